//! Logging and request tracing shared by the taskflow binaries.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Tracing**: request ids for the HTTP API and named spans for sweeps

pub mod logging;
pub mod tracing_setup;
