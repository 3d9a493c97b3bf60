//! HTTP surface of the workflow engine.
//!
//! Key modules:
//! - [`http_api`]: Axum router for transition, validation and health routes
//! - [`api_error`]: JSON error responses

pub mod api_error;
pub mod http_api;
