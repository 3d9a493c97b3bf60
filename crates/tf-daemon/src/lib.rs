//! Background automation for the workflow engine.
//!
//! The daemon drives the engine in bulk on fixed intervals:
//! - [`auto_flow`]: timeout blocking, parent completion, child auto-start
//! - [`patrol`]: timeout detection, health checks and reminders
//! - [`sweep`]: options, guards and the shared per-task attempt logic
//! - [`daemon`]: interval loops plus the HTTP API

pub mod api;
pub mod auto_flow;
pub mod daemon;
pub mod patrol;
pub mod shutdown;
pub mod sweep;
