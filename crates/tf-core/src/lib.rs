//! Core domain types and collaborator contracts for taskflow.
//!
//! - [`types`]: tasks, statuses and the static transition matrix
//! - [`store`]: the async [`store::TaskStore`] contract plus an in-memory store
//! - [`cache`]: SQLite-backed [`cache::SqliteStore`]
//! - [`events`]: workflow events and the [`events::EventBus`] sink
//! - [`config`]: TOML configuration

pub mod cache;
pub mod config;
pub mod events;
pub mod store;
pub mod types;
