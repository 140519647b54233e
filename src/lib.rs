//! Tether: a local-first continuity agent for a single operator.
//!
//! The crate is organized around an explicit context pair — [`config::StorePaths`]
//! for the on-disk layout and [`db::Database`] for the durable store — that is
//! constructed once and handed to every component:
//!
//! - [`api`]: the localhost HTTP surface over the store.
//! - [`backup`]: point-in-time snapshot archives and restore.
//! - [`continuity`]: session-gap detection and the restore policy.
//! - [`projects`]: per-project isolation (namespace + port) and lifecycle.
//! - [`client`]: the HTTP client the CLI uses to talk to a running instance.

pub mod api;
pub mod backup;
pub mod client;
pub mod config;
pub mod continuity;
pub mod db;
pub mod error;
pub mod models;
pub mod projects;

pub use error::Error;

/// Version string reported by `GET /health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
