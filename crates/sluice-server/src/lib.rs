//! Sluice Server - the mirror daemon
//!
//! Reads the daemon configuration, builds a driver per repository from the
//! built-in registry and keeps every working copy in sync until stopped.

pub mod config;
pub mod daemon;
pub mod error;
pub mod metrics;

pub use config::{RepoConfig, ServerConfig};
pub use daemon::{build_registry, build_scheduler, run, spawn_event_consumer};
pub use error::ServerError;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
