//! Daemon error types.

use sluice_core::VcsError;
use thiserror::Error;

/// Errors that stop the daemon from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration file or environment could not be read.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The configuration was read but is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A repository's driver could not be built.
    #[error("repository '{name}': {source}")]
    Repository {
        name: String,
        #[source]
        source: VcsError,
    },

    /// A driver or store error outside of a specific repository.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// The metrics exporter could not be installed.
    #[error("metrics exporter: {0}")]
    Metrics(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates an invalid configuration error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Wraps a driver error for repository `name`.
    pub fn repository(name: impl Into<String>, source: VcsError) -> Self {
        Self::Repository {
            name: name.into(),
            source,
        }
    }
}
