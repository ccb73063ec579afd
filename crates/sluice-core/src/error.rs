//! Error types for Sluice.
//!
//! Every driver operation returns `Result<T, VcsError>`. The variants follow
//! the three failure classes a synchronization can hit:
//!
//! - [`VcsError::Configuration`]: bad backend parameters, or a working
//!   directory that is not a valid checkout for the configured backend.
//! - [`VcsError::ToolExecution`]: the backend tool could not be launched or
//!   exited non-zero. Carries the captured output for diagnosis.
//! - [`VcsError::Normalization`]: post-processing of a fresh checkout failed.
//!   Drivers log these and never return them from `pull` or `clone`.
//!
//! # Example
//!
//! ```
//! use sluice_core::VcsError;
//!
//! let error = VcsError::configuration("missing CVS/Repository");
//! assert!(error.is_configuration());
//! assert!(!error.is_transient());
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for driver and registry operations.
#[derive(Debug, Error)]
pub enum VcsError {
    /// Backend parameters are invalid, or the directory is not a checkout.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem
        message: String,
        /// Underlying error, if any
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external tool failed to start or exited non-zero.
    #[error("{tool} failed ({}): {}", status_label(.status), .output.trim_end())]
    ToolExecution {
        /// Name of the tool that was invoked
        tool: String,
        /// Exit code, `None` when the process never ran or was killed
        status: Option<i32>,
        /// Combined stdout/stderr captured from the tool
        output: String,
        /// Launch error, if the process could not be started
        #[source]
        cause: Option<io::Error>,
    },

    /// Encoding normalization of a working copy failed.
    #[error("normalization failed in {}: {message}", .dir.display())]
    Normalization {
        /// Working directory being normalized
        dir: PathBuf,
        /// Description of the failure
        message: String,
        /// Underlying error, if any
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A backend with this name is already registered.
    #[error("backend '{0}' is already registered")]
    DuplicateBackend(String),

    /// No backend with this name is registered.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn status_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "not run".to_string(),
    }
}

impl VcsError {
    // ============================================
    // Convenience constructors
    // ============================================

    /// Creates a Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a Configuration error wrapping an underlying cause.
    pub fn configuration_with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Configuration {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Creates a ToolExecution error for a tool that ran and exited non-zero.
    pub fn tool(tool: impl Into<String>, status: Option<i32>, output: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            status,
            output: output.into(),
            cause: None,
        }
    }

    /// Creates a ToolExecution error for a tool that could not be launched.
    pub fn tool_launch(tool: impl Into<String>, cause: io::Error) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            status: None,
            output: String::new(),
            cause: Some(cause),
        }
    }

    /// Creates a Normalization error.
    pub fn normalization(dir: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Normalization {
            dir: dir.into(),
            message: message.into(),
            cause: None,
        }
    }

    // ============================================
    // Classification
    // ============================================

    /// Returns true for configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns true for tool execution errors.
    pub fn is_tool_execution(&self) -> bool {
        matches!(self, Self::ToolExecution { .. })
    }

    /// Returns true if a later attempt might succeed without operator action.
    ///
    /// Only tool failures qualify: servers go away and come back, whereas a
    /// bad configuration stays bad.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ToolExecution { .. })
    }

    /// Returns the captured tool output, if this is a tool error.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            Self::ToolExecution { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for VcsError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration_with_cause(format!("invalid driver configuration: {}", err), err)
    }
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, VcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VcsError::configuration("no CVS/Repository in /tmp/x");
        assert_eq!(
            err.to_string(),
            "configuration error: no CVS/Repository in /tmp/x"
        );

        let err = VcsError::tool("cvs", Some(1), "cvs [rlog aborted]: no such module\n");
        assert_eq!(
            err.to_string(),
            "cvs failed (exit status 1): cvs [rlog aborted]: no such module"
        );

        let err = VcsError::DuplicateBackend("cvs".to_string());
        assert_eq!(err.to_string(), "backend 'cvs' is already registered");
    }

    #[test]
    fn test_tool_launch_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err = VcsError::tool_launch("svn", io_err);

        assert!(err.is_tool_execution());
        assert_eq!(err.tool_output(), Some(""));
        assert!(err.to_string().contains("not run"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_transient() {
        assert!(VcsError::tool("git", Some(128), "fatal").is_transient());
        assert!(!VcsError::configuration("bad").is_transient());
        assert!(!VcsError::normalization("/tmp", "vim missing").is_transient());
        assert!(!VcsError::UnknownBackend("bzr".into()).is_transient());
    }

    #[test]
    fn test_from_serde_json() {
        let err: VcsError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("invalid driver configuration"));
    }
}
