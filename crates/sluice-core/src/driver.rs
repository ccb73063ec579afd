//! The uniform driver contract.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VcsError};
use crate::fingerprint::Fingerprint;

/// Declares whether a backend tolerates parallel synchronizations.
///
/// This is advisory metadata. The registry stores it; the scheduler reads it
/// to size the worker pool for each backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyClass {
    /// Several operations of this backend type may run at once.
    Concurrent,
    /// Operations of this backend type must run one at a time.
    Exclusive,
}

impl ConcurrencyClass {
    /// Returns the label used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concurrent => "concurrent",
            Self::Exclusive => "exclusive",
        }
    }

    /// Returns true if the scheduler must serialize this backend type.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive)
    }

    /// Number of simultaneous operations allowed given a pool-wide limit.
    pub fn permits(&self, max_concurrent: usize) -> usize {
        match self {
            Self::Concurrent => max_concurrent.max(1),
            Self::Exclusive => 1,
        }
    }
}

impl fmt::Display for ConcurrencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConcurrencyClass {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "concurrent" => Ok(Self::Concurrent),
            "exclusive" => Ok(Self::Exclusive),
            other => Err(VcsError::configuration(format!(
                "unknown concurrency class '{}'",
                other
            ))),
        }
    }
}

/// A version-control backend adapter.
///
/// A driver is bound to one backend configuration and keeps no state
/// between calls: everything it knows about a working copy it reads from
/// the backend's own bookkeeping files. Every operation blocks for the
/// duration of the external tool.
///
/// # Implementors
///
/// - `CvsDriver` - derives fingerprints by digesting `cvs rlog` output
/// - `GitDriver`, `HgDriver`, `SvnDriver` - report native revisions
///
/// # Concurrency
///
/// Calls on distinct working directories may run in parallel. The caller
/// must never run `pull`/`clone_repo` concurrently with any other operation on
/// the same directory.
pub trait Driver: Send + Sync {
    /// Computes the revision fingerprint of an existing checkout.
    ///
    /// Must not mutate the working directory.
    ///
    /// # Errors
    ///
    /// - `VcsError::Configuration` if `dir` is not a checkout for this backend
    /// - `VcsError::ToolExecution` if the backend tool fails
    fn head_rev(&self, dir: &Path) -> Result<Fingerprint>;

    /// Updates an existing checkout to the latest upstream state and returns
    /// the new fingerprint.
    fn pull(&self, dir: &Path) -> Result<Fingerprint>;

    /// Materializes a fresh checkout of `url` at `dir` and returns its
    /// fingerprint.
    ///
    /// # Errors
    ///
    /// - `VcsError::Configuration` if `dir` already holds a checkout
    fn clone_repo(&self, dir: &Path, url: &str) -> Result<Fingerprint>;

    /// Backend-reserved paths, relative to the working directory, that must
    /// be excluded from content enumeration.
    fn special_files(&self) -> &[&'static str];
}
