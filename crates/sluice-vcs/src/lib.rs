//! # Sluice VCS
//!
//! Version-control drivers and the scheduler that keeps working copies in
//! sync for the Sluice mirror daemon.
//!
//! ## Features
//!
//! - Built-in drivers for CVS, Git, Mercurial and Subversion, all invoking
//!   the system tools through one [`ToolCommand`] discipline
//! - Source normalization after every pull or clone
//! - A scheduler that honors each backend's concurrency class
//! - Last known good fingerprints persisted across restarts
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use sluice_vcs::builtin_registry;
//!
//! let registry = builtin_registry()?;
//! let work_dir = registry.new_work_dir("cvs", Some(br#"{"cvsroot": "/srv/cvs"}"#))?;
//! let fingerprint = work_dir.pull_or_clone(Path::new("/var/lib/sluice/vcs-tools"), "tools")?;
//! println!("tools at {}", fingerprint.short());
//! # Ok::<(), sluice_vcs::sluice_core::VcsError>(())
//! ```

pub mod backends;
pub mod normalize;
pub mod process;
pub mod sync;

// Re-exports
pub use backends::{
    CvsConfig, CvsDriver, GitConfig, GitDriver, HgConfig, HgDriver, SvnConfig, SvnDriver,
    builtin_registry, register_builtin,
};
pub use normalize::{NoopNormalizer, SourceNormalizer, VimNormalizer, collect_source_files};
pub use process::ToolCommand;
pub use sync::{
    JsonRevisionStore, MemoryRevisionStore, Repository, RevisionStore, SchedulerConfig,
    SyncEvent, SyncHandle, SyncOutcome, SyncScheduler, SyncStatus,
};

// Re-export sluice_core for consumers
pub use sluice_core;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
