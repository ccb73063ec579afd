//! Sluice Core - driver contract and registry
//!
//! This crate provides the foundational types shared by every Sluice
//! backend:
//!
//! - [`Driver`]: the four-operation contract (`head_rev`, `pull`,
//!   `clone_repo`, `special_files`) each version-control backend implements
//! - [`Registry`]: the name → (constructor, concurrency class) table the
//!   scheduler builds drivers from
//! - [`Fingerprint`]: the revision identifier returned by every operation
//! - [`VcsError`]: the error taxonomy
//!
//! ## Example
//!
//! ```
//! use sluice_core::{ConcurrencyClass, Registry};
//!
//! let registry = Registry::new();
//! assert!(registry.lookup("cvs").is_err());
//! assert_eq!(ConcurrencyClass::Exclusive.permits(8), 1);
//! ```

pub mod driver;
pub mod error;
pub mod fingerprint;
pub mod registry;

pub use driver::{ConcurrencyClass, Driver};
pub use error::{Result, VcsError};
pub use fingerprint::{DIGEST_HEX_LEN, Fingerprint};
pub use registry::{Constructor, Registry, RegistryEntry, WorkDir};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
