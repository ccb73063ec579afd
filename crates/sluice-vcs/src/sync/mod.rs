//! Background synchronization.
//!
//! This module runs drivers on a schedule, tracks per-repository health and
//! persists the last known good fingerprint of every repository.

mod scheduler;
mod state;
mod store;

pub use scheduler::{
    Repository, SchedulerConfig, SyncEvent, SyncHandle, SyncOutcome, SyncScheduler,
    SyncSchedulerBuilder,
};
pub use state::{SyncState, SyncStatus};
pub use store::{JsonRevisionStore, MemoryRevisionStore, RevisionStore};
