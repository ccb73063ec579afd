//! Per-repository sync state tracking.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use sluice_core::Fingerprint;

use super::SchedulerConfig;

/// Tracks the sync history of one repository.
#[derive(Debug)]
pub struct SyncState {
    /// Fingerprint returned by the last successful sync.
    fingerprint: RwLock<Option<Fingerprint>>,
    /// The last successful sync time.
    last_success: RwLock<Option<Instant>>,
    /// When the last attempt started, successful or not.
    last_attempt: RwLock<Option<Instant>>,
    /// The last error message, if any.
    last_error: RwLock<Option<String>>,
    /// Number of consecutive failures.
    failure_count: RwLock<u32>,
}

/// Point-in-time copy of a [`SyncState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub fingerprint: Option<Fingerprint>,
    pub last_error: Option<String>,
    pub failure_count: u32,
    pub healthy: bool,
}

impl SyncState {
    /// Creates a new SyncState.
    pub fn new() -> Self {
        Self {
            fingerprint: RwLock::new(None),
            last_success: RwLock::new(None),
            last_attempt: RwLock::new(None),
            last_error: RwLock::new(None),
            failure_count: RwLock::new(0),
        }
    }

    /// Returns the last known good fingerprint.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint.read().clone()
    }

    /// Returns the time of the last successful sync.
    pub fn last_success(&self) -> Option<Instant> {
        *self.last_success.read()
    }

    /// Records that an attempt started at `at`.
    ///
    /// Cadence is measured from the start of each attempt, so a slow driver
    /// does not push the next sync back by its own run time.
    pub fn record_attempt(&self, at: Instant) {
        *self.last_attempt.write() = Some(at);
    }

    /// Records a successful sync.
    pub fn record_success(&self, fingerprint: Fingerprint) {
        let mut fp = self.fingerprint.write();
        let mut last_success = self.last_success.write();
        let mut last_error = self.last_error.write();
        let mut failure_count = self.failure_count.write();

        *fp = Some(fingerprint);
        *last_success = Some(Instant::now());
        *last_error = None;
        *failure_count = 0;
    }

    /// Records a failed sync. The last known good fingerprint is kept.
    pub fn record_failure(&self, error: impl Into<String>) {
        let mut last_error = self.last_error.write();
        let mut failure_count = self.failure_count.write();

        *last_error = Some(error.into());
        *failure_count += 1;
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns the number of consecutive failures.
    pub fn failure_count(&self) -> u32 {
        *self.failure_count.read()
    }

    /// Returns true if the last sync succeeded.
    pub fn is_healthy(&self) -> bool {
        self.fingerprint.read().is_some() && self.last_error.read().is_none()
    }

    /// Delay before the next attempt.
    ///
    /// The base interval, stretched by `backoff_multiplier` for every failure
    /// past `max_failures` and capped at `max_backoff`.
    pub fn next_delay(&self, config: &SchedulerConfig) -> Duration {
        let failures = self.failure_count();
        if failures < config.max_failures {
            return config.interval;
        }

        let steps = (failures - config.max_failures + 1).min(32) as i32;
        let secs = config.interval.as_secs_f64() * config.backoff_multiplier.powi(steps);
        Duration::from_secs_f64(secs.min(config.max_backoff.as_secs_f64()))
    }

    /// Returns true if a sync is due at `now` under `config`.
    pub fn is_due(&self, config: &SchedulerConfig, now: Instant) -> bool {
        match *self.last_attempt.read() {
            Some(at) => now.saturating_duration_since(at) >= self.next_delay(config),
            None => true,
        }
    }

    /// Returns a snapshot of the state.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            fingerprint: self.fingerprint(),
            last_error: self.last_error(),
            failure_count: self.failure_count(),
            healthy: self.is_healthy(),
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}
