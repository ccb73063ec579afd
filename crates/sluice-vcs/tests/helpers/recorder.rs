//! An instrumented driver for scheduler tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use sluice_core::{ConcurrencyClass, Driver, Fingerprint, Registry, Result, VcsError};

/// Shared counters observed by every driver built from one registry entry.
#[derive(Debug)]
pub struct Recorder {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    fail: AtomicBool,
    fingerprint: Mutex<String>,
    delay: Duration,
}

impl Recorder {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            fingerprint: Mutex::new("r1".to_string()),
            delay,
        })
    }

    /// Highest number of operations observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fingerprint(&self, fp: &str) {
        *self.fingerprint.lock() = fp.to_string();
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn operate(&self) -> Result<Fingerprint> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        thread::sleep(self.delay);

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(VcsError::tool("recorder", Some(1), "recorder: forced failure\n"));
        }
        Ok(Fingerprint::native(self.fingerprint.lock().as_str()))
    }
}

/// Driver reporting to a [`Recorder`].
pub struct RecordingDriver {
    recorder: Arc<Recorder>,
}

impl Driver for RecordingDriver {
    fn head_rev(&self, _dir: &Path) -> Result<Fingerprint> {
        Ok(Fingerprint::native(self.recorder.fingerprint.lock().as_str()))
    }

    fn pull(&self, _dir: &Path) -> Result<Fingerprint> {
        self.recorder.operate()
    }

    fn clone_repo(&self, dir: &Path, _url: &str) -> Result<Fingerprint> {
        let fp = self.recorder.operate()?;
        std::fs::create_dir_all(dir)?;
        Ok(fp)
    }

    fn special_files(&self) -> &[&'static str] {
        &[]
    }
}

/// Builds a registry with a `shared` (concurrent) and a `locked`
/// (exclusive) backend, returning their recorders in that order.
pub fn recording_registry(delay: Duration) -> (Registry, Arc<Recorder>, Arc<Recorder>) {
    let shared = Recorder::new(delay);
    let locked = Recorder::new(delay);

    let mut registry = Registry::new();
    for (name, recorder, class) in [
        ("shared", Arc::clone(&shared), ConcurrencyClass::Concurrent),
        ("locked", Arc::clone(&locked), ConcurrencyClass::Exclusive),
    ] {
        registry
            .register(
                name,
                move |_raw: Option<&[u8]>| -> Result<Box<dyn Driver>> {
                    Ok(Box::new(RecordingDriver {
                        recorder: Arc::clone(&recorder),
                    }))
                },
                class,
            )
            .unwrap();
    }

    (registry, shared, locked)
}
