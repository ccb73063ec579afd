//! Test helpers for sluice-vcs.

#![allow(dead_code, unused_imports)]

#[cfg(unix)]
pub mod fake_cvs;
pub mod recorder;

#[cfg(unix)]
pub use fake_cvs::{FakeCvs, fake_checkout};
pub use recorder::{Recorder, RecordingDriver, recording_registry};
