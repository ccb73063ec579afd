#![cfg(unix)]

mod helpers;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use helpers::fake_cvs::DEFAULT_RLOG;
use helpers::{FakeCvs, fake_checkout};
use sluice_core::{Driver, Fingerprint, Result, VcsError};
use sluice_vcs::{CvsDriver, NoopNormalizer, SourceNormalizer, builtin_registry};

fn driver(fake: &FakeCvs) -> CvsDriver {
    CvsDriver::from_config(Some(fake.config_json().as_slice()))
        .unwrap()
        .with_normalizer(Arc::new(NoopNormalizer))
}

#[derive(Default)]
struct FailingNormalizer {
    calls: AtomicUsize,
}

impl SourceNormalizer for FailingNormalizer {
    fn normalize(&self, dir: &Path, special_files: &[&str]) -> Result<()> {
        assert_eq!(special_files, &["CVS"]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(VcsError::normalization(dir, "vim exited with status 1"))
    }
}

#[test]
fn head_rev_digests_rlog_output() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("work");
    fake_checkout(&dir, "foo/bar");

    let fp = driver(&fake).head_rev(&dir).unwrap();

    assert_eq!(fp, Fingerprint::digest(DEFAULT_RLOG.as_bytes()));
    assert_eq!(fp.as_str().len(), sluice_core::DIGEST_HEX_LEN);
    assert_eq!(fake.invocations(), vec!["-Q -d /srv/cvs rlog -r foo/bar"]);
}

#[test]
fn head_rev_is_deterministic() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    fake_checkout(tmp.path(), "foo/bar");
    let driver = driver(&fake);

    let first = driver.head_rev(tmp.path()).unwrap();
    let second = driver.head_rev(tmp.path()).unwrap();
    assert_eq!(first, second);

    fake.set_rlog("rev 1.5\ndate: 2024/02/01 00:00:00\n");
    let third = driver.head_rev(tmp.path()).unwrap();
    assert_ne!(first, third);
}

#[test]
fn clone_then_head_rev_agree() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("mirrors/vcs-tools");
    let driver = driver(&fake);

    let cloned = driver.clone_repo(&dir, "tools").unwrap();

    assert_eq!(
        fs::read_to_string(dir.join("CVS/Repository")).unwrap(),
        "tools\n"
    );
    assert_eq!(driver.head_rev(&dir).unwrap(), cloned);

    let calls = fake.invocations();
    assert_eq!(
        calls[0],
        "-Q -d /srv/cvs checkout -r HEAD -d vcs-tools tools"
    );
    assert_eq!(calls[1], "-Q -d /srv/cvs rlog -r tools");
}

#[test]
fn pull_without_upstream_change_is_idempotent() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    fake_checkout(tmp.path(), "foo/bar");
    let driver = driver(&fake);

    let first = driver.pull(tmp.path()).unwrap();
    let second = driver.pull(tmp.path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, driver.head_rev(tmp.path()).unwrap());
    assert_eq!(fake.invocations()[0], "-Q -d /srv/cvs update -r HEAD .");
}

#[test]
fn pull_reports_new_upstream_revision() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    fake_checkout(tmp.path(), "foo/bar");
    let driver = driver(&fake);

    let before = driver.pull(tmp.path()).unwrap();
    fake.set_rlog("rev 1.5\ndate: 2024/03/01 12:00:00\n");
    let after = driver.pull(tmp.path()).unwrap();

    assert_ne!(before, after);
}

#[test]
fn branch_is_passed_to_update_and_rlog() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    fake_checkout(tmp.path(), "foo/bar");

    let raw = serde_json::to_vec(&serde_json::json!({
        "cvsroot": "/srv/cvs",
        "branch": "rel-1",
        "command": fake.program().display().to_string(),
    }))
    .unwrap();
    let driver = CvsDriver::from_config(Some(raw.as_slice()))
        .unwrap()
        .with_normalizer(Arc::new(NoopNormalizer));

    driver.pull(tmp.path()).unwrap();

    assert_eq!(
        fake.invocations(),
        vec![
            "-Q -d /srv/cvs update -r rel-1 .",
            "-Q -d /srv/cvs rlog -rrel-1 foo/bar",
        ]
    );
}

#[test]
fn clone_into_existing_checkout_is_rejected() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    fake_checkout(tmp.path(), "foo/bar");

    let err = driver(&fake).clone_repo(tmp.path(), "foo/bar").unwrap_err();

    assert!(err.is_configuration());
    assert!(fake.invocations().is_empty());
}

#[test]
fn pull_without_bookkeeping_is_rejected() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();

    let err = driver(&fake).pull(tmp.path()).unwrap_err();

    assert!(err.is_configuration());
    assert!(fake.invocations().is_empty());
}

#[test]
fn tool_failure_carries_output() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    fake_checkout(tmp.path(), "foo/bar");
    fake.fail_with("cvs [rlog aborted]: there is no repository /srv/cvs\n");

    let err = driver(&fake).head_rev(tmp.path()).unwrap_err();

    assert!(err.is_tool_execution());
    assert!(err.is_transient());
    assert!(
        err.tool_output()
            .unwrap()
            .contains("cvs [rlog aborted]: there is no repository")
    );
    assert!(err.to_string().contains("exit status 1"));
}

#[test]
fn failed_update_does_not_fingerprint() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    fake_checkout(tmp.path(), "foo/bar");
    fake.fail_with("cvs update: connection refused\n");

    let err = driver(&fake).pull(tmp.path()).unwrap_err();

    assert!(err.is_tool_execution());
    assert_eq!(fake.invocations().len(), 1);
}

#[test]
fn normalizer_failure_does_not_fail_sync() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("work");
    let normalizer = Arc::new(FailingNormalizer::default());

    let driver = CvsDriver::from_config(Some(fake.config_json().as_slice()))
        .unwrap()
        .with_normalizer(normalizer.clone());

    let cloned = driver.clone_repo(&dir, "foo/bar").unwrap();
    let pulled = driver.pull(&dir).unwrap();

    assert_eq!(cloned, pulled);
    assert_eq!(normalizer.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn work_dir_clones_then_pulls() {
    let fake = FakeCvs::new();
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("vcs-foo");

    let registry = builtin_registry().unwrap();
    let work_dir = registry
        .new_work_dir("cvs", Some(fake.config_json().as_slice()))
        .unwrap();

    let cloned = work_dir.pull_or_clone(&dir, "foo/bar").unwrap();
    let pulled = work_dir.pull_or_clone(&dir, "foo/bar").unwrap();

    assert_eq!(cloned, pulled);
    let calls = fake.invocations();
    assert!(calls[0].contains("checkout"));
    assert!(calls.iter().any(|c| c.contains("update -r HEAD .")));
}
