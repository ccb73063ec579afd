//! A scripted stand-in for the `cvs` binary.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Output the fake `cvs rlog` prints until told otherwise.
pub const DEFAULT_RLOG: &str = "rev 1.4\ndate: 2024/01/02 03:04:05\n";

const SCRIPT: &str = r#"#!/bin/sh
state="__STATE__"
printf '%s\n' "$*" >> "$state/invocations"
if [ -f "$state/fail" ]; then
    cat "$state/fail" >&2
    exit 1
fi
# drop "-Q -d <root>"
shift 3
case "$1" in
    rlog)
        cat "$state/rlog"
        ;;
    update)
        ;;
    checkout)
        mkdir -p "$5/CVS"
        printf '%s\n' "$6" > "$5/CVS/Repository"
        ;;
esac
"#;

/// A fake `cvs` executable with controllable output.
///
/// Every invocation is appended to a log; `rlog` prints the current contents
/// of a state file; `checkout -r B -d <leaf> <module>` creates the
/// bookkeeping directory for `<module>` under `<leaf>`.
pub struct FakeCvs {
    state: TempDir,
    program: PathBuf,
}

impl FakeCvs {
    pub fn new() -> Self {
        let state = tempfile::tempdir().unwrap();
        let program = state.path().join("cvs");

        let script = SCRIPT.replace("__STATE__", &state.path().display().to_string());
        fs::write(&program, script).unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

        let fake = Self { state, program };
        fake.set_rlog(DEFAULT_RLOG);
        fake
    }

    /// Path of the fake binary, suitable for the `command` config key.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// JSON driver configuration pointing at the fake binary.
    pub fn config_json(&self) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "cvsroot": "/srv/cvs",
            "command": self.program.display().to_string(),
        }))
        .unwrap()
    }

    /// Replaces what `rlog` prints.
    pub fn set_rlog(&self, output: &str) {
        fs::write(self.state.path().join("rlog"), output).unwrap();
    }

    /// Makes every invocation print `message` to stderr and exit 1.
    pub fn fail_with(&self, message: &str) {
        fs::write(self.state.path().join("fail"), message).unwrap();
    }

    /// Restores normal behavior after [`fail_with`](Self::fail_with).
    pub fn recover(&self) {
        let _ = fs::remove_file(self.state.path().join("fail"));
    }

    /// Argument lists of every invocation so far, one string per call.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.state.path().join("invocations"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Creates a checkout directory whose bookkeeping names `module`.
pub fn fake_checkout(dir: &Path, module: &str) {
    fs::create_dir_all(dir.join("CVS")).unwrap();
    fs::write(dir.join("CVS/Repository"), format!("{}\n", module)).unwrap();
}
