//! Test helpers for sluice-server.

#![allow(dead_code, unused_imports)]

use std::fs;
use std::path::{Path, PathBuf};

/// Writes `sluice.<ext>` into `dir` and returns the path without extension,
/// the form `ServerConfig::load_from` expects.
pub fn write_config(dir: &Path, ext: &str, contents: &str) -> String {
    fs::write(dir.join(format!("sluice.{}", ext)), contents).unwrap();
    dir.join("sluice").display().to_string()
}

/// Writes an executable fake `cvs` into `dir` that checks out any module
/// and prints a fixed rlog.
#[cfg(unix)]
pub fn fake_cvs(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let program = dir.join("cvs");
    let script = r#"#!/bin/sh
shift 3
case "$1" in
    rlog)
        printf 'rev 1.1\ndate: 2024/01/01 00:00:00\n'
        ;;
    checkout)
        mkdir -p "$5/CVS"
        printf '%s\n' "$6" > "$5/CVS/Repository"
        ;;
esac
"#;
    fs::write(&program, script).unwrap();
    fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
    program
}
