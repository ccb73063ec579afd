//! Built-in version-control backends.
//!
//! Each backend module exposes a driver type with a `register` function.
//! [`register_builtin`] calls all of them.

mod cvs;
mod git;
mod hg;
mod svn;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use sluice_core::{Registry, Result, VcsError};

pub use cvs::{CvsConfig, CvsDriver, DEFAULT_CVSROOT};
pub use git::{GitConfig, GitDriver};
pub use hg::{HgConfig, HgDriver};
pub use svn::{SvnConfig, SvnDriver};

/// Registers every built-in backend.
///
/// | name  | class      |
/// |-------|------------|
/// | `cvs` | concurrent |
/// | `git` | concurrent |
/// | `hg`  | concurrent |
/// | `svn` | exclusive  |
pub fn register_builtin(registry: &mut Registry) -> Result<()> {
    CvsDriver::register(registry)?;
    GitDriver::register(registry)?;
    HgDriver::register(registry)?;
    SvnDriver::register(registry)?;
    Ok(())
}

/// Returns a registry holding every built-in backend.
pub fn builtin_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    register_builtin(&mut registry)?;
    Ok(registry)
}

/// Decodes a driver configuration blob, applying defaults when absent.
///
/// Missing fields fall back to the type's `#[serde(default)]` values.
pub(crate) fn decode_config<T>(raw: Option<&[u8]>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match raw {
        Some(bytes) => Ok(serde_json::from_slice(bytes)?),
        None => Ok(T::default()),
    }
}

/// Splits a clone destination into the directory the tool runs in and the
/// name of the checkout it creates there. The parent is created if needed.
pub(crate) fn clone_target(dir: &Path) -> Result<(PathBuf, OsString)> {
    let leaf = dir.file_name().ok_or_else(|| {
        VcsError::configuration(format!(
            "clone destination {} has no final path component",
            dir.display()
        ))
    })?;

    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&parent)?;

    Ok((parent, leaf.to_os_string()))
}

/// Fails if `dir` already contains the backend's bookkeeping path.
pub(crate) fn ensure_not_checkout(dir: &Path, marker: &str, backend: &str) -> Result<()> {
    if dir.join(marker).exists() {
        return Err(VcsError::configuration(format!(
            "{} already holds a {} checkout",
            dir.display(),
            backend
        )));
    }
    Ok(())
}

/// Fails unless `dir` contains the backend's bookkeeping path.
pub(crate) fn ensure_checkout(dir: &Path, marker: &str, backend: &str) -> Result<()> {
    if !dir.join(marker).exists() {
        return Err(VcsError::configuration(format!(
            "{} is not a {} checkout (missing {})",
            dir.display(),
            backend,
            marker
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use sluice_core::ConcurrencyClass;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        root: String,
        depth: u32,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                root: "/default".to_string(),
                depth: 1,
            }
        }
    }

    #[test]
    fn test_decode_config_defaults() {
        let s: Sample = decode_config(None).unwrap();
        assert_eq!(s, Sample::default());

        let s: Sample = decode_config(Some(br#"{"depth": 5}"#)).unwrap();
        assert_eq!(s.root, "/default");
        assert_eq!(s.depth, 5);
    }

    #[test]
    fn test_decode_config_malformed() {
        let err = decode_config::<Sample>(Some(b"{\"depth\": \"deep\"}")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_clone_target() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("nested/parent/repo");

        let (parent, leaf) = clone_target(&dest).unwrap();
        assert_eq!(parent, tmp.path().join("nested/parent"));
        assert_eq!(leaf, "repo");
        assert!(parent.is_dir());

        assert!(clone_target(Path::new("/")).unwrap_err().is_configuration());
    }

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry().unwrap();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["cvs", "git", "hg", "svn"]);

        assert_eq!(
            registry.lookup("svn").unwrap().concurrency(),
            ConcurrencyClass::Exclusive
        );
        assert_eq!(
            registry.lookup("cvs").unwrap().concurrency(),
            ConcurrencyClass::Concurrent
        );
    }

    #[test]
    fn test_register_builtin_twice_fails() {
        let mut registry = builtin_registry().unwrap();
        let err = register_builtin(&mut registry).unwrap_err();
        assert!(matches!(err, VcsError::DuplicateBackend(ref n) if n == "cvs"));
        assert_eq!(registry.len(), 4);
    }
}
