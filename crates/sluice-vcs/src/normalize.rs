//! Source encoding normalization.
//!
//! After a clone or pull materializes new content, drivers hand the working
//! directory to a [`SourceNormalizer`] that rewrites C-family, Fortran and
//! shell sources to UTF-8 in place. The call is best-effort: a failure is
//! logged by [`normalize_best_effort`] and never fails the sync, since the
//! checkout itself is already usable.

use std::path::{Path, PathBuf};

use sluice_core::{Result, VcsError};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::process::ToolCommand;

/// Extensions (lowercase, without the dot) of files that get normalized.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "h", "c", "sh", "cu", "cc", "hpp", "cpp", "f", "f90", "f77",
];

/// Rewrites source files under a working directory to UTF-8.
pub trait SourceNormalizer: Send + Sync {
    /// Normalizes every source file under `dir`, skipping `special_files`.
    fn normalize(&self, dir: &Path, special_files: &[&str]) -> Result<()>;
}

/// Returns true if `path` has one of the [`SOURCE_EXTENSIONS`].
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SOURCE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn is_special(entry: &DirEntry, special_files: &[&str]) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| special_files.contains(&name))
            .unwrap_or(false)
}

/// Lists source files under `dir` as paths relative to `dir`.
///
/// Any entry named like one of `special_files` is pruned together with its
/// whole subtree, at every depth (CVS keeps a `CVS/` directory in each
/// checked-out directory). Results are sorted by path.
pub fn collect_source_files(dir: &Path, special_files: &[&str]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_special(e, special_files));

    for entry in walker {
        let entry = entry.map_err(|e| VcsError::Normalization {
            dir: dir.to_path_buf(),
            message: "failed to walk working directory".to_string(),
            cause: Some(Box::new(e)),
        })?;

        if !entry.file_type().is_file() || !is_source_file(entry.path()) {
            continue;
        }

        if let Ok(rel) = entry.path().strip_prefix(dir) {
            paths.push(rel.to_path_buf());
        }
    }

    Ok(paths)
}

/// Runs `normalizer` and logs the outcome instead of returning it.
pub fn normalize_best_effort(
    normalizer: &dyn SourceNormalizer,
    dir: &Path,
    special_files: &[&str],
) {
    match normalizer.normalize(dir, special_files) {
        Ok(()) => debug!(dir = %dir.display(), "normalized sources"),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "source normalization failed, continuing")
        },
    }
}

/// Converts files with `vim`, in batches.
///
/// Runs `vim -n -T builtin_dumb "+silent argdo se nobomb | se fileencoding=utf-8 | w" -c :q`
/// over the collected files.
#[derive(Debug, Clone)]
pub struct VimNormalizer {
    command: String,
    batch_size: usize,
}

impl VimNormalizer {
    /// Default number of paths passed to a single `vim` invocation.
    pub const DEFAULT_BATCH_SIZE: usize = 512;

    /// Creates a normalizer invoking `vim` from `PATH`.
    pub fn new() -> Self {
        Self {
            command: "vim".to_string(),
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    /// Overrides the editor binary.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Sets how many paths go into one invocation.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn convert(&self, dir: &Path, paths: &[PathBuf]) -> Result<()> {
        ToolCommand::new(&self.command, dir)
            .args([
                "-n",
                "-T",
                "builtin_dumb",
                "+silent argdo se nobomb | se fileencoding=utf-8 | w",
                "-c",
                ":q",
            ])
            .args(paths)
            .run()
            .map_err(|e| VcsError::Normalization {
                dir: dir.to_path_buf(),
                message: format!("{} conversion failed", self.command),
                cause: Some(Box::new(e)),
            })
    }
}

impl Default for VimNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceNormalizer for VimNormalizer {
    fn normalize(&self, dir: &Path, special_files: &[&str]) -> Result<()> {
        let paths = collect_source_files(dir, special_files)?;
        if paths.is_empty() {
            return Ok(());
        }

        debug!(dir = %dir.display(), files = paths.len(), "normalizing sources");

        for batch in paths.chunks(self.batch_size) {
            self.convert(dir, batch)?;
        }

        Ok(())
    }
}

/// Leaves the working directory untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNormalizer;

impl SourceNormalizer for NoopNormalizer {
    fn normalize(&self, _dir: &Path, _special_files: &[&str]) -> Result<()> {
        Ok(())
    }
}
