//! Git backend, driven through the system `git` CLI.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sluice_core::{ConcurrencyClass, Driver, Fingerprint, Registry, Result};
use tracing::info;

use super::{clone_target, decode_config, ensure_checkout, ensure_not_checkout};
use crate::normalize::{SourceNormalizer, VimNormalizer, normalize_best_effort};
use crate::process::ToolCommand;

/// Configuration for the Git backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Branch to track.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// The `git` binary.
    pub command: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            git_ref: "master".to_string(),
            command: "git".to_string(),
        }
    }
}

/// Driver for Git working copies.
///
/// Clones are shallow; the fingerprint is the commit id of `HEAD`.
pub struct GitDriver {
    config: GitConfig,
    normalizer: Arc<dyn SourceNormalizer>,
}

impl GitDriver {
    /// Backend name in the registry.
    pub const NAME: &'static str = "git";

    /// Creates a driver with the default normalizer.
    pub fn new(config: GitConfig) -> Self {
        Self {
            config,
            normalizer: Arc::new(VimNormalizer::new()),
        }
    }

    /// Builds a driver from a raw JSON configuration blob.
    pub fn from_config(raw: Option<&[u8]>) -> Result<Self> {
        Ok(Self::new(decode_config(raw)?))
    }

    /// Replaces the source normalizer.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn SourceNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Returns the driver configuration.
    pub fn config(&self) -> &GitConfig {
        &self.config
    }

    /// Registers the `git` backend.
    pub fn register(registry: &mut Registry) -> Result<()> {
        registry.register(
            Self::NAME,
            |raw: Option<&[u8]>| -> Result<Box<dyn Driver>> {
                Ok(Box::new(Self::from_config(raw)?))
            },
            ConcurrencyClass::Concurrent,
        )
    }

    fn git(&self, dir: &Path) -> ToolCommand {
        ToolCommand::new(&self.config.command, dir)
    }
}

impl Driver for GitDriver {
    fn head_rev(&self, dir: &Path) -> Result<Fingerprint> {
        ensure_checkout(dir, ".git", Self::NAME)?;
        let out = self.git(dir).args(["rev-parse", "HEAD"]).output()?;
        Ok(Fingerprint::native(String::from_utf8_lossy(&out)))
    }

    fn pull(&self, dir: &Path) -> Result<Fingerprint> {
        ensure_checkout(dir, ".git", Self::NAME)?;
        let git_ref = &self.config.git_ref;

        info!(dir = %dir.display(), git_ref = %git_ref, "git fetch");
        self.git(dir)
            .args(["fetch", "--prune", "--no-tags", "--depth", "1", "origin"])
            .arg(format!("+{0}:remotes/origin/{0}", git_ref))
            .run()?;

        self.git(dir)
            .args(["reset", "--hard"])
            .arg(format!("origin/{}", git_ref))
            .run()?;

        normalize_best_effort(self.normalizer.as_ref(), dir, self.special_files());
        self.head_rev(dir)
    }

    fn clone_repo(&self, dir: &Path, url: &str) -> Result<Fingerprint> {
        ensure_not_checkout(dir, ".git", Self::NAME)?;
        let (parent, leaf) = clone_target(dir)?;

        info!(url = %url, dir = %dir.display(), "git clone");
        self.git(&parent)
            .args(["clone", "--depth", "1", "--branch", self.config.git_ref.as_str()])
            .arg(url)
            .arg(&leaf)
            .run()?;

        normalize_best_effort(self.normalizer.as_ref(), dir, self.special_files());
        self.head_rev(dir)
    }

    fn special_files(&self) -> &[&'static str] {
        &[".git"]
    }
}
