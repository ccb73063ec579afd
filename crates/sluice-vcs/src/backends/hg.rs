//! Mercurial backend.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sluice_core::{ConcurrencyClass, Driver, Fingerprint, Registry, Result};
use tracing::info;

use super::{clone_target, decode_config, ensure_checkout, ensure_not_checkout};
use crate::normalize::{SourceNormalizer, VimNormalizer, normalize_best_effort};
use crate::process::ToolCommand;

/// Configuration for the Mercurial backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HgConfig {
    /// The `hg` binary.
    pub command: String,
}

impl Default for HgConfig {
    fn default() -> Self {
        Self {
            command: "hg".to_string(),
        }
    }
}

/// Driver for Mercurial working copies; the fingerprint is the node id of
/// the working directory parent.
pub struct HgDriver {
    config: HgConfig,
    normalizer: Arc<dyn SourceNormalizer>,
}

impl HgDriver {
    /// Backend name in the registry.
    pub const NAME: &'static str = "hg";

    pub fn new(config: HgConfig) -> Self {
        Self {
            config,
            normalizer: Arc::new(VimNormalizer::new()),
        }
    }

    pub fn from_config(raw: Option<&[u8]>) -> Result<Self> {
        Ok(Self::new(decode_config(raw)?))
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn SourceNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Registers the `hg` backend.
    pub fn register(registry: &mut Registry) -> Result<()> {
        registry.register(
            Self::NAME,
            |raw: Option<&[u8]>| -> Result<Box<dyn Driver>> {
                Ok(Box::new(Self::from_config(raw)?))
            },
            ConcurrencyClass::Concurrent,
        )
    }

    fn hg(&self, dir: &Path) -> ToolCommand {
        ToolCommand::new(&self.config.command, dir)
    }
}

impl Driver for HgDriver {
    fn head_rev(&self, dir: &Path) -> Result<Fingerprint> {
        ensure_checkout(dir, ".hg", Self::NAME)?;
        let out = self
            .hg(dir)
            .args(["log", "-r", ".", "--template", "{node}"])
            .output()?;
        Ok(Fingerprint::native(String::from_utf8_lossy(&out)))
    }

    fn pull(&self, dir: &Path) -> Result<Fingerprint> {
        ensure_checkout(dir, ".hg", Self::NAME)?;

        info!(dir = %dir.display(), "hg pull");
        self.hg(dir).args(["pull", "-u"]).run()?;

        normalize_best_effort(self.normalizer.as_ref(), dir, self.special_files());
        self.head_rev(dir)
    }

    fn clone_repo(&self, dir: &Path, url: &str) -> Result<Fingerprint> {
        ensure_not_checkout(dir, ".hg", Self::NAME)?;
        let (parent, leaf) = clone_target(dir)?;

        info!(url = %url, dir = %dir.display(), "hg clone");
        self.hg(&parent).arg("clone").arg(url).arg(&leaf).run()?;

        normalize_best_effort(self.normalizer.as_ref(), dir, self.special_files());
        self.head_rev(dir)
    }

    fn special_files(&self) -> &[&'static str] {
        &[".hg"]
    }
}
