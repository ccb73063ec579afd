//! Subversion backend.
//!
//! Registered as exclusive: a working copy holds a lock while `svn` runs and
//! many hosted servers throttle parallel checkouts from one client.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sluice_core::{ConcurrencyClass, Driver, Fingerprint, Registry, Result};
use tracing::info;

use super::{clone_target, decode_config, ensure_checkout, ensure_not_checkout};
use crate::normalize::{SourceNormalizer, VimNormalizer, normalize_best_effort};
use crate::process::ToolCommand;

/// Configuration for the Subversion backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvnConfig {
    /// Username for authenticated repositories.
    pub username: Option<String>,
    /// Password for authenticated repositories.
    pub password: Option<String>,
    /// The `svn` binary.
    pub command: String,
}

impl Default for SvnConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            command: "svn".to_string(),
        }
    }
}

impl std::fmt::Debug for SvnConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvnConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("command", &self.command)
            .finish()
    }
}

/// Driver for Subversion working copies; the fingerprint is the last
/// changed revision of the checkout root.
pub struct SvnDriver {
    config: SvnConfig,
    normalizer: Arc<dyn SourceNormalizer>,
}

impl SvnDriver {
    /// Backend name in the registry.
    pub const NAME: &'static str = "svn";

    pub fn new(config: SvnConfig) -> Self {
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

    /// Registers the `svn` backend.
    pub fn register(registry: &mut Registry) -> Result<()> {
        registry.register(
            Self::NAME,
            |raw: Option<&[u8]>| -> Result<Box<dyn Driver>> {
                Ok(Box::new(Self::from_config(raw)?))
            },
            ConcurrencyClass::Exclusive,
        )
    }

    /// `svn --non-interactive [--username U] [--password P]`
    fn svn(&self, dir: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.config.command, dir).arg("--non-interactive");
        if let Some(username) = &self.config.username {
            cmd = cmd.arg("--username").arg(username);
        }
        if let Some(password) = &self.config.password {
            cmd = cmd.arg("--password").arg(password);
        }
        cmd
    }
}

impl Driver for SvnDriver {
    fn head_rev(&self, dir: &Path) -> Result<Fingerprint> {
        ensure_checkout(dir, ".svn", Self::NAME)?;
        let out = self
            .svn(dir)
            .args(["info", "--show-item", "last-changed-revision"])
            .output()?;
        Ok(Fingerprint::native(String::from_utf8_lossy(&out)))
    }

    fn pull(&self, dir: &Path) -> Result<Fingerprint> {
        ensure_checkout(dir, ".svn", Self::NAME)?;

        info!(dir = %dir.display(), "svn update");
        self.svn(dir).args(["update", "--ignore-externals"]).run()?;

        normalize_best_effort(self.normalizer.as_ref(), dir, self.special_files());
        self.head_rev(dir)
    }

    fn clone_repo(&self, dir: &Path, url: &str) -> Result<Fingerprint> {
        ensure_not_checkout(dir, ".svn", Self::NAME)?;
        let (parent, leaf) = clone_target(dir)?;

        info!(url = %url, dir = %dir.display(), "svn checkout");
        self.svn(&parent).arg("checkout").arg(url).arg(&leaf).run()?;

        normalize_best_effort(self.normalizer.as_ref(), dir, self.special_files());
        self.head_rev(dir)
    }

    fn special_files(&self) -> &[&'static str] {
        &[".svn"]
    }
}
