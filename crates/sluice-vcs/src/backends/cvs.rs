//! CVS backend.
//!
//! CVS has no repository-wide revision number, so the fingerprint is derived:
//! the module name is read from `CVS/Repository`, `cvs rlog` is run for that
//! module, and the raw output is digested with SHA-1.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sluice_core::{ConcurrencyClass, Driver, Fingerprint, Registry, Result, VcsError};
use tracing::{debug, info};

use super::{clone_target, decode_config, ensure_not_checkout};
use crate::normalize::{SourceNormalizer, VimNormalizer, normalize_best_effort};
use crate::process::ToolCommand;

/// Repository root used when the configuration does not name one.
pub const DEFAULT_CVSROOT: &str = "/vcs/repos/cvs";

const BOOKKEEPING_DIR: &str = "CVS";
const REPOSITORY_FILE: &str = "CVS/Repository";
const DEFAULT_BRANCH: &str = "HEAD";

/// Configuration for the CVS backend.
///
/// ```json
/// {"cvsroot": ":pserver:anon@cvs.example.org:/cvsroot", "branch": "HEAD"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvsConfig {
    /// Value passed to `cvs -d`.
    pub cvsroot: String,
    /// Branch or tag to check out and fingerprint.
    pub branch: String,
    /// The `cvs` binary.
    pub command: String,
}

impl Default for CvsConfig {
    fn default() -> Self {
        Self {
            cvsroot: DEFAULT_CVSROOT.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            command: "cvs".to_string(),
        }
    }
}

/// Driver for CVS working copies.
pub struct CvsDriver {
    config: CvsConfig,
    normalizer: Arc<dyn SourceNormalizer>,
}

impl CvsDriver {
    /// Backend name in the registry.
    pub const NAME: &'static str = "cvs";

    /// Creates a driver with the default normalizer.
    pub fn new(config: CvsConfig) -> Self {
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
    pub fn config(&self) -> &CvsConfig {
        &self.config
    }

    /// Registers the `cvs` backend.
    pub fn register(registry: &mut Registry) -> Result<()> {
        registry.register(
            Self::NAME,
            |raw: Option<&[u8]>| -> Result<Box<dyn Driver>> {
                Ok(Box::new(Self::from_config(raw)?))
            },
            ConcurrencyClass::Concurrent,
        )
    }

    /// Reads the module path recorded for the checkout at `dir`.
    pub fn module(&self, dir: &Path) -> Result<String> {
        let path = dir.join(REPOSITORY_FILE);
        let contents = fs::read_to_string(&path).map_err(|e| {
            VcsError::configuration_with_cause(format!("cannot read {}", path.display()), e)
        })?;

        let module = contents.trim();
        if module.is_empty() {
            return Err(VcsError::configuration(format!(
                "{} names no module",
                path.display()
            )));
        }

        Ok(module.to_string())
    }

    /// `cvs -Q -d <cvsroot>`, the prefix of every invocation.
    fn cvs(&self, dir: &Path) -> ToolCommand {
        ToolCommand::new(&self.config.command, dir).args([
            "-Q",
            "-d",
            self.config.cvsroot.as_str(),
        ])
    }

    /// Revision selector for `rlog`: a bare `-r` selects the trunk head.
    fn rlog_selector(&self) -> String {
        if self.config.branch == DEFAULT_BRANCH {
            "-r".to_string()
        } else {
            format!("-r{}", self.config.branch)
        }
    }
}

impl Driver for CvsDriver {
    fn head_rev(&self, dir: &Path) -> Result<Fingerprint> {
        let module = self.module(dir)?;

        let out = self
            .cvs(dir)
            .arg("rlog")
            .arg(self.rlog_selector())
            .arg(&module)
            .output()?;

        let fingerprint = Fingerprint::digest(&out);
        debug!(module = %module, fingerprint = %fingerprint.short(), "cvs head rev");

        Ok(fingerprint)
    }

    fn pull(&self, dir: &Path) -> Result<Fingerprint> {
        let module = self.module(dir)?;

        info!(module = %module, dir = %dir.display(), "cvs update");
        self.cvs(dir)
            .args(["update", "-r", self.config.branch.as_str(), "."])
            .run()?;

        normalize_best_effort(self.normalizer.as_ref(), dir, self.special_files());
        self.head_rev(dir)
    }

    fn clone_repo(&self, dir: &Path, url: &str) -> Result<Fingerprint> {
        ensure_not_checkout(dir, REPOSITORY_FILE, Self::NAME)?;
        let (parent, leaf) = clone_target(dir)?;

        info!(module = %url, dir = %dir.display(), "cvs checkout");
        self.cvs(&parent)
            .args(["checkout", "-r", self.config.branch.as_str(), "-d"])
            .arg(&leaf)
            .arg(url)
            .run()?;

        normalize_best_effort(self.normalizer.as_ref(), dir, self.special_files());
        self.head_rev(dir)
    }

    fn special_files(&self) -> &[&'static str] {
        &[BOOKKEEPING_DIR]
    }
}
