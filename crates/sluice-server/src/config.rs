//! Daemon configuration.
//!
//! Read through the `config` crate from `<SLUICE_CONFIG>.{toml,json,yaml}`
//! (default `config/sluice`), then overlaid with `SLUICE_`-prefixed
//! environment variables. Nested keys use `__`, so
//! `SLUICE_SCHEDULER__MAX_CONCURRENT=8` sets `scheduler.max_concurrent`.
//!
//! ```toml
//! data_dir = "/var/lib/sluice"
//! metrics_addr = "0.0.0.0:9187"
//!
//! [scheduler]
//! interval = 60
//!
//! [repos.tools]
//! url = "tools"
//! vcs = "cvs"
//! vcs_config = { cvsroot = ":pserver:anon@cvs.example.org:/cvsroot" }
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sluice_vcs::SchedulerConfig;

use crate::error::ServerError;

/// Environment variable naming the configuration file, without extension.
pub const CONFIG_PATH_ENV: &str = "SLUICE_CONFIG";

/// Configuration file used when `SLUICE_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/sluice";

/// Name of the revision store inside `data_dir` when `state_file` is unset.
pub const DEFAULT_STATE_FILE: &str = "revisions.json";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Root of all working copies.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Revision store file; defaults to `<data_dir>/revisions.json`.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Scheduler tuning.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Address for the Prometheus exporter; disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,

    /// Repositories to mirror, by name.
    #[serde(default)]
    pub repos: BTreeMap<String, RepoConfig>,
}

/// One mirrored repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Upstream location, interpreted by the backend.
    pub url: String,

    /// Backend name in the registry.
    #[serde(default = "default_vcs")]
    pub vcs: String,

    /// Backend-specific settings, handed to the driver as JSON.
    #[serde(default)]
    pub vcs_config: Option<serde_json::Value>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/sluice")
}

fn default_vcs() -> String {
    "git".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            state_file: None,
            scheduler: SchedulerConfig::default(),
            metrics_addr: None,
            repos: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// Loads the configuration named by `SLUICE_CONFIG`.
    pub fn load() -> Result<Self, ServerError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Loads the configuration from `path` plus the environment.
    ///
    /// The extension may be omitted; a missing file leaves every key at its
    /// default.
    pub fn load_from(path: &str) -> Result<Self, ServerError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SLUICE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the type system does not.
    pub fn validate(&self) -> Result<(), ServerError> {
        self.scheduler
            .validate()
            .map_err(|e| ServerError::invalid(e.to_string()))?;

        for (name, repo) in &self.repos {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(ServerError::invalid(format!(
                    "repository name '{}' is not a valid directory name",
                    name
                )));
            }
            if repo.url.trim().is_empty() {
                return Err(ServerError::invalid(format!(
                    "repository '{}' has an empty url",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Working copy location for repository `name`.
    pub fn work_dir_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("vcs-{}", name))
    }

    /// Path of the revision store.
    pub fn state_file_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_STATE_FILE))
    }
}

impl RepoConfig {
    /// Driver configuration blob, if any.
    pub fn vcs_config_bytes(&self) -> Result<Option<Vec<u8>>, ServerError> {
        self.vcs_config
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| ServerError::invalid(format!("vcs_config: {}", e)))
    }
}
