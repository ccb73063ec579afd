//! Persistence of last known good fingerprints.
//!
//! The scheduler compares each new fingerprint with the stored one to decide
//! whether a repository changed. A fingerprint is only ever saved after a
//! successful sync.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use sluice_core::{Fingerprint, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Storage for the last fingerprint of each repository.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// Returns the stored fingerprint for `repo`, if any.
    async fn load(&self, repo: &str) -> Result<Option<Fingerprint>>;

    /// Stores `fingerprint` as the latest for `repo`.
    async fn save(&self, repo: &str, fingerprint: &Fingerprint) -> Result<()>;
}

/// Keeps fingerprints in memory only.
#[derive(Debug, Default)]
pub struct MemoryRevisionStore {
    revisions: RwLock<HashMap<String, Fingerprint>>,
}

impl MemoryRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of repositories with a stored fingerprint.
    pub fn len(&self) -> usize {
        self.revisions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.read().is_empty()
    }
}

#[async_trait]
impl RevisionStore for MemoryRevisionStore {
    async fn load(&self, repo: &str) -> Result<Option<Fingerprint>> {
        Ok(self.revisions.read().get(repo).cloned())
    }

    async fn save(&self, repo: &str, fingerprint: &Fingerprint) -> Result<()> {
        self.revisions
            .write()
            .insert(repo.to_string(), fingerprint.clone());
        Ok(())
    }
}

/// Keeps fingerprints in a JSON file, rewritten atomically on every save.
///
/// File format: `{"<repo>": "<fingerprint>", ...}`.
#[derive(Debug)]
pub struct JsonRevisionStore {
    path: PathBuf,
    revisions: Mutex<BTreeMap<String, Fingerprint>>,
}

impl JsonRevisionStore {
    /// Opens the store at `path`, loading existing entries.
    ///
    /// A missing or empty file yields an empty store. A corrupt file is
    /// logged and treated as empty; the next save overwrites it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let revisions = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt revision store, starting empty");
                    BTreeMap::new()
                },
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = revisions.len(), "opened revision store");

        Ok(Self {
            path,
            revisions: Mutex::new(revisions),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, revisions: &BTreeMap<String, Fingerprint>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(revisions).map_err(io::Error::other)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RevisionStore for JsonRevisionStore {
    async fn load(&self, repo: &str) -> Result<Option<Fingerprint>> {
        Ok(self.revisions.lock().await.get(repo).cloned())
    }

    async fn save(&self, repo: &str, fingerprint: &Fingerprint) -> Result<()> {
        let mut revisions = self.revisions.lock().await;

        // The in-memory map only takes the new entry once it is on disk.
        let mut next = revisions.clone();
        next.insert(repo.to_string(), fingerprint.clone());
        self.persist(&next).await?;

        *revisions = next;
        Ok(())
    }
}
