//! Backend registry.
//!
//! Maps a backend name to a driver constructor and its declared
//! [`ConcurrencyClass`]. A registry is built once at start-up, filled by
//! each backend module's `register` function, and then only read.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::driver::{ConcurrencyClass, Driver};
use crate::error::{Result, VcsError};
use crate::fingerprint::Fingerprint;

/// Builds a driver from a raw configuration blob.
///
/// `None` means no configuration was supplied; the backend applies its
/// defaults.
pub type Constructor = Arc<dyn Fn(Option<&[u8]>) -> Result<Box<dyn Driver>> + Send + Sync>;

/// A single registered backend.
#[derive(Clone)]
pub struct RegistryEntry {
    name: String,
    constructor: Constructor,
    concurrency: ConcurrencyClass,
}

impl RegistryEntry {
    /// Returns the backend name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared concurrency class.
    pub fn concurrency(&self) -> ConcurrencyClass {
        self.concurrency
    }

    /// Builds a driver from the given configuration blob.
    pub fn construct(&self, config: Option<&[u8]>) -> Result<Box<dyn Driver>> {
        (self.constructor)(config)
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

/// Name → (constructor, concurrency class) table.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend.
    ///
    /// # Errors
    ///
    /// Returns `VcsError::DuplicateBackend` if `name` is already taken. The
    /// existing entry is left untouched.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        constructor: F,
        concurrency: ConcurrencyClass,
    ) -> Result<()>
    where
        F: Fn(Option<&[u8]>) -> Result<Box<dyn Driver>> + Send + Sync + 'static,
    {
        let name = name.into();

        if self.entries.contains_key(&name) {
            error!(backend = %name, "backend registered twice");
            return Err(VcsError::DuplicateBackend(name));
        }

        debug!(backend = %name, concurrency = %concurrency, "registered backend");
        self.entries.insert(
            name.clone(),
            RegistryEntry {
                name,
                constructor: Arc::new(constructor),
                concurrency,
            },
        );

        Ok(())
    }

    /// Looks up a backend by name.
    pub fn lookup(&self, name: &str) -> Result<&RegistryEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| VcsError::UnknownBackend(name.to_string()))
    }

    /// Returns true if a backend with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the registered backend names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns the number of registered backends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a [`WorkDir`] for the named backend.
    ///
    /// # Errors
    ///
    /// - `VcsError::UnknownBackend` if `name` is not registered
    /// - `VcsError::Configuration` if the constructor rejects `config`
    pub fn new_work_dir(&self, name: &str, config: Option<&[u8]>) -> Result<WorkDir> {
        let entry = self.lookup(name)?;
        let driver = entry.construct(config)?;

        Ok(WorkDir {
            backend: entry.name.clone(),
            concurrency: entry.concurrency,
            driver: Arc::from(driver),
        })
    }
}

/// A constructed driver together with its registry metadata.
#[derive(Clone)]
pub struct WorkDir {
    backend: String,
    concurrency: ConcurrencyClass,
    driver: Arc<dyn Driver>,
}

impl WorkDir {
    /// Wraps a driver that did not come from a registry.
    pub fn new(
        backend: impl Into<String>,
        concurrency: ConcurrencyClass,
        driver: Arc<dyn Driver>,
    ) -> Self {
        Self {
            backend: backend.into(),
            concurrency,
            driver,
        }
    }

    /// Returns the backend name.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Returns the backend's declared concurrency class.
    pub fn concurrency(&self) -> ConcurrencyClass {
        self.concurrency
    }

    /// Returns the underlying driver.
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Pulls `dir` if it holds a checkout, otherwise clones `url` into it.
    ///
    /// A directory that exists but has none of the driver's special files is
    /// a leftover from an interrupted clone. It is removed and cloned again.
    /// Drivers without special files cannot tell, so their directories are
    /// always pulled.
    pub fn pull_or_clone(&self, dir: &Path, url: &str) -> Result<Fingerprint> {
        if dir.try_exists()? {
            if self.is_checkout(dir)? {
                debug!(backend = %self.backend, dir = %dir.display(), "pulling");
                return self.driver.pull(dir);
            }

            warn!(
                backend = %self.backend,
                dir = %dir.display(),
                "working directory has no checkout, cloning again"
            );
            std::fs::remove_dir_all(dir)?;
        }

        debug!(backend = %self.backend, dir = %dir.display(), "cloning");
        self.driver.clone_repo(dir, url)
    }

    fn is_checkout(&self, dir: &Path) -> Result<bool> {
        let special = self.driver.special_files();
        if special.is_empty() {
            return Ok(true);
        }
        for name in special {
            if dir.join(name).try_exists()? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl fmt::Debug for WorkDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkDir")
            .field("backend", &self.backend)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}
