//! Sync scheduler.
//!
//! Runs driver operations on the blocking pool while honoring each backend's
//! declared [`ConcurrencyClass`](sluice_core::ConcurrencyClass):
//!
//! - every backend type gets a semaphore sized from its class (one permit for
//!   exclusive backends, `max_concurrent` for concurrent ones)
//! - every repository gets its own lock, so a working directory is never the
//!   target of two overlapping operations

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sluice_core::{Fingerprint, Result, VcsError, WorkDir};
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::state::{SyncState, SyncStatus};
use super::store::RevisionStore;

/// Configuration for the sync scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between sync rounds, in seconds.
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    /// Maximum simultaneous operations per concurrent backend type.
    pub max_concurrent: usize,
    /// Consecutive failures before a repository starts backing off.
    pub max_failures: u32,
    /// Backoff multiplier for failures.
    pub backoff_multiplier: f64,
    /// Maximum backoff duration, in seconds.
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_concurrent: 4,
            max_failures: 3,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl SchedulerConfig {
    /// Checks that the settings describe a loop that can actually run.
    ///
    /// # Errors
    ///
    /// `VcsError::Configuration` if the interval is zero, no operation may
    /// run at once, the multiplier is below 1 or not finite, or the backoff
    /// cap is shorter than the interval.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(VcsError::configuration("scheduler interval must be positive"));
        }
        if self.max_concurrent == 0 {
            return Err(VcsError::configuration(
                "scheduler max_concurrent must be at least 1",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(VcsError::configuration(format!(
                "scheduler backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_backoff < self.interval {
            return Err(VcsError::configuration(format!(
                "scheduler max_backoff ({}s) is shorter than interval ({}s)",
                self.max_backoff.as_secs(),
                self.interval.as_secs()
            )));
        }
        Ok(())
    }
}

/// A repository the scheduler keeps in sync.
#[derive(Debug, Clone)]
pub struct Repository {
    /// Unique repository name; also the key in the revision store.
    pub name: String,
    /// Upstream location handed to `clone_repo`.
    pub url: String,
    /// Working directory.
    pub dir: PathBuf,
    /// Driver bound to this repository's backend configuration.
    pub work_dir: WorkDir,
}

impl Repository {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        dir: impl Into<PathBuf>,
        work_dir: WorkDir,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            dir: dir.into(),
            work_dir,
        }
    }
}

/// Result of one successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Repository name.
    pub repo: String,
    /// Backend name.
    pub backend: String,
    /// Fingerprint after the sync.
    pub fingerprint: Fingerprint,
    /// Fingerprint stored before the sync, if any.
    pub previous: Option<Fingerprint>,
    /// True if the fingerprint differs from the stored one.
    pub changed: bool,
    /// Time spent in the driver.
    pub elapsed: Duration,
}

/// Published after every sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The driver returned a fingerprint.
    Synced(SyncOutcome),
    /// The attempt failed; the stored fingerprint was left alone.
    Failed {
        repo: String,
        backend: String,
        error: String,
    },
}

impl SyncEvent {
    /// Returns the repository name.
    pub fn repo(&self) -> &str {
        match self {
            SyncEvent::Synced(outcome) => &outcome.repo,
            SyncEvent::Failed { repo, .. } => repo,
        }
    }

    /// Returns the backend name.
    pub fn backend(&self) -> &str {
        match self {
            SyncEvent::Synced(outcome) => &outcome.backend,
            SyncEvent::Failed { backend, .. } => backend,
        }
    }
}

struct RepoSlot {
    repo: Repository,
    state: SyncState,
    lock: Mutex<()>,
}

struct Inner {
    slots: HashMap<String, Arc<RepoSlot>>,
    pools: HashMap<String, Arc<Semaphore>>,
    store: Arc<dyn RevisionStore>,
    config: SchedulerConfig,
    events: Option<mpsc::Sender<SyncEvent>>,
}

/// Handle for controlling a running sync loop.
pub struct SyncHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Signals the loop to stop after the current round.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the loop and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("sync loop ended abnormally: {}", e);
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for [`SyncScheduler`].
pub struct SyncSchedulerBuilder {
    repos: Vec<Repository>,
    store: Arc<dyn RevisionStore>,
    config: SchedulerConfig,
    events: Option<mpsc::Sender<SyncEvent>>,
}

impl SyncSchedulerBuilder {
    /// Adds a repository.
    pub fn repository(mut self, repo: Repository) -> Self {
        self.repos.push(repo);
        self
    }

    /// Publishes a [`SyncEvent`] for every attempt on `tx`.
    pub fn events(mut self, tx: mpsc::Sender<SyncEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Builds the scheduler.
    ///
    /// # Errors
    ///
    /// `VcsError::Configuration` if the scheduler settings are invalid, or
    /// if two repositories share a name or a working directory.
    pub fn build(self) -> Result<SyncScheduler> {
        self.config.validate()?;

        let mut slots = HashMap::new();
        let mut pools: HashMap<String, Arc<Semaphore>> = HashMap::new();
        let mut dirs = HashMap::new();

        for repo in self.repos {
            if let Some(other) = dirs.insert(repo.dir.clone(), repo.name.clone()) {
                return Err(VcsError::configuration(format!(
                    "repositories '{}' and '{}' share working directory {}",
                    other,
                    repo.name,
                    repo.dir.display()
                )));
            }

            let backend = repo.work_dir.backend().to_string();
            let permits = repo.work_dir.concurrency().permits(self.config.max_concurrent);
            pools
                .entry(backend)
                .or_insert_with(|| Arc::new(Semaphore::new(permits)));

            let name = repo.name.clone();
            let slot = Arc::new(RepoSlot {
                repo,
                state: SyncState::new(),
                lock: Mutex::new(()),
            });
            if slots.insert(name.clone(), slot).is_some() {
                return Err(VcsError::configuration(format!(
                    "duplicate repository name '{}'",
                    name
                )));
            }
        }

        Ok(SyncScheduler {
            inner: Arc::new(Inner {
                slots,
                pools,
                store: self.store,
                config: self.config,
                events: self.events,
            }),
        })
    }
}

/// Schedules pulls and clones across configured repositories.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl SyncScheduler {
    /// Starts building a scheduler.
    pub fn builder(config: SchedulerConfig, store: Arc<dyn RevisionStore>) -> SyncSchedulerBuilder {
        SyncSchedulerBuilder {
            repos: Vec::new(),
            store,
            config,
            events: None,
        }
    }

    /// Returns the scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Returns the names of all repositories, sorted.
    pub fn repositories(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.slots.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns a snapshot of a repository's sync state.
    pub fn status(&self, repo: &str) -> Option<SyncStatus> {
        self.inner.slots.get(repo).map(|slot| slot.state.status())
    }

    /// Pulls or clones one repository.
    ///
    /// The stored fingerprint is replaced only when the driver returned a
    /// non-empty one.
    pub async fn sync_once(&self, repo: &str) -> Result<SyncOutcome> {
        self.sync_once_at(repo, Instant::now()).await
    }

    /// Like [`sync_once`](Self::sync_once), recording `started` as the
    /// attempt time the next due check is measured from.
    async fn sync_once_at(&self, repo: &str, started: Instant) -> Result<SyncOutcome> {
        let slot = self
            .inner
            .slots
            .get(repo)
            .cloned()
            .ok_or_else(|| VcsError::configuration(format!("unknown repository '{}'", repo)))?;

        let backend = slot.repo.work_dir.backend().to_string();

        // Directory lock first, so a queued repository does not hold one of
        // its backend's scarce permits while it waits.
        let _dir_guard = slot.lock.lock().await;
        let _permit = match self.inner.pools.get(&backend) {
            Some(pool) => Some(
                Arc::clone(pool)
                    .acquire_owned()
                    .await
                    .map_err(|e| VcsError::Io(io::Error::other(e)))?,
            ),
            None => None,
        };

        slot.state.record_attempt(started);

        let result = match self.run_driver(&slot).await {
            Ok((fingerprint, elapsed)) => self.commit(repo, &backend, fingerprint, elapsed).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                slot.state.record_success(outcome.fingerprint.clone());

                info!(
                    repo = %repo,
                    backend = %backend,
                    fingerprint = %outcome.fingerprint.short(),
                    changed = outcome.changed,
                    "sync complete"
                );

                self.publish(SyncEvent::Synced(outcome.clone())).await;
                Ok(outcome)
            },
            Err(e) => {
                slot.state.record_failure(e.to_string());
                warn!(repo = %repo, backend = %backend, error = %e, "sync failed");

                self.publish(SyncEvent::Failed {
                    repo: repo.to_string(),
                    backend,
                    error: e.to_string(),
                })
                .await;
                Err(e)
            },
        }
    }

    /// Compares against the stored fingerprint and saves it if it moved.
    async fn commit(
        &self,
        repo: &str,
        backend: &str,
        fingerprint: Fingerprint,
        elapsed: Duration,
    ) -> Result<SyncOutcome> {
        let previous = self.inner.store.load(repo).await?;
        let changed = previous.as_ref() != Some(&fingerprint);

        if changed {
            self.inner.store.save(repo, &fingerprint).await?;
        }

        Ok(SyncOutcome {
            repo: repo.to_string(),
            backend: backend.to_string(),
            fingerprint,
            previous,
            changed,
            elapsed,
        })
    }

    async fn publish(&self, event: SyncEvent) {
        if let Some(tx) = &self.inner.events
            && tx.send(event).await.is_err()
        {
            debug!("event receiver dropped");
        }
    }

    async fn run_driver(&self, slot: &Arc<RepoSlot>) -> Result<(Fingerprint, Duration)> {
        let work_dir = slot.repo.work_dir.clone();
        let dir = slot.repo.dir.clone();
        let url = slot.repo.url.clone();

        let started = Instant::now();
        let fingerprint = tokio::task::spawn_blocking(move || work_dir.pull_or_clone(&dir, &url))
            .await
            .map_err(|e| VcsError::Io(io::Error::other(format!("sync task failed: {}", e))))??;
        let elapsed = started.elapsed();

        if fingerprint.is_empty() {
            return Err(VcsError::tool(
                slot.repo.work_dir.backend(),
                None,
                "backend reported an empty revision",
            ));
        }

        Ok((fingerprint, elapsed))
    }

    /// Syncs every repository, concurrently within the backend limits.
    ///
    /// Results are sorted by repository name.
    pub async fn sync_all(&self) -> Vec<(String, Result<SyncOutcome>)> {
        self.sync_matching(Instant::now(), |_| true).await
    }

    /// Syncs the repositories whose next attempt is due.
    pub async fn sync_due(&self) -> Vec<(String, Result<SyncOutcome>)> {
        self.sync_due_at(Instant::now()).await
    }

    async fn sync_due_at(&self, now: Instant) -> Vec<(String, Result<SyncOutcome>)> {
        let config = self.inner.config.clone();
        self.sync_matching(now, move |slot| slot.state.is_due(&config, now))
            .await
    }

    async fn sync_matching<F>(
        &self,
        started: Instant,
        filter: F,
    ) -> Vec<(String, Result<SyncOutcome>)>
    where
        F: Fn(&RepoSlot) -> bool,
    {
        let mut set = JoinSet::new();

        for (name, slot) in &self.inner.slots {
            if !filter(slot.as_ref()) {
                continue;
            }
            let scheduler = self.clone();
            let name = name.clone();
            set.spawn(async move {
                let result = scheduler.sync_once_at(&name, started).await;
                (name, result)
            });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => warn!("sync task panicked: {}", e),
            }
        }

        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Starts the periodic sync loop.
    ///
    /// Must be called from within a Tokio runtime. Returns a handle that
    /// stops the loop.
    pub fn start(&self) -> SyncHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.clone().run(shutdown_rx));

        SyncHandle {
            shutdown_tx,
            task: Some(task),
        }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let period = self.inner.config.interval;
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Starting sync loop for {} repositories with interval {:?}",
            self.inner.slots.len(),
            period
        );

        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    let results = self.sync_due_at(tick.into_std()).await;
                    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                    debug!(synced = results.len(), failed, "sync round finished");
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Sync loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("repositories", &self.repositories())
            .field("config", &self.inner.config)
            .finish()
    }
}


mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
