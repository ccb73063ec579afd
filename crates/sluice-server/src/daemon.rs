//! Daemon wiring: registry, scheduler, event consumer and shutdown.

use std::sync::Arc;

use sluice_core::Registry;
use sluice_vcs::{
    JsonRevisionStore, Repository, SyncEvent, SyncScheduler, register_builtin,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::metrics;

/// Capacity of the event channel between scheduler and consumer.
const EVENT_BUFFER: usize = 256;

/// Builds the registry with every built-in backend.
pub fn build_registry() -> Result<Registry, ServerError> {
    let mut registry = Registry::new();
    register_builtin(&mut registry)?;
    Ok(registry)
}

/// Builds a scheduler for every configured repository.
///
/// Fails if any repository names an unknown backend or carries a
/// configuration its driver rejects.
pub async fn build_scheduler(
    config: &ServerConfig,
    registry: &Registry,
    events: Option<mpsc::Sender<SyncEvent>>,
) -> Result<SyncScheduler, ServerError> {
    let store = JsonRevisionStore::open(config.state_file_path()).await?;

    let mut builder = SyncScheduler::builder(config.scheduler.clone(), Arc::new(store));
    for (name, repo) in &config.repos {
        let raw = repo.vcs_config_bytes()?;
        let work_dir = registry
            .new_work_dir(&repo.vcs, raw.as_deref())
            .map_err(|e| ServerError::repository(name, e))?;

        info!(repo = %name, backend = %repo.vcs, url = %repo.url, "configured repository");
        builder = builder.repository(Repository::new(
            name,
            &repo.url,
            config.work_dir_path(name),
            work_dir,
        ));
    }

    if let Some(tx) = events {
        builder = builder.events(tx);
    }

    Ok(builder.build()?)
}

/// Logs and records every event until the channel closes.
pub fn spawn_event_consumer(mut rx: mpsc::Receiver<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            metrics::record_event(&event);

            match &event {
                SyncEvent::Synced(outcome) if outcome.changed => info!(
                    repo = %outcome.repo,
                    fingerprint = %outcome.fingerprint,
                    previous = ?outcome.previous.as_ref().map(|p| p.as_str()),
                    "revision changed"
                ),
                SyncEvent::Synced(_) => {},
                SyncEvent::Failed { repo, error, .. } => {
                    warn!(repo = %repo, error = %error, "repository is stale")
                },
            }
        }
    })
}

/// Runs the daemon until a shutdown signal arrives.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    metrics::register_sync_metrics();
    if let Some(addr) = config.metrics_addr {
        metrics::init_exporter(addr)?;
    }

    if config.repos.is_empty() {
        warn!("No repositories configured");
    }

    tokio::fs::create_dir_all(&config.data_dir).await?;

    let registry = build_registry()?;
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let scheduler = build_scheduler(&config, &registry, Some(tx)).await?;
    let consumer = spawn_event_consumer(rx);

    info!(
        "Initial sync of {} repositories",
        scheduler.repositories().len()
    );
    let results = scheduler.sync_all().await;
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    info!(
        "Initial sync finished: {} ok, {} failed",
        results.len() - failed,
        failed
    );

    let handle = scheduler.start();
    shutdown_signal().await;

    handle.shutdown().await;
    drop(scheduler);

    if let Err(e) = consumer.await {
        error!("event consumer ended abnormally: {}", e);
    }

    info!("Sluice stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
