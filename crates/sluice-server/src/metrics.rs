//! Sync metrics.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use sluice_vcs::SyncEvent;
use tracing::info;

use crate::error::ServerError;

/// Registers metric descriptions. Call once at start-up.
pub fn register_sync_metrics() {
    metrics::describe_counter!(
        "sluice_sync_total",
        "Sync attempts by backend and result"
    );
    metrics::describe_counter!(
        "sluice_sync_changed_total",
        "Syncs that produced a new fingerprint"
    );
    metrics::describe_histogram!(
        "sluice_sync_seconds",
        "Time spent in driver pull or clone"
    );
}

/// Installs the Prometheus recorder with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_exporter(addr: SocketAddr) -> Result<(), ServerError> {
    // Driver calls run for seconds to minutes
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(&[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0])
        .map_err(|e| ServerError::Metrics(e.to_string()))?
        .install()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Label value for an event's result.
pub fn result_label(event: &SyncEvent) -> &'static str {
    match event {
        SyncEvent::Synced(outcome) if outcome.changed => "changed",
        SyncEvent::Synced(_) => "unchanged",
        SyncEvent::Failed { .. } => "failure",
    }
}

/// Records one sync event.
pub fn record_event(event: &SyncEvent) {
    let backend = event.backend().to_string();

    counter!(
        "sluice_sync_total",
        "backend" => backend.clone(),
        "result" => result_label(event)
    )
    .increment(1);

    if let SyncEvent::Synced(outcome) = event {
        if outcome.changed {
            counter!("sluice_sync_changed_total", "backend" => backend.clone()).increment(1);
        }
        histogram!("sluice_sync_seconds", "backend" => backend)
            .record(outcome.elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::Fingerprint;
    use sluice_vcs::SyncOutcome;
    use std::time::Duration;

    fn synced(changed: bool) -> SyncEvent {
        SyncEvent::Synced(SyncOutcome {
            repo: "tools".to_string(),
            backend: "cvs".to_string(),
            fingerprint: Fingerprint::native("abc"),
            previous: None,
            changed,
            elapsed: Duration::from_millis(250),
        })
    }

    #[test]
    fn test_result_label() {
        assert_eq!(result_label(&synced(true)), "changed");
        assert_eq!(result_label(&synced(false)), "unchanged");

        let failed = SyncEvent::Failed {
            repo: "tools".to_string(),
            backend: "cvs".to_string(),
            error: "cvs failed".to_string(),
        };
        assert_eq!(result_label(&failed), "failure");
    }

    #[test]
    fn test_record_without_recorder() {
        // No recorder installed: must be a no-op
        record_event(&synced(true));
    }
}
