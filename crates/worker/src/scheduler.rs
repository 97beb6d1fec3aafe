//! Periodic background tasks.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::info;

use telemetry::metrics;

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between metrics snapshot log lines; 0 disables them
    #[serde(default = "default_metrics_log_interval_secs")]
    pub metrics_log_interval_secs: u64,
}

fn default_metrics_log_interval_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            metrics_log_interval_secs: default_metrics_log_interval_secs(),
        }
    }
}

/// Starts the periodic tasks.
pub fn start(config: &SchedulerConfig) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if config.metrics_log_interval_secs > 0 {
        let period = Duration::from_secs(config.metrics_log_interval_secs);
        handles.push(tokio::spawn(run_metrics_log(period)));
    }

    info!(tasks = handles.len(), "Background tasks started");
    handles
}

async fn run_metrics_log(period: Duration) {
    let mut ticker = interval(period);
    // First tick fires immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let snapshot = metrics().snapshot();
        info!(
            events_received = snapshot.events_received,
            events_accepted = snapshot.events_accepted,
            events_rejected = snapshot.events_rejected,
            identity_cache_hits = snapshot.identity_cache_hits,
            store_errors = snapshot.store_errors,
            queries = snapshot.queries,
            folds_applied = snapshot.folds_applied,
            folds_failed = snapshot.folds_failed,
            fold_conflicts = snapshot.fold_conflicts,
            queue_depth = snapshot.queue_depth,
            ingest_mean_ms = snapshot.ingest.mean_ms,
            append_mean_ms = snapshot.append.mean_ms,
            fold_mean_ms = snapshot.fold.mean_ms,
            query_mean_ms = snapshot.query.mean_ms,
            "Metrics snapshot"
        );
    }
}
