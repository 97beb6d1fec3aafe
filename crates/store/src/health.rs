//! Storage health checks.

use std::sync::Arc;
use std::time::Duration;
use telemetry::Component;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::store::{EventStore, ProfileStore};

fn record(component: Component, probe: analytics_core::Result<()>) -> bool {
    let health = telemetry::health();
    match probe {
        Ok(()) => {
            health.mark_up(component);
            true
        }
        Err(e) => {
            error!(?component, error = %e, "Storage health check failed");
            health.mark_down(component, e.to_string());
            false
        }
    }
}

/// Probe both stores once and record the result in the health registry.
pub async fn check_stores(events: &dyn EventStore, profiles: &dyn ProfileStore) -> bool {
    let events_ok = record(Component::EventStore, events.ping().await);
    let profiles_ok = record(Component::ProfileStore, profiles.ping().await);

    debug!(events_ok, profiles_ok, "Storage health checked");
    events_ok && profiles_ok
}

/// Re-probe the stores on a fixed interval until the task is aborted.
pub fn spawn_health_monitor(
    events: Arc<dyn EventStore>,
    profiles: Arc<dyn ProfileStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            check_stores(events.as_ref(), profiles.as_ref()).await;
        }
    })
}
