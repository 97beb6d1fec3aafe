//! Common test setup functions.

use api::{router, AppState};
use axum::{http::StatusCode, Router};
use axum_test::TestServer;
use event_store::{EventStore, InMemoryEventStore, InMemoryProfileStore, ProfileStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use worker::{Aggregator, AggregatorConfig, AggregatorHandle};

use crate::fixtures::{INACTIVE_KEY, TENANT_A, TENANT_A_KEY, TENANT_B, TENANT_B_KEY};
use crate::mocks::StaticIdentityResolver;

/// Test context over in-memory stores.
///
/// Runs the real router, gateway and aggregator; only the identity
/// service is replaced by a static key table.
pub struct TestContext {
    pub events: Arc<InMemoryEventStore>,
    pub profiles: Arc<InMemoryProfileStore>,
    pub identity: Arc<StaticIdentityResolver>,
    pub aggregator: AggregatorHandle,
    pub router: Router,
}

impl TestContext {
    pub async fn new() -> Self {
        let events = Arc::new(InMemoryEventStore::new());
        Self::build(events.clone(), events, Duration::from_secs(5))
    }

    /// Context whose gateway appends to `store` under `ingest_timeout`.
    ///
    /// `events` stays empty; use it to assert nothing was stored elsewhere.
    pub async fn with_event_store(store: Arc<dyn EventStore>, ingest_timeout: Duration) -> Self {
        Self::build(Arc::new(InMemoryEventStore::new()), store, ingest_timeout)
    }

    fn build(
        events: Arc<InMemoryEventStore>,
        store: Arc<dyn EventStore>,
        ingest_timeout: Duration,
    ) -> Self {
        let profiles = Arc::new(InMemoryProfileStore::new());
        let identity = Arc::new(
            StaticIdentityResolver::new()
                .with_key(TENANT_A_KEY, TENANT_A)
                .with_key(TENANT_B_KEY, TENANT_B)
                .with_inactive_key(INACTIVE_KEY, "user-inactive"),
        );

        let config = AggregatorConfig {
            shards: 4,
            retry_backoff_ms: 1,
            ..AggregatorConfig::default()
        };
        let max_conflict_retries = config.max_conflict_retries;
        let (aggregator, _tasks) =
            Aggregator::new(profiles.clone() as Arc<dyn ProfileStore>, config).spawn();

        let state = AppState::new(
            store,
            profiles.clone(),
            identity.clone(),
            aggregator.clone(),
            max_conflict_retries,
        )
        .with_ingest_timeout(ingest_timeout);

        Self {
            events,
            profiles,
            identity,
            aggregator,
            router: router(state),
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router.clone()).expect("Failed to create test server")
    }

    /// Wait for every queued profile fold.
    pub async fn settle(&self) {
        self.aggregator.drain().await;
    }

    /// Track events and wait until they are folded.
    pub async fn seed(&self, server: &TestServer, bodies: impl IntoIterator<Item = Value>) {
        for body in bodies {
            server
                .post("/analytics/track")
                .json(&body)
                .await
                .assert_status(StatusCode::CREATED);
        }
        self.settle().await;
    }
}
