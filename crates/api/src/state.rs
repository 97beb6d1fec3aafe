//! Application state shared across handlers.

use analytics_core::auth::{ResolveRequest, ResolveResponse};
use analytics_core::{ApiKey, Error, IdentityResolver, Result, UserIdentity};
use async_trait::async_trait;
use event_store::{EventStore, ProfileStore, ReportEngine};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tracing::{debug, warn};
use worker::{AggregatorHandle, ProfileRebuilder};

/// Cache TTL for identity responses (30 seconds).
const IDENTITY_CACHE_TTL: Duration = Duration::from_secs(30);

/// Maximum cache entries.
const IDENTITY_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Default bound on the event store append.
pub const DEFAULT_INGEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Identity service client.
///
/// Calls the identity service's `/internal/api-keys/resolve` endpoint.
/// Caches responses for 30 seconds, including negative ones.
#[derive(Clone)]
pub struct IdentityClient {
    /// Identity service URL (e.g., "http://identity:8080")
    base_url: String,
    http_client: reqwest::Client,
    /// API key -> identity service answer
    cache: Cache<String, ResolveResponse>,
    /// Derive identities locally instead of calling out
    mock_mode: bool,
}

impl IdentityClient {
    /// Creates a new identity client. An empty URL or `"mock"` enables mock mode.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mock_mode = base_url.is_empty() || base_url == "mock";

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            http_client,
            cache: Cache::builder()
                .max_capacity(IDENTITY_CACHE_MAX_CAPACITY)
                .time_to_live(IDENTITY_CACHE_TTL)
                .build(),
            mock_mode,
        })
    }

    pub fn is_mock(&self) -> bool {
        self.mock_mode
    }

    /// Resolve through the cache.
    async fn lookup(&self, api_key: &ApiKey) -> Result<ResolveResponse> {
        let cache_key = api_key.as_str().to_string();

        if let Some(cached) = self.cache.get(&cache_key).await {
            metrics().gateway.identity_cache_hits.inc();
            debug!("Identity cache hit");
            return Ok(cached);
        }

        metrics().gateway.identity_lookups.inc();
        let response = if self.mock_mode {
            mock_resolve(api_key)
        } else {
            self.remote_resolve(api_key).await?
        };

        self.cache.insert(cache_key, response.clone()).await;
        Ok(response)
    }

    async fn remote_resolve(&self, api_key: &ApiKey) -> Result<ResolveResponse> {
        let url = format!("{}/internal/api-keys/resolve", self.base_url);
        let request = ResolveRequest {
            api_key: api_key.as_str().to_string(),
        };

        debug!(url = %url, "Calling identity service");

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Identity service request failed");
                Error::internal(format!("Identity service unavailable: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Identity service returned error");
            return Err(Error::internal(format!(
                "Identity service returned {}: {}",
                status, body
            )));
        }

        response.json().await.map_err(|e| {
            warn!(error = %e, "Failed to parse identity response");
            Error::internal(format!("Invalid identity response: {}", e))
        })
    }
}

#[async_trait]
impl IdentityResolver for IdentityClient {
    async fn resolve(&self, api_key: &ApiKey) -> Result<UserIdentity> {
        self.lookup(api_key).await?.into_identity()
    }

    async fn invalidate(&self, api_key: &ApiKey) {
        self.cache.invalidate(&api_key.as_str().to_string()).await;
    }
}

/// Deterministic identity for local development.
fn mock_resolve(api_key: &ApiKey) -> ResolveResponse {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    api_key.as_str().hash(&mut hasher);
    ResolveResponse {
        valid: true,
        user_id: Some(format!("user-{:016x}", hasher.finish())),
        active: true,
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub events: Arc<dyn EventStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub reports: Arc<ReportEngine>,
    pub identity: Arc<dyn IdentityResolver>,
    /// Queue into the profile aggregator
    pub aggregator: AggregatorHandle,
    pub rebuilder: Arc<ProfileRebuilder>,
    /// Bound on the event store append during ingestion
    pub ingest_timeout: Duration,
}

impl AppState {
    pub fn new(
        events: Arc<dyn EventStore>,
        profiles: Arc<dyn ProfileStore>,
        identity: Arc<dyn IdentityResolver>,
        aggregator: AggregatorHandle,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            reports: Arc::new(ReportEngine::new(events.clone())),
            rebuilder: Arc::new(ProfileRebuilder::new(
                events.clone(),
                profiles.clone(),
                max_conflict_retries,
            )),
            events,
            profiles,
            identity,
            aggregator,
            ingest_timeout: DEFAULT_INGEST_TIMEOUT,
        }
    }

    pub fn with_ingest_timeout(mut self, timeout: Duration) -> Self {
        self.ingest_timeout = timeout;
        self
    }
}
