//! Widget Analytics Engine
//!
//! Event ingestion and reporting service:
//! - Tracking gateway with API key resolution and request enrichment
//! - Append-only event log (in-memory or ClickHouse)
//! - Sharded customer profile aggregation
//! - Grouping reports over the event log

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{info, warn};

use api::{router, AppState, IdentityClient};
use event_store::{
    check_stores, spawn_health_monitor, ClickHouseClient, ClickHouseConfig, ClickHouseEventStore,
    ClickHouseProfileStore, EventStore, InMemoryEventStore, InMemoryProfileStore, ProfileStore,
};
use telemetry::init_tracing_from_env;
use worker::{scheduler, Aggregator, AggregatorConfig, SchedulerConfig};

/// Upper bound on draining queued folds at shutdown.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Where events and profiles live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StorageBackend {
    Memory,
    Clickhouse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StorageConfig {
    #[serde(default = "default_backend")]
    backend: StorageBackend,
    #[serde(default)]
    clickhouse: ClickHouseConfig,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Memory
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Identity service URL for API key resolution; "mock" for local development
    #[serde(default = "default_identity_url")]
    identity_url: String,

    /// Bound on the event store append during ingestion
    #[serde(default = "default_ingest_timeout_ms")]
    ingest_timeout_ms: u64,

    #[serde(default = "default_health_check_interval_secs")]
    health_check_interval_secs: u64,

    #[serde(default)]
    storage: StorageConfig,

    #[serde(default)]
    aggregator: AggregatorConfig,

    #[serde(default)]
    scheduler: SchedulerConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_identity_url() -> String {
    "http://identity-service:8080".to_string()
}

fn default_ingest_timeout_ms() -> u64 {
    5000
}

fn default_health_check_interval_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            identity_url: default_identity_url(),
            ingest_timeout_ms: default_ingest_timeout_ms(),
            health_check_interval_secs: default_health_check_interval_secs(),
            storage: StorageConfig::default(),
            aggregator: AggregatorConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Widget Analytics Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    let (events, profiles) = open_stores(&config.storage).await?;

    // Record store health before serving
    if !check_stores(events.as_ref(), profiles.as_ref()).await {
        warn!("Storage unhealthy at startup, serving anyway");
    }
    let health_monitor = spawn_health_monitor(
        events.clone(),
        profiles.clone(),
        Duration::from_secs(config.health_check_interval_secs.max(1)),
    );

    let max_conflict_retries = config.aggregator.max_conflict_retries;
    let (aggregator, shard_tasks) = Aggregator::new(profiles.clone(), config.aggregator.clone()).spawn();
    let background = scheduler::start(&config.scheduler);

    let identity = IdentityClient::new(config.identity_url.as_str())
        .context("Failed to create identity client")?;
    if identity.is_mock() {
        warn!("Identity service in mock mode, every well-formed API key is accepted");
    }

    let state = AppState::new(
        events,
        profiles,
        Arc::new(identity),
        aggregator.clone(),
        max_conflict_retries,
    )
    .with_ingest_timeout(Duration::from_millis(config.ingest_timeout_ms));

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    // Finish queued folds before exit
    if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, aggregator.drain())
        .await
        .is_err()
    {
        warn!("Timed out draining profile folds");
    }

    health_monitor.abort();
    for task in background {
        task.abort();
    }
    drop(aggregator);
    for task in shard_tasks {
        task.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from defaults, an optional file and the environment.
///
/// `WIDGET_ANALYTICS_PORT=9000`, `WIDGET_ANALYTICS_STORAGE__BACKEND=clickhouse`
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::with_prefix("WIDGET_ANALYTICS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

async fn open_stores(
    storage: &StorageConfig,
) -> Result<(Arc<dyn EventStore>, Arc<dyn ProfileStore>)> {
    match storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data is lost on restart");
            Ok((
                Arc::new(InMemoryEventStore::new()),
                Arc::new(InMemoryProfileStore::new()),
            ))
        }
        StorageBackend::Clickhouse => {
            let client = ClickHouseClient::new(storage.clickhouse.clone());
            client
                .init_schema()
                .await
                .context("Failed to initialize ClickHouse schema")?;
            info!(
                url = %storage.clickhouse.url,
                database = %storage.clickhouse.database,
                "ClickHouse storage ready"
            );
            Ok((
                Arc::new(ClickHouseEventStore::new(client.clone())),
                Arc::new(ClickHouseProfileStore::new(client)),
            ))
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
