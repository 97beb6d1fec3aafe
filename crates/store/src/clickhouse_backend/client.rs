//! ClickHouse client wrapper.

use super::config::ClickHouseConfig;
use super::schema::all_tables;
use analytics_core::error::DbErrorCode;
use analytics_core::{Error, Result};
use clickhouse::Client;
use tracing::{debug, info};

/// Map a driver error to a coded storage error.
pub(crate) fn db_error(context: &'static str) -> impl Fn(clickhouse::error::Error) -> Error {
    move |e| {
        telemetry::metrics().store.errors.inc();
        let code = match &e {
            clickhouse::error::Error::TimedOut => DbErrorCode::Timeout,
            _ => DbErrorCode::StoreFailed,
        };
        Error::database(code, format!("{}: {}", context, e))
    }
}

/// ClickHouse client bound to the configured database.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    /// Creates a new ClickHouse client.
    pub fn new(config: ClickHouseConfig) -> Self {
        let inner = Self::base(&config).with_database(&config.database);

        info!(
            url = %config.url,
            database = %config.database,
            "Created ClickHouse client"
        );

        Self { inner, config }
    }

    fn base(config: &ClickHouseConfig) -> Client {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_option("max_execution_time", config.timeout_secs.to_string());

        if let Some(ref user) = config.username {
            client = client.with_user(user);
        }

        if let Some(ref pass) = config.password {
            client = client.with_password(pass);
        }

        client
    }

    /// Returns the inner clickhouse client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    /// Create the database and tables if they do not exist.
    pub async fn init_schema(&self) -> Result<()> {
        Self::base(&self.config)
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.config.database))
            .execute()
            .await
            .map_err(db_error("create database"))?;

        for ddl in all_tables() {
            self.inner
                .query(ddl)
                .execute()
                .await
                .map_err(db_error("execute DDL"))?;
        }

        debug!(database = %self.config.database, "ClickHouse schema initialized");
        Ok(())
    }

    /// Round trip to the server.
    pub async fn ping(&self) -> Result<()> {
        self.inner
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .map_err(db_error("ping"))?;
        Ok(())
    }
}
