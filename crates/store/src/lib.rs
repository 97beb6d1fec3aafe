//! Event and profile storage for the widget analytics engine.
//!
//! Two backends implement the [`EventStore`] and [`ProfileStore`] traits:
//! an in-memory one for development and tests, and ClickHouse.
//! [`ReportEngine`] builds every report on top of [`EventStore::aggregate`].

pub mod clickhouse_backend;
pub mod health;
pub mod memory;
pub mod query;
pub mod reports;
pub mod store;

pub use clickhouse_backend::{ClickHouseClient, ClickHouseConfig, ClickHouseEventStore, ClickHouseProfileStore};
pub use health::{check_stores, spawn_health_monitor};
pub use memory::{InMemoryEventStore, InMemoryProfileStore};
pub use query::{DateRange, EventQuery};
pub use reports::*;
pub use store::{EventStore, ProfileStore};
