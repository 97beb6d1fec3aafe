//! ClickHouse storage backend.

pub mod client;
pub mod config;
pub mod events;
pub mod profiles;
pub mod schema;

pub use client::ClickHouseClient;
pub use config::ClickHouseConfig;
pub use events::ClickHouseEventStore;
pub use profiles::ClickHouseProfileStore;
