//! ClickHouse table schemas.
//!
//! - `events` is append-only, ordered for per-tenant time scans
//! - `profiles` keeps every revision; `FINAL` reads collapse to the newest

/// Raw event log. `event_data` and `metadata` hold JSON text.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id String,
    api_key String,
    user_id String,
    event_name LowCardinality(String),
    event_data String,
    session_id Nullable(String),
    visitor_id Nullable(String),
    user_agent Nullable(String),
    ip_address Nullable(String),
    referrer Nullable(String),
    path Nullable(String),
    metadata Nullable(String),
    created_at DateTime64(3)
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(created_at)
ORDER BY (user_id, created_at, id)
SETTINGS index_granularity = 8192
"#;

/// Customer profiles, one row per revision.
pub const CREATE_PROFILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    user_id String,
    visitor_id String,
    version UInt64,
    body String,
    updated_at DateTime64(3)
)
ENGINE = ReplacingMergeTree(version)
ORDER BY (user_id, visitor_id)
SETTINGS index_granularity = 8192
"#;

/// All tables in creation order.
pub fn all_tables() -> &'static [&'static str] {
    &[CREATE_EVENTS_TABLE, CREATE_PROFILES_TABLE]
}
