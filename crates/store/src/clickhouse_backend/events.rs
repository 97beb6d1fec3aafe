//! ClickHouse-backed event store.

use analytics_core::events::EventRecord;
use analytics_core::{Error, Event, EventName, Pipeline, Result};
use async_trait::async_trait;
use chrono::DateTime;
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::client::{db_error, ClickHouseClient};
use crate::query::EventQuery;
use crate::store::EventStore;

/// Flattened event row. JSON columns are stored as text.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    pub api_key: String,
    pub user_id: String,
    pub event_name: String,
    pub event_data: String,
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub referrer: Option<String>,
    pub path: Option<String>,
    pub metadata: Option<String>,
    pub created_at: i64, // DateTime64(3) as milliseconds
}

impl TryFrom<&Event> for EventRow {
    type Error = Error;

    fn try_from(event: &Event) -> Result<Self> {
        Ok(Self {
            id: event.id.to_string(),
            api_key: event.api_key.clone(),
            user_id: event.user_id.clone(),
            event_name: event.event_name.as_str().to_string(),
            event_data: serde_json::to_string(&event.event_data)?,
            session_id: event.session_id.clone(),
            visitor_id: event.visitor_id.clone(),
            user_agent: event.user_agent.clone(),
            ip_address: event.ip_address.clone(),
            referrer: event.referrer.clone(),
            path: event.path.clone(),
            metadata: event.metadata.as_ref().map(serde_json::to_string).transpose()?,
            created_at: event.created_at.timestamp_millis(),
        })
    }
}

impl TryFrom<EventRow> for Event {
    type Error = Error;

    /// Stored payloads are reclassified on the way out.
    fn try_from(row: EventRow) -> Result<Self> {
        let record = EventRecord {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| Error::internal(format!("bad event id {}: {}", row.id, e)))?,
            api_key: row.api_key,
            user_id: row.user_id,
            event_name: EventName::parse(&row.event_name)?,
            event_data: serde_json::from_str(&row.event_data)?,
            session_id: row.session_id,
            visitor_id: row.visitor_id,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            referrer: row.referrer,
            path: row.path,
            metadata: row
                .metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: DateTime::from_timestamp_millis(row.created_at)
                .ok_or_else(|| Error::internal(format!("bad timestamp {}", row.created_at)))?,
        };
        Event::try_from(record)
    }
}

/// Event store over the `events` table.
#[derive(Clone)]
pub struct ClickHouseEventStore {
    client: ClickHouseClient,
}

impl ClickHouseEventStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    /// Count every stored event of a tenant.
    pub async fn count_for_user(&self, user_id: &str) -> Result<u64> {
        self.client
            .inner()
            .query("SELECT count() FROM events WHERE user_id = ?")
            .bind(user_id)
            .fetch_one()
            .await
            .map_err(db_error("count events"))
    }
}

fn into_events(rows: Vec<EventRow>) -> Result<Vec<Event>> {
    rows.into_iter().map(Event::try_from).collect()
}

#[async_trait]
impl EventStore for ClickHouseEventStore {
    async fn append(&self, event: Event) -> Result<Uuid> {
        event.check_envelope()?;
        let row = EventRow::try_from(&event)?;

        let mut insert = self
            .client
            .inner()
            .insert("events")
            .map_err(db_error("insert"))?;
        insert.write(&row).await.map_err(db_error("write"))?;
        insert.end().await.map_err(db_error("end insert"))?;

        Ok(event.id)
    }

    async fn query_by_user(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let mut sql = String::from("SELECT ?fields FROM events WHERE user_id = ?");
        if query.api_key.is_some() {
            sql.push_str(" AND api_key = ?");
        }
        if query.range.start.is_some() {
            sql.push_str(" AND created_at >= fromUnixTimestamp64Milli(toInt64(?))");
        }
        if query.range.end.is_some() {
            sql.push_str(" AND created_at < fromUnixTimestamp64Milli(toInt64(?))");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        match query.limit {
            Some(_) => sql.push_str(" LIMIT ? OFFSET ?"),
            None if query.offset > 0 => sql.push_str(" OFFSET ? ROWS"),
            None => {}
        }

        let mut q = self.client.inner().query(&sql).bind(&query.user_id);
        if let Some(key) = &query.api_key {
            q = q.bind(key);
        }
        if let Some(start) = query.range.start {
            q = q.bind(start.timestamp_millis());
        }
        if let Some(end) = query.range.end {
            q = q.bind(end.timestamp_millis());
        }
        match query.limit {
            Some(limit) => q = q.bind(limit as u64).bind(query.offset as u64),
            None if query.offset > 0 => q = q.bind(query.offset as u64),
            None => {}
        }

        let rows: Vec<EventRow> = q.fetch_all().await.map_err(db_error("query events"))?;
        into_events(rows)
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>> {
        let start = Instant::now();
        let hint = pipeline.scan_hint();

        let mut sql = String::from("SELECT ?fields FROM events WHERE 1 = 1");
        if hint.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if hint.event_names.is_some() {
            sql.push_str(" AND has(?, event_name)");
        }
        if hint.created_from.is_some() {
            sql.push_str(" AND created_at >= fromUnixTimestamp64Milli(toInt64(?))");
        }
        if hint.created_before.is_some() {
            sql.push_str(" AND created_at < fromUnixTimestamp64Milli(toInt64(?))");
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut q = self.client.inner().query(&sql);
        if let Some(user_id) = &hint.user_id {
            q = q.bind(user_id);
        }
        if let Some(names) = &hint.event_names {
            q = q.bind(names);
        }
        if let Some(from) = hint.created_from {
            q = q.bind(from);
        }
        if let Some(before) = hint.created_before {
            q = q.bind(before);
        }

        let rows: Vec<EventRow> = q.fetch_all().await.map_err(db_error("scan events"))?;
        let scanned = rows.len();
        let docs: Vec<Value> = into_events(rows)?.iter().map(Event::to_document).collect();
        let result = pipeline.run(docs);

        debug!(
            scanned = scanned,
            rows = result.len(),
            latency_ms = %start.elapsed().as_millis(),
            "Ran pipeline over ClickHouse scan"
        );
        Ok(result)
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await
    }
}
