//! Raw event listing and tenant-wide counts.

use analytics_core::Event;
use axum::{extract::State, Json};
use event_store::{DateRange, EventAggregations, EventQuery, SessionCount};
use serde::Deserialize;
use std::time::Instant;
use telemetry::metrics;
use tracing::debug;

use super::authorize_key;
use crate::extractors::{QueryParams, SessionUser};
use crate::response::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsParams {
    pub api_key: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Key and date filters shared by the count endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeParams {
    pub api_key: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// GET /analytics/events - Tenant events, newest first.
pub async fn list_events(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    QueryParams(params): QueryParams<EventsParams>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let api_key = authorize_key(&state, &user_id, params.api_key.as_deref()).await?;
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;

    let query = EventQuery::for_user(user_id.as_str())
        .with_api_key(api_key)
        .with_range(range)
        .page(params.offset, params.limit);

    let start = Instant::now();
    let events = state.events.query_by_user(&query).await?;
    metrics().store.queries.inc();
    metrics().store.query_latency.record(start.elapsed());

    debug!(user_id = %user_id, count = events.len(), "Listed events");
    Ok(Json(events))
}

/// GET /analytics/aggregations
pub async fn aggregations(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    QueryParams(params): QueryParams<ScopeParams>,
) -> Result<Json<EventAggregations>, ApiError> {
    let api_key = authorize_key(&state, &user_id, params.api_key.as_deref()).await?;
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;

    let aggregations = state
        .reports
        .aggregations(&user_id, api_key.as_deref(), range)
        .await?;
    Ok(Json(aggregations))
}

/// GET /analytics/sessions
pub async fn sessions(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    QueryParams(params): QueryParams<ScopeParams>,
) -> Result<Json<SessionCount>, ApiError> {
    let api_key = authorize_key(&state, &user_id, params.api_key.as_deref()).await?;
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;

    let sessions = state
        .reports
        .sessions(&user_id, api_key.as_deref(), range)
        .await?;
    Ok(Json(sessions))
}
