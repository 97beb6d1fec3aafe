//! Tracking endpoint handler.
//!
//! Accepts one event per request, resolves its API key to a tenant,
//! classifies the payload and appends it to the event store. The profile
//! fold is queued and never delays the response.

use analytics_core::error::DbErrorCode;
use analytics_core::{Error, Event, TrackRequest};
use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::extractors::TrackContext;
use crate::response::ApiError;
use crate::state::AppState;

/// POST /analytics/track
pub async fn track_handler(
    State(state): State<AppState>,
    TrackContext(context): TrackContext,
    body: Bytes,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let start = Instant::now();
    let gateway = &metrics().gateway;
    gateway.received.inc();

    match ingest(&state, context, &body).await {
        Ok(event) => {
            let elapsed = start.elapsed();
            gateway.accepted.inc();
            gateway.latency.record(elapsed);

            info!(
                user_id = %event.user_id,
                event_id = %event.id,
                event_name = %event.event_name,
                latency_ms = %elapsed.as_millis(),
                "Event tracked"
            );
            Ok((StatusCode::CREATED, Json(event)))
        }
        Err(e) => {
            gateway.rejected.inc();
            warn!(code = e.error_code(), error = %e, "Event rejected");
            Err(e.into())
        }
    }
}

async fn ingest(
    state: &AppState,
    context: analytics_core::RequestContext,
    body: &[u8],
) -> Result<Event, Error> {
    let request = TrackRequest::parse(body)?;
    let key = request.api_key()?;
    let identity = state.identity.resolve(&key).await?;

    let event = request.into_event(&key, &identity, context, Utc::now())?;
    debug!(
        user_id = %identity.user_id,
        event_name = %event.event_name,
        "Event classified"
    );

    let store_metrics = &metrics().store;
    let append_start = Instant::now();
    tokio::time::timeout(state.ingest_timeout, state.events.append(event.clone()))
        .await
        .map_err(|_| {
            store_metrics.errors.inc();
            Error::database(
                DbErrorCode::Timeout,
                format!("append timed out after {}ms", state.ingest_timeout.as_millis()),
            )
        })??;
    store_metrics.appends.inc();
    store_metrics.append_latency.record(append_start.elapsed());

    state.aggregator.submit(event.clone());
    Ok(event)
}
