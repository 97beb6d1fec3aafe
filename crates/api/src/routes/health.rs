//! Health check endpoints. None of them require credentials.

use axum::{http::StatusCode, Json};
use telemetry::{health, metrics, Component};

use crate::response::HealthResponse;

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    let registry = health();

    Json(HealthResponse {
        status: registry.report().status.as_str().to_string(),
        event_store_connected: registry.is_up(Component::EventStore),
        profile_store_connected: registry.is_up(Component::ProfileStore),
        queue_depth: metrics().aggregator.queue_depth.get(),
    })
}

/// GET /health/ready - 503 until the event store answers.
pub async fn ready_handler() -> StatusCode {
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live
pub async fn live_handler() -> StatusCode {
    StatusCode::OK
}
