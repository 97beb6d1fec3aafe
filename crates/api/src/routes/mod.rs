//! API routes.

pub mod events;
pub mod health;
pub mod profiles;
pub mod reports;
pub mod track;

use analytics_core::error::AuthErrorCode;
use analytics_core::{ApiKey, Error};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::response::ApiError;
use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let reports = Router::new()
        .route("/most-viewed-products", get(reports::most_viewed_products))
        .route("/most-added-to-cart", get(reports::most_added_to_cart))
        .route("/order-statistics", get(reports::order_statistics))
        .route("/time-based", get(reports::time_based))
        .route("/page-duration", get(reports::page_duration))
        .route("/page-duration/detailed", get(reports::detailed_page_duration));

    let analytics = Router::new()
        .route("/track", post(track::track_handler))
        .route("/events", get(events::list_events))
        .route("/aggregations", get(events::aggregations))
        .route("/sessions", get(events::sessions))
        .route("/profiles/rebuild", post(profiles::rebuild_profiles))
        .route("/profiles/:visitor_id", get(profiles::get_profile))
        .nest("/reports", reports);

    Router::new()
        .nest("/analytics", analytics)
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Check that an `apiKey` query parameter belongs to the session user.
///
/// Returns the key to scope the query by, if one was given.
pub(crate) async fn authorize_key(
    state: &AppState,
    session_user: &str,
    api_key: Option<&str>,
) -> Result<Option<String>, ApiError> {
    let Some(raw) = api_key.filter(|k| !k.trim().is_empty()) else {
        return Ok(None);
    };

    let key = ApiKey::parse(raw)?;
    let identity = state.identity.resolve(&key).await?;
    if identity.user_id != session_user {
        return Err(Error::unauthorized(
            AuthErrorCode::Forbidden,
            "API key does not belong to this account",
        )
        .into());
    }
    Ok(Some(key.as_str().to_string()))
}
