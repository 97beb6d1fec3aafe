//! Customer profile endpoints.

use analytics_core::{CustomerProfile, ProfileKey};
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::extractors::SessionUser;
use crate::response::{ApiError, RebuildResponse};
use crate::state::AppState;

/// GET /analytics/profiles/:visitorId
pub async fn get_profile(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    Path(visitor_id): Path<String>,
) -> Result<Json<CustomerProfile>, ApiError> {
    let key = ProfileKey::new(user_id, visitor_id);
    match state.profiles.get(&key).await? {
        Some(profile) => Ok(Json(profile)),
        None => Err(ApiError::not_found(format!(
            "No profile for visitor {}",
            key.visitor_id
        ))),
    }
}

/// POST /analytics/profiles/rebuild
///
/// Waits for queued folds, then replays the tenant's events.
pub async fn rebuild_profiles(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
) -> Result<Json<RebuildResponse>, ApiError> {
    state.aggregator.drain().await;
    let summary = state.rebuilder.rebuild(&user_id).await?;

    info!(
        user_id = %user_id,
        profiles = summary.profiles,
        events = summary.events,
        "Profile rebuild requested"
    );
    Ok(Json(RebuildResponse {
        rebuilt: summary.profiles,
        events: summary.events,
    }))
}
