//! Report endpoints. All are scoped to the session user.

use analytics_core::limits::{
    DEFAULT_DETAIL_LIMIT, DEFAULT_REPORT_LIMIT, DEFAULT_TIME_WINDOW_DAYS, MAX_QUERY_LIMIT,
};
use analytics_core::Error;
use axum::{extract::State, Json};
use chrono::Utc;
use event_store::{
    DailyActivity, DateRange, MostAddedProduct, MostViewedProduct, OrderStatistics,
    PageDurationRecord, PageDurationStat,
};
use serde::Deserialize;

use crate::extractors::{QueryParams, SessionUser};
use crate::response::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingParams {
    pub limit: Option<usize>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DaysParams {
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDurationParams {
    pub path: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailedParams {
    pub path: Option<String>,
    pub limit: Option<usize>,
}

fn limit_or(limit: Option<usize>, default: usize) -> Result<usize, Error> {
    match limit {
        Some(0) => Err(Error::query("limit must be positive")),
        Some(n) => Ok(n.min(MAX_QUERY_LIMIT)),
        None => Ok(default),
    }
}

/// GET /analytics/reports/most-viewed-products
pub async fn most_viewed_products(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    QueryParams(params): QueryParams<RankingParams>,
) -> Result<Json<Vec<MostViewedProduct>>, ApiError> {
    let limit = limit_or(params.limit, DEFAULT_REPORT_LIMIT)?;
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;
    Ok(Json(
        state.reports.most_viewed_products(&user_id, limit, range).await?,
    ))
}

/// GET /analytics/reports/most-added-to-cart
pub async fn most_added_to_cart(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    QueryParams(params): QueryParams<RankingParams>,
) -> Result<Json<Vec<MostAddedProduct>>, ApiError> {
    let limit = limit_or(params.limit, DEFAULT_REPORT_LIMIT)?;
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;
    Ok(Json(
        state.reports.most_added_to_cart(&user_id, limit, range).await?,
    ))
}

/// GET /analytics/reports/order-statistics
pub async fn order_statistics(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    QueryParams(params): QueryParams<RangeParams>,
) -> Result<Json<OrderStatistics>, ApiError> {
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;
    Ok(Json(state.reports.order_statistics(&user_id, range).await?))
}

/// GET /analytics/reports/time-based
pub async fn time_based(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    QueryParams(params): QueryParams<DaysParams>,
) -> Result<Json<Vec<DailyActivity>>, ApiError> {
    let days = params.days.unwrap_or(DEFAULT_TIME_WINDOW_DAYS);
    if days <= 0 {
        return Err(Error::query("days must be positive").into());
    }
    Ok(Json(
        state.reports.time_based(&user_id, days, Utc::now()).await?,
    ))
}

/// GET /analytics/reports/page-duration
pub async fn page_duration(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    QueryParams(params): QueryParams<PageDurationParams>,
) -> Result<Json<Vec<PageDurationStat>>, ApiError> {
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;
    let path = params.path.as_deref().filter(|p| !p.is_empty());
    Ok(Json(
        state.reports.page_duration(&user_id, path, range).await?,
    ))
}

/// GET /analytics/reports/page-duration/detailed
pub async fn detailed_page_duration(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    QueryParams(params): QueryParams<DetailedParams>,
) -> Result<Json<Vec<PageDurationRecord>>, ApiError> {
    let path = params
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::query("path is required"))?;
    let limit = limit_or(params.limit, DEFAULT_DETAIL_LIMIT)?;
    Ok(Json(
        state
            .reports
            .detailed_page_duration(&user_id, &path, limit)
            .await?,
    ))
}
