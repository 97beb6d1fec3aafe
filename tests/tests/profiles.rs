//! Tests for profile lookup and rebuild.

use analytics_core::{CustomerProfile, ProfileKey};
use axum::http::StatusCode;
use event_store::{EventQuery, EventStore, ProfileStore};
use integration_tests::{
    fixtures::{self, TENANT_A, TENANT_A_KEY, TENANT_B},
    setup::TestContext,
};
use serde_json::Value;

/// Unknown visitors are a 404
#[tokio::test]
async fn test_unknown_profile_returns_404() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .get("/analytics/profiles/nobody")
        .add_header("X-User-Id", TENANT_A)
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

/// Profiles are only visible to their own tenant
#[tokio::test]
async fn test_profile_lookup_is_tenant_scoped() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    ctx.seed(
        &server,
        [fixtures::track(TENANT_A_KEY, "PRODUCT_VIEWED", fixtures::product("A"))],
    )
    .await;

    server
        .get("/analytics/profiles/visitor-1")
        .add_header("X-User-Id", TENANT_A)
        .await
        .assert_status_ok();
    server
        .get("/analytics/profiles/visitor-1")
        .add_header("X-User-Id", TENANT_B)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

/// The user agent of the latest event becomes the profile's device
#[tokio::test]
async fn test_profile_records_last_device() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    server
        .post("/analytics/track")
        .add_header("User-Agent", fixtures::CHROME_MAC_UA)
        .add_header("X-Real-IP", "198.51.100.4")
        .json(&fixtures::track(TENANT_A_KEY, "SEARCH", fixtures::search("lamp")))
        .await
        .assert_status(StatusCode::CREATED);
    ctx.settle().await;

    let profile: Value = server
        .get("/analytics/profiles/visitor-1")
        .add_header("X-User-Id", TENANT_A)
        .await
        .json();
    assert_eq!(profile["lastDevice"]["browser"], "Chrome");
    assert_eq!(profile["lastDevice"]["category"], "desktop");
    assert_eq!(profile["lastLocation"]["ip"], "198.51.100.4");
}

/// Rebuild recomputes drifted counters from the event log
#[tokio::test]
async fn test_rebuild_restores_profiles_from_events() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    ctx.seed(
        &server,
        [
            fixtures::track_for(TENANT_A_KEY, "v1", "ADD_TO_CART", fixtures::product("A")),
            fixtures::track_for(TENANT_A_KEY, "v1", "ADD_TO_CART", fixtures::product("B")),
            fixtures::track_for(TENANT_A_KEY, "v2", "PRODUCT_VIEWED", fixtures::product("C")),
        ],
    )
    .await;

    // Corrupt one profile behind the aggregator's back.
    let key = ProfileKey::new(TENANT_A, "v1");
    let mut drifted: CustomerProfile = ctx.profiles.get(&key).await.unwrap().unwrap();
    drifted.analytics.add_to_cart_count = 99;
    drifted.preferences.newsletter = true;
    ctx.profiles.put(&drifted).await.unwrap();

    let response = server
        .post("/analytics/profiles/rebuild")
        .add_header("X-User-Id", TENANT_A)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["rebuilt"], 2);
    assert_eq!(body["events"], 3);

    let restored = ctx.profiles.get(&key).await.unwrap().unwrap();
    assert_eq!(restored.analytics.add_to_cart_count, 2);
    assert!(restored.preferences.newsletter);
}

/// Rebuild and the report endpoints only read the event log
#[tokio::test]
async fn test_rebuild_and_reports_leave_events_untouched() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    ctx.seed(
        &server,
        [
            fixtures::track_for(TENANT_A_KEY, "v1", "PRODUCT_VIEWED", fixtures::product("A")),
            fixtures::track_for(TENANT_A_KEY, "v1", "ADD_TO_CART", fixtures::product("A")),
            fixtures::track_for(TENANT_A_KEY, "v2", "PAGE_VIEW", fixtures::page_view("/pricing", Some(12.0))),
            fixtures::track_for(TENANT_A_KEY, "v2", "CHECKOUT_COMPLETED", fixtures::checkout(40.0)),
            fixtures::track_for(TENANT_A_KEY, "v2", "SEARCH", fixtures::search("boots")),
        ],
    )
    .await;

    let query = EventQuery::for_user(TENANT_A);
    let before = ctx.events.query_by_user(&query).await.unwrap();
    assert_eq!(before.len(), 5);

    server
        .post("/analytics/profiles/rebuild")
        .add_header("X-User-Id", TENANT_A)
        .await
        .assert_status_ok();

    for path in [
        "/analytics/events",
        "/analytics/aggregations",
        "/analytics/sessions",
        "/analytics/reports/most-viewed-products",
        "/analytics/reports/most-added-to-cart",
        "/analytics/reports/order-statistics",
        "/analytics/reports/time-based?days=7",
        "/analytics/reports/page-duration",
        "/analytics/reports/page-duration/detailed?path=/pricing",
        "/analytics/profiles/v1",
    ] {
        server
            .get(path)
            .add_header("X-User-Id", TENANT_A)
            .await
            .assert_status_ok();
    }

    let after = ctx.events.query_by_user(&query).await.unwrap();
    assert_eq!(ctx.events.len(), 5);
    assert_eq!(before, after);
}

/// Rebuild needs a session like every other query endpoint
#[tokio::test]
async fn test_rebuild_requires_session() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.post("/analytics/profiles/rebuild").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "AUTH_004");
}
