//! End-to-end tests for `POST /analytics/track`.

use analytics_core::{Event, EventName};
use axum::http::StatusCode;
use integration_tests::{
    fixtures::{self, TENANT_A, TENANT_A_KEY},
    setup::TestContext,
};
use serde_json::{json, Value};

/// A tracked event is stored for the key's tenant and echoed back
#[tokio::test]
async fn test_track_returns_created_event() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::track(
            TENANT_A_KEY,
            "PRODUCT_VIEWED",
            fixtures::product("sku-1"),
        ))
        .await;

    response.assert_status(StatusCode::CREATED);
    let event: Event = response.json();
    assert_eq!(event.user_id, TENANT_A);
    assert_eq!(event.api_key, TENANT_A_KEY);
    assert_eq!(event.event_name, EventName::ProductViewed);
    assert_eq!(event.visitor_id.as_deref(), Some("visitor-1"));
    assert_eq!(event.event_data.product().map(|p| p.product_id.as_str()), Some("sku-1"));

    assert_eq!(ctx.events.len(), 1);
    assert_eq!(ctx.identity.lookups(), 1);
}

/// Request headers are captured on the event, never taken from the body
#[tokio::test]
async fn test_track_enriches_from_request_headers() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .add_header("User-Agent", fixtures::CHROME_MAC_UA)
        .add_header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
        .add_header("Referer", "https://shop.example.com/pricing?plan=pro")
        .json(&fixtures::track(
            TENANT_A_KEY,
            "PAGE_VIEW",
            fixtures::page_view("/pricing", Some(12.5)),
        ))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["ipAddress"], "203.0.113.7");
    assert_eq!(body["userAgent"], fixtures::CHROME_MAC_UA);
    assert_eq!(body["referrer"], "https://shop.example.com/pricing?plan=pro");
    assert_eq!(body["path"], "/pricing");
}

/// Event names are normalized before the allow-list check
#[tokio::test]
async fn test_track_normalizes_event_name() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::track(TENANT_A_KEY, "add-to-cart", fixtures::product("sku-2")))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["eventName"], "ADD_TO_CART");
}

/// Tracked events are folded into the visitor's profile
#[tokio::test]
async fn test_tracked_events_fold_into_profile() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let mut bodies = Vec::new();
    for sku in ["sku-1", "sku-2", "sku-3"] {
        bodies.push(fixtures::track(TENANT_A_KEY, "PRODUCT_VIEWED", fixtures::product(sku)));
    }
    for total in [100.0, 200.0, 300.0] {
        bodies.push(fixtures::track(TENANT_A_KEY, "CHECKOUT_COMPLETED", fixtures::checkout(total)));
    }
    bodies.push(fixtures::track(TENANT_A_KEY, "SEARCH", fixtures::search("blue mugs")));
    ctx.seed(&server, bodies).await;

    let response = server
        .get("/analytics/profiles/visitor-1")
        .add_header("X-User-Id", TENANT_A)
        .await;
    response.assert_status_ok();

    let profile: Value = response.json();
    assert_eq!(profile["userId"], TENANT_A);
    assert_eq!(profile["analytics"]["productViews"], 3);
    assert_eq!(profile["analytics"]["totalOrders"], 3);
    assert_eq!(profile["analytics"]["totalSpent"], 600.0);
    assert_eq!(profile["analytics"]["averageOrderValue"], 200.0);
    assert_eq!(profile["recentlyViewedProducts"], json!(["sku-3", "sku-2", "sku-1"]));
    assert_eq!(profile["searchHistory"], json!(["blue mugs"]));
    assert_eq!(profile["version"], 7);
}

/// Repeated adds from one visitor are all counted
#[tokio::test]
async fn test_add_to_cart_counts_every_event() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let bodies = (0..25).map(|i| {
        fixtures::track(TENANT_A_KEY, "ADD_TO_CART", fixtures::product(&format!("sku-{}", i)))
    });
    ctx.seed(&server, bodies).await;

    let response = server
        .get("/analytics/profiles/visitor-1")
        .add_header("X-User-Id", TENANT_A)
        .await;
    let profile: Value = response.json();
    assert_eq!(profile["analytics"]["addToCartCount"], 25);
}

/// Events without any visitor identity are stored but not folded
#[tokio::test]
async fn test_anonymous_event_is_stored_without_profile() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let body = json!({
        "apiKey": TENANT_A_KEY,
        "eventName": "SEARCH",
        "eventData": { "query": "socks" },
    });
    ctx.seed(&server, [body]).await;

    assert_eq!(ctx.events.len(), 1);
    assert!(ctx.profiles.is_empty());
}
