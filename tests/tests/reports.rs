//! Tests for the query and report endpoints.

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Utc;
use integration_tests::{
    fixtures::{self, TENANT_A, TENANT_A_KEY, TENANT_B, TENANT_B_KEY},
    setup::TestContext,
};
use serde_json::{json, Value};

async fn get_as(server: &TestServer, user: &str, path: &str) -> Value {
    let response = server.get(path).add_header("X-User-Id", user).await;
    response.assert_status_ok();
    response.json()
}

/// Grouping counts per product, ties broken by product id
#[tokio::test]
async fn test_most_viewed_products() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let bodies = ["A", "B", "A", "A"]
        .into_iter()
        .map(|sku| fixtures::track(TENANT_A_KEY, "PRODUCT_VIEWED", fixtures::product(sku)));
    ctx.seed(&server, bodies).await;

    let rows = get_as(&server, TENANT_A, "/analytics/reports/most-viewed-products").await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["_id"], "A");
    assert_eq!(rows[0]["viewCount"], 3);
    assert_eq!(rows[0]["name"], "Product A");
    assert_eq!(rows[1]["_id"], "B");
    assert_eq!(rows[1]["viewCount"], 1);

    let limited = get_as(&server, TENANT_A, "/analytics/reports/most-viewed-products?limit=1").await;
    assert_eq!(limited.as_array().unwrap().len(), 1);
}

/// Reports only see the session tenant's events
#[tokio::test]
async fn test_reports_are_tenant_scoped() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    ctx.seed(
        &server,
        [
            fixtures::track(TENANT_A_KEY, "ADD_TO_CART", fixtures::product("A")),
            fixtures::track(TENANT_B_KEY, "ADD_TO_CART", fixtures::product("B")),
            fixtures::track(TENANT_B_KEY, "ADD_TO_CART", fixtures::product("B")),
        ],
    )
    .await;

    let rows = get_as(&server, TENANT_A, "/analytics/reports/most-added-to-cart").await;
    assert_eq!(rows, json!([{
        "_id": "A",
        "addCount": 1,
        "name": "Product A",
        "price": 19.99,
        "lastAdded": rows[0]["lastAdded"].clone(),
    }]));

    let rows = get_as(&server, TENANT_B, "/analytics/reports/most-added-to-cart").await;
    assert_eq!(rows[0]["_id"], "B");
    assert_eq!(rows[0]["addCount"], 2);
}

/// No orders gives an all-zero record
#[tokio::test]
async fn test_order_statistics_zero_state() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let stats = get_as(&server, TENANT_A, "/analytics/reports/order-statistics").await;
    assert_eq!(
        stats,
        json!({
            "totalOrders": 0,
            "totalAmount": 0.0,
            "averageOrderAmount": 0.0,
            "minOrderAmount": 0.0,
            "maxOrderAmount": 0.0,
        })
    );
}

#[tokio::test]
async fn test_order_statistics_totals() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let bodies = [100.0, 200.0, 300.0]
        .into_iter()
        .map(|total| fixtures::track(TENANT_A_KEY, "CHECKOUT_COMPLETED", fixtures::checkout(total)));
    ctx.seed(&server, bodies).await;

    let stats = get_as(&server, TENANT_A, "/analytics/reports/order-statistics").await;
    assert_eq!(stats["totalOrders"], 3);
    assert_eq!(stats["totalAmount"], 600.0);
    assert_eq!(stats["averageOrderAmount"], 200.0);
    assert_eq!(stats["minOrderAmount"], 100.0);
    assert_eq!(stats["maxOrderAmount"], 300.0);
}

/// Today's events are bucketed by day and name
#[tokio::test]
async fn test_time_based_analytics() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    ctx.seed(
        &server,
        [
            fixtures::track(TENANT_A_KEY, "SEARCH", fixtures::search("a")),
            fixtures::track(TENANT_A_KEY, "SEARCH", fixtures::search("b")),
            fixtures::track(TENANT_A_KEY, "PRODUCT_VIEWED", fixtures::product("A")),
        ],
    )
    .await;

    let days = get_as(&server, TENANT_A, "/analytics/reports/time-based?days=7").await;
    let days = days.as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0]["_id"], Utc::now().format("%Y-%m-%d").to_string());
    assert_eq!(days[0]["totalEvents"], 3);

    let events = days[0]["events"].as_array().unwrap();
    let searches = events.iter().find(|e| e["eventName"] == "SEARCH").unwrap();
    assert_eq!(searches["count"], 2);
}

/// Duration statistics per page path
#[tokio::test]
async fn test_page_duration_stats() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    ctx.seed(
        &server,
        [
            fixtures::track(TENANT_A_KEY, "PAGE_VIEW", fixtures::page_view("/pricing", Some(10.0))),
            fixtures::track(TENANT_A_KEY, "PAGE_VIEW", fixtures::page_view("/pricing", Some(20.0))),
            fixtures::track(TENANT_A_KEY, "PAGE_VIEW", fixtures::page_view("/about", Some(5.0))),
            // Without a duration, not counted
            fixtures::track(TENANT_A_KEY, "PAGE_VIEW", fixtures::page_view("/about", None)),
        ],
    )
    .await;

    let stats = get_as(&server, TENANT_A, "/analytics/reports/page-duration").await;
    let stats = stats.as_array().unwrap();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0]["_id"], "/pricing");
    assert_eq!(stats[0]["visits"], 2);
    assert_eq!(stats[0]["averageDuration"], 15.0);
    assert_eq!(stats[0]["minDuration"], 10.0);
    assert_eq!(stats[0]["maxDuration"], 20.0);
    assert_eq!(stats[1]["_id"], "/about");
    assert_eq!(stats[1]["visits"], 1);

    let only = get_as(&server, TENANT_A, "/analytics/reports/page-duration?path=/about").await;
    assert_eq!(only.as_array().unwrap().len(), 1);

    let detailed = get_as(
        &server,
        TENANT_A,
        "/analytics/reports/page-duration/detailed?path=/pricing",
    )
    .await;
    let detailed = detailed.as_array().unwrap();
    assert_eq!(detailed.len(), 2);
    let mut durations: Vec<f64> = detailed.iter().filter_map(|r| r["duration"].as_f64()).collect();
    durations.sort_by(f64::total_cmp);
    assert_eq!(durations, vec![10.0, 20.0]);
    assert_eq!(detailed[0]["sessionId"], "sess-visitor-1");
    assert_eq!(detailed[0]["referrer"], "https://search.example.com/");
}

/// Raw event listing, distributions and session counts
#[tokio::test]
async fn test_events_aggregations_and_sessions() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    ctx.seed(
        &server,
        [
            fixtures::track_for(TENANT_A_KEY, "v1", "SEARCH", fixtures::search("a")),
            fixtures::track_for(TENANT_A_KEY, "v1", "PRODUCT_VIEWED", fixtures::product("A")),
            fixtures::track_for(TENANT_A_KEY, "v2", "PRODUCT_VIEWED", fixtures::product("B")),
            fixtures::track_for(TENANT_B_KEY, "v3", "SEARCH", fixtures::search("b")),
        ],
    )
    .await;

    let events = get_as(&server, TENANT_A, "/analytics/events").await;
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["eventName"], "PRODUCT_VIEWED");
    assert_eq!(events[0]["visitorId"], "v2");

    let page = get_as(&server, TENANT_A, "/analytics/events?offset=1&limit=1").await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["id"], events[1]["id"]);

    let aggregations = get_as(
        &server,
        TENANT_A,
        &format!("/analytics/aggregations?apiKey={}", TENANT_A_KEY),
    )
    .await;
    assert_eq!(aggregations["totalEvents"], 3);
    assert_eq!(aggregations["eventDistribution"]["PRODUCT_VIEWED"], 2);
    assert_eq!(aggregations["eventDistribution"]["SEARCH"], 1);
    assert_eq!(aggregations["uniqueSessions"], 2);

    let sessions = get_as(&server, TENANT_A, "/analytics/sessions").await;
    assert_eq!(sessions, json!({ "count": 2 }));
}

/// A date window excludes events outside it
#[tokio::test]
async fn test_date_range_filters() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    ctx.seed(
        &server,
        [fixtures::track(TENANT_A_KEY, "SEARCH", fixtures::search("a"))],
    )
    .await;

    let past = get_as(
        &server,
        TENANT_A,
        "/analytics/events?startDate=2020-01-01&endDate=2020-01-31",
    )
    .await;
    assert_eq!(past, json!([]));

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let current = get_as(
        &server,
        TENANT_A,
        &format!("/analytics/events?startDate={}&endDate={}", today, today),
    )
    .await;
    assert_eq!(current.as_array().unwrap().len(), 1);
}

/// Query endpoints need the session header
#[tokio::test]
async fn test_missing_session_returns_auth_004() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    for path in [
        "/analytics/events",
        "/analytics/sessions",
        "/analytics/reports/order-statistics",
        "/analytics/profiles/visitor-1",
    ] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["code"], "AUTH_004", "{}", path);
    }
}

/// Another tenant's key cannot be used to scope a query
#[tokio::test]
async fn test_foreign_api_key_returns_auth_005() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .get(&format!("/analytics/events?apiKey={}", TENANT_B_KEY))
        .add_header("X-User-Id", TENANT_A)
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "AUTH_005");
}

/// Unparseable parameters return QUERY_001
#[tokio::test]
async fn test_bad_query_parameters_return_query_001() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    for path in [
        "/analytics/events?startDate=yesterday",
        "/analytics/events?startDate=2024-02-01&endDate=2024-01-01",
        "/analytics/events?limit=many",
        "/analytics/reports/time-based?days=0",
        "/analytics/reports/time-based?days=100000000",
        "/analytics/reports/page-duration/detailed",
    ] {
        let response = server.get(path).add_header("X-User-Id", TENANT_A).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["code"], "QUERY_001", "{}", path);
    }
}
