//! Tests for health check endpoints.

use axum::http::StatusCode;
use event_store::{check_stores, InMemoryEventStore, InMemoryProfileStore};
use integration_tests::setup::TestContext;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    for field in ["status", "eventStoreConnected", "profileStoreConnected", "queueDepth"] {
        assert!(body.get(field).is_some(), "Response should have '{}' field", field);
    }
    assert!(body["queueDepth"].as_u64().is_some());
}

/// Healthy stores make the service ready
#[tokio::test]
async fn test_ready_after_store_check() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    assert!(check_stores(&InMemoryEventStore::new(), &InMemoryProfileStore::new()).await);

    server.get("/health/ready").await.assert_status_ok();

    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["eventStoreConnected"], true);
}

/// Test /health/live endpoint always returns 200 when service is running
#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new().await;
    ctx.server().get("/health/live").await.assert_status_ok();
}

/// Health endpoints need neither an API key nor a session
#[tokio::test]
async fn test_health_endpoints_no_auth_required() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    for path in ["/health", "/health/ready", "/health/live"] {
        assert_ne!(
            server.get(path).await.status_code(),
            StatusCode::UNAUTHORIZED,
            "{} should not require auth",
            path
        );
    }
}
