//! Tests for error handling in the tracking gateway.
//!
//! Each rejection must carry its stable code and leave the event log untouched.

use axum::http::StatusCode;
use axum_test::{TestResponse, TestServer};
use integration_tests::{
    fixtures::{self, INACTIVE_KEY, TENANT_A_KEY, UNKNOWN_KEY},
    mocks::{Breakage, BrokenEventStore},
    setup::TestContext,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn post_raw(server: &TestServer, body: &str) -> TestResponse {
    server
        .post("/analytics/track")
        .content_type("application/json")
        .bytes(body.to_string().into())
        .await
}

fn assert_code(response: &TestResponse, status: StatusCode, code: &str) {
    response.assert_status(status);
    let body: Value = response.json();
    assert_eq!(body["code"], code, "unexpected body: {}", body);
}

/// Test missing API key returns AUTH_001
#[tokio::test]
async fn test_missing_api_key_returns_401() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&json!({ "eventName": "SEARCH", "eventData": {} }))
        .await;

    assert_code(&response, StatusCode::UNAUTHORIZED, "AUTH_001");
    assert!(ctx.events.is_empty());
}

/// Malformed keys are rejected without an identity lookup
#[tokio::test]
async fn test_malformed_api_key_returns_auth_002() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::track("not a key!", "SEARCH", fixtures::search("x")))
        .await;

    assert_code(&response, StatusCode::UNAUTHORIZED, "AUTH_002");
    assert_eq!(ctx.identity.lookups(), 0);
}

/// Test unknown API key returns AUTH_002
#[tokio::test]
async fn test_unknown_api_key_returns_auth_002() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::track(UNKNOWN_KEY, "SEARCH", fixtures::search("x")))
        .await;

    assert_code(&response, StatusCode::UNAUTHORIZED, "AUTH_002");
    assert!(ctx.events.is_empty());
}

/// Test inactive account returns AUTH_003
#[tokio::test]
async fn test_inactive_key_returns_auth_003() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::track(INACTIVE_KEY, "SEARCH", fixtures::search("x")))
        .await;

    assert_code(&response, StatusCode::UNAUTHORIZED, "AUTH_003");
}

/// Test invalid JSON returns VALID_001
#[tokio::test]
async fn test_invalid_json_returns_400() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = post_raw(&server, "not json at all").await;
    assert_code(&response, StatusCode::BAD_REQUEST, "VALID_001");

    let response = post_raw(&server, r#"{"apiKey": "key_tenant_a_0001", "eventName": "#).await;
    assert_code(&response, StatusCode::BAD_REQUEST, "VALID_001");
}

/// The body is parsed before the key is looked at
#[tokio::test]
async fn test_parse_errors_win_over_auth_errors() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = post_raw(&server, "[1, 2").await;
    assert_code(&response, StatusCode::BAD_REQUEST, "VALID_001");
}

/// Test missing eventName or eventData returns VALID_002
#[tokio::test]
async fn test_missing_envelope_fields_return_valid_002() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&json!({ "apiKey": TENANT_A_KEY, "eventData": {} }))
        .await;
    assert_code(&response, StatusCode::BAD_REQUEST, "VALID_002");

    let response = server
        .post("/analytics/track")
        .json(&json!({ "apiKey": TENANT_A_KEY, "eventName": "SEARCH" }))
        .await;
    assert_code(&response, StatusCode::BAD_REQUEST, "VALID_002");

    assert!(ctx.events.is_empty());
}

/// Test oversized body returns VALID_003
#[tokio::test]
async fn test_oversized_event_returns_413() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::oversized(TENANT_A_KEY))
        .await;

    assert_code(&response, StatusCode::PAYLOAD_TOO_LARGE, "VALID_003");
    assert!(ctx.events.is_empty());
}

/// Names outside the allow-list return EVENT_002
#[tokio::test]
async fn test_unknown_event_name_returns_422() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::track(TENANT_A_KEY, "NOT_REAL", json!({})))
        .await;

    assert_code(&response, StatusCode::UNPROCESSABLE_ENTITY, "EVENT_002");
    assert!(ctx.events.is_empty());
}

/// Payloads breaking their contract return EVENT_001 with details
#[tokio::test]
async fn test_invalid_payload_returns_422() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::track(TENANT_A_KEY, "PRODUCT_VIEWED", json!({ "name": "no id" })))
        .await;

    assert_code(&response, StatusCode::UNPROCESSABLE_ENTITY, "EVENT_001");
    let body: Value = response.json();
    assert!(body["details"].as_array().is_some_and(|d| !d.is_empty()));
    assert!(ctx.events.is_empty());
    assert!(ctx.profiles.is_empty());
}

/// Storage failures surface as DB_001
#[tokio::test]
async fn test_store_failure_returns_500() {
    let ctx = TestContext::with_event_store(
        Arc::new(BrokenEventStore::new(Breakage::Failing)),
        Duration::from_secs(5),
    )
    .await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::track(TENANT_A_KEY, "SEARCH", fixtures::search("x")))
        .await;

    assert_code(&response, StatusCode::INTERNAL_SERVER_ERROR, "DB_001");
    ctx.settle().await;
    assert!(ctx.profiles.is_empty());
}

/// A stalled append is cut off with DB_002
#[tokio::test]
async fn test_store_timeout_returns_504() {
    let ctx = TestContext::with_event_store(
        Arc::new(BrokenEventStore::new(Breakage::Stalled(Duration::from_secs(10)))),
        Duration::from_millis(50),
    )
    .await;
    let server = ctx.server();

    let response = server
        .post("/analytics/track")
        .json(&fixtures::track(TENANT_A_KEY, "SEARCH", fixtures::search("x")))
        .await;

    assert_code(&response, StatusCode::GATEWAY_TIMEOUT, "DB_002");
}
