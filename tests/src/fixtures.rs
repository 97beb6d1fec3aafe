//! Test fixtures and event generators.

use serde_json::{json, Value};
use uuid::Uuid;

/// Tenant A and its widget key.
pub const TENANT_A: &str = "user-a";
pub const TENANT_A_KEY: &str = "key_tenant_a_0001";

/// Tenant B and its widget key.
pub const TENANT_B: &str = "user-b";
pub const TENANT_B_KEY: &str = "key_tenant_b_0001";

/// Key of a deactivated account.
pub const INACTIVE_KEY: &str = "key_inactive_0001";

/// Well-formed key nobody owns.
pub const UNKNOWN_KEY: &str = "key_nobody_00001";

pub const CHROME_MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Tracking envelope for one event from `visitor-1`.
pub fn track(api_key: &str, event_name: &str, event_data: Value) -> Value {
    track_for(api_key, "visitor-1", event_name, event_data)
}

/// Tracking envelope for one event from a given visitor.
pub fn track_for(api_key: &str, visitor_id: &str, event_name: &str, event_data: Value) -> Value {
    json!({
        "apiKey": api_key,
        "eventName": event_name,
        "eventData": event_data,
        "sessionId": format!("sess-{}", visitor_id),
        "visitorId": visitor_id,
    })
}

pub fn product(product_id: &str) -> Value {
    json!({
        "productId": product_id,
        "name": format!("Product {}", product_id),
        "price": 19.99,
    })
}

pub fn checkout(total: f64) -> Value {
    json!({
        "checkoutId": Uuid::new_v4().to_string(),
        "total": total,
        "currency": "USD",
    })
}

pub fn page_view(path: &str, duration: Option<f64>) -> Value {
    let mut data = json!({
        "title": "Test page",
        "url": format!("https://shop.example.com{}", path),
        "path": path,
        "referrer": "https://search.example.com/",
    });
    if let Some(duration) = duration {
        data["duration"] = json!(duration);
    }
    data
}

pub fn search(query: &str) -> Value {
    json!({ "query": query, "resultsCount": 3 })
}

/// Envelope over the 64KB event limit.
pub fn oversized(api_key: &str) -> Value {
    let mut body = track(api_key, "SEARCH", search("big"));
    body["eventData"]["padding"] = Value::String("x".repeat(70_000));
    body
}
