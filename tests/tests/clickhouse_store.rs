//! ClickHouse backend tests.
//!
//! These need Docker (or `WIDGET_ANALYTICS_TEST_CLICKHOUSE_URL`) and are
//! ignored by default: `cargo test -p integration-tests -- --ignored`.

use analytics_core::{classify, CustomerProfile, Error, Event, EventName, ProfileKey};
use chrono::{Duration, Utc};
use event_store::{
    ClickHouseClient, ClickHouseEventStore, ClickHouseProfileStore, DateRange, EventQuery,
    EventStore, ProfileStore, ReportEngine,
};
use integration_tests::containers::TestContainers;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

async fn client(containers: &TestContainers) -> ClickHouseClient {
    let client = ClickHouseClient::new(containers.config());
    client.init_schema().await.expect("schema init failed");
    client
}

/// Each test works in its own tenant so runs never see each other's rows.
fn tenant() -> String {
    format!("user-{}", Uuid::new_v4().simple())
}

fn product_view(user_id: &str, sku: &str, minutes_ago: i64) -> Event {
    let data = classify(
        EventName::ProductViewed,
        json!({ "productId": sku, "name": format!("Product {}", sku), "price": 5.0 }),
    )
    .unwrap();
    let mut event = Event::new(
        "key_clickhouse_01",
        user_id,
        data,
        Utc::now() - Duration::minutes(minutes_ago),
    );
    event.visitor_id = Some("visitor-1".into());
    event.session_id = Some("sess-1".into());
    event
}

#[tokio::test]
#[ignore = "requires ClickHouse"]
async fn test_append_and_query_newest_first() {
    let containers = TestContainers::start().await;
    let store = ClickHouseEventStore::new(client(&containers).await);
    let user = tenant();

    for (sku, minutes_ago) in [("A", 30), ("B", 20), ("C", 10)] {
        store.append(product_view(&user, sku, minutes_ago)).await.unwrap();
    }

    assert_eq!(store.count_for_user(&user).await.unwrap(), 3);

    let events = store.query_by_user(&EventQuery::for_user(&user)).await.unwrap();
    let skus: Vec<_> = events
        .iter()
        .filter_map(|e| e.event_data.product().map(|p| p.product_id.clone()))
        .collect();
    assert_eq!(skus, vec!["C", "B", "A"]);
    assert_eq!(events[0].visitor_id.as_deref(), Some("visitor-1"));

    let paged = store
        .query_by_user(&EventQuery::for_user(&user).page(1, Some(1)))
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].id, events[1].id);
}

#[tokio::test]
#[ignore = "requires ClickHouse"]
async fn test_reports_over_clickhouse() {
    let containers = TestContainers::start().await;
    let store = Arc::new(ClickHouseEventStore::new(client(&containers).await));
    let user = tenant();

    for (sku, minutes_ago) in [("A", 3), ("B", 2), ("A", 1)] {
        store.append(product_view(&user, sku, minutes_ago)).await.unwrap();
    }

    let reports = ReportEngine::new(store);
    let rows = reports
        .most_viewed_products(&user, 10, DateRange::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].product_id, "A");
    assert_eq!(rows[0].view_count, 2);

    let sessions = reports.sessions(&user, None, DateRange::default()).await.unwrap();
    assert_eq!(sessions.count, 1);
}

#[tokio::test]
#[ignore = "requires ClickHouse"]
async fn test_profile_put_is_conditional() {
    let containers = TestContainers::start().await;
    let store = ClickHouseProfileStore::new(client(&containers).await);
    let key = ProfileKey::new(tenant(), "visitor-1");

    let profile = CustomerProfile::new(&key, Utc::now());
    assert_eq!(store.put(&profile).await.unwrap(), 1);

    // Still holds version 0 while the store is at 1.
    let err = store.put(&profile).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));

    let mut current = store.get(&key).await.unwrap().unwrap();
    assert_eq!(current.version, 1);
    current.analytics.product_views = 4;
    assert_eq!(store.put(&current).await.unwrap(), 2);

    let listed = store.list_by_user(&key.user_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].analytics.product_views, 4);
}

/// Two writers in one process racing on the same version: exactly one lands
#[tokio::test]
#[ignore = "requires ClickHouse"]
async fn test_concurrent_profile_puts_one_wins() {
    let containers = TestContainers::start().await;
    let store = ClickHouseProfileStore::new(client(&containers).await);
    let key = ProfileKey::new(tenant(), "visitor-1");

    let profile = CustomerProfile::new(&key, Utc::now());
    let (first, second) = tokio::join!(store.put(&profile), store.put(&profile));

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(Error::Conflict { .. }))));
    assert_eq!(store.get(&key).await.unwrap().unwrap().version, 1);
}
