//! Reporting engine: tenant-scoped, read-only reports built from
//! aggregation pipelines.

use analytics_core::events::fields;
use analytics_core::{
    Accumulator, EventName, Expr, Filter, Group, Pipeline, Result, SortKey,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::query::DateRange;
use crate::store::EventStore;

/// Product ranked by view count.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MostViewedProduct {
    #[serde(rename = "_id")]
    pub product_id: String,
    pub view_count: u64,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub last_viewed: Option<DateTime<Utc>>,
}

/// Product ranked by add-to-cart count.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MostAddedProduct {
    #[serde(rename = "_id")]
    pub product_id: String,
    pub add_count: u64,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub last_added: Option<DateTime<Utc>>,
}

/// Completed order totals. All zeros when there are no orders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatistics {
    pub total_orders: u64,
    pub total_amount: f64,
    pub average_order_amount: f64,
    pub min_order_amount: f64,
    pub max_order_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCount {
    pub event_name: String,
    pub count: u64,
}

/// Event counts for one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    #[serde(rename = "_id")]
    pub date: String,
    pub events: Vec<EventCount>,
    pub total_events: u64,
}

/// Time-on-page statistics for one path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDurationStat {
    #[serde(rename = "_id")]
    pub path: String,
    pub average_duration: f64,
    pub visits: u64,
    pub min_duration: f64,
    pub max_duration: f64,
    pub last_visit: Option<DateTime<Utc>>,
}

/// One duration-bearing page view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDurationRecord {
    pub session_id: Option<String>,
    pub duration: f64,
    pub referrer: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAggregations {
    pub total_events: u64,
    pub event_distribution: BTreeMap<String, u64>,
    pub daily_distribution: BTreeMap<String, u64>,
    pub unique_sessions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCount {
    pub count: u64,
}

fn str_at(row: &Value, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(String::from)
}

fn f64_at(row: &Value, key: &str) -> Option<f64> {
    row.get(key).and_then(Value::as_f64)
}

fn u64_at(row: &Value, key: &str) -> u64 {
    row.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn time_at(row: &Value, key: &str) -> Option<DateTime<Utc>> {
    row.get(key)
        .and_then(Value::as_i64)
        .and_then(DateTime::from_timestamp_millis)
}

/// Tenant filter plus any extra conditions.
fn scoped(user_id: &str, api_key: Option<&str>, range: &DateRange, extra: Vec<Filter>) -> Filter {
    let mut filters = vec![Filter::eq(fields::USER_ID, user_id)];
    if let Some(key) = api_key {
        filters.push(Filter::eq(fields::API_KEY, key));
    }
    filters.extend(extra);
    filters.extend(range.filters());
    Filter::And(filters)
}

/// Read-only reports over an [`EventStore`].
#[derive(Clone)]
pub struct ReportEngine {
    store: Arc<dyn EventStore>,
}

impl ReportEngine {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    async fn run(&self, report: &'static str, pipeline: Pipeline) -> Result<Vec<Value>> {
        let start = Instant::now();
        let rows = self.store.aggregate(&pipeline).await?;

        let elapsed = start.elapsed();
        let metrics = &telemetry::metrics().store;
        metrics.queries.inc();
        metrics.query_latency.record(elapsed);

        debug!(
            report = report,
            rows = rows.len(),
            latency_ms = %elapsed.as_millis(),
            "Report executed"
        );
        Ok(rows)
    }

    /// Group one product event kind by product, most frequent first.
    fn product_ranking(
        user_id: &str,
        event: EventName,
        count_field: &str,
        last_field: &str,
        limit: usize,
        range: &DateRange,
    ) -> Pipeline {
        Pipeline::new()
            .matching(scoped(
                user_id,
                None,
                range,
                vec![Filter::eq(fields::EVENT_NAME, event.as_str())],
            ))
            .group(
                Group::by(Expr::field(fields::PRODUCT_ID))
                    .with(count_field, Accumulator::Count)
                    .with("name", Accumulator::First(Expr::field(fields::PRODUCT_NAME)))
                    .with("price", Accumulator::First(Expr::field(fields::PRODUCT_PRICE)))
                    .with(last_field, Accumulator::Max(Expr::field(fields::CREATED_AT))),
            )
            .sort(vec![SortKey::desc(count_field), SortKey::asc("_id")])
            .limit(limit)
    }

    pub async fn most_viewed_products(
        &self,
        user_id: &str,
        limit: usize,
        range: DateRange,
    ) -> Result<Vec<MostViewedProduct>> {
        let pipeline = Self::product_ranking(
            user_id,
            EventName::ProductViewed,
            "viewCount",
            "lastViewed",
            limit,
            &range,
        );
        let rows = self.run("most_viewed_products", pipeline).await?;

        Ok(rows
            .iter()
            .map(|row| MostViewedProduct {
                product_id: str_at(row, "_id").unwrap_or_default(),
                view_count: u64_at(row, "viewCount"),
                name: str_at(row, "name"),
                price: f64_at(row, "price"),
                last_viewed: time_at(row, "lastViewed"),
            })
            .collect())
    }

    pub async fn most_added_to_cart(
        &self,
        user_id: &str,
        limit: usize,
        range: DateRange,
    ) -> Result<Vec<MostAddedProduct>> {
        let pipeline = Self::product_ranking(
            user_id,
            EventName::AddToCart,
            "addCount",
            "lastAdded",
            limit,
            &range,
        );
        let rows = self.run("most_added_to_cart", pipeline).await?;

        Ok(rows
            .iter()
            .map(|row| MostAddedProduct {
                product_id: str_at(row, "_id").unwrap_or_default(),
                add_count: u64_at(row, "addCount"),
                name: str_at(row, "name"),
                price: f64_at(row, "price"),
                last_added: time_at(row, "lastAdded"),
            })
            .collect())
    }

    pub async fn order_statistics(&self, user_id: &str, range: DateRange) -> Result<OrderStatistics> {
        let total = || Expr::field(fields::ORDER_TOTAL);
        let pipeline = Pipeline::new()
            .matching(scoped(
                user_id,
                None,
                &range,
                vec![Filter::eq(fields::EVENT_NAME, EventName::CheckoutCompleted.as_str())],
            ))
            .group(
                Group::all()
                    .with("totalOrders", Accumulator::Count)
                    .with("totalAmount", Accumulator::Sum(total()))
                    .with("averageOrderAmount", Accumulator::Avg(total()))
                    .with("minOrderAmount", Accumulator::Min(total()))
                    .with("maxOrderAmount", Accumulator::Max(total())),
            );

        let rows = self.run("order_statistics", pipeline).await?;
        Ok(rows
            .first()
            .map(|row| OrderStatistics {
                total_orders: u64_at(row, "totalOrders"),
                total_amount: f64_at(row, "totalAmount").unwrap_or(0.0),
                average_order_amount: f64_at(row, "averageOrderAmount").unwrap_or(0.0),
                min_order_amount: f64_at(row, "minOrderAmount").unwrap_or(0.0),
                max_order_amount: f64_at(row, "maxOrderAmount").unwrap_or(0.0),
            })
            .unwrap_or_default())
    }

    /// Daily event counts by name over the last `days` days, oldest day first.
    pub async fn time_based(
        &self,
        user_id: &str,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailyActivity>> {
        let window = DateRange::last_days(days, now)?;
        let pipeline = Pipeline::new()
            .matching(scoped(user_id, None, &window, Vec::new()))
            .group(
                Group::by(Expr::object([
                    ("date", Expr::day(fields::CREATED_AT)),
                    ("eventName", Expr::field(fields::EVENT_NAME)),
                ]))
                .with("count", Accumulator::Count),
            )
            .group(
                Group::by(Expr::field("_id.date"))
                    .with(
                        "events",
                        Accumulator::Push(Expr::object([
                            ("eventName", Expr::field("_id.eventName")),
                            ("count", Expr::field("count")),
                        ])),
                    )
                    .with("totalEvents", Accumulator::Sum(Expr::field("count"))),
            )
            .sort(vec![SortKey::asc("_id")]);

        let rows = self.run("time_based", pipeline).await?;
        Ok(rows
            .iter()
            .map(|row| DailyActivity {
                date: str_at(row, "_id").unwrap_or_default(),
                events: row
                    .get("events")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .map(|item| EventCount {
                                event_name: str_at(item, "eventName").unwrap_or_default(),
                                count: u64_at(item, "count"),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                total_events: u64_at(row, "totalEvents"),
            })
            .collect())
    }

    fn duration_filters(path: Option<&str>) -> Vec<Filter> {
        let mut filters = vec![
            Filter::eq(fields::EVENT_NAME, EventName::PageView.as_str()),
            Filter::exists(fields::PAGE_DURATION),
        ];
        if let Some(path) = path {
            filters.push(Filter::eq(fields::PAGE_PATH, path));
        }
        filters
    }

    /// Per-path time-on-page statistics, most visited first.
    pub async fn page_duration(
        &self,
        user_id: &str,
        path: Option<&str>,
        range: DateRange,
    ) -> Result<Vec<PageDurationStat>> {
        let duration = || Expr::field(fields::PAGE_DURATION);
        let pipeline = Pipeline::new()
            .matching(scoped(user_id, None, &range, Self::duration_filters(path)))
            .group(
                Group::by(Expr::field(fields::PAGE_PATH))
                    .with("averageDuration", Accumulator::Avg(duration()))
                    .with("visits", Accumulator::Count)
                    .with("minDuration", Accumulator::Min(duration()))
                    .with("maxDuration", Accumulator::Max(duration()))
                    .with("lastVisit", Accumulator::Max(Expr::field(fields::CREATED_AT))),
            )
            .sort(vec![SortKey::desc("visits"), SortKey::asc("_id")]);

        let rows = self.run("page_duration", pipeline).await?;
        Ok(rows
            .iter()
            .map(|row| PageDurationStat {
                path: str_at(row, "_id").unwrap_or_default(),
                average_duration: f64_at(row, "averageDuration").unwrap_or(0.0),
                visits: u64_at(row, "visits"),
                min_duration: f64_at(row, "minDuration").unwrap_or(0.0),
                max_duration: f64_at(row, "maxDuration").unwrap_or(0.0),
                last_visit: time_at(row, "lastVisit"),
            })
            .collect())
    }

    /// Individual duration records for one path, newest first.
    pub async fn detailed_page_duration(
        &self,
        user_id: &str,
        path: &str,
        limit: usize,
    ) -> Result<Vec<PageDurationRecord>> {
        let pipeline = Pipeline::new()
            .matching(scoped(
                user_id,
                None,
                &DateRange::default(),
                Self::duration_filters(Some(path)),
            ))
            .sort(vec![SortKey::desc(fields::CREATED_AT)])
            .limit(limit);

        let rows = self.run("detailed_page_duration", pipeline).await?;
        Ok(rows
            .iter()
            .map(|doc| {
                let data = doc.get("eventData").unwrap_or(&Value::Null);
                PageDurationRecord {
                    session_id: str_at(doc, fields::SESSION_ID),
                    duration: f64_at(data, "duration").unwrap_or(0.0),
                    referrer: str_at(data, "referrer").filter(|r| !r.is_empty()),
                    created_at: time_at(doc, fields::CREATED_AT),
                }
            })
            .collect())
    }

    /// Event totals with per-name and per-day breakdowns.
    pub async fn aggregations(
        &self,
        user_id: &str,
        api_key: Option<&str>,
        range: DateRange,
    ) -> Result<EventAggregations> {
        let docs = self
            .run(
                "aggregations",
                Pipeline::new().matching(scoped(user_id, api_key, &range, Vec::new())),
            )
            .await?;

        let counts = |key: Expr| -> BTreeMap<String, u64> {
            Pipeline::new()
                .group(Group::by(key).with("count", Accumulator::Count))
                .run(docs.iter().cloned())
                .iter()
                .filter_map(|row| str_at(row, "_id").map(|id| (id, u64_at(row, "count"))))
                .collect()
        };

        let event_distribution = counts(Expr::field(fields::EVENT_NAME));
        let daily_distribution = counts(Expr::day(fields::CREATED_AT));
        let unique_sessions = counts(Expr::field(fields::SESSION_ID))
            .keys()
            .filter(|s| !s.is_empty())
            .count() as u64;

        Ok(EventAggregations {
            total_events: docs.len() as u64,
            event_distribution,
            daily_distribution,
            unique_sessions,
        })
    }

    /// Distinct non-empty session IDs in the window.
    pub async fn sessions(
        &self,
        user_id: &str,
        api_key: Option<&str>,
        range: DateRange,
    ) -> Result<SessionCount> {
        let pipeline = Pipeline::new()
            .matching(scoped(
                user_id,
                api_key,
                &range,
                vec![Filter::exists(fields::SESSION_ID)],
            ))
            .group(Group::by(Expr::field(fields::SESSION_ID)));

        let rows = self.run("sessions", pipeline).await?;
        let count = rows
            .iter()
            .filter(|row| str_at(row, "_id").is_some_and(|s| !s.is_empty()))
            .count() as u64;
        Ok(SessionCount { count })
    }
}
