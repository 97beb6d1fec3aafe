//! In-process counters for the gateway, the stores and the aggregator.
//!
//! Everything is lock-free atomics behind one global [`Metrics`]; the
//! scheduler logs a [`MetricsSnapshot`] periodically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Level that moves both ways and never drops below zero.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Running latency summary in microseconds.
#[derive(Debug, Default)]
pub struct Latency {
    count: AtomicU64,
    total_us: AtomicU64,
    max_us: AtomicU64,
}

impl Latency {
    pub fn record(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_us.fetch_add(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.total_us.load(Ordering::Relaxed) as f64 / n as f64 / 1000.0,
        }
    }

    pub fn max_ms(&self) -> f64 {
        self.max_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    fn summary(&self) -> LatencySummary {
        LatencySummary {
            count: self.count(),
            mean_ms: self.mean_ms(),
            max_ms: self.max_ms(),
        }
    }
}

/// `POST /analytics/track` and the identity lookup behind it.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub received: Counter,
    pub accepted: Counter,
    pub rejected: Counter,
    pub identity_lookups: Counter,
    pub identity_cache_hits: Counter,
    pub latency: Latency,
}

#[derive(Debug, Default)]
pub struct StoreMetrics {
    pub appends: Counter,
    pub errors: Counter,
    pub queries: Counter,
    pub append_latency: Latency,
    pub query_latency: Latency,
}

#[derive(Debug, Default)]
pub struct AggregatorMetrics {
    pub applied: Counter,
    pub retried: Counter,
    pub failed: Counter,
    /// Events without a visitor identity
    pub skipped: Counter,
    pub conflicts: Counter,
    /// Events handed to a shard and not yet folded
    pub queue_depth: Gauge,
    pub latency: Latency,
}

#[derive(Debug, Default)]
pub struct Metrics {
    pub gateway: GatewayMetrics,
    pub store: StoreMetrics,
    pub aggregator: AggregatorMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub count: u64,
    pub mean_ms: f64,
    pub max_ms: f64,
}

/// Point-in-time copy of every metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub events_received: u64,
    pub events_accepted: u64,
    pub events_rejected: u64,
    pub identity_cache_hits: u64,
    pub store_errors: u64,
    pub queries: u64,
    pub folds_applied: u64,
    pub folds_failed: u64,
    pub fold_conflicts: u64,
    pub queue_depth: u64,
    pub ingest: LatencySummary,
    pub append: LatencySummary,
    pub fold: LatencySummary,
    pub query: LatencySummary,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        let Self {
            gateway,
            store,
            aggregator,
        } = self;

        MetricsSnapshot {
            taken_at: Utc::now(),
            events_received: gateway.received.get(),
            events_accepted: gateway.accepted.get(),
            events_rejected: gateway.rejected.get(),
            identity_cache_hits: gateway.identity_cache_hits.get(),
            store_errors: store.errors.get(),
            queries: store.queries.get(),
            folds_applied: aggregator.applied.get(),
            folds_failed: aggregator.failed.get(),
            fold_conflicts: aggregator.conflicts.get(),
            queue_depth: aggregator.queue_depth.get(),
            ingest: gateway.latency.summary(),
            append: store.append_latency.summary(),
            fold: aggregator.latency.summary(),
            query: store.query_latency.summary(),
        }
    }
}

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::default);

/// Process-wide metrics.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
