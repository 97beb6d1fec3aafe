//! Customer profile aggregator.
//!
//! Events are routed to one of N shard tasks by a stable hash of their
//! profile key, so each profile has a single writer and folds apply in
//! arrival order. Writes are still conditional on the profile version;
//! a conflict re-reads the profile and re-applies the event.

use analytics_core::{CustomerProfile, Error, Event, ProfileKey, Result};
use chrono::{DateTime, Utc};
use event_store::ProfileStore;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::enrichment::DeviceEnricher;

/// Aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Number of single-writer shard tasks
    #[serde(default = "default_shards")]
    pub shards: usize,
    /// Maximum retries for profile store failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff between retries, multiplied by the attempt number
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Re-reads allowed when a conditional write loses a race
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

fn default_shards() -> usize {
    8
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_max_conflict_retries() -> u32 {
    5
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

impl AggregatorConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Stable shard index for a profile key.
pub fn shard_for(key: &ProfileKey, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

enum Command {
    Fold(Box<Event>),
    /// Acknowledged once every earlier command on the shard is done.
    Barrier(oneshot::Sender<()>),
}

/// Folds events into profiles.
pub struct Aggregator {
    profiles: Arc<dyn ProfileStore>,
    enricher: DeviceEnricher,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(profiles: Arc<dyn ProfileStore>, config: AggregatorConfig) -> Self {
        Self {
            profiles,
            enricher: DeviceEnricher::new(),
            config,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Start the shard tasks.
    pub fn spawn(self) -> (AggregatorHandle, Vec<JoinHandle<()>>) {
        let shards = self.config.shards.max(1);
        let aggregator = Arc::new(self);

        let mut senders = Vec::with_capacity(shards);
        let mut tasks = Vec::with_capacity(shards);
        for index in 0..shards {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            tasks.push(tokio::spawn(aggregator.clone().run_shard(index, rx)));
        }

        info!(shards = shards, "Profile aggregator started");
        (
            AggregatorHandle {
                shards: Arc::new(senders),
            },
            tasks,
        )
    }

    async fn run_shard(self: Arc<Self>, index: usize, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Fold(event) => {
                    metrics().aggregator.queue_depth.dec();
                    self.fold_with_retry(&event).await;
                }
                Command::Barrier(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!(shard = index, "Aggregator shard stopped");
    }

    /// Fold one event at `now`, re-reading on version conflicts.
    ///
    /// Returns the stored profile version.
    pub async fn fold_at(&self, event: &Event, now: DateTime<Utc>) -> Result<u64> {
        let key = ProfileKey::for_event(event)
            .ok_or_else(|| Error::aggregation(format!("event {} has no visitor identity", event.id)))?;
        let device = event
            .user_agent
            .as_deref()
            .and_then(|ua| self.enricher.device(ua));

        let mut conflicts = 0;
        loop {
            let mut profile = match self.profiles.get(&key).await? {
                Some(profile) => profile,
                None => CustomerProfile::new(&key, now),
            };
            profile.apply(event, now);
            if device.is_some() {
                profile.last_device = device.clone();
            }

            match self.profiles.put(&profile).await {
                Ok(version) => return Ok(version),
                Err(Error::Conflict { .. }) if conflicts < self.config.max_conflict_retries => {
                    conflicts += 1;
                    metrics().aggregator.conflicts.inc();
                    debug!(key = %key, attempt = conflicts, "Profile version conflict, re-reading");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fold with linear backoff on transient failures.
    ///
    /// Never fails: exhausted retries are logged with the event id so the
    /// fold can be replayed from the event store.
    pub async fn fold_with_retry(&self, event: &Event) {
        let start = Instant::now();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff() * attempt;
                warn!(
                    event_id = %event.id,
                    attempt = attempt,
                    backoff_ms = %backoff.as_millis(),
                    "Retrying profile fold"
                );
                metrics().aggregator.retried.inc();
                tokio::time::sleep(backoff).await;
            }

            match self.fold_at(event, Utc::now()).await {
                Ok(version) => {
                    metrics().aggregator.applied.inc();
                    metrics().aggregator.latency.record(start.elapsed());
                    debug!(event_id = %event.id, version = version, "Folded event into profile");
                    return;
                }
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        metrics().aggregator.failed.inc();
        error!(
            event_id = %event.id,
            user_id = %event.user_id,
            visitor_id = ?event.visitor_key(),
            error = %last_error.map(|e| e.to_string()).unwrap_or_default(),
            "[AGG_001] Profile fold failed, replay required"
        );
    }
}

/// Cheap, cloneable entry point into the running aggregator.
#[derive(Clone)]
pub struct AggregatorHandle {
    shards: Arc<Vec<mpsc::UnboundedSender<Command>>>,
}

impl AggregatorHandle {
    /// Queue an event for folding without waiting.
    ///
    /// Returns `false` when the event has no visitor identity or the
    /// aggregator has stopped.
    pub fn submit(&self, event: Event) -> bool {
        let Some(key) = ProfileKey::for_event(&event) else {
            metrics().aggregator.skipped.inc();
            debug!(event_id = %event.id, "No visitor identity, fold skipped");
            return false;
        };

        let shard = shard_for(&key, self.shards.len());
        metrics().aggregator.queue_depth.inc();
        if self.shards[shard].send(Command::Fold(Box::new(event))).is_err() {
            metrics().aggregator.queue_depth.dec();
            warn!(shard = shard, "Aggregator shard stopped, fold dropped");
            return false;
        }
        true
    }

    /// Wait until every fold queued before this call has finished.
    pub async fn drain(&self) {
        let mut pending = Vec::with_capacity(self.shards.len());
        for shard in self.shards.iter() {
            let (done, wait) = oneshot::channel();
            if shard.send(Command::Barrier(done)).is_ok() {
                pending.push(wait);
            }
        }
        for wait in pending {
            let _ = wait.await;
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
