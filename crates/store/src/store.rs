//! Storage traits implemented by every backend.

use analytics_core::{CustomerProfile, Event, Pipeline, ProfileKey, Result};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::query::EventQuery;

/// Append-only event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event. Rejects events without a tenant, key or name.
    async fn append(&self, event: Event) -> Result<Uuid>;

    /// Tenant events ordered by `createdAt`, newest first.
    async fn query_by_user(&self, query: &EventQuery) -> Result<Vec<Event>>;

    /// Run an aggregation pipeline over event documents.
    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<()>;
}

/// Durable customer profiles with versioned writes.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, key: &ProfileKey) -> Result<Option<CustomerProfile>>;

    /// Conditional write.
    ///
    /// Succeeds only when the stored version equals `profile.version`
    /// (an absent profile counts as version 0), then stores it as
    /// `version + 1` and returns the new version. Fails with
    /// `Error::Conflict` otherwise.
    async fn put(&self, profile: &CustomerProfile) -> Result<u64>;

    /// Every profile of one tenant.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<CustomerProfile>>;

    async fn ping(&self) -> Result<()>;
}
