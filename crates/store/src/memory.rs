//! In-memory backends for development and tests.

use analytics_core::{CustomerProfile, Error, Event, Pipeline, ProfileKey, Result, ScanHint};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::query::EventQuery;
use crate::store::{EventStore, ProfileStore};

/// Event log held in a vector, in append order.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

/// Whether an event can satisfy the pushed-down part of a pipeline.
pub(crate) fn admits(hint: &ScanHint, event: &Event) -> bool {
    let millis = event.created_at.timestamp_millis();
    hint.user_id.as_ref().map_or(true, |u| &event.user_id == u)
        && hint
            .event_names
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == event.event_name.as_str()))
        && hint.created_from.map_or(true, |from| millis >= from)
        && hint.created_before.map_or(true, |before| millis < before)
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: Event) -> Result<Uuid> {
        event.check_envelope()?;
        let id = event.id;
        self.events.write().push(event);
        Ok(id)
    }

    async fn query_by_user(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let mut matched: Vec<Event> = self
            .events
            .read()
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        // Newest first; append order breaks ties.
        matched.reverse();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let page = matched.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        })
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>> {
        let hint = pipeline.scan_hint();
        let docs: Vec<Value> = self
            .events
            .read()
            .iter()
            .filter(|e| admits(&hint, e))
            .map(Event::to_document)
            .collect();
        Ok(pipeline.run(docs))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Profiles keyed by `(userId, visitorId)`.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<ProfileKey, CustomerProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, key: &ProfileKey) -> Result<Option<CustomerProfile>> {
        Ok(self.profiles.read().get(key).cloned())
    }

    async fn put(&self, profile: &CustomerProfile) -> Result<u64> {
        let key = profile.key();
        let mut profiles = self.profiles.write();

        let stored = profiles.get(&key).map(|p| p.version).unwrap_or(0);
        if stored != profile.version {
            return Err(Error::Conflict {
                key: key.to_string(),
                expected: Some(profile.version),
            });
        }

        let mut next = profile.clone();
        next.version = stored + 1;
        let version = next.version;
        profiles.insert(key, next);
        Ok(version)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<CustomerProfile>> {
        let mut found: Vec<CustomerProfile> = self
            .profiles
            .read()
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.visitor_id.cmp(&b.visitor_id));
        Ok(found)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
