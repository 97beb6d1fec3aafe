//! Profile rebuild from the event log.
//!
//! Replays a tenant's stored events in time order into fresh profiles and
//! writes them over the current ones. Used after failed folds or when the
//! fold rules change.

use analytics_core::{CustomerProfile, Error, Event, ProfileKey, Result};
use event_store::{EventQuery, EventStore, ProfileStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::enrichment::DeviceEnricher;

/// Outcome of a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildSummary {
    pub profiles: usize,
    pub events: usize,
}

/// Recomputes profiles from stored events.
///
/// Callers should drain the aggregator first. Events folded live while a
/// rebuild runs may be overwritten and need another rebuild.
pub struct ProfileRebuilder {
    events: Arc<dyn EventStore>,
    profiles: Arc<dyn ProfileStore>,
    enricher: DeviceEnricher,
    max_conflict_retries: u32,
}

impl ProfileRebuilder {
    pub fn new(
        events: Arc<dyn EventStore>,
        profiles: Arc<dyn ProfileStore>,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            events,
            profiles,
            enricher: DeviceEnricher::new(),
            max_conflict_retries,
        }
    }

    /// Rebuild every profile of one tenant.
    pub async fn rebuild(&self, user_id: &str) -> Result<RebuildSummary> {
        let mut events = self.events.query_by_user(&EventQuery::for_user(user_id)).await?;
        // Stored newest first.
        events.reverse();

        let mut folded: BTreeMap<ProfileKey, CustomerProfile> = BTreeMap::new();
        let mut replayed = 0;
        for event in &events {
            let Some(key) = ProfileKey::for_event(event) else {
                continue;
            };
            let profile = folded
                .entry(key)
                .or_insert_with_key(|key| CustomerProfile::new(key, event.created_at));
            self.replay_one(profile, event);
            replayed += 1;
        }

        let summary = RebuildSummary {
            profiles: folded.len(),
            events: replayed,
        };
        for rebuilt in folded.into_values() {
            self.store(rebuilt).await?;
        }

        info!(
            user_id = user_id,
            profiles = summary.profiles,
            events = summary.events,
            "Profiles rebuilt from event log"
        );
        Ok(summary)
    }

    fn replay_one(&self, profile: &mut CustomerProfile, event: &Event) {
        profile.apply(event, event.created_at);
        if let Some(device) = event
            .user_agent
            .as_deref()
            .and_then(|ua| self.enricher.device(ua))
        {
            profile.last_device = Some(device);
        }
    }

    /// Overwrite the stored profile, keeping its preferences.
    async fn store(&self, rebuilt: CustomerProfile) -> Result<u64> {
        let key = rebuilt.key();
        let mut conflicts = 0;

        loop {
            let mut next = rebuilt.clone();
            match self.profiles.get(&key).await? {
                Some(current) => {
                    next.version = current.version;
                    next.preferences = current.preferences;
                    next.created_at = current.created_at.min(next.created_at);
                }
                None => next.version = 0,
            }

            match self.profiles.put(&next).await {
                Ok(version) => {
                    debug!(key = %key, version = version, "Rebuilt profile stored");
                    return Ok(version);
                }
                Err(Error::Conflict { .. }) if conflicts < self.max_conflict_retries => {
                    conflicts += 1;
                    warn!(key = %key, attempt = conflicts, "Profile changed during rebuild, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
