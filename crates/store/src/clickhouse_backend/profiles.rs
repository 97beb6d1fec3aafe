//! ClickHouse-backed profile store.

use analytics_core::{CustomerProfile, Error, ProfileKey, Result};
use async_trait::async_trait;
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::client::{db_error, ClickHouseClient};
use crate::store::ProfileStore;

const WRITE_STRIPES: usize = 64;

/// One profile revision. The profile itself is stored as JSON.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ProfileRow {
    pub user_id: String,
    pub visitor_id: String,
    pub version: u64,
    pub body: String,
    pub updated_at: i64, // DateTime64(3) as milliseconds
}

impl ProfileRow {
    fn into_profile(self) -> Result<CustomerProfile> {
        let mut profile: CustomerProfile = serde_json::from_str(&self.body)?;
        profile.version = self.version;
        Ok(profile)
    }
}

/// Profile store over the `profiles` table.
///
/// ClickHouse has no conditional insert, so the version check and the
/// insert run under a per-key stripe lock. This serializes writers within
/// one process only: two processes writing the same key can both pass the
/// check, and `FINAL` then keeps one of the two revisions. Deployments run
/// a single aggregator per tenant shard.
#[derive(Clone)]
pub struct ClickHouseProfileStore {
    client: ClickHouseClient,
    stripes: Arc<Vec<Mutex<()>>>,
}

impl ClickHouseProfileStore {
    pub fn new(client: ClickHouseClient) -> Self {
        let stripes = (0..WRITE_STRIPES).map(|_| Mutex::new(())).collect();
        Self {
            client,
            stripes: Arc::new(stripes),
        }
    }

    fn stripe(&self, key: &ProfileKey) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % self.stripes.len()]
    }
}

#[async_trait]
impl ProfileStore for ClickHouseProfileStore {
    async fn get(&self, key: &ProfileKey) -> Result<Option<CustomerProfile>> {
        let row: Option<ProfileRow> = self
            .client
            .inner()
            .query(
                "SELECT ?fields FROM profiles FINAL WHERE user_id = ? AND visitor_id = ? \
                 ORDER BY version DESC LIMIT 1",
            )
            .bind(&key.user_id)
            .bind(&key.visitor_id)
            .fetch_optional()
            .await
            .map_err(db_error("get profile"))?;

        row.map(ProfileRow::into_profile).transpose()
    }

    async fn put(&self, profile: &CustomerProfile) -> Result<u64> {
        let key = profile.key();
        // Async mutex held across the read and the insert. It is the only
        // lock in the stores that spans I/O, and it orders writers of this
        // process only.
        let _guard = self.stripe(&key).lock().await;

        let stored = self.get(&key).await?.map(|p| p.version).unwrap_or(0);
        if stored != profile.version {
            return Err(Error::Conflict {
                key: key.to_string(),
                expected: Some(profile.version),
            });
        }

        let version = stored + 1;
        let mut next = profile.clone();
        next.version = version;
        let row = ProfileRow {
            user_id: next.user_id.clone(),
            visitor_id: next.visitor_id.clone(),
            version,
            body: serde_json::to_string(&next)?,
            updated_at: next.updated_at.timestamp_millis(),
        };

        let mut insert = self
            .client
            .inner()
            .insert("profiles")
            .map_err(db_error("insert profile"))?;
        insert.write(&row).await.map_err(db_error("write profile"))?;
        insert.end().await.map_err(db_error("end profile insert"))?;

        Ok(version)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<CustomerProfile>> {
        let rows: Vec<ProfileRow> = self
            .client
            .inner()
            .query("SELECT ?fields FROM profiles FINAL WHERE user_id = ? ORDER BY visitor_id")
            .bind(user_id)
            .fetch_all()
            .await
            .map_err(db_error("list profiles"))?;

        rows.into_iter().map(ProfileRow::into_profile).collect()
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await
    }
}
