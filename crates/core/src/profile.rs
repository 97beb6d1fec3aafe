//! Customer profiles: per-visitor rolling statistics folded from events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::{Event, EventData};
use crate::limits::RECENCY_LIST_CAPACITY;

/// Address of a profile: tenant plus end visitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileKey {
    pub user_id: String,
    pub visitor_id: String,
}

impl ProfileKey {
    pub fn new(user_id: impl Into<String>, visitor_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            visitor_id: visitor_id.into(),
        }
    }

    /// Key of the profile an event folds into, if the event names a visitor.
    pub fn for_event(event: &Event) -> Option<Self> {
        event
            .visitor_key()
            .map(|visitor| Self::new(event.user_id.clone(), visitor))
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.visitor_id)
    }
}

/// Most-recent-first list capped at [`RECENCY_LIST_CAPACITY`] entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecencyList(Vec<String>);

impl RecencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends an entry and drops whatever falls past the capacity.
    pub fn push_recent(&mut self, item: impl Into<String>) {
        self.0.insert(0, item.into());
        self.0.truncate(RECENCY_LIST_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Last known network location of a visitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastLocation {
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Device parsed from the visitor's latest user agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub browser: String,
    pub os: String,
    /// desktop, mobile, bot, other or unknown
    pub category: String,
}

/// Rolling counters. All but `average_order_value` only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAnalytics {
    pub total_visits: u64,
    pub total_orders: u64,
    pub total_spent: f64,
    pub average_order_value: f64,
    pub product_views: u64,
    pub add_to_cart_count: u64,
    pub last_order_date: Option<DateTime<Utc>>,
}

/// Tenant-managed preferences. Never written by the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub favorite_categories: Vec<String>,
    #[serde(default)]
    pub newsletter: bool,
}

/// Durable per-visitor aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub user_id: String,
    pub visitor_id: String,
    pub last_visit: Option<DateTime<Utc>>,
    pub last_location: Option<LastLocation>,
    #[serde(default)]
    pub last_device: Option<DeviceSummary>,
    pub analytics: ProfileAnalytics,
    pub recently_viewed_products: RecencyList,
    pub search_history: RecencyList,
    #[serde(default)]
    pub preferences: Preferences,
    /// Revision used for conditional writes; 0 until first stored.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerProfile {
    /// Empty profile for a visitor seen for the first time.
    pub fn new(key: &ProfileKey, now: DateTime<Utc>) -> Self {
        Self {
            user_id: key.user_id.clone(),
            visitor_id: key.visitor_id.clone(),
            last_visit: None,
            last_location: None,
            last_device: None,
            analytics: ProfileAnalytics::default(),
            recently_viewed_products: RecencyList::new(),
            search_history: RecencyList::new(),
            preferences: Preferences::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ProfileKey {
        ProfileKey::new(self.user_id.clone(), self.visitor_id.clone())
    }

    /// Fold one event into the profile.
    ///
    /// `now` is the fold time: wall clock for live folds, the event's
    /// `createdAt` when replaying.
    pub fn apply(&mut self, event: &Event, now: DateTime<Utc>) {
        let stats = &mut self.analytics;

        match &event.event_data {
            EventData::PageView(_) => {
                stats.total_visits += 1;
            }
            EventData::ProductViewed(product) => {
                stats.product_views += 1;
                if !product.product_id.is_empty() {
                    self.recently_viewed_products
                        .push_recent(product.product_id.as_str());
                }
            }
            EventData::AddToCart(_) => {
                stats.add_to_cart_count += 1;
            }
            EventData::CheckoutCompleted(checkout) => {
                stats.total_orders += 1;
                stats.total_spent += checkout.total.unwrap_or(0.0);
                // Recomputed from totals so repeated folds never drift.
                stats.average_order_value = stats.total_spent / stats.total_orders as f64;
                stats.last_order_date = Some(now);
            }
            EventData::Search(search) => {
                if let Some(query) = search.query.as_deref().filter(|q| !q.trim().is_empty()) {
                    self.search_history.push_recent(query);
                }
            }
            _ => {}
        }

        self.last_visit = Some(now);
        if let Some(ip) = event.ip_address.as_ref() {
            let location = self.last_location.get_or_insert_with(LastLocation::default);
            location.ip = Some(ip.clone());
        }
        self.updated_at = now;
    }
}
