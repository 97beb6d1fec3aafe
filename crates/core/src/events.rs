//! Event type definitions for the analytics engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::classify::classify;
use crate::error::{Error, Result};

/// Document field paths used by the aggregation pipeline.
pub mod fields {
    pub const ID: &str = "id";
    pub const USER_ID: &str = "userId";
    pub const API_KEY: &str = "apiKey";
    pub const EVENT_NAME: &str = "eventName";
    pub const SESSION_ID: &str = "sessionId";
    pub const VISITOR_ID: &str = "visitorId";
    pub const PATH: &str = "path";
    pub const REFERRER: &str = "referrer";
    pub const CREATED_AT: &str = "createdAt";

    pub const PRODUCT_ID: &str = "eventData.productId";
    pub const PRODUCT_NAME: &str = "eventData.name";
    pub const PRODUCT_PRICE: &str = "eventData.price";
    pub const ORDER_TOTAL: &str = "eventData.total";
    pub const PAGE_PATH: &str = "eventData.path";
    pub const PAGE_DURATION: &str = "eventData.duration";
}

/// All tracked event names. Closed allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    PageView,
    Identify,
    ElementClick,
    AddToCart,
    RemoveFromCart,
    ProductViewed,
    CheckoutStarted,
    CheckoutCompleted,
    CheckoutCancelled,
    FormSubmission,
    Login,
    Register,
    AddWishlist,
    RemoveWishlist,
    ForgotPassword,
    Search,
}

impl EventName {
    pub const ALL: [EventName; 16] = [
        Self::PageView,
        Self::Identify,
        Self::ElementClick,
        Self::AddToCart,
        Self::RemoveFromCart,
        Self::ProductViewed,
        Self::CheckoutStarted,
        Self::CheckoutCompleted,
        Self::CheckoutCancelled,
        Self::FormSubmission,
        Self::Login,
        Self::Register,
        Self::AddWishlist,
        Self::RemoveWishlist,
        Self::ForgotPassword,
        Self::Search,
    ];

    /// Returns the canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "PAGE_VIEW",
            Self::Identify => "IDENTIFY",
            Self::ElementClick => "ELEMENT_CLICK",
            Self::AddToCart => "ADD_TO_CART",
            Self::RemoveFromCart => "REMOVE_FROM_CART",
            Self::ProductViewed => "PRODUCT_VIEWED",
            Self::CheckoutStarted => "CHECKOUT_STARTED",
            Self::CheckoutCompleted => "CHECKOUT_COMPLETED",
            Self::CheckoutCancelled => "CHECKOUT_CANCELLED",
            Self::FormSubmission => "FORM_SUBMISSION",
            Self::Login => "LOGIN",
            Self::Register => "REGISTER",
            Self::AddWishlist => "ADD_WISHLIST",
            Self::RemoveWishlist => "REMOVE_WISHLIST",
            Self::ForgotPassword => "FORGOT_PASSWORD",
            Self::Search => "SEARCH",
        }
    }

    /// Parse a caller-supplied name, normalizing case and separators.
    ///
    /// `page_view`, `page-view` and `Page View` all map to `PAGE_VIEW`.
    pub fn parse(raw: &str) -> Result<Self> {
        let canonical: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();

        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == canonical)
            .ok_or_else(|| Error::UnknownEventName(raw.to_string()))
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// PAGE_VIEW payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PageViewData {
    #[validate(length(max = 1000))]
    pub title: String,
    #[validate(length(max = 2048))]
    pub url: String,
    #[validate(length(max = 2048))]
    pub path: String,
    /// Empty for direct visits
    #[validate(length(max = 2048))]
    pub referrer: String,
    /// Seconds spent on the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub duration: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// ELEMENT_CLICK payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ElementClickData {
    /// Element tag name
    #[validate(length(min = 1, max = 64))]
    pub element: String,
    #[validate(length(max = 2048))]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 256))]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000))]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000))]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2048))]
    pub href: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Product payload shared by cart, wishlist and product-view events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductData {
    #[validate(length(min = 1, max = 256))]
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000))]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 256))]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 256))]
    pub variant: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Validates every line item against the product contract.
fn validate_products(products: &Vec<ProductData>) -> std::result::Result<(), ValidationError> {
    for (i, product) in products.iter().enumerate() {
        if let Err(e) = product.validate() {
            let mut err = ValidationError::new("invalid_product");
            err.message = Some(format!("products[{}]: {}", i, e).into());
            return Err(err);
        }
    }
    Ok(())
}

/// CHECKOUT_STARTED / CHECKOUT_COMPLETED / CHECKOUT_CANCELLED payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutData {
    #[validate(length(min = 1, max = 256))]
    pub checkout_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 16))]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_products"))]
    pub products: Option<Vec<ProductData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 64))]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 64))]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000))]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// FORM_SUBMISSION payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmissionData {
    #[validate(length(min = 1, max = 256))]
    pub form_id: String,
    #[validate(length(max = 256))]
    pub form_name: String,
    #[validate(length(max = 2048))]
    pub form_action: String,
    #[validate(length(max = 16))]
    pub form_method: String,
    /// Submitted field values
    pub data: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// SEARCH payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub results_count: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Free-form trait bag (IDENTIFY, LOGIN, REGISTER, FORGOT_PASSWORD).
pub type Traits = Map<String, Value>;

/// Classified event payload, one variant per event name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    PageView(PageViewData),
    Identify(Traits),
    ElementClick(ElementClickData),
    AddToCart(ProductData),
    RemoveFromCart(ProductData),
    ProductViewed(ProductData),
    CheckoutStarted(CheckoutData),
    CheckoutCompleted(CheckoutData),
    CheckoutCancelled(CheckoutData),
    FormSubmission(FormSubmissionData),
    Login(Traits),
    Register(Traits),
    AddWishlist(ProductData),
    RemoveWishlist(ProductData),
    ForgotPassword(Traits),
    Search(SearchData),
}

impl EventData {
    /// The event name this payload was classified under.
    pub fn event_name(&self) -> EventName {
        match self {
            Self::PageView(_) => EventName::PageView,
            Self::Identify(_) => EventName::Identify,
            Self::ElementClick(_) => EventName::ElementClick,
            Self::AddToCart(_) => EventName::AddToCart,
            Self::RemoveFromCart(_) => EventName::RemoveFromCart,
            Self::ProductViewed(_) => EventName::ProductViewed,
            Self::CheckoutStarted(_) => EventName::CheckoutStarted,
            Self::CheckoutCompleted(_) => EventName::CheckoutCompleted,
            Self::CheckoutCancelled(_) => EventName::CheckoutCancelled,
            Self::FormSubmission(_) => EventName::FormSubmission,
            Self::Login(_) => EventName::Login,
            Self::Register(_) => EventName::Register,
            Self::AddWishlist(_) => EventName::AddWishlist,
            Self::RemoveWishlist(_) => EventName::RemoveWishlist,
            Self::ForgotPassword(_) => EventName::ForgotPassword,
            Self::Search(_) => EventName::Search,
        }
    }

    /// Product payload, if this is a product-shaped event.
    pub fn product(&self) -> Option<&ProductData> {
        match self {
            Self::AddToCart(p)
            | Self::RemoveFromCart(p)
            | Self::ProductViewed(p)
            | Self::AddWishlist(p)
            | Self::RemoveWishlist(p) => Some(p),
            _ => None,
        }
    }

    /// Serializes the payload back to a JSON object.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Object(Map::new()))
    }
}

/// A single stored analytics event. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "EventRecord")]
pub struct Event {
    /// Server-assigned event ID
    pub id: Uuid,
    /// API key the event was ingested with
    pub api_key: String,
    /// Tenant that owns the widget
    pub user_id: String,
    pub event_name: EventName,
    pub event_data: EventData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// End-visitor identity used for profile aggregation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
}

/// Wire form of a stored event with an unclassified payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Uuid,
    pub api_key: String,
    pub user_id: String,
    pub event_name: EventName,
    pub event_data: Value,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EventRecord> for Event {
    type Error = Error;

    fn try_from(record: EventRecord) -> Result<Self> {
        let event_data = classify(record.event_name, record.event_data)?;
        Ok(Self {
            id: record.id,
            api_key: record.api_key,
            user_id: record.user_id,
            event_name: record.event_name,
            event_data,
            session_id: record.session_id,
            visitor_id: record.visitor_id,
            user_agent: record.user_agent,
            ip_address: record.ip_address,
            referrer: record.referrer,
            path: record.path,
            metadata: record.metadata,
            created_at: record.created_at,
        })
    }
}

impl Event {
    /// Creates a new event with a generated ID.
    pub fn new(
        api_key: impl Into<String>,
        user_id: impl Into<String>,
        event_data: EventData,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            api_key: api_key.into(),
            user_id: user_id.into(),
            event_name: event_data.event_name(),
            event_data,
            session_id: None,
            visitor_id: None,
            user_agent: None,
            ip_address: None,
            referrer: None,
            path: None,
            metadata: None,
            created_at,
        }
    }

    /// Checks the fields the event store requires before an append.
    pub fn check_envelope(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::missing_field("userId"));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::missing_field("apiKey"));
        }
        if self.event_data.event_name() != self.event_name {
            return Err(Error::invalid_event_data(
                self.event_name.as_str(),
                format!("payload classified as {}", self.event_data.event_name()),
            ));
        }
        Ok(())
    }

    /// Visitor identity for profile aggregation.
    ///
    /// Falls back to `metadata.visitorId`, then to the session ID. Blank
    /// candidates are skipped.
    pub fn visitor_key(&self) -> Option<&str> {
        let present = |v: &&str| !v.trim().is_empty();
        self.visitor_id
            .as_deref()
            .filter(present)
            .or_else(|| {
                self.metadata
                    .as_ref()
                    .and_then(|m| m.get(fields::VISITOR_ID))
                    .and_then(Value::as_str)
                    .filter(present)
            })
            .or_else(|| self.session_id.as_deref().filter(present))
    }

    /// Flattened JSON document consumed by the aggregation pipeline.
    ///
    /// `createdAt` is epoch milliseconds so range filters compare numerically.
    pub fn to_document(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "apiKey": self.api_key,
            "userId": self.user_id,
            "eventName": self.event_name.as_str(),
            "eventData": self.event_data.to_value(),
            "sessionId": self.session_id,
            "visitorId": self.visitor_key(),
            "userAgent": self.user_agent,
            "ipAddress": self.ip_address,
            "referrer": self.referrer,
            "path": self.path,
            "createdAt": self.created_at.timestamp_millis(),
        })
    }
}
