//! Tracking envelope accepted by the ingestion gateway.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;
use validator::Validate;

use crate::auth::{ApiKey, UserIdentity};
use crate::classify::classify_raw;
use crate::error::{AuthErrorCode, Error, Result, ValidationErrorCode};
use crate::events::Event;
use crate::limits::{MAX_EVENT_SIZE_BYTES, MAX_METADATA_BYTES, MAX_URL_LEN, MAX_USER_AGENT_LEN};

/// Body of `POST /analytics/track`.
///
/// Everything is optional at the wire level so that a missing field maps
/// to a coded error instead of a generic parse failure.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub event_data: Option<Value>,
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub session_id: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 256))]
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl TrackRequest {
    /// Parse a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() > MAX_EVENT_SIZE_BYTES {
            return Err(Error::validation(
                ValidationErrorCode::EventTooLarge,
                format!("Event exceeds {} bytes", MAX_EVENT_SIZE_BYTES),
            ));
        }

        let request: Self = serde_json::from_slice(body).map_err(|e| {
            Error::validation(ValidationErrorCode::InvalidFormat, format!("Invalid JSON: {}", e))
        })?;

        request
            .validate()
            .map_err(|e| Error::validation(ValidationErrorCode::InvalidFormat, e.to_string()))?;

        if let Some(metadata) = &request.metadata {
            let size = serde_json::to_vec(metadata)?.len();
            if size > MAX_METADATA_BYTES {
                return Err(Error::validation(
                    ValidationErrorCode::EventTooLarge,
                    format!("metadata exceeds {} bytes", MAX_METADATA_BYTES),
                ));
            }
        }

        Ok(request)
    }

    /// The caller's API key, checked for shape.
    pub fn api_key(&self) -> Result<ApiKey> {
        match self.api_key.as_deref() {
            Some(key) => ApiKey::parse(key),
            None => Err(Error::unauthorized(AuthErrorCode::MissingKey, "API key is required")),
        }
    }

    /// Build the stored event for a resolved tenant.
    ///
    /// Checks the remaining envelope fields, then classifies the payload.
    pub fn into_event(
        self,
        key: &ApiKey,
        identity: &UserIdentity,
        context: RequestContext,
        now: DateTime<Utc>,
    ) -> Result<Event> {
        let event_name = self
            .event_name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::missing_field("eventName"))?;
        let event_data = self
            .event_data
            .ok_or_else(|| Error::missing_field("eventData"))?;

        let data = classify_raw(&event_name, event_data)?;

        let path = context.path();
        let mut event = Event::new(key.as_str(), identity.user_id.as_str(), data, now);
        event.session_id = self.session_id;
        event.visitor_id = self.visitor_id;
        event.metadata = self.metadata;
        event.user_agent = context.user_agent;
        event.ip_address = context.ip_address;
        event.referrer = context.referrer;
        event.path = path;
        Ok(event)
    }
}

/// Request context captured by the gateway. Never caller-supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub referrer: Option<String>,
}

impl RequestContext {
    pub fn new(
        user_agent: Option<String>,
        ip_address: Option<String>,
        referrer: Option<String>,
    ) -> Self {
        Self {
            user_agent: user_agent
                .filter(|ua| !ua.is_empty())
                .map(|ua| truncate(ua, MAX_USER_AGENT_LEN)),
            ip_address: ip_address.filter(|ip| !ip.is_empty()),
            referrer: referrer.filter(|r| !r.is_empty() && r.len() <= MAX_URL_LEN),
        }
    }

    /// URL path of the referring page.
    pub fn path(&self) -> Option<String> {
        self.referrer.as_deref().and_then(extract_path)
    }
}

/// Path component of an absolute URL.
pub fn extract_path(referrer: &str) -> Option<String> {
    Url::parse(referrer).ok().map(|url| url.path().to_string())
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}
