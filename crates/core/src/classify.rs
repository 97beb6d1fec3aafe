//! Event classification: maps an event name and free-form payload to a
//! typed [`EventData`] variant, enforcing the per-event contract.

use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

use crate::error::{Error, Result};
use crate::events::{EventData, EventName, Traits};

/// Classify a raw event name and payload.
///
/// Names outside the allow-list are rejected before the payload is inspected.
pub fn classify_raw(raw_name: &str, data: Value) -> Result<EventData> {
    let name = EventName::parse(raw_name)?;
    classify(name, data)
}

/// Classify a payload under a known event name.
pub fn classify(name: EventName, data: Value) -> Result<EventData> {
    let classified = match name {
        EventName::PageView => EventData::PageView(contract(name, data)?),
        EventName::ElementClick => EventData::ElementClick(contract(name, data)?),
        EventName::AddToCart => EventData::AddToCart(contract(name, data)?),
        EventName::RemoveFromCart => EventData::RemoveFromCart(contract(name, data)?),
        EventName::ProductViewed => EventData::ProductViewed(contract(name, data)?),
        EventName::AddWishlist => EventData::AddWishlist(contract(name, data)?),
        EventName::RemoveWishlist => EventData::RemoveWishlist(contract(name, data)?),
        EventName::CheckoutStarted => EventData::CheckoutStarted(contract(name, data)?),
        EventName::CheckoutCompleted => EventData::CheckoutCompleted(contract(name, data)?),
        EventName::CheckoutCancelled => EventData::CheckoutCancelled(contract(name, data)?),
        EventName::FormSubmission => EventData::FormSubmission(contract(name, data)?),
        EventName::Search => EventData::Search(contract(name, data)?),
        EventName::Identify => EventData::Identify(traits(name, data)?),
        EventName::Login => EventData::Login(traits(name, data)?),
        EventName::Register => EventData::Register(traits(name, data)?),
        EventName::ForgotPassword => EventData::ForgotPassword(traits(name, data)?),
    };
    Ok(classified)
}

/// Deserialize into the typed payload and run its field validations.
fn contract<T>(name: EventName, data: Value) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    require_object(name, &data)?;

    let payload: T = serde_json::from_value(data)
        .map_err(|e| Error::invalid_event_data(name.as_str(), e.to_string()))?;

    payload
        .validate()
        .map_err(|e| Error::invalid_event_data(name.as_str(), e.to_string()))?;

    Ok(payload)
}

fn traits(name: EventName, data: Value) -> Result<Traits> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(object_expected(name, &other)),
    }
}

fn require_object(name: EventName, data: &Value) -> Result<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(object_expected(name, data))
    }
}

fn object_expected(name: EventName, data: &Value) -> Error {
    let kind = match data {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    Error::invalid_event_data(name.as_str(), format!("eventData must be an object, got {}", kind))
}
