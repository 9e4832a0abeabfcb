//! Context values and their envelope encoding.
//!
//! A context value is carried as `Option<Payload>`, where `None` means "nothing selected".
//! On the wire a value becomes an envelope body plus a [`PayloadEncoding`] tag:
//!
//! - no value or plain text: `none`
//! - empty text: `json`, as the JSON string `""`, so it is not mistaken for no value
//! - a typed domain resource: `domain-resource`, serialised with the resource's own JSON form
//! - anything else: generic `json`

use crate::{DispatchError, DispatchResult};
use ctx_broker::PayloadEncoding;
use fhir::Resource;
use serde::Serialize;

/// A value held by a context subject or carried by an event.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    Json(serde_json::Value),
    Resource(Resource),
}

impl Payload {
    /// Wrap any serialisable value as a generic JSON payload.
    pub fn json<T: Serialize>(value: &T) -> DispatchResult<Self> {
        serde_json::to_value(value)
            .map(Payload::Json)
            .map_err(|e| DispatchError::Encode(e.to_string()))
    }
}

impl From<Resource> for Payload {
    fn from(resource: Resource) -> Self {
        Payload::Resource(resource)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

const EMPTY_TEXT_JSON: &str = "\"\"";

/// Encode a value into an envelope body and its encoding tag.
pub fn encode(payload: Option<&Payload>) -> DispatchResult<(PayloadEncoding, String)> {
    match payload {
        None => Ok((PayloadEncoding::None, String::new())),
        Some(Payload::Text(text)) if text.is_empty() => {
            Ok((PayloadEncoding::Json, EMPTY_TEXT_JSON.to_string()))
        }
        Some(Payload::Text(text)) => Ok((PayloadEncoding::None, text.clone())),
        Some(Payload::Json(value)) => serde_json::to_string(value)
            .map(|body| (PayloadEncoding::Json, body))
            .map_err(|e| DispatchError::Encode(e.to_string())),
        Some(Payload::Resource(resource)) => resource
            .to_json()
            .map(|body| (PayloadEncoding::Resource, body))
            .map_err(|e| DispatchError::Encode(e.to_string())),
    }
}

/// Decode an envelope body according to its recorded encoding.
///
/// # Errors
///
/// Returns [`DispatchError::Decode`] when a `json` or `domain-resource` body is malformed.
pub fn decode(encoding: PayloadEncoding, body: &str) -> DispatchResult<Option<Payload>> {
    match encoding {
        PayloadEncoding::None if body.is_empty() => Ok(None),
        PayloadEncoding::None => Ok(Some(Payload::Text(body.to_string()))),
        PayloadEncoding::Json if body.trim() == EMPTY_TEXT_JSON => {
            Ok(Some(Payload::Text(String::new())))
        }
        PayloadEncoding::Json => serde_json::from_str(body)
            .map(|value| Some(Payload::Json(value)))
            .map_err(|e| DispatchError::Decode(e.to_string())),
        PayloadEncoding::Resource => Resource::from_json(body)
            .map(|resource| Some(Payload::Resource(resource)))
            .map_err(|e| DispatchError::Decode(e.to_string())),
    }
}
