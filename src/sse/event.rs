//! Decoded SSE events.

use enum_as_inner::EnumAsInner;
use serde::Serialize;

use super::relaxed;

/// Data value meaning the stream is finished.
pub const DONE_MARKER: &str = "[DONE]";

/// Event types that end the stream normally.
pub const TERMINAL_EVENT_TYPES: [&str; 2] = ["end", "close"];

/// Event payload, structured when the server sent (relaxed) JSON.
#[derive(Debug, Clone, PartialEq, Serialize, EnumAsInner)]
#[serde(untagged)]
pub enum Payload {
    /// payload decoded as a JSON object or array
    Json(serde_json::Value),
    /// payload passed through as raw text
    Text(String),
}

impl Payload {
    /// Decode a `data` field.
    ///
    /// Text that starts with `{` or `[` is parsed as relaxed JSON, anything
    /// else, and anything that fails to parse, stays a raw string. Never fails.
    pub fn decode(data: &str) -> Self {
        let trimmed = data.trim();

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            match relaxed::parse(trimmed) {
                Ok(value) => return Self::Json(value),
                Err(err) => {
                    log::warn!("Event data is not valid json, use raw text: {}", err);
                    log::trace!("Undecodable event data: {:?}", data);
                }
            }
        }

        Self::Text(data.to_string())
    }

    /// Convert to a json value, raw text becomes a json string.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Text(text) => serde_json::Value::String(text.clone()),
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// One event delivered to a session handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    /// `event:` field, or the session's default type when absent
    pub event_type: String,
    /// decoded `data:` field
    pub data: Payload,
    /// last `id:` seen on this connection, empty if none
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
}

impl StreamEvent {
    /// Create an event with an empty id.
    pub fn new<S: Into<String>, P: Into<Payload>>(event_type: S, data: P) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
            id: String::new(),
        }
    }

    /// true if this event ends the stream normally
    pub fn is_terminal(&self) -> bool {
        TERMINAL_EVENT_TYPES.contains(&self.event_type.as_str())
            || matches!(&self.data, Payload::Text(text) if text.trim() == DONE_MARKER)
    }
}
