//! Live protocol frames exchanged with a Thing.
//!
//! Every frame is a JSON text message of the form
//! `{"messageType": "...", "data": {...}}`. Inbound frames report state
//! (`propertyStatus`, `event`, `connected`); outbound frames carry commands
//! (`setProperty`, `addEventSubscription`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Frame received from a Thing.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// One or more properties changed; values in arrival order.
    PropertyStatus(Map<String, Value>),
    /// One or more events occurred; only the names are meaningful.
    Event(Map<String, Value>),
    /// Connection acknowledgment.
    Connected(bool),
    /// Any other message type, kept for logging.
    Other(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    message_type: String,
    #[serde(default)]
    data: Value,
}

impl InboundMessage {
    /// Decode a raw text frame.
    ///
    /// Unknown fields are ignored. `data` must be an object for
    /// `propertyStatus` and `event`.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the frame is not valid JSON, has
    /// no `messageType`, or carries a non-object `data` where one is
    /// required.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let frame: RawFrame = serde_json::from_str(text)?;
        match frame.message_type.as_str() {
            "propertyStatus" => Ok(Self::PropertyStatus(serde_json::from_value(frame.data)?)),
            "event" => Ok(Self::Event(serde_json::from_value(frame.data)?)),
            "connected" => Ok(Self::Connected(!matches!(
                frame.data,
                Value::Null | Value::Bool(false)
            ))),
            _ => Ok(Self::Other(frame.message_type)),
        }
    }
}

/// Command sent to a Thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", content = "data", rename_all = "camelCase")]
pub enum Command {
    /// Change one or more property values.
    SetProperty(Map<String, Value>),
    /// Ask to receive the named events; each maps to an empty object.
    AddEventSubscription(Map<String, Value>),
}

impl Command {
    /// `setProperty` for a single property.
    #[must_use]
    pub fn set_property(name: impl Into<String>, value: Value) -> Self {
        let mut data = Map::new();
        data.insert(name.into(), value);
        Self::SetProperty(data)
    }

    /// `addEventSubscription` for a single event.
    #[must_use]
    pub fn subscribe_event(name: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert(name.into(), Value::Object(Map::new()));
        Self::AddEventSubscription(data)
    }

    /// Encode as a text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if a value cannot be serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
