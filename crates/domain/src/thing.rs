//! Thing descriptors and property state.
//!
//! A [`ThingDescription`] is the metadata the gateway publishes for one
//! device: its address, title, declared properties and links. The live
//! values of those properties are kept in a [`ThingState`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON type declared for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
    /// Any type name this crate does not know about.
    #[serde(other)]
    Other,
}

impl PropertyType {
    /// Whether `value` is acceptable for a property of this type.
    ///
    /// `Null` is accepted by every type since devices report it for
    /// properties they could not read.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Other, _) => true,
            (Self::Boolean, Value::Bool(_))
            | (Self::Object, Value::Object(_))
            | (Self::Array, Value::Array(_))
            | (Self::Number, Value::Number(_))
            | (Self::String, Value::String(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            _ => false,
        }
    }
}

/// Declared schema of a single property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescription {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PropertyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "readOnly", default)]
    pub read_only: bool,
}

/// Link attached to a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub rel: String,
    pub href: String,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Metadata describing one Thing as published by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingDescription {
    pub href: String,
    pub title: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDescription>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl ThingDescription {
    /// Identifier of the Thing: the last path segment of its `href`.
    #[must_use]
    pub fn id(&self) -> &str {
        let trimmed = self.href.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Address of the live connection, if the gateway published one.
    ///
    /// This is the `alternate` link whose href uses a `ws` scheme. When
    /// several qualify, the last one wins.
    #[must_use]
    pub fn web_socket_uri(&self) -> Option<&str> {
        self.links
            .iter()
            .rev()
            .find(|link| link.rel == "alternate" && link.href.starts_with("ws"))
            .map(|link| link.href.as_str())
    }

    /// Whether the schema declares a property with this name.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }
}

/// Snapshot of every known property value of a Thing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThingState(pub Map<String, Value>);

impl ThingState {
    /// Value of one property, if known.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Names of the properties whose value differs between `previous` and
    /// `self`, including properties only present on one side.
    #[must_use]
    pub fn changed_from(&self, previous: &Self) -> Vec<String> {
        let mut changed: Vec<String> = self
            .0
            .iter()
            .filter(|(name, value)| previous.0.get(name.as_str()) != Some(*value))
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            previous
                .0
                .keys()
                .filter(|name| !self.0.contains_key(name.as_str()))
                .cloned(),
        );
        changed
    }
}
