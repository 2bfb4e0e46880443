//! Core domain types for datapipe: node identity, run identity, and the payload.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{DataPipeError, Result};

/// Attribute values carried by a payload.
pub type Value = serde_json::Value;

/// Attribute name → value mapping, in insertion order.
pub type AttributeMap = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Stable identity of a pipeline node.
///
/// Used as the dependency graph vertex key and in dependency declarations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The record enriched by a pipeline run.
///
/// The set of attribute names is fixed when the payload is created; `null` or
/// an empty string mark an attribute as unset. A snapshot of the initial
/// attributes is kept so changes can be reported against it.
///
/// Serializes as a plain JSON object of the current attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload {
    attributes: AttributeMap,
    original: AttributeMap,
}

impl Payload {
    pub fn new(attributes: AttributeMap) -> Self {
        Self {
            original: attributes.clone(),
            attributes,
        }
    }

    /// Build a payload from a JSON value, which must be an object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::new(map)),
            other => Err(DataPipeError::validation(format!(
                "payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Current attributes.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Value of a single attribute; `None` if unknown or `null`.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }

    /// Whether the attribute has a non-null value.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Whether the payload declares the attribute at all.
    pub fn knows_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Whether the attribute is unknown, `null`, or an empty string.
    pub fn is_unset(&self, name: &str) -> bool {
        match self.attributes.get(name) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }

    /// Set a known attribute. Attributes outside the fixed set are rejected.
    pub fn set_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        match self.attributes.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(DataPipeError::UnknownAttribute {
                name: name.to_string(),
            }),
        }
    }

    /// Names of all attributes the payload may carry.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn original_attributes(&self) -> &AttributeMap {
        &self.original
    }

    pub fn original_attribute(&self, name: &str) -> Option<&Value> {
        self.original.get(name).filter(|v| !v.is_null())
    }

    /// Whether the attribute differs from the snapshot taken at construction.
    pub fn was_changed(&self, name: &str) -> bool {
        self.attribute(name) != self.original_attribute(name)
    }

    /// Names of attributes whose value differs from the original snapshot.
    pub fn changed_attributes(&self) -> Vec<&str> {
        self.attribute_names()
            .filter(|name| self.was_changed(name))
            .collect()
    }

    /// Consume the payload, returning the current attributes.
    pub fn into_attributes(self) -> AttributeMap {
        self.attributes
    }
}

impl From<AttributeMap> for Payload {
    fn from(attributes: AttributeMap) -> Self {
        Self::new(attributes)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.attributes.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        AttributeMap::deserialize(deserializer).map(Self::new)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
