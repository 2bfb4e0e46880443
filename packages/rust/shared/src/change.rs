//! A single proposed attribute change.

use serde::Serialize;

use crate::error::Result;
use crate::types::{NodeId, Payload, Value};

/// A candidate mutation to one payload attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposedChange {
    node: NodeId,
    attribute: String,
    new_value: Value,
    old_value: Option<Value>,
    confidence: i64,
}

impl ProposedChange {
    pub fn new(
        node: NodeId,
        attribute: impl Into<String>,
        new_value: Value,
        old_value: Option<Value>,
        confidence: i64,
    ) -> Self {
        Self {
            node,
            attribute: attribute.into(),
            new_value,
            old_value,
            confidence,
        }
    }

    /// Node that proposed the change.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn new_value(&self) -> &Value {
        &self.new_value
    }

    /// Payload value at the time of the proposal.
    pub fn old_value(&self) -> Option<&Value> {
        self.old_value.as_ref()
    }

    pub fn confidence(&self) -> i64 {
        self.confidence
    }

    /// Write the new value into the payload.
    pub fn apply(&self, payload: &mut Payload) -> Result<()> {
        payload.set_attribute(&self.attribute, self.new_value.clone())
    }
}
