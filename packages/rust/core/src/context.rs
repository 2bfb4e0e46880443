//! Per-run pipeline context.
//!
//! The context gives nodes read access to the payload and lets them propose
//! changes without applying them right away. Scoping the context to a node
//! yields a new value whose proposals are attributed to that node; the
//! original context is left untouched.

use std::sync::Arc;

use tracing::{debug, warn};

use datapipe_shared::{DataPipeError, NodeId, Payload, Result, RunId, Value};

use crate::changes::{ChangeSet, ProposedChange};
use crate::node::Node;

/// Scratchpad of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    run_id: RunId,
    payload: Arc<Payload>,
    changes: ChangeSet,
    node: Option<NodeId>,
}

impl PipelineContext {
    pub fn new(payload: Payload) -> Self {
        Self {
            run_id: RunId::new(),
            payload: Arc::new(payload),
            changes: ChangeSet::new(),
            node: None,
        }
    }

    /// A copy of this context whose proposals are attributed to `node`.
    pub fn for_node(&self, node: &dyn Node) -> Self {
        Self {
            node: Some(node.id().clone()),
            ..self.clone()
        }
    }

    /// Node the context is scoped to, if any.
    pub fn node(&self) -> Option<&NodeId> {
        self.node.as_ref()
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// An independent copy of the payload.
    pub fn payload(&self) -> Payload {
        Payload::clone(&self.payload)
    }

    /// Current payload value of an attribute, ignoring pending proposals.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.payload.attribute(name)
    }

    pub fn proposed_changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// All proposals for one attribute, in proposal order.
    pub fn changes_to(&self, attribute: &str) -> Vec<&ProposedChange> {
        self.changes.for_attribute(attribute).collect()
    }

    /// Propose a new value for an attribute.
    ///
    /// `confidence` has no bounds; it only has meaning relative to the
    /// confidences other nodes in the same pipeline assign. Proposals for
    /// attributes the payload does not know are discarded.
    ///
    /// Fails with [`DataPipeError::ContractViolation`] if the context has not
    /// been scoped to a node.
    pub fn propose_change(
        &mut self,
        attribute: &str,
        value: impl Into<Value>,
        confidence: i64,
    ) -> Result<()> {
        let node = self.node.clone().ok_or_else(|| {
            DataPipeError::contract(format!(
                "change to '{attribute}' proposed outside of a node scope"
            ))
        })?;

        if !self.payload.knows_attribute(attribute) {
            warn!(%node, attribute, "discarding proposal for unknown attribute");
            return Ok(());
        }

        let change = ProposedChange::new(
            node,
            attribute,
            value.into(),
            self.payload.attribute(attribute).cloned(),
            confidence,
        );
        debug!(
            node = %change.node(),
            attribute,
            confidence,
            "change proposed"
        );
        self.changes.push(change);

        Ok(())
    }

    /// The value of the most trusted proposal for an attribute, or the payload
    /// value when nothing has been proposed yet.
    pub fn most_trusted_value(&self, attribute: &str) -> Option<Value> {
        match self.changes.most_trusted(attribute) {
            Some(change) => Some(change.new_value().clone()),
            None => self.payload.attribute(attribute).cloned(),
        }
    }

    /// Attributes that are unset in the payload and have no proposal yet.
    pub fn missing_attributes(&self) -> Vec<String> {
        self.payload
            .attribute_names()
            .filter(|name| self.payload.is_unset(name) && !self.changes.touches(name))
            .map(str::to_string)
            .collect()
    }

    /// One winning change per attribute, without applying anything.
    pub fn resolve_changes(&self) -> Vec<ProposedChange> {
        self.changes.resolve()
    }

    /// Apply the winning changes to a copy of the payload and clear the
    /// change set. The context continues from the committed payload.
    pub fn commit(&mut self) -> Payload {
        let mut payload = self.payload();

        for change in self.changes.resolve() {
            if let Err(e) = change.apply(&mut payload) {
                warn!(attribute = change.attribute(), error = %e, "change not applied");
            }
        }

        self.adopt(payload.clone());
        payload
    }

    /// Continue from `payload`, dropping all pending proposals.
    pub(crate) fn adopt(&mut self, payload: Payload) {
        self.changes.clear();
        self.payload = Arc::new(payload);
    }
}
