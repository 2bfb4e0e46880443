//! Hook contract: typed notifications at every pipeline decision point.
//!
//! Listeners implement [`PipelineListener`] and override the methods they care
//! about. [`Hooks`] delivers each event to all listeners synchronously, in
//! registration order. At decision points the current [`Decision`] is folded
//! through the listeners: each one receives the decision left by the previous
//! listener and returns the decision handed to the next. The engine branches on
//! the final value.

use std::sync::Arc;
use std::time::Duration;

use datapipe_shared::Payload;

use crate::changes::ProposedChange;
use crate::context::PipelineContext;
use crate::node::{Node, NodeRef};

/// Skip/continue toggle carried through a decision point.
///
/// What "skip" means depends on the event: skip registering the node, skip
/// invoking it, skip applying a change, or, for [`NodeFailed`], skip the error
/// and carry on with the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decision {
    #[default]
    Continue,
    Skip,
}

impl Decision {
    pub fn is_skip(self) -> bool {
        self == Self::Skip
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A node is about to be added to the registry.
pub struct BeforeNodeRegistration<'a> {
    pub node: &'a dyn Node,
    /// Nodes registered so far.
    pub registered: &'a [NodeRef],
}

/// A run is about to start.
pub struct BeforeRun<'a> {
    pub context: &'a PipelineContext,
    pub nodes: &'a [NodeRef],
    pub maximum_cost: Option<u32>,
}

/// A node is about to be considered for invocation.
pub struct BeforeNode<'a> {
    pub node: &'a dyn Node,
    pub context: &'a PipelineContext,
    pub nodes: &'a [NodeRef],
}

/// A collector exceeds the run's cost ceiling. Skipped unless a listener
/// returns [`Decision::Continue`].
pub struct NodeTooExpensive<'a> {
    pub node: &'a dyn Node,
    pub context: &'a PipelineContext,
    pub cost: u32,
    pub maximum_cost: u32,
}

/// A costly collector provides none of the still-missing attributes. Skipped
/// unless a listener returns [`Decision::Continue`].
pub struct NodeRedundant<'a> {
    pub node: &'a dyn Node,
    pub context: &'a PipelineContext,
    pub missing: &'a [String],
}

/// A node finished without error.
pub struct NodeSucceeded<'a> {
    pub node: &'a dyn Node,
    /// Context returned by the node.
    pub context: &'a PipelineContext,
    pub duration: Duration,
}

/// A node returned an error. The run aborts unless a listener returns
/// [`Decision::Skip`].
pub struct NodeFailed<'a> {
    pub error: &'a (dyn std::error::Error + Send + Sync + 'static),
    pub node: &'a dyn Node,
    /// Context as it was before the node ran.
    pub context: &'a PipelineContext,
    pub duration: Duration,
}

/// A node invocation ended, successfully or not.
pub struct AfterNode<'a> {
    pub node: &'a dyn Node,
    /// Resulting context on success, the pre-failure context otherwise.
    pub context: &'a PipelineContext,
    pub nodes: &'a [NodeRef],
    pub duration: Duration,
    pub success: bool,
}

impl<'a> AfterNode<'a> {
    fn position(&self) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == self.node.id())
    }

    /// Node scheduled before this one, if any.
    pub fn previous_node(&self) -> Option<&'a NodeRef> {
        let index = self.position()?;
        index.checked_sub(1).and_then(|i| self.nodes.get(i))
    }

    /// Node scheduled after this one, if any.
    pub fn next_node(&self) -> Option<&'a NodeRef> {
        self.nodes.get(self.position()? + 1)
    }

    /// Nodes up to and including this one.
    pub fn completed_nodes(&self) -> &'a [NodeRef] {
        match self.position() {
            Some(index) => &self.nodes[..=index],
            None => &[],
        }
    }

    /// Nodes still to come after this one.
    pub fn pending_nodes(&self) -> &'a [NodeRef] {
        match self.position() {
            Some(index) => &self.nodes[index + 1..],
            None => &[],
        }
    }
}

/// Winning changes have been resolved and are about to be applied. Listeners
/// may replace the set wholesale.
pub struct BeforeCommit<'a> {
    pub context: &'a PipelineContext,
    pub payload: &'a Payload,
    changes: Vec<ProposedChange>,
}

impl<'a> BeforeCommit<'a> {
    pub(crate) fn new(
        context: &'a PipelineContext,
        payload: &'a Payload,
        changes: Vec<ProposedChange>,
    ) -> Self {
        Self {
            context,
            payload,
            changes,
        }
    }

    pub fn changes(&self) -> &[ProposedChange] {
        &self.changes
    }

    pub fn changes_mut(&mut self) -> &mut Vec<ProposedChange> {
        &mut self.changes
    }

    pub fn set_changes(&mut self, changes: Vec<ProposedChange>) {
        self.changes = changes;
    }

    pub(crate) fn into_changes(self) -> Vec<ProposedChange> {
        self.changes
    }
}

/// A single winning change is about to be applied.
pub struct BeforeChangeApplication<'a> {
    pub context: &'a PipelineContext,
    pub change: &'a ProposedChange,
}

/// Changes have been applied to the payload.
pub struct AfterCommit<'a> {
    pub context: &'a PipelineContext,
    /// Changes that were actually applied.
    pub applied: &'a [ProposedChange],
    pub payload: &'a Payload,
}

/// A run finished and its payload is about to be returned.
pub struct AfterRun<'a> {
    pub context: &'a PipelineContext,
    pub payload: &'a Payload,
    pub nodes: &'a [NodeRef],
    pub maximum_cost: Option<u32>,
}

// ---------------------------------------------------------------------------
// Listener trait
// ---------------------------------------------------------------------------

/// Receiver of pipeline events. Every method has a pass-through default.
pub trait PipelineListener: Send + Sync {
    fn before_node_registration(
        &self,
        _event: &BeforeNodeRegistration<'_>,
        decision: Decision,
    ) -> Decision {
        decision
    }

    fn before_run(&self, _event: &BeforeRun<'_>) {}

    fn before_node(&self, _event: &BeforeNode<'_>, decision: Decision) -> Decision {
        decision
    }

    fn node_too_expensive(&self, _event: &NodeTooExpensive<'_>, decision: Decision) -> Decision {
        decision
    }

    fn node_redundant(&self, _event: &NodeRedundant<'_>, decision: Decision) -> Decision {
        decision
    }

    fn node_succeeded(&self, _event: &NodeSucceeded<'_>) {}

    fn node_failed(&self, _event: &NodeFailed<'_>, decision: Decision) -> Decision {
        decision
    }

    fn after_node(&self, _event: &AfterNode<'_>) {}

    fn before_commit(&self, _event: &mut BeforeCommit<'_>) {}

    fn before_change_application(
        &self,
        _event: &BeforeChangeApplication<'_>,
        decision: Decision,
    ) -> Decision {
        decision
    }

    fn after_commit(&self, _event: &AfterCommit<'_>) {}

    fn after_run(&self, _event: &AfterRun<'_>) {}
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Ordered set of listeners.
#[derive(Clone, Default)]
pub struct Hooks {
    listeners: Vec<Arc<dyn PipelineListener>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener; it will run after all previously added ones.
    pub fn register(&mut self, listener: Arc<dyn PipelineListener>) {
        self.listeners.push(listener);
    }

    /// Builder-style [`Hooks::register`].
    pub fn with(mut self, listener: impl PipelineListener + 'static) -> Self {
        self.register(Arc::new(listener));
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn decide(
        &self,
        initial: Decision,
        ask: impl Fn(&dyn PipelineListener, Decision) -> Decision,
    ) -> Decision {
        self.listeners
            .iter()
            .fold(initial, |decision, listener| ask(listener.as_ref(), decision))
    }

    fn notify(&self, tell: impl Fn(&dyn PipelineListener)) {
        for listener in &self.listeners {
            tell(listener.as_ref());
        }
    }

    pub fn before_node_registration(
        &self,
        event: &BeforeNodeRegistration<'_>,
        initial: Decision,
    ) -> Decision {
        self.decide(initial, |l, d| l.before_node_registration(event, d))
    }

    pub fn before_run(&self, event: &BeforeRun<'_>) {
        self.notify(|l| l.before_run(event));
    }

    pub fn before_node(&self, event: &BeforeNode<'_>, initial: Decision) -> Decision {
        self.decide(initial, |l, d| l.before_node(event, d))
    }

    pub fn node_too_expensive(&self, event: &NodeTooExpensive<'_>, initial: Decision) -> Decision {
        self.decide(initial, |l, d| l.node_too_expensive(event, d))
    }

    pub fn node_redundant(&self, event: &NodeRedundant<'_>, initial: Decision) -> Decision {
        self.decide(initial, |l, d| l.node_redundant(event, d))
    }

    pub fn node_succeeded(&self, event: &NodeSucceeded<'_>) {
        self.notify(|l| l.node_succeeded(event));
    }

    pub fn node_failed(&self, event: &NodeFailed<'_>, initial: Decision) -> Decision {
        self.decide(initial, |l, d| l.node_failed(event, d))
    }

    pub fn after_node(&self, event: &AfterNode<'_>) {
        self.notify(|l| l.after_node(event));
    }

    pub fn before_commit(&self, event: &mut BeforeCommit<'_>) {
        for listener in &self.listeners {
            listener.before_commit(event);
        }
    }

    pub fn before_change_application(
        &self,
        event: &BeforeChangeApplication<'_>,
        initial: Decision,
    ) -> Decision {
        self.decide(initial, |l, d| l.before_change_application(event, d))
    }

    pub fn after_commit(&self, event: &AfterCommit<'_>) {
        self.notify(|l| l.after_commit(event));
    }

    pub fn after_run(&self, event: &AfterRun<'_>) {
        self.notify(|l| l.after_run(event));
    }
}
