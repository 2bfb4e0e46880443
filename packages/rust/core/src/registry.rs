//! Registry of pipeline nodes.
//!
//! Holds registered nodes in registration order, decides the execution order
//! (cheap collectors first, then transformers, subject to dependencies) and
//! builds [`Pipeline`]s that share the registry's hooks.

use tracing::{debug, instrument};

use datapipe_shared::Result;

use crate::graph::DependencyGraph;
use crate::hooks::{BeforeNodeRegistration, Decision, Hooks};
use crate::node::NodeRef;
use crate::pipeline::Pipeline;

/// Ordered collection of nodes plus the hooks used by pipelines built from it.
#[derive(Default)]
pub struct PipelineRegistry {
    nodes: Vec<NodeRef>,
    hooks: Hooks,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(hooks: Hooks) -> Self {
        Self {
            nodes: Vec::new(),
            hooks,
        }
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    /// Register a node. Returns `false` if a listener vetoed it.
    pub fn add_node(&mut self, node: NodeRef) -> bool {
        let event = BeforeNodeRegistration {
            node: node.as_ref(),
            registered: &self.nodes,
        };
        if self
            .hooks
            .before_node_registration(&event, Decision::Continue)
            .is_skip()
        {
            debug!(node = %node.id(), "registration vetoed");
            return false;
        }

        debug!(node = %node.id(), kind = node.kind().label(), "node registered");
        self.nodes.push(node);
        true
    }

    /// Register every node in turn; returns how many were accepted.
    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = NodeRef>) -> usize {
        nodes
            .into_iter()
            .filter(|node| self.add_node(NodeRef::clone(node)))
            .count()
    }

    /// All nodes in registration order.
    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn collectors(&self) -> impl Iterator<Item = &NodeRef> {
        self.nodes.iter().filter(|n| n.kind().is_collector())
    }

    pub fn transformers(&self) -> impl Iterator<Item = &NodeRef> {
        self.nodes.iter().filter(|n| !n.kind().is_collector())
    }

    /// Find a collector by name, ignoring case.
    pub fn resolve_collector(&self, name: &str) -> Option<&NodeRef> {
        let wanted = name.to_lowercase();
        self.collectors()
            .find(|n| n.name().to_lowercase() == wanted)
    }

    /// Execution order: collectors by ascending cost, then transformers, then
    /// reordered so dependencies come first.
    #[instrument(skip_all, fields(nodes = self.nodes.len()))]
    pub fn resolve_pipeline(&self) -> Result<Vec<NodeRef>> {
        let mut collectors: Vec<&NodeRef> = self.collectors().collect();
        collectors.sort_by_key(|n| n.kind().cost());

        let mut graph = DependencyGraph::new();
        for node in collectors.into_iter().chain(self.transformers()) {
            graph.connect(NodeRef::clone(node));
        }

        graph.resolve()
    }

    /// Resolve the execution order and wrap it in a runnable pipeline.
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        let nodes = self.resolve_pipeline()?;
        Ok(Pipeline::new(nodes, self.hooks.clone()))
    }
}
