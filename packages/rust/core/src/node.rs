//! Pipeline node contract.
//!
//! A node is either a collector, which acquires attribute values from some
//! source at a cost, or a transformer, which derives values from data already
//! present. The kind is declared by the node itself through [`Node::kind`].

use std::sync::Arc;

use datapipe_shared::{NodeError, NodeId};

use crate::context::PipelineContext;

/// Outcome of piping a context through a node.
pub type NodeResult = std::result::Result<PipelineContext, NodeError>;

/// Shared handle to a node. Nodes are reused across runs.
pub type NodeRef = Arc<dyn Node>;

/// Declared kind of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Acquires values from a source.
    Collector {
        /// Relative acquisition cost; cheaper collectors run first.
        cost: u32,
        /// Attribute names the collector is able to provide.
        provides: Vec<String>,
    },
    /// Derives values from existing data. Always zero cost.
    Transformer,
}

impl NodeKind {
    pub fn collector(cost: u32, provides: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Collector {
            cost,
            provides: provides.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_collector(&self) -> bool {
        matches!(self, Self::Collector { .. })
    }

    pub fn cost(&self) -> u32 {
        match self {
            Self::Collector { cost, .. } => *cost,
            Self::Transformer => 0,
        }
    }

    pub fn provides(&self) -> &[String] {
        match self {
            Self::Collector { provides, .. } => provides,
            Self::Transformer => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Collector { .. } => "Collector",
            Self::Transformer => "Transformer",
        }
    }
}

/// A unit of pipeline processing.
///
/// Implementations must not keep references to the context beyond the call to
/// [`Node::pipe`] and must be safe to invoke from several runs at once.
pub trait Node: Send + Sync {
    /// Stable identity, used as the graph key and in dependency declarations.
    fn id(&self) -> &NodeId;

    /// Human-readable name for display and case-insensitive lookup.
    fn name(&self) -> &str {
        self.id().as_str()
    }

    /// Identities of nodes that must run before this one.
    fn dependencies(&self) -> &[NodeId] {
        &[]
    }

    fn kind(&self) -> NodeKind;

    /// Process the context, proposing changes through it, and hand it back.
    fn pipe(&self, context: PipelineContext) -> NodeResult;

    /// Whether this node declares a dependency on `id`.
    fn depends_on(&self, id: &NodeId) -> bool {
        self.dependencies().contains(id)
    }
}

impl std::fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_kind_accessors() {
        let kind = NodeKind::collector(3, ["country", "city"]);
        assert!(kind.is_collector());
        assert_eq!(kind.cost(), 3);
        assert_eq!(kind.provides(), ["country".to_string(), "city".to_string()]);
        assert_eq!(kind.label(), "Collector");
    }

    #[test]
    fn transformer_is_free_and_provides_nothing() {
        let kind = NodeKind::Transformer;
        assert!(!kind.is_collector());
        assert_eq!(kind.cost(), 0);
        assert!(kind.provides().is_empty());
    }
}
