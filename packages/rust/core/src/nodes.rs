//! Declarative nodes built from configuration.

use tracing::debug;

use datapipe_shared::{AppConfig, AttributeMap, CopyRule, NodeConfig, NodeId, NodeKindConfig, Result};

use crate::context::PipelineContext;
use crate::node::{Node, NodeKind, NodeRef, NodeResult};

/// Collector that proposes a fixed set of attribute values.
#[derive(Debug, Clone)]
pub struct StaticCollector {
    id: NodeId,
    name: String,
    cost: u32,
    dependencies: Vec<NodeId>,
    confidence: i64,
    values: AttributeMap,
}

impl StaticCollector {
    pub fn new(id: impl Into<NodeId>, cost: u32, values: AttributeMap) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            cost,
            dependencies: Vec::new(),
            confidence: 0,
            values,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_confidence(mut self, confidence: i64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn depending_on(mut self, ids: impl IntoIterator<Item = impl Into<NodeId>>) -> Self {
        self.dependencies = ids.into_iter().map(Into::into).collect();
        self
    }
}

impl Node for StaticCollector {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    fn kind(&self) -> NodeKind {
        NodeKind::collector(self.cost, self.values.keys().cloned())
    }

    fn pipe(&self, mut context: PipelineContext) -> NodeResult {
        for (attribute, value) in &self.values {
            context.propose_change(attribute, value.clone(), self.confidence)?;
        }
        Ok(context)
    }
}

/// Transformer that proposes the most trusted value of one attribute for
/// another.
#[derive(Debug, Clone)]
pub struct CopyTransformer {
    id: NodeId,
    name: String,
    dependencies: Vec<NodeId>,
    confidence: i64,
    rules: Vec<CopyRule>,
}

impl CopyTransformer {
    pub fn new(id: impl Into<NodeId>, rules: Vec<CopyRule>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            dependencies: Vec::new(),
            confidence: 0,
            rules,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_confidence(mut self, confidence: i64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn depending_on(mut self, ids: impl IntoIterator<Item = impl Into<NodeId>>) -> Self {
        self.dependencies = ids.into_iter().map(Into::into).collect();
        self
    }
}

impl Node for CopyTransformer {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Transformer
    }

    fn pipe(&self, mut context: PipelineContext) -> NodeResult {
        for rule in &self.rules {
            // Nothing to copy yet; leave the target alone.
            let Some(value) = context.most_trusted_value(&rule.from) else {
                continue;
            };
            context.propose_change(&rule.to, value, self.confidence)?;
        }
        Ok(context)
    }
}

/// Build nodes from the `[[nodes]]` section, in declaration order.
pub fn nodes_from_config(config: &AppConfig) -> Result<Vec<NodeRef>> {
    config.validate()?;
    Ok(config.nodes.iter().map(node_from_config).collect())
}

fn node_from_config(node: &NodeConfig) -> NodeRef {
    debug!(node = %node.id, kind = ?node.kind, "building configured node");
    match node.kind {
        NodeKindConfig::Collector => std::sync::Arc::new(
            StaticCollector::new(node.id.as_str(), node.cost, node.values.clone())
                .named(node.display_name())
                .with_confidence(node.confidence)
                .depending_on(node.depends_on.iter().map(String::as_str)),
        ),
        NodeKindConfig::Transformer => std::sync::Arc::new(
            CopyTransformer::new(node.id.as_str(), node.copy.clone())
                .named(node.display_name())
                .with_confidence(node.confidence)
                .depending_on(node.depends_on.iter().map(String::as_str)),
        ),
    }
}
