//! Node-based data enrichment engine for datapipe.
//!
//! Nodes (collectors and transformers) are registered with a
//! [`PipelineRegistry`], which orders them by cost and dependencies and builds
//! a [`Pipeline`]. Each run pipes a [`PipelineContext`] through the nodes,
//! which propose changes; the highest-confidence proposal per attribute is
//! committed to the returned payload. Listeners observe and steer every
//! decision point through [`Hooks`].

pub mod changes;
pub mod context;
pub mod graph;
pub mod hooks;
pub mod listeners;
pub mod node;
pub mod nodes;
pub mod pipeline;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use changes::{ChangeSet, ProposedChange};
pub use context::PipelineContext;
pub use graph::DependencyGraph;
pub use hooks::{Decision, Hooks, PipelineListener};
pub use listeners::{AllowExpensive, ContinueOnFailure, NodeTiming, TimingRecorder, TracingListener};
pub use node::{Node, NodeKind, NodeRef, NodeResult};
pub use nodes::{CopyTransformer, StaticCollector, nodes_from_config};
pub use pipeline::Pipeline;
pub use registry::PipelineRegistry;
