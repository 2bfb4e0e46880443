//! Dependency graph for pipeline nodes.
//!
//! Nodes are vertices keyed by their [`NodeId`]; each declared dependency is
//! an edge. [`DependencyGraph::resolve`] linearises the graph so every node
//! comes after all of its dependencies.

use std::collections::HashMap;

use tracing::{debug, instrument};

use datapipe_shared::{DataPipeError, NodeId, Result};

use crate::node::NodeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Directed graph of nodes and their dependency edges.
#[derive(Default)]
pub struct DependencyGraph {
    /// Vertices in connection order.
    nodes: Vec<NodeRef>,
    index: HashMap<NodeId, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes on the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Connect a node and its declared dependencies to the graph.
    ///
    /// Connecting an identity twice rebinds it to the new instance while the
    /// vertex keeps its original position.
    pub fn connect(&mut self, node: NodeRef) {
        match self.index.get(node.id()) {
            Some(&slot) => {
                debug!(node = %node.id(), "rebinding graph vertex");
                self.nodes[slot] = node;
            }
            None => {
                self.index.insert(node.id().clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Resolve the graph to a linear order.
    ///
    /// Depth-first with an explicit stack: roots are visited in connection
    /// order and dependencies in declaration order, so the result is
    /// deterministic for a fixed connection order.
    #[instrument(skip_all, fields(nodes = self.nodes.len()))]
    pub fn resolve(&self) -> Result<Vec<NodeRef>> {
        let mut marks: Vec<Option<Mark>> = vec![None; self.nodes.len()];
        let mut sorted: Vec<NodeRef> = Vec::with_capacity(self.nodes.len());
        // (vertex, index of the next dependency to visit)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..self.nodes.len() {
            if marks[root].is_some() {
                continue;
            }
            marks[root] = Some(Mark::Visiting);
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let (vertex, next) = *frame;
                frame.1 += 1;

                let node = &self.nodes[vertex];
                let Some(dependency) = node.dependencies().get(next) else {
                    stack.pop();
                    marks[vertex] = Some(Mark::Done);
                    sorted.push(NodeRef::clone(node));
                    continue;
                };

                let Some(&target) = self.index.get(dependency) else {
                    return Err(DataPipeError::DependencyNotFound {
                        dependency: dependency.clone(),
                        required_by: node.id().clone(),
                    });
                };

                match marks[target] {
                    Some(Mark::Done) => {}
                    Some(Mark::Visiting) => return Err(self.cycle_error(&stack, target)),
                    None => {
                        marks[target] = Some(Mark::Visiting);
                        stack.push((target, 0));
                    }
                }
            }
        }

        debug!(order = ?sorted.iter().map(|n| n.id().as_str()).collect::<Vec<_>>(), "graph resolved");
        Ok(sorted)
    }

    /// Build the cycle path from the point where `target` entered the stack.
    fn cycle_error(&self, stack: &[(usize, usize)], target: usize) -> DataPipeError {
        let start = stack
            .iter()
            .position(|&(vertex, _)| vertex == target)
            .unwrap_or(0);

        let mut path: Vec<NodeId> = stack[start..]
            .iter()
            .map(|&(vertex, _)| self.nodes[vertex].id().clone())
            .collect();
        path.push(self.nodes[target].id().clone());

        DataPipeError::CircularDependency { path }
    }
}
