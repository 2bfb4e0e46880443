//! Closure-backed nodes for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use datapipe_shared::{NodeId, Value};

use crate::context::PipelineContext;
use crate::node::{Node, NodeKind, NodeResult};

type PipeFn = dyn Fn(PipelineContext) -> NodeResult + Send + Sync;

/// Shared log of node invocations, in call order.
pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

pub(crate) struct TestNode {
    id: NodeId,
    name: String,
    kind: NodeKind,
    dependencies: Vec<NodeId>,
    pipe: Box<PipeFn>,
    calls: AtomicUsize,
    log: Option<CallLog>,
}

impl TestNode {
    fn new(id: &str, kind: NodeKind) -> Self {
        Self {
            id: NodeId::from(id),
            name: id.to_string(),
            kind,
            dependencies: Vec::new(),
            pipe: Box::new(|ctx: PipelineContext| -> NodeResult { Ok(ctx) }),
            calls: AtomicUsize::new(0),
            log: None,
        }
    }

    pub(crate) fn collector(id: &str, cost: u32, provides: &[&str]) -> Self {
        Self::new(id, NodeKind::collector(cost, provides.iter().copied()))
    }

    pub(crate) fn transformer(id: &str) -> Self {
        Self::new(id, NodeKind::Transformer)
    }

    pub(crate) fn depends_on(mut self, ids: &[&str]) -> Self {
        self.dependencies = ids.iter().map(|id| NodeId::from(*id)).collect();
        self
    }

    pub(crate) fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub(crate) fn logging_to(mut self, log: &CallLog) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    pub(crate) fn with_pipe(
        mut self,
        pipe: impl Fn(PipelineContext) -> NodeResult + Send + Sync + 'static,
    ) -> Self {
        self.pipe = Box::new(pipe);
        self
    }

    pub(crate) fn proposing(self, attribute: &'static str, value: Value, confidence: i64) -> Self {
        self.with_pipe(move |mut ctx| {
            ctx.propose_change(attribute, value.clone(), confidence)?;
            Ok(ctx)
        })
    }

    pub(crate) fn failing(self, message: &'static str) -> Self {
        self.with_pipe(move |_| Err(message.into()))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Node for TestNode {
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
        self.kind.clone()
    }

    fn pipe(&self, context: PipelineContext) -> NodeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.id.to_string());
        }
        (self.pipe)(context)
    }
}

pub(crate) fn ids(nodes: &[crate::node::NodeRef]) -> Vec<&str> {
    nodes.iter().map(|n| n.id().as_str()).collect()
}
