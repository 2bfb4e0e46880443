//! Built-in pipeline listeners.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use datapipe_shared::NodeId;

use crate::hooks::{
    AfterCommit, AfterNode, AfterRun, BeforeRun, Decision, NodeFailed, NodeRedundant,
    NodeTooExpensive, PipelineListener,
};

/// Reports pipeline events through `tracing`. Never changes a decision.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl PipelineListener for TracingListener {
    fn before_run(&self, event: &BeforeRun<'_>) {
        info!(
            run_id = %event.context.run_id(),
            nodes = event.nodes.len(),
            maximum_cost = ?event.maximum_cost,
            "run started"
        );
    }

    fn node_too_expensive(&self, event: &NodeTooExpensive<'_>, decision: Decision) -> Decision {
        info!(
            node = %event.node.id(),
            cost = event.cost,
            maximum_cost = event.maximum_cost,
            ?decision,
            "collector over cost ceiling"
        );
        decision
    }

    fn node_redundant(&self, event: &NodeRedundant<'_>, decision: Decision) -> Decision {
        debug!(node = %event.node.id(), missing = ?event.missing, ?decision, "collector redundant");
        decision
    }

    fn node_failed(&self, event: &NodeFailed<'_>, decision: Decision) -> Decision {
        warn!(
            node = %event.node.id(),
            error = %event.error,
            elapsed_ms = event.duration.as_millis() as u64,
            "node failed"
        );
        decision
    }

    fn after_node(&self, event: &AfterNode<'_>) {
        debug!(
            node = %event.node.id(),
            success = event.success,
            elapsed_ms = event.duration.as_millis() as u64,
            pending = event.pending_nodes().len(),
            "node done"
        );
    }

    fn after_commit(&self, event: &AfterCommit<'_>) {
        for change in event.applied {
            debug!(
                node = %change.node(),
                attribute = change.attribute(),
                confidence = change.confidence(),
                "change applied"
            );
        }
    }

    fn after_run(&self, event: &AfterRun<'_>) {
        info!(
            run_id = %event.context.run_id(),
            changed = event.payload.changed_attributes().len(),
            "run finished"
        );
    }
}

/// Timing of one node invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeTiming {
    pub node: NodeId,
    #[serde(rename = "duration_ms")]
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Collects per-node timings across runs.
#[derive(Debug, Default)]
pub struct TimingRecorder {
    timings: Mutex<Vec<NodeTiming>>,
}

impl TimingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the timings recorded so far.
    pub fn timings(&self) -> Vec<NodeTiming> {
        self.timings
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.timings().iter().map(|t| t.duration).sum()
    }

    pub fn clear(&self) {
        if let Ok(mut timings) = self.timings.lock() {
            timings.clear();
        }
    }
}

impl PipelineListener for TimingRecorder {
    fn after_node(&self, event: &AfterNode<'_>) {
        let timing = NodeTiming {
            node: event.node.id().clone(),
            duration: event.duration,
            success: event.success,
            recorded_at: Utc::now(),
        };
        match self.timings.lock() {
            Ok(mut timings) => timings.push(timing),
            Err(_) => warn!(node = %timing.node, "timing recorder poisoned, dropping entry"),
        }
    }
}

/// Keeps the run going when a node fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContinueOnFailure;

impl PipelineListener for ContinueOnFailure {
    fn node_failed(&self, _event: &NodeFailed<'_>, _decision: Decision) -> Decision {
        Decision::Skip
    }
}

/// Runs collectors regardless of the cost ceiling.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowExpensive;

impl PipelineListener for AllowExpensive {
    fn node_too_expensive(&self, _event: &NodeTooExpensive<'_>, _decision: Decision) -> Decision {
        Decision::Continue
    }
}
