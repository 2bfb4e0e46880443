//! Pipeline execution engine.
//!
//! A [`Pipeline`] runs its nodes in a fixed order against one payload at a
//! time:
//!
//! 1. Notify listeners that the run starts
//! 2. For each node: ask listeners, skip collectors that are too expensive or
//!    redundant, then pipe the context through the node
//! 3. Resolve the proposed changes and apply the winners to the payload
//! 4. Notify listeners that the run is done and return the payload

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use datapipe_shared::{DataPipeError, Payload, Result};

use crate::context::PipelineContext;
use crate::hooks::{
    AfterCommit, AfterNode, AfterRun, BeforeChangeApplication, BeforeCommit, BeforeNode,
    BeforeRun, Decision, Hooks, NodeFailed, NodeRedundant, NodeSucceeded, NodeTooExpensive,
};
use crate::node::{Node, NodeKind, NodeRef};

/// An ordered list of nodes ready to process payloads.
///
/// Usually built with [`PipelineRegistry::build_pipeline`](crate::PipelineRegistry::build_pipeline).
#[derive(Clone)]
pub struct Pipeline {
    nodes: Vec<NodeRef>,
    hooks: Hooks,
}

impl Pipeline {
    /// Wrap nodes that are already in execution order.
    pub fn new(nodes: Vec<NodeRef>, hooks: Hooks) -> Self {
        Self { nodes, hooks }
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Run every node against `payload` and return the enriched copy.
    ///
    /// Collectors costing more than `maximum_cost` are skipped unless a
    /// listener clears them. `None` means no ceiling.
    #[instrument(
        skip_all,
        fields(run_id = tracing::field::Empty, nodes = self.nodes.len(), maximum_cost = ?maximum_cost)
    )]
    pub fn process(&self, payload: Payload, maximum_cost: Option<u32>) -> Result<Payload> {
        let start = Instant::now();
        let mut context = PipelineContext::new(payload);
        tracing::Span::current().record("run_id", tracing::field::display(context.run_id()));

        info!("starting pipeline run");
        self.hooks.before_run(&BeforeRun {
            context: &context,
            nodes: &self.nodes,
            maximum_cost,
        });

        for node in &self.nodes {
            context = self.apply(node.as_ref(), context, maximum_cost)?;
        }

        let payload = self.commit_changes(&context);
        context.adopt(payload.clone());

        self.hooks.after_run(&AfterRun {
            context: &context,
            payload: &payload,
            nodes: &self.nodes,
            maximum_cost,
        });

        info!(
            changed = ?payload.changed_attributes(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline run complete"
        );
        Ok(payload)
    }

    /// Run each payload in turn, stopping at the first error.
    pub fn process_all(
        &self,
        payloads: impl IntoIterator<Item = Payload>,
        maximum_cost: Option<u32>,
    ) -> Result<Vec<Payload>> {
        payloads
            .into_iter()
            .map(|payload| self.process(payload, maximum_cost))
            .collect()
    }

    /// Decide whether `node` runs and, if so, pipe the context through it.
    fn apply(
        &self,
        node: &dyn Node,
        context: PipelineContext,
        maximum_cost: Option<u32>,
    ) -> Result<PipelineContext> {
        let event = BeforeNode {
            node,
            context: &context,
            nodes: &self.nodes,
        };
        if self.hooks.before_node(&event, Decision::Continue).is_skip() {
            debug!(node = %node.id(), "node skipped by listener");
            return Ok(context);
        }

        if let NodeKind::Collector { cost, provides } = node.kind() {
            if let Some(maximum_cost) = maximum_cost.filter(|&ceiling| cost > ceiling) {
                let event = NodeTooExpensive {
                    node,
                    context: &context,
                    cost,
                    maximum_cost,
                };
                if self.hooks.node_too_expensive(&event, Decision::Skip).is_skip() {
                    debug!(node = %node.id(), cost, maximum_cost, "collector too expensive");
                    return Ok(context);
                }
            } else if cost > 0 {
                let missing = context.missing_attributes();
                if !provides.iter().any(|attribute| missing.contains(attribute)) {
                    let event = NodeRedundant {
                        node,
                        context: &context,
                        missing: &missing,
                    };
                    if self.hooks.node_redundant(&event, Decision::Skip).is_skip() {
                        debug!(node = %node.id(), ?missing, "collector redundant");
                        return Ok(context);
                    }
                }
            }
        }

        let start = Instant::now();
        let outcome = node.pipe(context.for_node(node));
        let duration = start.elapsed();

        match outcome {
            Ok(result) => {
                debug!(
                    node = %node.id(),
                    proposals = result.proposed_changes().len(),
                    elapsed_ms = duration.as_millis() as u64,
                    "node finished"
                );
                self.hooks.node_succeeded(&NodeSucceeded {
                    node,
                    context: &result,
                    duration,
                });
                self.hooks.after_node(&AfterNode {
                    node,
                    context: &result,
                    nodes: &self.nodes,
                    duration,
                    success: true,
                });
                Ok(result)
            }
            Err(error) => {
                let event = NodeFailed {
                    error: error.as_ref(),
                    node,
                    context: &context,
                    duration,
                };
                let decision = self.hooks.node_failed(&event, Decision::Continue);
                self.hooks.after_node(&AfterNode {
                    node,
                    context: &context,
                    nodes: &self.nodes,
                    duration,
                    success: false,
                });

                if decision.is_skip() {
                    warn!(node = %node.id(), %error, "node failed, continuing");
                    return Ok(context);
                }
                Err(DataPipeError::NodeExecution {
                    node: node.id().clone(),
                    elapsed: duration,
                    payload: Box::new(context.payload()),
                    pending: context.proposed_changes().iter().cloned().collect(),
                    source: error,
                })
            }
        }
    }

    /// Resolve winning changes and apply those the listeners let through.
    #[instrument(skip_all, fields(proposals = context.proposed_changes().len()))]
    fn commit_changes(&self, context: &PipelineContext) -> Payload {
        let mut payload = context.payload();

        let mut event = BeforeCommit::new(context, &payload, context.resolve_changes());
        self.hooks.before_commit(&mut event);
        let winners = event.into_changes();

        let mut applied = Vec::with_capacity(winners.len());
        for change in winners {
            let event = BeforeChangeApplication {
                context,
                change: &change,
            };
            if self
                .hooks
                .before_change_application(&event, Decision::Continue)
                .is_skip()
            {
                debug!(attribute = change.attribute(), "change application skipped");
                continue;
            }

            match change.apply(&mut payload) {
                Ok(()) => applied.push(change),
                Err(e) => warn!(attribute = change.attribute(), error = %e, "change not applied"),
            }
        }

        self.hooks.after_commit(&AfterCommit {
            context,
            applied: &applied,
            payload: &payload,
        });

        debug!(applied = applied.len(), "changes committed");
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ProposedChange;
    use crate::hooks::PipelineListener;
    use crate::registry::PipelineRegistry;
    use crate::test_support::{CallLog, TestNode};
    use datapipe_shared::{NodeId, Value};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn payload(value: Value) -> Payload {
        Payload::from_json(value).unwrap()
    }

    fn pipeline(nodes: Vec<Arc<TestNode>>, hooks: Hooks) -> Pipeline {
        let mut registry = PipelineRegistry::with_hooks(hooks);
        for node in nodes {
            registry.add_node(node);
        }
        registry.build_pipeline().unwrap()
    }

    #[test]
    fn transformer_derives_value_from_payload() {
        let doubler = Arc::new(TestNode::transformer("double").with_pipe(|mut ctx| {
            let b = ctx.attribute("b").and_then(Value::as_i64).unwrap_or(0);
            ctx.propose_change("a", b * 4, 1)?;
            Ok(ctx)
        }));
        let pipeline = pipeline(vec![doubler], Hooks::new());

        let result = pipeline.process(payload(json!({"a": null, "b": 5})), None).unwrap();
        assert_eq!(result.attribute("a"), Some(&json!(20)));
        assert_eq!(result.attribute("b"), Some(&json!(5)));
        assert_eq!(result.changed_attributes(), vec!["a"]);
    }

    #[test]
    fn cheap_confident_collector_beats_costly_one() {
        let costly = Arc::new(TestNode::collector("costly", 1, &["a"]).proposing("a", json!(10), 1));
        let free = Arc::new(TestNode::collector("free", 0, &["a"]).proposing("a", json!(20), 5));
        let pipeline = pipeline(vec![costly, free], Hooks::new());

        let result = pipeline.process(payload(json!({"a": null, "b": 5})), None).unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"a": 20, "b": 5})
        );
    }

    #[test]
    fn collector_for_already_set_attributes_is_not_invoked() {
        let stale = Arc::new(TestNode::collector("stale", 3, &["b"]));
        let pipeline = pipeline(vec![Arc::clone(&stale)], Hooks::new());

        pipeline
            .process(payload(json!({"a": null, "b": "set"})), None)
            .unwrap();
        assert_eq!(stale.calls(), 0);
    }

    #[test]
    fn highest_confidence_wins_across_nodes() {
        let low = Arc::new(TestNode::transformer("low").proposing("x", json!(3), 3));
        let high = Arc::new(TestNode::transformer("high").proposing("x", json!(7), 7));
        let late_low = Arc::new(TestNode::transformer("late").proposing("x", json!(1), 1));
        let pipeline = pipeline(vec![low, high, late_low], Hooks::new());

        let result = pipeline.process(payload(json!({"x": null})), None).unwrap();
        assert_eq!(result.attribute("x"), Some(&json!(7)));
    }

    #[test]
    fn ceiling_skips_expensive_collectors() {
        let pricey = Arc::new(TestNode::collector("pricey", 10, &["a"]).proposing("a", json!(1), 1));
        let pipeline = pipeline(vec![Arc::clone(&pricey)], Hooks::new());

        let result = pipeline.process(payload(json!({"a": null})), Some(5)).unwrap();
        assert_eq!(pricey.calls(), 0);
        assert_eq!(result.attribute("a"), None);

        let result = pipeline.process(payload(json!({"a": null})), None).unwrap();
        assert_eq!(pricey.calls(), 1);
        assert_eq!(result.attribute("a"), Some(&json!(1)));
    }

    #[test]
    fn zero_ceiling_still_allows_free_collectors() {
        let free = Arc::new(TestNode::collector("free", 0, &[]));
        let cheap = Arc::new(TestNode::collector("cheap", 1, &["a"]));
        let pipeline = pipeline(vec![Arc::clone(&free), Arc::clone(&cheap)], Hooks::new());

        pipeline.process(payload(json!({"a": null})), Some(0)).unwrap();
        assert_eq!(free.calls(), 1);
        assert_eq!(cheap.calls(), 0);
    }

    #[test]
    fn redundant_collectors_are_skipped() {
        let first = Arc::new(TestNode::collector("first", 1, &["a"]).proposing("a", json!("x"), 1));
        let second = Arc::new(TestNode::collector("second", 2, &["a"]));
        let useful = Arc::new(TestNode::collector("useful", 3, &["a", "b"]));
        let pipeline = pipeline(
            vec![Arc::clone(&first), Arc::clone(&second), Arc::clone(&useful)],
            Hooks::new(),
        );

        pipeline
            .process(payload(json!({"a": null, "b": null})), None)
            .unwrap();
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
        assert_eq!(useful.calls(), 1);
    }

    #[test]
    fn failure_aborts_the_run() {
        let log = CallLog::default();
        let broken = Arc::new(TestNode::transformer("broken").failing("boom").logging_to(&log));
        let after = Arc::new(TestNode::transformer("after").logging_to(&log));
        let pipeline = pipeline(vec![broken, Arc::clone(&after)], Hooks::new());

        let err = pipeline.process(payload(json!({})), None).unwrap_err();
        match &err {
            DataPipeError::NodeExecution { node, source, .. } => {
                assert_eq!(node.as_str(), "broken");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(after.calls(), 0);
        assert_eq!(*log.lock().unwrap(), vec!["broken"]);
    }

    #[test]
    fn failure_error_carries_pre_failure_state() {
        let early = Arc::new(TestNode::transformer("early").proposing("a", json!("kept"), 2));
        let broken = Arc::new(TestNode::transformer("broken").with_pipe(|mut ctx| {
            ctx.propose_change("b", "partial", 9)?;
            Err("boom".into())
        }));
        let pipeline = pipeline(vec![early, broken], Hooks::new());

        let err = pipeline
            .process(payload(json!({"a": null, "b": 1})), None)
            .unwrap_err();
        let (payload, pending) = err.failure_state().unwrap();

        assert_eq!(payload.attribute("b"), Some(&json!(1)));
        assert_eq!(payload.attribute("a"), None);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].node().as_str(), "early");
        assert_eq!(pending[0].attribute(), "a");
        assert_eq!(pending[0].new_value(), &json!("kept"));
    }

    #[test]
    fn redundant_skip_can_be_cleared() {
        #[derive(Default)]
        struct Keep(Mutex<Vec<String>>);
        impl PipelineListener for Keep {
            fn node_redundant(&self, event: &NodeRedundant<'_>, _decision: Decision) -> Decision {
                self.0.lock().unwrap().extend(event.missing.iter().cloned());
                Decision::Continue
            }
        }

        let keep = Arc::new(Keep::default());
        let mut hooks = Hooks::new();
        hooks.register(keep.clone());
        let stale = Arc::new(TestNode::collector("stale", 3, &["b"]).proposing("b", json!("fresh"), 1));
        let pipeline = pipeline(vec![Arc::clone(&stale)], hooks);

        let result = pipeline
            .process(payload(json!({"a": null, "b": "set", "c": ""})), None)
            .unwrap();
        assert_eq!(stale.calls(), 1);
        assert_eq!(*keep.0.lock().unwrap(), vec!["a", "c"]);
        assert_eq!(result.attribute("b"), Some(&json!("fresh")));
    }

    #[test]
    fn after_node_fires_before_failure_propagates() {
        #[derive(Default)]
        struct Outcomes(Mutex<Vec<(String, bool)>>);
        impl PipelineListener for Outcomes {
            fn after_node(&self, event: &AfterNode<'_>) {
                self.0
                    .lock()
                    .unwrap()
                    .push((event.node.id().to_string(), event.success));
            }
        }

        let outcomes = Arc::new(Outcomes::default());
        let mut hooks = Hooks::new();
        hooks.register(outcomes.clone());
        let pipeline = pipeline(
            vec![
                Arc::new(TestNode::transformer("ok")),
                Arc::new(TestNode::transformer("broken").failing("boom")),
            ],
            hooks,
        );

        assert!(pipeline.process(payload(json!({})), None).is_err());
        assert_eq!(
            *outcomes.0.lock().unwrap(),
            vec![("ok".to_string(), true), ("broken".to_string(), false)]
        );
    }

    #[test]
    fn swallowed_failure_keeps_pre_failure_context() {
        struct Swallow;
        impl PipelineListener for Swallow {
            fn node_failed(&self, _event: &NodeFailed<'_>, _decision: Decision) -> Decision {
                Decision::Skip
            }
        }

        let half_done = Arc::new(TestNode::transformer("half").with_pipe(|mut ctx| {
            ctx.propose_change("a", "lost", 100)?;
            Err("gave up".into())
        }));
        let fine = Arc::new(TestNode::transformer("fine").proposing("b", json!("kept"), 1));
        let pipeline = pipeline(vec![half_done, Arc::clone(&fine)], Hooks::new().with(Swallow));

        let result = pipeline
            .process(payload(json!({"a": null, "b": null})), None)
            .unwrap();
        assert_eq!(fine.calls(), 1);
        assert_eq!(result.attribute("a"), None);
        assert_eq!(result.attribute("b"), Some(&json!("kept")));
    }

    #[test]
    fn before_node_skip_prevents_invocation() {
        struct SkipNamed(&'static str);
        impl PipelineListener for SkipNamed {
            fn before_node(&self, event: &BeforeNode<'_>, decision: Decision) -> Decision {
                if event.node.id().as_str() == self.0 {
                    Decision::Skip
                } else {
                    decision
                }
            }
        }

        let skipped = Arc::new(TestNode::transformer("skipped"));
        let kept = Arc::new(TestNode::transformer("kept"));
        let pipeline = pipeline(
            vec![Arc::clone(&skipped), Arc::clone(&kept)],
            Hooks::new().with(SkipNamed("skipped")),
        );

        pipeline.process(payload(json!({})), None).unwrap();
        assert_eq!(skipped.calls(), 0);
        assert_eq!(kept.calls(), 1);
    }

    #[test]
    fn before_commit_can_replace_winners() {
        struct Override;
        impl PipelineListener for Override {
            fn before_commit(&self, event: &mut BeforeCommit<'_>) {
                assert_eq!(event.changes().len(), 1);
                event.set_changes(vec![ProposedChange::new(
                    NodeId::from("override"),
                    "b",
                    json!("forced"),
                    None,
                    0,
                )]);
            }
        }

        let node = Arc::new(TestNode::transformer("t").proposing("a", json!(1), 1));
        let pipeline = pipeline(vec![node], Hooks::new().with(Override));

        let result = pipeline
            .process(payload(json!({"a": null, "b": null})), None)
            .unwrap();
        assert_eq!(result.attribute("a"), None);
        assert_eq!(result.attribute("b"), Some(&json!("forced")));
    }

    #[test]
    fn change_application_can_be_skipped() {
        #[derive(Default)]
        struct Guard(Mutex<Vec<String>>);
        impl PipelineListener for Guard {
            fn before_change_application(
                &self,
                event: &BeforeChangeApplication<'_>,
                decision: Decision,
            ) -> Decision {
                if event.change.attribute() == "locked" {
                    Decision::Skip
                } else {
                    decision
                }
            }

            fn after_commit(&self, event: &AfterCommit<'_>) {
                let mut applied = self.0.lock().unwrap();
                applied.extend(event.applied.iter().map(|c| c.attribute().to_string()));
            }
        }

        let guard = Arc::new(Guard::default());
        let mut hooks = Hooks::new();
        hooks.register(guard.clone());
        let node = Arc::new(TestNode::transformer("t").with_pipe(|mut ctx| {
            ctx.propose_change("locked", 1, 1)?;
            ctx.propose_change("open", 2, 1)?;
            Ok(ctx)
        }));
        let pipeline = pipeline(vec![node], hooks);

        let result = pipeline
            .process(payload(json!({"locked": "orig", "open": null})), None)
            .unwrap();
        assert_eq!(result.attribute("locked"), Some(&json!("orig")));
        assert_eq!(result.attribute("open"), Some(&json!(2)));
        assert_eq!(*guard.0.lock().unwrap(), vec!["open"]);
    }

    #[test]
    fn listeners_see_run_boundaries() {
        #[derive(Default)]
        struct Boundaries(Mutex<Vec<String>>);
        impl PipelineListener for Boundaries {
            fn before_run(&self, event: &BeforeRun<'_>) {
                self.0
                    .lock()
                    .unwrap()
                    .push(format!("start {:?}", event.maximum_cost));
            }
            fn after_run(&self, event: &AfterRun<'_>) {
                assert!(event.context.proposed_changes().is_empty());
                self.0
                    .lock()
                    .unwrap()
                    .push(format!("end {}", event.payload.changed_attributes().len()));
            }
        }

        let boundaries = Arc::new(Boundaries::default());
        let mut hooks = Hooks::new();
        hooks.register(boundaries.clone());
        let node = Arc::new(TestNode::transformer("t").proposing("a", json!(1), 1));
        let pipeline = pipeline(vec![node], hooks);

        pipeline.process(payload(json!({"a": null})), Some(3)).unwrap();
        assert_eq!(*boundaries.0.lock().unwrap(), vec!["start Some(3)", "end 1"]);
    }

    #[test]
    fn process_all_runs_payloads_independently() {
        let node = Arc::new(TestNode::transformer("t").proposing("a", json!("set"), 1));
        let pipeline = pipeline(vec![Arc::clone(&node)], Hooks::new());

        let results = pipeline
            .process_all(
                vec![payload(json!({"a": null})), payload(json!({"a": "old", "b": 1}))],
                None,
            )
            .unwrap();
        assert_eq!(node.calls(), 2);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|p| p.attribute("a") == Some(&json!("set"))));
        assert_eq!(results[1].attribute("b"), Some(&json!(1)));
    }

    #[test]
    fn empty_pipeline_returns_payload_unchanged() {
        let pipeline = Pipeline::new(Vec::new(), Hooks::new());
        let result = pipeline.process(payload(json!({"a": 1})), None).unwrap();
        assert_eq!(result.attribute("a"), Some(&json!(1)));
        assert!(result.changed_attributes().is_empty());
    }
}
