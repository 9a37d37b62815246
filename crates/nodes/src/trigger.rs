//! Trigger runners.
//!
//! In a normal execution the engine materializes the trigger event onto the
//! trigger node's outputs without invoking a runner at all — the subtype
//! exists so graphs can declare which triggers are admissible. The runner
//! still behaves sensibly (echoing the trigger event) for resume-from-node
//! executions and registry completeness.

use async_trait::async_trait;
use weft_runner::{NodeInput, NodeRunner, RunContext, RunnerError, RunnerOutcome, RunnerSpec};
use weft_workflow::NodeKind;

/// Runner for trigger nodes (`manual`, `webhook`, `schedule`).
pub struct TriggerRunner {
    spec: RunnerSpec,
}

impl TriggerRunner {
    /// Create a trigger runner for one subtype.
    #[must_use]
    pub fn new(subtype: &str) -> Self {
        Self {
            spec: RunnerSpec::new(
                NodeKind::Trigger,
                subtype,
                format!("Starts the workflow from a {subtype} trigger"),
            ),
        }
    }
}

#[async_trait]
impl NodeRunner for TriggerRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(
        &self,
        ctx: &RunContext,
        _input: &NodeInput,
    ) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;
        Ok(RunnerOutcome::result(ctx.trigger.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{ExecutionId, NodeId, WorkflowId};

    #[tokio::test]
    async fn echoes_trigger_event() {
        let runner = TriggerRunner::new("manual");
        let ctx = RunContext::new(
            ExecutionId::v4(),
            WorkflowId::v4(),
            NodeId::v4(),
            "start",
        )
        .with_trigger(serde_json::json!({"x": 21}));

        let outcome = runner.run(&ctx, &NodeInput::new()).await.unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&serde_json::json!({"x": 21}))
        );
    }

    #[test]
    fn subtype_is_registered_key() {
        assert_eq!(TriggerRunner::new("webhook").spec().subtype, "webhook");
        assert_eq!(TriggerRunner::new("webhook").spec().kind, NodeKind::Trigger);
    }
}
