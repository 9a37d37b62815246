//! The workflow execution engine.
//!
//! Owns the dispatch loop: selects ready nodes in deterministic order,
//! invokes runners on a bounded worker pool, routes outputs along edges,
//! and handles pause/resume, cancellation, retries and the error policy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use weft_core::{ExecutionId, InteractionId, NodeId, UserId};
use weft_execution::{
    EventType, ExecutionState, ExecutionStatus, LogEntry, PauseReason, PauseRecord, RunFailure,
    TimeoutAction,
};
use weft_runner::{
    Adapters, NodeInput, NodeRunner, PortMap, RunContext, RunnerError, RunnerOutcome,
    RunnerRegistry, SubgraphHandle, ToolDescriptor, ToolHandle, WaitSignal,
};
use weft_storage::{
    ExecutionRepository, LogRepository, PauseRepository, WorkflowRepository,
};
use weft_workflow::{
    Connection, ConnectionKind, DependencyGraph, ErrorPolicy, NodeDefinition, NodeKind, NodeState,
    ValidateMode, WorkflowDefinition,
};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::router;
use crate::sink::LogSink;

/// Options for [`WorkflowEngine::execute_workflow`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Start dispatch from this node instead of the trigger nodes; the
    /// trigger payload is delivered as the node's input.
    pub start_from_node: Option<NodeId>,
    /// Skip matching the trigger kind against trigger-node subtypes.
    pub skip_trigger_validation: bool,
    /// Declared kind of the trigger event (e.g. `"webhook"`); when present
    /// and not skipped, a trigger node of that subtype must exist.
    pub trigger_kind: Option<String>,
    /// User the execution acts on behalf of.
    pub user_id: Option<UserId>,
}

/// What the caller gets back from starting an execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionHandle {
    /// The new execution's id.
    pub execution_id: ExecutionId,
    /// Status when control returned: terminal, or `Paused`.
    pub status: ExecutionStatus,
}

/// How the resumer classifies an incoming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeClassification {
    /// Explicit approval.
    Approved,
    /// Explicit rejection.
    Rejected,
    /// Timer or deadline expiry.
    TimedOut,
    /// Anything else — subject to relevance classification.
    Other,
}

impl ResumeClassification {
    fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed_out",
            Self::Other => "other",
        }
    }
}

/// A loaded execution record: state plus logs.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// The execution state.
    pub state: ExecutionState,
    /// Logs — hot entries when cached, otherwise persisted milestones.
    pub logs: Vec<LogEntry>,
}

/// Per-workflow derived dispatch plan.
struct ExecPlan {
    workflow: Arc<WorkflowDefinition>,
    graph: Arc<DependencyGraph>,
    /// Nodes feeding agents via support edges; never dispatched top-level.
    support_nodes: HashSet<NodeId>,
    /// Union of all `for_each` body closures; dispatched per-iteration.
    body_nodes: HashSet<NodeId>,
    /// Body closure per `for_each` node.
    loop_bodies: HashMap<NodeId, HashSet<NodeId>>,
    user_id: Option<UserId>,
}

impl ExecPlan {
    fn build(
        workflow: Arc<WorkflowDefinition>,
        user_id: Option<UserId>,
    ) -> Result<Self, EngineError> {
        let graph = Arc::new(DependencyGraph::from_definition(&workflow)?);

        let mut support_nodes = HashSet::new();
        for conn in &workflow.connections {
            if conn.kind != ConnectionKind::Main {
                support_nodes.insert(conn.source);
            }
        }

        let mut loop_bodies = HashMap::new();
        let mut body_nodes = HashSet::new();
        for node in &workflow.nodes {
            if node.kind == NodeKind::Flow && node.subtype == "for_each" {
                let entries: Vec<NodeId> = graph
                    .outgoing(node.id)
                    .iter()
                    .map(|&idx| &workflow.connections[idx])
                    .filter(|conn| conn.kind == ConnectionKind::Main && conn.output_key == "item")
                    .map(|conn| conn.target)
                    .collect();
                let mut body: HashSet<NodeId> = graph.downstream_closure(&entries);
                body.extend(entries);
                body_nodes.extend(body.iter().copied());
                loop_bodies.insert(node.id, body);
            }
        }

        Ok(Self {
            workflow,
            graph,
            support_nodes,
            body_nodes,
            loop_bodies,
            user_id,
        })
    }

    fn connection(&self, idx: usize) -> &Connection {
        &self.workflow.connections[idx]
    }

    /// Incoming Main connections of a node, in authoring order.
    fn incoming_main(&self, node: NodeId) -> Vec<usize> {
        self.graph
            .incoming(node)
            .iter()
            .copied()
            .filter(|&idx| self.connection(idx).kind == ConnectionKind::Main)
            .collect()
    }

    fn total_steps(&self, state: &ExecutionState) -> u32 {
        state
            .node_runs
            .values()
            .filter(|run| run.state != NodeState::Skipped)
            .filter(|run| {
                !self.support_nodes.contains(&run.node_id)
                    && !self.body_nodes.contains(&run.node_id)
            })
            .count() as u32
    }
}

/// The engine. Cheap to share as `Arc<WorkflowEngine>`; one instance serves
/// many concurrent executions with no shared mutable state beyond the
/// repositories.
pub struct WorkflowEngine {
    registry: Arc<RunnerRegistry>,
    adapters: Adapters,
    workflows: Arc<dyn WorkflowRepository>,
    executions: Arc<dyn ExecutionRepository>,
    pauses: Arc<dyn PauseRepository>,
    sink: Arc<LogSink>,
    config: EngineConfig,
    cancellations: DashMap<ExecutionId, CancellationToken>,
}

impl WorkflowEngine {
    /// Create an engine over the given registry, adapters and repositories.
    #[must_use]
    pub fn new(
        registry: Arc<RunnerRegistry>,
        adapters: Adapters,
        workflows: Arc<dyn WorkflowRepository>,
        executions: Arc<dyn ExecutionRepository>,
        pauses: Arc<dyn PauseRepository>,
        logs: Arc<dyn LogRepository>,
        config: EngineConfig,
    ) -> Self {
        let sink = Arc::new(LogSink::new(logs, config.hot_log_capacity));
        Self {
            registry,
            adapters,
            workflows,
            executions,
            pauses,
            sink,
            config,
            cancellations: DashMap::new(),
        }
    }

    /// The engine's log sink.
    #[must_use]
    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The pause repository (shared with the timeout monitor).
    #[must_use]
    pub fn pauses(&self) -> &Arc<dyn PauseRepository> {
        &self.pauses
    }

    // ── Public operations ───────────────────────────────────────────────────

    /// Validate and execute a workflow against a trigger event.
    ///
    /// Returns when the execution reaches a terminal status or pauses on a
    /// wait signal.
    pub async fn execute_workflow(
        self: &Arc<Self>,
        workflow: WorkflowDefinition,
        trigger: serde_json::Value,
        opts: ExecuteOptions,
    ) -> Result<ExecutionHandle, EngineError> {
        let mode = if opts.start_from_node.is_some() {
            ValidateMode::ResumeFromNode
        } else {
            ValidateMode::Full
        };
        workflow.validate(mode)?;
        for node in &workflow.nodes {
            self.registry
                .validate_node(node)
                .map_err(|e| EngineError::InvalidGraph(e.to_string()))?;
        }

        if !opts.skip_trigger_validation {
            if let Some(kind) = &opts.trigger_kind {
                let admissible = workflow
                    .nodes
                    .iter()
                    .any(|n| n.kind == NodeKind::Trigger && n.subtype == *kind);
                if !admissible {
                    return Err(EngineError::TriggerNotApplicable(format!(
                        "no {kind:?} trigger node in workflow {:?}",
                        workflow.name
                    )));
                }
            }
        }

        let workflow = Arc::new(workflow);
        self.workflows.save((*workflow).clone()).await?;
        let plan = ExecPlan::build(workflow.clone(), opts.user_id)?;

        let execution_id = ExecutionId::v4();
        let node_ids: Vec<NodeId> = workflow.nodes.iter().map(|n| n.id).collect();
        let mut state = ExecutionState::new(execution_id, workflow.id, trigger, &node_ids);
        state.user_id = opts.user_id;

        self.init_state(&plan, &mut state, opts.start_from_node)?;
        state.transition_status(ExecutionStatus::Running)?;
        self.executions.save(&state).await?;

        self.sink
            .emit(
                LogEntry::new(
                    execution_id,
                    EventType::WorkflowStarted,
                    format!("🚀 Workflow {:?} started", workflow.name),
                )
                .with_data(serde_json::json!({"workflow_id": workflow.id})),
            )
            .await?;

        let cancel = CancellationToken::new();
        self.cancellations.insert(execution_id, cancel.clone());
        let result = self
            .drive(&plan, &mut state, opts.start_from_node, cancel)
            .await;
        self.cancellations.remove(&execution_id);
        result?;

        Ok(ExecutionHandle {
            execution_id,
            status: state.status,
        })
    }

    /// Resume a paused execution with a human or system response.
    pub async fn resume_execution(
        self: &Arc<Self>,
        execution_id: ExecutionId,
        node_id: NodeId,
        response: serde_json::Value,
        classification: ResumeClassification,
    ) -> Result<ExecutionStatus, EngineError> {
        let mut state = self
            .executions
            .get(execution_id)
            .await?
            .ok_or(EngineError::NotFound(execution_id))?;
        if state.status != ExecutionStatus::Paused {
            return Err(EngineError::NoPendingPause(execution_id));
        }
        let Some(record) = self.pauses.get(execution_id).await? else {
            return Err(EngineError::NoPendingPause(execution_id));
        };
        if record.node_id != node_id {
            return Err(EngineError::NoPendingPause(execution_id));
        }

        self.validate_response(&record, &response, classification)
            .await?;

        // The linearization point: losing the race to the timeout monitor
        // means there is no longer a pause to resume.
        if !self
            .pauses
            .delete_if_version(execution_id, record.version)
            .await?
        {
            return Err(EngineError::NoPendingPause(execution_id));
        }

        let workflow = self
            .workflows
            .get(state.workflow_id)
            .await?
            .ok_or_else(|| EngineError::internal("workflow snapshot missing"))?;
        let plan = ExecPlan::build(Arc::new(workflow), state.user_id)?;

        self.sink
            .emit(
                LogEntry::new(
                    execution_id,
                    EventType::HumanInteraction,
                    format!("👤 Response received ({})", classification.as_str()),
                )
                .with_node(node_id)
                .with_data(serde_json::json!({"classification": classification.as_str()})),
            )
            .await?;

        let node = plan
            .workflow
            .node(node_id)
            .ok_or_else(|| EngineError::internal("paused node missing from workflow"))?;
        let fail_on_rejection = node
            .config_value("fail_on_rejection")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        if classification == ResumeClassification::Rejected && fail_on_rejection {
            let failure = RunFailure {
                kind: "rejected".to_owned(),
                message: "response rejected by the approver".to_owned(),
                advice: None,
            };
            self.fail_waiting_node(&plan, &mut state, node_id, failure)
                .await?;
        } else {
            let mut ports = PortMap::new();
            ports.insert(
                weft_workflow::DEFAULT_OUTPUT_PORT.to_owned(),
                serde_json::json!({
                    "response": response,
                    "classification": classification.as_str(),
                    "approved": classification == ResumeClassification::Approved,
                }),
            );
            self.complete_waiting_node(&plan, &mut state, node_id, ports)
                .await?;
        }

        if !state.status.is_terminal() {
            state.transition_status(ExecutionStatus::Running)?;
            self.executions.save(&state).await?;
            let cancel = CancellationToken::new();
            self.cancellations.insert(execution_id, cancel.clone());
            let result = self.drive(&plan, &mut state, None, cancel).await;
            self.cancellations.remove(&execution_id);
            result?;
        }
        Ok(state.status)
    }

    /// Cancel an execution. Idempotent: cancelling a terminal execution
    /// reports its status without mutating anything.
    pub async fn cancel_execution(
        self: &Arc<Self>,
        execution_id: ExecutionId,
    ) -> Result<ExecutionStatus, EngineError> {
        let state = self
            .executions
            .get(execution_id)
            .await?
            .ok_or(EngineError::NotFound(execution_id))?;
        if state.status.is_terminal() {
            return Ok(state.status);
        }

        if let Some(token) = self.cancellations.get(&execution_id) {
            token.cancel();
            drop(token);
            // The owning drive loop acknowledges within the grace window.
            let deadline = tokio::time::Instant::now() + self.config.cancel_grace;
            while tokio::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(25)).await;
                if let Some(current) = self.executions.get(execution_id).await? {
                    if current.status.is_terminal() {
                        return Ok(current.status);
                    }
                }
            }
            self.sink
                .emit(
                    LogEntry::new(
                        execution_id,
                        EventType::Cancelled,
                        "⚠️ cancel_timeout: runners did not stop within the grace window",
                    )
                    .with_level(weft_execution::LogLevel::Warn),
                )
                .await?;
        }

        // Paused execution, or a stale Running record with no live loop.
        let mut state = self
            .executions
            .get(execution_id)
            .await?
            .ok_or(EngineError::NotFound(execution_id))?;
        if state.status.is_terminal() {
            return Ok(state.status);
        }

        if let Some(record) = self.pauses.get(execution_id).await? {
            let _ = self
                .pauses
                .delete_if_version(execution_id, record.version)
                .await?;
        }

        for run in state.node_runs.values_mut() {
            if !run.state.is_terminal() {
                let _ = run.transition_to(NodeState::Cancelled);
            }
        }
        state.transition_status(ExecutionStatus::Cancelling)?;
        state.transition_status(ExecutionStatus::Cancelled)?;
        self.executions.save(&state).await?;
        self.sink
            .emit(LogEntry::new(
                execution_id,
                EventType::Cancelled,
                "🛑 Execution cancelled",
            ))
            .await?;
        Ok(state.status)
    }

    /// Load an execution record with its logs.
    pub async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ExecutionRecord, EngineError> {
        let state = self
            .executions
            .get(execution_id)
            .await?
            .ok_or(EngineError::NotFound(execution_id))?;
        let logs = self.sink.logs(execution_id).await?;
        Ok(ExecutionRecord { state, logs })
    }

    // ── Timeout handling (called by the monitor) ────────────────────────────

    /// Apply a pause record's timeout action. Returns `false` when the race
    /// against an external resume was lost.
    pub async fn apply_timeout(
        self: &Arc<Self>,
        record: &PauseRecord,
    ) -> Result<bool, EngineError> {
        if !self
            .pauses
            .delete_if_version(record.execution_id, record.version)
            .await?
        {
            return Ok(false);
        }

        let Some(mut state) = self.executions.get(record.execution_id).await? else {
            return Ok(false);
        };
        if state.status != ExecutionStatus::Paused {
            return Ok(false);
        }

        let workflow = self
            .workflows
            .get(state.workflow_id)
            .await?
            .ok_or_else(|| EngineError::internal("workflow snapshot missing"))?;
        let plan = ExecPlan::build(Arc::new(workflow), state.user_id)?;

        self.sink
            .emit(
                LogEntry::new(
                    record.execution_id,
                    EventType::TimedOut,
                    format!("⏰ Wait timed out ({:?})", record.timeout_action),
                )
                .with_node(record.node_id),
            )
            .await?;

        match record.timeout_action {
            TimeoutAction::Fail => {
                let failure = RunFailure {
                    kind: "timeout".to_owned(),
                    message: "no response before the deadline".to_owned(),
                    advice: Some("Respond faster or extend the timeout".to_owned()),
                };
                self.fail_waiting_node(&plan, &mut state, record.node_id, failure)
                    .await?;
            }
            TimeoutAction::Continue => {
                let mut ports = PortMap::new();
                ports.insert(
                    weft_workflow::DEFAULT_OUTPUT_PORT.to_owned(),
                    serde_json::json!({}),
                );
                self.complete_waiting_node(&plan, &mut state, record.node_id, ports)
                    .await?;
            }
            TimeoutAction::InjectDefault => {
                let default = record
                    .default_response
                    .clone()
                    .unwrap_or(serde_json::Value::Null);
                let mut ports = PortMap::new();
                ports.insert(weft_workflow::DEFAULT_OUTPUT_PORT.to_owned(), default);
                self.complete_waiting_node(&plan, &mut state, record.node_id, ports)
                    .await?;
            }
        }

        if !state.status.is_terminal() {
            state.transition_status(ExecutionStatus::Running)?;
            self.executions.save(&state).await?;
            let cancel = CancellationToken::new();
            self.cancellations.insert(record.execution_id, cancel.clone());
            let result = self.drive(&plan, &mut state, None, cancel).await;
            self.cancellations.remove(&record.execution_id);
            result?;
        }
        Ok(true)
    }

    // ── Resume validation ───────────────────────────────────────────────────

    async fn validate_response(
        &self,
        record: &PauseRecord,
        response: &serde_json::Value,
        classification: ResumeClassification,
    ) -> Result<(), EngineError> {
        let conditions = &record.resume_conditions;

        if let (Some(expected), Some(actual)) = (
            conditions.channel.as_deref(),
            response.get("channel").and_then(serde_json::Value::as_str),
        ) {
            if expected != actual {
                return Err(EngineError::ResponseFiltered(format!(
                    "channel {actual:?} does not match {expected:?}"
                )));
            }
        }

        if let Some(expected) = conditions.responder.as_deref() {
            let actual = response
                .get("responder")
                .and_then(serde_json::Value::as_str);
            if actual != Some(expected) {
                return Err(EngineError::ResponseFiltered(format!(
                    "responder {actual:?} does not match {expected:?}"
                )));
            }
        }

        // Explicit verdicts and timeouts skip relevance scoring.
        if classification != ResumeClassification::Other
            || record.reason != PauseReason::HumanInteraction
        {
            return Ok(());
        }

        let threshold = conditions
            .min_relevance
            .unwrap_or(self.config.relevance_threshold);
        let interaction = serde_json::json!({
            "node_id": record.node_id,
            "reason": "human_interaction",
        });
        let relevance = if let Some(classifier) = &self.adapters.classifier {
            classifier
                .classify(&interaction, response)
                .await
                .map_err(|e| EngineError::internal(format!("classifier failed: {e}")))?
                .relevance
        } else {
            // No classifier configured: keyword heuristic over the prompt
            // the record retained.
            let prompt = record.resume_conditions.prompt.as_deref().unwrap_or_default();
            crate::classify::heuristic_classify(
                prompt,
                &crate::classify::response_text(response),
            )
            .relevance
        };
        if relevance < threshold {
            return Err(EngineError::ResponseFiltered(format!(
                "relevance {relevance:.2} below threshold {threshold:.2}"
            )));
        }
        Ok(())
    }

    // ── State initialisation ────────────────────────────────────────────────

    fn init_state(
        &self,
        plan: &ExecPlan,
        state: &mut ExecutionState,
        start_from: Option<NodeId>,
    ) -> Result<(), EngineError> {
        // Support nodes never run top-level; their descriptors are
        // delivered to the consumer immediately.
        for conn in &plan.workflow.connections {
            if conn.kind != ConnectionKind::Main {
                state.delivered.insert(conn.key());
            }
        }
        for &node_id in &plan.support_nodes {
            state.node_run_mut(node_id)?.transition_to(NodeState::Skipped)?;
        }

        if let Some(start) = start_from {
            if plan.workflow.node(start).is_none() {
                return Err(EngineError::InvalidGraph(format!(
                    "start_from_node {start} does not exist"
                )));
            }
            let mut live: HashSet<NodeId> = plan.graph.downstream_closure(&[start]);
            live.insert(start);
            for node in &plan.workflow.nodes {
                if !live.contains(&node.id) {
                    let run = state.node_run_mut(node.id)?;
                    if !run.state.is_terminal() {
                        run.transition_to(NodeState::Skipped)?;
                    }
                    for &idx in plan.graph.outgoing(node.id) {
                        let conn = plan.connection(idx);
                        if conn.kind == ConnectionKind::Main {
                            state.skipped_edges.insert(conn.key());
                        }
                    }
                }
            }
            for &idx in plan.graph.incoming(start) {
                state.skipped_edges.insert(plan.connection(idx).key());
            }
        }
        Ok(())
    }

    // ── Dispatch loop ───────────────────────────────────────────────────────

    async fn drive(
        self: &Arc<Self>,
        plan: &ExecPlan,
        state: &mut ExecutionState,
        start_from: Option<NodeId>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut join_set: JoinSet<(NodeId, Result<RunnerOutcome, RunnerError>, u32)> =
            JoinSet::new();
        let mut in_flight: HashSet<NodeId> = HashSet::new();
        let mut pause_open = self.pauses.get(state.execution_id).await?.is_some();
        let mut stopped = false;
        let mut budget_exceeded = false;
        let total_steps = plan.total_steps(state);
        let deadline = plan
            .workflow
            .settings
            .timeout
            .map(|t| tokio::time::Instant::now() + t);

        loop {
            if cancel.is_cancelled() {
                self.drain_cancelled(plan, state, &mut join_set).await?;
                return Ok(());
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline && !budget_exceeded && !stopped {
                    budget_exceeded = true;
                    self.sink
                        .emit(
                            LogEntry::new(
                                state.execution_id,
                                EventType::WorkflowFailed,
                                "⏰ Workflow exceeded its time budget",
                            )
                            .with_level(weft_execution::LogLevel::Warn),
                        )
                        .await?;
                }
            }

            let halted = stopped || budget_exceeded;
            let ready = if halted {
                Vec::new()
            } else {
                self.ready_nodes(plan, state, &in_flight, pause_open, start_from)
            };

            if ready.is_empty() && in_flight.is_empty() {
                let waiting = state.waiting_node_ids();
                if !waiting.is_empty() && pause_open && !halted {
                    state.transition_status(ExecutionStatus::Paused)?;
                    self.executions.save(state).await?;
                    return Ok(());
                }
                if waiting.is_empty() || halted {
                    self.finalize(plan, state, budget_exceeded).await?;
                    return Ok(());
                }
                // Waiting nodes without an open pause re-enter ready on the
                // next pass; nothing else to do here.
                continue;
            }

            for node_id in ready {
                if in_flight.len() >= self.config.max_concurrency {
                    break;
                }
                let node = plan
                    .workflow
                    .node(node_id)
                    .ok_or_else(|| EngineError::internal("node vanished from workflow"))?;

                let input = self.resolve_input(plan, state, node, start_from).await?;
                let step = state.path.len() as u32 + 1;

                {
                    let run = state.node_run_mut(node_id)?;
                    if run.state == NodeState::Pending {
                        run.transition_to(NodeState::Ready)?;
                    }
                    run.transition_to(NodeState::Running)?;
                    run.input = Some(input.to_value());
                }
                state.record_start(node_id);
                self.sink
                    .emit(
                        LogEntry::new(
                            state.execution_id,
                            EventType::StepStarted,
                            format!("▶️ Step {step}/{total_steps}: {}", node.name),
                        )
                        .with_node(node_id)
                        .with_step(step, total_steps),
                    )
                    .await?;

                // Trigger nodes are materialized, never invoked.
                if node.kind == NodeKind::Trigger && start_from.is_none() {
                    let mut ports = PortMap::new();
                    ports.insert(
                        weft_workflow::DEFAULT_OUTPUT_PORT.to_owned(),
                        state.trigger.clone(),
                    );
                    self.apply_finished(plan, state, node_id, ports, 1, step, total_steps)
                        .await?;
                    self.executions.save(state).await?;
                    continue;
                }

                let runner = self
                    .registry
                    .get(node.kind, &node.subtype)
                    .ok_or_else(|| {
                        EngineError::internal(format!(
                            "no runner for {}/{}",
                            node.kind, node.subtype
                        ))
                    })?
                    .clone();
                let ctx = self.build_context(plan, state, node, &cancel);
                let node_timeout = node
                    .config_value("node_timeout_secs")
                    .and_then(serde_json::Value::as_u64)
                    .map_or(self.config.default_node_timeout, Duration::from_secs);
                let retry = self.config.retry.clone();
                let permit_source = semaphore.clone();
                let task_cancel = cancel.clone();

                in_flight.insert(node_id);
                join_set.spawn(async move {
                    let _permit = permit_source.acquire().await;
                    invoke_with_retries(runner, ctx, input, node_timeout, retry, task_cancel)
                        .await
                        .map_or_else(
                            |(err, attempts)| (node_id, Err(err), attempts),
                            |(outcome, attempts)| (node_id, Ok(outcome), attempts),
                        )
                });
            }

            let Some(joined) = join_set.join_next().await else {
                continue;
            };
            let (node_id, result, attempts) = joined
                .map_err(|e| EngineError::internal(format!("node task panicked: {e}")))?;
            in_flight.remove(&node_id);
            let step = state.path.len() as u32;

            match result {
                Ok(RunnerOutcome::Finished(ports)) => {
                    self.apply_finished(plan, state, node_id, ports, attempts, step, total_steps)
                        .await?;
                }
                Ok(RunnerOutcome::Wait(signal)) => {
                    self.apply_wait(state, node_id, signal, attempts, &mut pause_open)
                        .await?;
                }
                Err(err) => {
                    if matches!(err, RunnerError::Cancelled) || cancel.is_cancelled() {
                        let run = state.node_run_mut(node_id)?;
                        run.attempts = attempts;
                        run.transition_to(NodeState::Cancelled)?;
                    } else {
                        let stop = self
                            .apply_failed(plan, state, node_id, &err, attempts, step, total_steps)
                            .await?;
                        if stop {
                            stopped = true;
                        }
                    }
                }
            }
            self.executions.save(state).await?;
        }
    }

    /// Ready nodes in deterministic dispatch order: topological index,
    /// ties broken by node id (the topological order already encodes both).
    fn ready_nodes(
        &self,
        plan: &ExecPlan,
        state: &ExecutionState,
        in_flight: &HashSet<NodeId>,
        pause_open: bool,
        start_from: Option<NodeId>,
    ) -> Vec<NodeId> {
        let mut ready = Vec::new();
        for &node_id in plan.graph.topo_order() {
            if in_flight.contains(&node_id)
                || plan.support_nodes.contains(&node_id)
                || plan.body_nodes.contains(&node_id)
            {
                continue;
            }
            let Some(run) = state.node_run(node_id) else {
                continue;
            };
            match run.state {
                NodeState::Waiting if !pause_open => ready.push(node_id),
                // The start-from node runs on the supplied payload even
                // though its inbound edges were skipped at init.
                NodeState::Pending if start_from == Some(node_id) => ready.push(node_id),
                NodeState::Pending => {
                    if self.inputs_satisfied(plan, state, node_id) {
                        ready.push(node_id);
                    }
                }
                _ => {}
            }
        }
        ready
    }

    fn inputs_satisfied(&self, plan: &ExecPlan, state: &ExecutionState, node_id: NodeId) -> bool {
        let incoming = plan.incoming_main(node_id);
        if incoming.is_empty() {
            return true;
        }

        let node = plan.workflow.node(node_id);
        let is_wait_any = node.is_some_and(|n| {
            n.kind == NodeKind::Flow
                && n.subtype == "merge"
                && n.config_value("strategy").and_then(serde_json::Value::as_str)
                    == Some("wait_any")
        });

        let delivered = |idx: &usize| state.delivered.contains(&plan.connection(*idx).key());
        let resolved = |idx: &usize| {
            let key = plan.connection(*idx).key();
            state.delivered.contains(&key) || state.skipped_edges.contains(&key)
        };

        if is_wait_any {
            incoming.iter().any(delivered)
                || (incoming.iter().all(resolved) && incoming.iter().any(delivered))
        } else {
            incoming.iter().all(resolved) && incoming.iter().any(delivered)
        }
    }

    /// Build the aggregated input for a node from delivered edges.
    async fn resolve_input(
        &self,
        plan: &ExecPlan,
        state: &ExecutionState,
        node: &NodeDefinition,
        start_from: Option<NodeId>,
    ) -> Result<NodeInput, EngineError> {
        if start_from == Some(node.id) && state.node_run(node.id).map(|r| r.attempts) == Some(0) {
            return Ok(NodeInput::new().with("input", state.trigger.clone()));
        }

        let mut input = NodeInput::new();
        for &idx in plan.graph.incoming(node.id) {
            let conn = plan.connection(idx);
            if !state.delivered.contains(&conn.key()) {
                continue;
            }

            let value = if conn.kind == ConnectionKind::Main {
                let producer = state
                    .node_run(conn.source)
                    .and_then(|run| run.output.as_ref());
                let Some(ports) = producer else { continue };
                let Some(raw) = router::edge_value(ports, &conn.output_key) else {
                    continue;
                };
                let (converted, conversion_error) = router::convert_edge_value(conn, raw);
                if let Some(error) = conversion_error {
                    self.sink
                        .emit(
                            LogEntry::new(
                                state.execution_id,
                                EventType::StepError,
                                format!("⚠️ Edge conversion failed, delivering null: {error}"),
                            )
                            .with_node(node.id)
                            .with_level(weft_execution::LogLevel::Warn)
                            .with_milestone(false),
                        )
                        .await?;
                }
                converted
            } else {
                let source = plan
                    .workflow
                    .node(conn.source)
                    .ok_or_else(|| EngineError::internal("support node missing"))?;
                router::support_descriptor(source)
            };
            input.deliver(router::input_slot(conn), value);
        }
        Ok(input)
    }

    fn build_context(
        self: &Arc<Self>,
        plan: &ExecPlan,
        state: &ExecutionState,
        node: &NodeDefinition,
        cancel: &CancellationToken,
    ) -> RunContext {
        let mut ctx = RunContext::new(
            state.execution_id,
            plan.workflow.id,
            node.id,
            node.name.clone(),
        )
        .with_config(node.config.clone())
        .with_trigger(state.trigger.clone())
        .with_cancellation(cancel.child_token())
        .with_adapters(self.adapters.clone());
        if let Some(user_id) = plan.user_id {
            ctx = ctx.with_user(user_id);
        }

        let outer_outputs: HashMap<NodeId, PortMap> = state
            .node_runs
            .iter()
            .filter_map(|(&id, run)| run.output.clone().map(|ports| (id, ports)))
            .collect();

        if let Some(body) = plan.loop_bodies.get(&node.id) {
            ctx = ctx.with_subgraph(Arc::new(LoopBody {
                engine: self.clone(),
                workflow: plan.workflow.clone(),
                graph: plan.graph.clone(),
                loop_node: node.id,
                body: body.clone(),
                outer_outputs: outer_outputs.clone(),
                execution_id: state.execution_id,
                trigger: state.trigger.clone(),
                user_id: plan.user_id,
                cancel: cancel.clone(),
            }));
        }

        if node.kind == NodeKind::AiAgent {
            let tools: Vec<(NodeId, String, String)> = plan
                .graph
                .incoming(node.id)
                .iter()
                .map(|&idx| plan.connection(idx))
                .filter(|conn| conn.kind == ConnectionKind::AiTool)
                .filter_map(|conn| plan.workflow.node(conn.source))
                .map(|tool| {
                    let description = tool
                        .config_value("description")
                        .and_then(serde_json::Value::as_str)
                        .map_or_else(|| tool.subtype.clone(), str::to_owned);
                    (tool.id, tool.name.clone(), description)
                })
                .collect();
            if !tools.is_empty() {
                ctx = ctx.with_tools(Arc::new(ToolBinding {
                    engine: self.clone(),
                    workflow: plan.workflow.clone(),
                    execution_id: state.execution_id,
                    trigger: state.trigger.clone(),
                    user_id: plan.user_id,
                    cancel: cancel.clone(),
                    tools,
                }));
            }
        }

        ctx
    }

    // ── Outcome application ─────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn apply_finished(
        &self,
        plan: &ExecPlan,
        state: &mut ExecutionState,
        node_id: NodeId,
        ports: PortMap,
        attempts: u32,
        step: u32,
        total_steps: u32,
    ) -> Result<(), EngineError> {
        let truncated_loop = plan.loop_bodies.contains_key(&node_id)
            && ports
                .get("done")
                .and_then(|done| done.get("truncated"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);

        let duration_ms;
        {
            let run = state.node_run_mut(node_id)?;
            run.attempts = attempts.max(run.attempts);
            run.output = Some(ports.clone());
            run.transition_to(NodeState::Completed)?;
            duration_ms = run.duration_ms.unwrap_or(0);
        }

        self.mark_outgoing(plan, state, node_id, &ports);
        self.record_loop_body_runs(plan, state, node_id, &ports)?;
        self.cascade_skips(plan, state)?;

        let name = plan
            .workflow
            .node(node_id)
            .map_or_else(String::new, |n| n.name.clone());
        self.sink
            .emit(
                LogEntry::new(
                    state.execution_id,
                    EventType::StepCompleted,
                    format!("✅ Step {step}/{total_steps}: {name} completed"),
                )
                .with_node(node_id)
                .with_step(step, total_steps)
                .with_duration_ms(duration_ms)
                .with_data(serde_json::json!({
                    "output_ports": ports.keys().collect::<Vec<_>>(),
                })),
            )
            .await?;

        if truncated_loop {
            self.sink
                .emit(
                    LogEntry::new(
                        state.execution_id,
                        EventType::LoopTruncated,
                        format!("⚠️ Loop {name} truncated at its iteration cap"),
                    )
                    .with_node(node_id),
                )
                .await?;
        }
        Ok(())
    }

    async fn apply_wait(
        &self,
        state: &mut ExecutionState,
        node_id: NodeId,
        signal: WaitSignal,
        attempts: u32,
        pause_open: &mut bool,
    ) -> Result<(), EngineError> {
        {
            let run = state.node_run_mut(node_id)?;
            run.attempts = attempts.max(run.attempts);
            run.transition_to(NodeState::Waiting)?;
        }

        if *pause_open {
            // One pause record per execution: this node re-arms once the
            // open pause resolves.
            return Ok(());
        }

        let mut record = PauseRecord::new(
            state.execution_id,
            node_id,
            signal.reason,
            signal.timeout,
            signal.timeout_action,
        )
        .with_resume_conditions(signal.resume_conditions.clone());
        if let Some(default) = signal.default_response.clone() {
            record = record.with_default_response(default);
        }
        if signal.reason == PauseReason::HumanInteraction {
            record = record.with_interaction_id(InteractionId::v4());
        }
        let interaction_data = signal
            .interaction
            .as_ref()
            .map(|spec| serde_json::to_value(spec).unwrap_or(serde_json::Value::Null))
            .unwrap_or(serde_json::Value::Null);

        self.pauses.create(record).await?;
        *pause_open = true;

        let (event, message) = if signal.reason == PauseReason::HumanInteraction {
            (
                EventType::HumanInteraction,
                "🙋 Waiting for a human response".to_owned(),
            )
        } else {
            (
                EventType::HumanInteraction,
                format!("⏳ Waiting {}s on a timer", signal.timeout.as_secs()),
            )
        };
        self.sink
            .emit(
                LogEntry::new(state.execution_id, event, message)
                    .with_node(node_id)
                    .with_data(interaction_data),
            )
            .await?;
        Ok(())
    }

    /// Apply the error policy to a failed node. Returns `true` when the
    /// execution must stop dispatching.
    #[allow(clippy::too_many_arguments)]
    async fn apply_failed(
        &self,
        plan: &ExecPlan,
        state: &mut ExecutionState,
        node_id: NodeId,
        err: &RunnerError,
        attempts: u32,
        step: u32,
        total_steps: u32,
    ) -> Result<bool, EngineError> {
        {
            let run = state.node_run_mut(node_id)?;
            run.attempts = attempts.max(run.attempts);
            run.error = Some(RunFailure {
                kind: err.kind().to_owned(),
                message: err.to_string(),
                advice: err.advice(),
            });
            run.transition_to(NodeState::Failed)?;
        }

        let name = plan
            .workflow
            .node(node_id)
            .map_or_else(String::new, |n| n.name.clone());
        self.sink
            .emit(
                LogEntry::new(
                    state.execution_id,
                    EventType::StepError,
                    format!("❌ Step {step}/{total_steps}: {name} failed: {err}"),
                )
                .with_node(node_id)
                .with_step(step, total_steps)
                .with_data(serde_json::json!({
                    "kind": err.kind(),
                    "advice": err.advice(),
                })),
            )
            .await?;

        let policy = plan.workflow.settings.error_policy;
        match policy {
            ErrorPolicy::Stop => Ok(true),
            ErrorPolicy::ContinueRegular => {
                self.skip_outgoing(plan, state, node_id);
                self.cascade_skips(plan, state)?;
                Ok(false)
            }
            ErrorPolicy::ContinueErrorBranch => {
                let has_error_edge = plan
                    .graph
                    .outgoing(node_id)
                    .iter()
                    .any(|&idx| plan.connection(idx).output_key == "error");
                if has_error_edge {
                    let mut ports = PortMap::new();
                    ports.insert(
                        "error".to_owned(),
                        serde_json::json!({
                            "kind": err.kind(),
                            "message": err.to_string(),
                        }),
                    );
                    state.node_run_mut(node_id)?.output = Some(ports.clone());
                    // Only the error port carries data; regular ports are
                    // not taken. Bypass the default-port fallback here.
                    for &idx in plan.graph.outgoing(node_id) {
                        let conn = plan.connection(idx);
                        if conn.kind != ConnectionKind::Main {
                            continue;
                        }
                        if conn.output_key == "error" {
                            state.delivered.insert(conn.key());
                        } else {
                            state.skipped_edges.insert(conn.key());
                        }
                    }
                    self.cascade_skips(plan, state)?;
                    Ok(false)
                } else {
                    Ok(true)
                }
            }
        }
    }

    /// Mark outgoing Main edges delivered or skipped based on the produced
    /// ports.
    fn mark_outgoing(
        &self,
        plan: &ExecPlan,
        state: &mut ExecutionState,
        node_id: NodeId,
        ports: &PortMap,
    ) {
        for &idx in plan.graph.outgoing(node_id) {
            let conn = plan.connection(idx);
            if conn.kind != ConnectionKind::Main {
                continue;
            }
            if router::edge_value(ports, &conn.output_key).is_some() {
                state.delivered.insert(conn.key());
            } else {
                state.skipped_edges.insert(conn.key());
            }
        }
    }

    fn skip_outgoing(&self, plan: &ExecPlan, state: &mut ExecutionState, node_id: NodeId) {
        for &idx in plan.graph.outgoing(node_id) {
            let conn = plan.connection(idx);
            if conn.kind == ConnectionKind::Main {
                state.skipped_edges.insert(conn.key());
            }
        }
    }

    /// Skip nodes whose every incoming Main edge is skipped, cascading
    /// downstream in topological order.
    fn cascade_skips(
        &self,
        plan: &ExecPlan,
        state: &mut ExecutionState,
    ) -> Result<(), EngineError> {
        for &node_id in plan.graph.topo_order() {
            if plan.body_nodes.contains(&node_id) {
                continue;
            }
            let Some(run) = state.node_run(node_id) else {
                continue;
            };
            if run.state != NodeState::Pending {
                continue;
            }
            let incoming = plan.incoming_main(node_id);
            if incoming.is_empty() {
                continue;
            }
            let all_skipped = incoming
                .iter()
                .all(|&idx| state.skipped_edges.contains(&plan.connection(idx).key()));
            if all_skipped {
                state.node_run_mut(node_id)?.transition_to(NodeState::Skipped)?;
                self.skip_outgoing(plan, state, node_id);
            }
        }
        Ok(())
    }

    /// Copy per-iteration body results onto the top-level node runs after a
    /// `for_each` node completes.
    fn record_loop_body_runs(
        &self,
        plan: &ExecPlan,
        state: &mut ExecutionState,
        node_id: NodeId,
        ports: &PortMap,
    ) -> Result<(), EngineError> {
        let Some(body) = plan.loop_bodies.get(&node_id) else {
            return Ok(());
        };
        let iterations = ports
            .get("done")
            .and_then(|done| done.get("iterations"))
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;

        for &body_node in body {
            let run = state.node_run_mut(body_node)?;
            if run.state != NodeState::Pending {
                continue;
            }
            if iterations == 0 {
                run.transition_to(NodeState::Skipped)?;
            } else {
                run.attempts = iterations;
                run.transition_to(NodeState::Ready)?;
                run.transition_to(NodeState::Running)?;
                run.transition_to(NodeState::Completed)?;
            }
        }
        for &idx in plan.graph.outgoing(node_id) {
            let conn = plan.connection(idx);
            if conn.output_key == "item" {
                state.skipped_edges.remove(&conn.key());
                state.delivered.insert(conn.key());
            }
        }
        Ok(())
    }

    async fn complete_waiting_node(
        &self,
        plan: &ExecPlan,
        state: &mut ExecutionState,
        node_id: NodeId,
        ports: PortMap,
    ) -> Result<(), EngineError> {
        {
            let run = state.node_run_mut(node_id)?;
            if run.state != NodeState::Waiting {
                // At-most-once success: an already-resolved node keeps its
                // prior output untouched.
                return Ok(());
            }
            run.output = Some(ports.clone());
            run.attempts = run.attempts.max(1);
            run.transition_to(NodeState::Completed)?;
        }
        self.mark_outgoing(plan, state, node_id, &ports);
        self.cascade_skips(plan, state)?;
        self.executions.save(state).await?;
        Ok(())
    }

    async fn fail_waiting_node(
        &self,
        plan: &ExecPlan,
        state: &mut ExecutionState,
        node_id: NodeId,
        failure: RunFailure,
    ) -> Result<(), EngineError> {
        let timed_out = failure.kind == "timeout";
        {
            let run = state.node_run_mut(node_id)?;
            if run.state != NodeState::Waiting {
                return Ok(());
            }
            run.error = Some(failure);
            run.transition_to(if timed_out {
                NodeState::TimedOut
            } else {
                NodeState::Failed
            })?;
        }

        match plan.workflow.settings.error_policy {
            ErrorPolicy::Stop => {
                for run in state.node_runs.values_mut() {
                    if matches!(run.state, NodeState::Pending | NodeState::Ready) {
                        let _ = run.transition_to(NodeState::Skipped);
                    }
                }
                state.transition_status(ExecutionStatus::Failed)?;
                self.sink
                    .emit(LogEntry::new(
                        state.execution_id,
                        EventType::WorkflowFailed,
                        "💥 Workflow failed",
                    ))
                    .await?;
            }
            ErrorPolicy::ContinueRegular | ErrorPolicy::ContinueErrorBranch => {
                self.skip_outgoing(plan, state, node_id);
                self.cascade_skips(plan, state)?;
            }
        }
        self.executions.save(state).await?;
        Ok(())
    }

    async fn finalize(
        &self,
        plan: &ExecPlan,
        state: &mut ExecutionState,
        budget_exceeded: bool,
    ) -> Result<(), EngineError> {
        // Whatever never became dispatchable is skipped.
        let pending: Vec<NodeId> = state
            .node_runs
            .values()
            .filter(|run| matches!(run.state, NodeState::Pending | NodeState::Ready))
            .map(|run| run.node_id)
            .collect();
        for node_id in pending {
            state.node_run_mut(node_id)?.transition_to(NodeState::Skipped)?;
        }

        let status = if budget_exceeded {
            ExecutionStatus::TimedOut
        } else if state.any_node_failed() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        state.transition_status(status)?;
        self.executions.save(state).await?;

        let (event, message) = if status == ExecutionStatus::Completed {
            (
                EventType::WorkflowCompleted,
                format!("🏁 Workflow {:?} completed", plan.workflow.name),
            )
        } else {
            (
                EventType::WorkflowFailed,
                format!("💥 Workflow {:?} {status}", plan.workflow.name),
            )
        };
        self.sink
            .emit(
                LogEntry::new(state.execution_id, event, message).with_data(serde_json::json!({
                    "status": status.to_string(),
                    "steps": state.path.len(),
                })),
            )
            .await?;
        Ok(())
    }

    async fn drain_cancelled(
        &self,
        _plan: &ExecPlan,
        state: &mut ExecutionState,
        join_set: &mut JoinSet<(NodeId, Result<RunnerOutcome, RunnerError>, u32)>,
    ) -> Result<(), EngineError> {
        let grace = tokio::time::timeout(self.config.cancel_grace, async {
            while join_set.join_next().await.is_some() {}
        })
        .await;
        if grace.is_err() {
            join_set.abort_all();
            self.sink
                .emit(
                    LogEntry::new(
                        state.execution_id,
                        EventType::Cancelled,
                        "⚠️ cancel_timeout: runners did not stop within the grace window",
                    )
                    .with_level(weft_execution::LogLevel::Warn),
                )
                .await?;
        }

        for run in state.node_runs.values_mut() {
            if !run.state.is_terminal() {
                let _ = run.transition_to(NodeState::Cancelled);
            }
        }
        if let Some(record) = self.pauses.get(state.execution_id).await? {
            let _ = self
                .pauses
                .delete_if_version(state.execution_id, record.version)
                .await?;
        }
        state.transition_status(ExecutionStatus::Cancelling)?;
        state.transition_status(ExecutionStatus::Cancelled)?;
        self.executions.save(state).await?;
        self.sink
            .emit(LogEntry::new(
                state.execution_id,
                EventType::Cancelled,
                "🛑 Execution cancelled",
            ))
            .await?;
        Ok(())
    }
}

/// Run a node with timeout and bounded retries for retryable errors.
async fn invoke_with_retries(
    runner: Arc<dyn NodeRunner>,
    ctx: RunContext,
    input: NodeInput,
    node_timeout: Duration,
    retry: crate::retry::RetryPolicy,
    cancel: CancellationToken,
) -> Result<(RunnerOutcome, u32), (RunnerError, u32)> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let result = tokio::time::timeout(node_timeout, runner.run(&ctx, &input)).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => Err(RunnerError::Timeout(node_timeout)),
        };
        match outcome {
            Ok(outcome) => return Ok((outcome, attempts)),
            Err(err) if err.is_retryable() && retry.allows_retry(attempts) => {
                if cancel.is_cancelled() {
                    return Err((RunnerError::Cancelled, attempts));
                }
                let delay = retry.backoff(attempts, err.retry_after());
                tracing::debug!(attempts, ?delay, error = %err, "retrying node");
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => return Err((RunnerError::Cancelled, attempts)),
                }
            }
            Err(err) => return Err((err, attempts)),
        }
    }
}

// ── Loop body execution ─────────────────────────────────────────────────────

/// Serial per-element executor for a `for_each` body subgraph.
struct LoopBody {
    engine: Arc<WorkflowEngine>,
    workflow: Arc<WorkflowDefinition>,
    graph: Arc<DependencyGraph>,
    loop_node: NodeId,
    body: HashSet<NodeId>,
    outer_outputs: HashMap<NodeId, PortMap>,
    execution_id: ExecutionId,
    trigger: serde_json::Value,
    user_id: Option<UserId>,
    cancel: CancellationToken,
}

#[async_trait]
impl SubgraphHandle for LoopBody {
    async fn run_body(
        &self,
        index: usize,
        item: serde_json::Value,
    ) -> Result<serde_json::Value, RunnerError> {
        if self.cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let mut local_outputs: HashMap<NodeId, PortMap> = HashMap::new();
        let body_order: Vec<NodeId> = self
            .graph
            .topo_order()
            .iter()
            .copied()
            .filter(|id| self.body.contains(id))
            .collect();

        for node_id in body_order {
            let node = self
                .workflow
                .node(node_id)
                .ok_or_else(|| RunnerError::internal("body node missing"))?;

            let mut input = NodeInput::new();
            let mut any_delivered = false;
            for &idx in self.graph.incoming(node_id) {
                let conn = &self.workflow.connections[idx];
                if conn.kind != ConnectionKind::Main {
                    continue;
                }
                let raw = if conn.source == self.loop_node && conn.output_key == "item" {
                    Some(item.clone())
                } else if let Some(ports) = local_outputs.get(&conn.source) {
                    router::edge_value(ports, &conn.output_key)
                } else if let Some(ports) = self.outer_outputs.get(&conn.source) {
                    router::edge_value(ports, &conn.output_key)
                } else {
                    None
                };
                let Some(raw) = raw else { continue };
                let (converted, _conversion_error) = router::convert_edge_value(conn, raw);
                input.deliver(router::input_slot(conn), converted);
                any_delivered = true;
            }
            if !any_delivered {
                // Branch not taken for this element.
                continue;
            }

            let runner = self
                .engine
                .registry
                .get(node.kind, &node.subtype)
                .ok_or_else(|| {
                    RunnerError::internal(format!("no runner for {}/{}", node.kind, node.subtype))
                })?
                .clone();

            let mut ctx = RunContext::new(
                self.execution_id,
                self.workflow.id,
                node.id,
                node.name.clone(),
            )
            .with_config(node.config.clone())
            .with_trigger(self.trigger.clone())
            .with_cancellation(self.cancel.child_token())
            .with_adapters(self.engine.adapters.clone());
            if let Some(user_id) = self.user_id {
                ctx = ctx.with_user(user_id);
            }

            let timeout = node
                .config_value("node_timeout_secs")
                .and_then(serde_json::Value::as_u64)
                .map_or(self.engine.config.default_node_timeout, Duration::from_secs);

            let (outcome, _attempts) = invoke_with_retries(
                runner,
                ctx,
                input,
                timeout,
                self.engine.config.retry.clone(),
                self.cancel.clone(),
            )
            .await
            .map_err(|(err, _)| err)?;

            match outcome {
                RunnerOutcome::Finished(ports) => {
                    let _ = self
                        .engine
                        .sink
                        .emit(
                            LogEntry::new(
                                self.execution_id,
                                EventType::StepCompleted,
                                format!("🔁 Iteration {}: {} completed", index + 1, node.name),
                            )
                            .with_node(node_id)
                            .with_milestone(false),
                        )
                        .await;
                    local_outputs.insert(node_id, ports);
                }
                RunnerOutcome::Wait(_) => {
                    return Err(RunnerError::internal(
                        "wait signals are not supported inside a for_each body",
                    ));
                }
            }
        }

        // The iteration's value: output of the body's exit nodes.
        let mut exits: Vec<(String, serde_json::Value)> = Vec::new();
        for (&node_id, ports) in &local_outputs {
            let has_internal_successor = self
                .graph
                .outgoing(node_id)
                .iter()
                .any(|&idx| self.body.contains(&self.workflow.connections[idx].target));
            if has_internal_successor {
                continue;
            }
            let name = self
                .workflow
                .node(node_id)
                .map_or_else(String::new, |n| n.name.clone());
            let value = router::edge_value(ports, weft_workflow::DEFAULT_OUTPUT_PORT)
                .unwrap_or(serde_json::Value::Null);
            exits.push((name, value));
        }
        exits.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(match exits.len() {
            0 => serde_json::Value::Null,
            1 => exits.remove(0).1,
            _ => serde_json::Value::Object(exits.into_iter().collect()),
        })
    }
}

// ── AI tool binding ─────────────────────────────────────────────────────────

/// Inline invoker for tool nodes wired to an agent via `ai_tool` edges.
struct ToolBinding {
    engine: Arc<WorkflowEngine>,
    workflow: Arc<WorkflowDefinition>,
    execution_id: ExecutionId,
    trigger: serde_json::Value,
    user_id: Option<UserId>,
    cancel: CancellationToken,
    tools: Vec<(NodeId, String, String)>,
}

#[async_trait]
impl ToolHandle for ToolBinding {
    fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|(_, name, description)| ToolDescriptor {
                name: name.clone(),
                description: description.clone(),
            })
            .collect()
    }

    async fn invoke_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, RunnerError> {
        let (node_id, _, _) = self
            .tools
            .iter()
            .find(|(_, tool_name, _)| tool_name == name)
            .ok_or_else(|| RunnerError::internal(format!("unknown tool {name:?}")))?;
        let node = self
            .workflow
            .node(*node_id)
            .ok_or_else(|| RunnerError::internal("tool node missing"))?;
        let runner = self
            .engine
            .registry
            .get(node.kind, &node.subtype)
            .ok_or_else(|| {
                RunnerError::internal(format!("no runner for {}/{}", node.kind, node.subtype))
            })?
            .clone();

        let mut ctx = RunContext::new(
            self.execution_id,
            self.workflow.id,
            node.id,
            node.name.clone(),
        )
        .with_config(node.config.clone())
        .with_trigger(self.trigger.clone())
        .with_cancellation(self.cancel.child_token())
        .with_adapters(self.engine.adapters.clone());
        if let Some(user_id) = self.user_id {
            ctx = ctx.with_user(user_id);
        }

        let input = NodeInput::new().with("input", arguments);
        let (outcome, _attempts) = invoke_with_retries(
            runner,
            ctx,
            input,
            self.engine.config.default_node_timeout,
            self.engine.config.retry.clone(),
            self.cancel.clone(),
        )
        .await
        .map_err(|(err, _)| err)?;

        match outcome {
            RunnerOutcome::Finished(ports) => Ok(router::edge_value(
                &ports,
                weft_workflow::DEFAULT_OUTPUT_PORT,
            )
            .unwrap_or(serde_json::Value::Null)),
            RunnerOutcome::Wait(_) => Err(RunnerError::internal(
                "tool nodes cannot pause when invoked inline",
            )),
        }
    }
}
