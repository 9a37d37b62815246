//! Execution state tracking for workflows and individual nodes.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{ExecutionId, NodeId, WorkflowId};
use weft_workflow::NodeState;

use crate::error::ExecutionError;
use crate::status::ExecutionStatus;
use crate::transition::{validate_execution_transition, validate_node_transition};

/// A structured, user-presentable record of a node failure.
///
/// `kind` carries the uniform error kind (`invalid_configuration`,
/// `provider_error`, ...); `advice` is an actionable hint. Stack traces
/// never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Uniform error kind.
    pub kind: String,
    /// Human-readable cause.
    pub message: String,
    /// Optional user-actionable advice ("Reconnect Slack and retry").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
}

/// The record of a single node within a running execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRun {
    /// The node this run belongs to.
    pub node_id: NodeId,
    /// Current state of the node.
    pub state: NodeState,
    /// Exact input snapshot the runner saw, keyed by input port.
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    /// Output values keyed by output port.
    #[serde(default)]
    pub output: Option<BTreeMap<String, serde_json::Value>>,
    /// Failure details, if the node failed or timed out.
    #[serde(default)]
    pub error: Option<RunFailure>,
    /// When the first attempt started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock execution time in milliseconds.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Number of attempts made (1 on first success).
    pub attempts: u32,
}

impl NodeRun {
    /// Create a new node run in the Pending state.
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            state: NodeState::Pending,
            input: None,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            attempts: 0,
        }
    }

    /// Transition to a new state, validating the transition.
    ///
    /// Sets `started_at` on the first Running transition and `completed_at`
    /// (plus `duration_ms`) when a terminal state is reached.
    pub fn transition_to(&mut self, new_state: NodeState) -> Result<(), ExecutionError> {
        validate_node_transition(self.state, new_state)?;
        self.state = new_state;

        let now = Utc::now();
        if new_state == NodeState::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if new_state.is_terminal() {
            self.completed_at = Some(now);
            if let Some(started) = self.started_at {
                self.duration_ms = Some((now - started).num_milliseconds().max(0) as u64);
            }
        }
        Ok(())
    }

    /// Extract the value on a single output port, if produced.
    #[must_use]
    pub fn output_port(&self, port: &str) -> Option<&serde_json::Value> {
        self.output.as_ref().and_then(|ports| ports.get(port))
    }
}

/// The complete persistent state of one workflow execution.
///
/// Serializable in every intermediate state: persisting and reloading an
/// execution (including while `Paused`) yields the same status, node runs
/// and bookkeeping sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Unique identifier for this execution.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// Current execution status.
    pub status: ExecutionStatus,
    /// The trigger event that started this execution.
    pub trigger: serde_json::Value,
    /// User the execution acts on behalf of, if any.
    #[serde(default)]
    pub user_id: Option<weft_core::UserId>,
    /// Per-node run records.
    pub node_runs: HashMap<NodeId, NodeRun>,
    /// Node ids in the order they started.
    #[serde(default)]
    pub path: Vec<NodeId>,
    /// Connection keys whose values have been delivered to their targets.
    #[serde(default)]
    pub delivered: HashSet<String>,
    /// Connection keys that will never deliver (branch not taken, producer
    /// failed under a continue policy, producer skipped).
    #[serde(default)]
    pub skipped_edges: HashSet<String>,
    /// Optimistic concurrency version, bumped on each status change.
    pub version: u64,
    /// When the execution was created.
    pub created_at: DateTime<Utc>,
    /// When the execution was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the execution started running.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the execution reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    /// Create a new execution state covering `node_ids`.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        trigger: serde_json::Value,
        node_ids: &[NodeId],
    ) -> Self {
        let now = Utc::now();
        let node_runs = node_ids.iter().map(|&id| (id, NodeRun::new(id))).collect();

        Self {
            execution_id,
            workflow_id,
            status: ExecutionStatus::Created,
            trigger,
            user_id: None,
            node_runs,
            path: Vec::new(),
            delivered: HashSet::new(),
            skipped_edges: HashSet::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Get a node's run record.
    #[must_use]
    pub fn node_run(&self, node_id: NodeId) -> Option<&NodeRun> {
        self.node_runs.get(&node_id)
    }

    /// Get a mutable node run record, erroring when the node is unknown.
    pub fn node_run_mut(&mut self, node_id: NodeId) -> Result<&mut NodeRun, ExecutionError> {
        self.node_runs
            .get_mut(&node_id)
            .ok_or(ExecutionError::NodeNotFound(node_id))
    }

    /// Record that a node started, appending it to the execution path.
    pub fn record_start(&mut self, node_id: NodeId) {
        self.path.push(node_id);
    }

    /// Returns `true` if every node is in a terminal state.
    #[must_use]
    pub fn all_nodes_terminal(&self) -> bool {
        self.node_runs.values().all(|run| run.state.is_terminal())
    }

    /// Returns `true` if any node failed or timed out.
    #[must_use]
    pub fn any_node_failed(&self) -> bool {
        self.node_runs
            .values()
            .any(|run| matches!(run.state, NodeState::Failed | NodeState::TimedOut))
    }

    /// Ids of nodes currently waiting on a pause.
    #[must_use]
    pub fn waiting_node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .node_runs
            .iter()
            .filter(|(_, run)| run.state == NodeState::Waiting)
            .map(|(&id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Transition the execution status, validating the transition and
    /// bumping the version.
    pub fn transition_status(&mut self, new_status: ExecutionStatus) -> Result<(), ExecutionError> {
        validate_execution_transition(self.status, new_status)?;
        self.status = new_status;
        self.version += 1;
        self.updated_at = Utc::now();

        if new_status == ExecutionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_state() -> (ExecutionState, NodeId, NodeId) {
        let n1 = NodeId::v4();
        let n2 = NodeId::v4();
        let state = ExecutionState::new(
            ExecutionId::v4(),
            WorkflowId::v4(),
            serde_json::json!({"x": 1}),
            &[n1, n2],
        );
        (state, n1, n2)
    }

    #[test]
    fn new_execution_state() {
        let (state, n1, _n2) = make_state();
        assert_eq!(state.status, ExecutionStatus::Created);
        assert_eq!(state.version, 0);
        assert_eq!(state.node_runs.len(), 2);
        assert_eq!(state.node_run(n1).unwrap().state, NodeState::Pending);
        assert!(state.path.is_empty());
        assert!(state.delivered.is_empty());
    }

    #[test]
    fn node_run_lifecycle() {
        let mut run = NodeRun::new(NodeId::v4());
        assert_eq!(run.attempts, 0);

        run.transition_to(NodeState::Ready).unwrap();
        run.transition_to(NodeState::Running).unwrap();
        assert!(run.started_at.is_some());
        assert!(run.completed_at.is_none());

        run.transition_to(NodeState::Completed).unwrap();
        assert!(run.completed_at.is_some());
        assert!(run.duration_ms.is_some());
    }

    #[test]
    fn node_run_invalid_transition() {
        let mut run = NodeRun::new(NodeId::v4());
        let err = run.transition_to(NodeState::Completed).unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
        assert_eq!(run.state, NodeState::Pending);
    }

    #[test]
    fn output_port_lookup() {
        let mut run = NodeRun::new(NodeId::v4());
        let mut ports = BTreeMap::new();
        ports.insert("result".to_owned(), serde_json::json!({"y": 42}));
        run.output = Some(ports);

        assert_eq!(run.output_port("result"), Some(&serde_json::json!({"y": 42})));
        assert!(run.output_port("missing").is_none());
    }

    #[test]
    fn record_start_appends_to_path() {
        let (mut state, n1, n2) = make_state();
        state.record_start(n1);
        state.record_start(n2);
        assert_eq!(state.path, vec![n1, n2]);
    }

    #[test]
    fn all_nodes_terminal() {
        let (mut state, n1, n2) = make_state();
        assert!(!state.all_nodes_terminal());

        state.node_runs.get_mut(&n1).unwrap().state = NodeState::Completed;
        state.node_runs.get_mut(&n2).unwrap().state = NodeState::Skipped;
        assert!(state.all_nodes_terminal());
        assert!(!state.any_node_failed());

        state.node_runs.get_mut(&n2).unwrap().state = NodeState::TimedOut;
        assert!(state.any_node_failed());
    }

    #[test]
    fn waiting_node_ids_sorted() {
        let (mut state, n1, n2) = make_state();
        state.node_runs.get_mut(&n1).unwrap().state = NodeState::Waiting;
        state.node_runs.get_mut(&n2).unwrap().state = NodeState::Waiting;
        let ids = state.waiting_node_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
    }

    #[test]
    fn transition_status_bumps_version() {
        let (mut state, _n1, _n2) = make_state();
        state.transition_status(ExecutionStatus::Running).unwrap();
        assert_eq!(state.version, 1);
        assert!(state.started_at.is_some());

        state.transition_status(ExecutionStatus::Completed).unwrap();
        assert_eq!(state.version, 2);
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn transition_status_invalid_keeps_version() {
        let (mut state, _n1, _n2) = make_state();
        let err = state
            .transition_status(ExecutionStatus::Completed)
            .unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
        assert_eq!(state.version, 0);
    }

    #[test]
    fn node_run_mut_unknown_node() {
        let (mut state, _n1, _n2) = make_state();
        let ghost = NodeId::v4();
        assert!(matches!(
            state.node_run_mut(ghost),
            Err(ExecutionError::NodeNotFound(id)) if id == ghost
        ));
    }

    #[test]
    fn serde_roundtrip_preserves_bookkeeping() {
        let (mut state, n1, _n2) = make_state();
        state.transition_status(ExecutionStatus::Running).unwrap();
        state.record_start(n1);
        state.delivered.insert("a:result->b:input".into());
        state.skipped_edges.insert("a:false->c:input".into());

        let json = serde_json::to_string(&state).unwrap();
        let back: ExecutionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.execution_id, state.execution_id);
        assert_eq!(back.status, state.status);
        assert_eq!(back.path, state.path);
        assert_eq!(back.delivered, state.delivered);
        assert_eq!(back.skipped_edges, state.skipped_edges);
        assert_eq!(back.version, state.version);
        assert_eq!(back.trigger, state.trigger);
    }
}
