//! Workflow definition and structural validation.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use weft_core::{NodeId, WorkflowId};

use crate::connection::Connection;
use crate::error::WorkflowError;
use crate::graph::DependencyGraph;
use crate::node::{NodeDefinition, NodeKind};

/// What to do when a node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Terminate the execution as failed.
    #[default]
    Stop,
    /// Mark the node failed but keep going; the node delivers nothing on
    /// its regular ports.
    ContinueRegular,
    /// Route an error object on the node's declared `error` port, if any.
    ContinueErrorBranch,
}

/// Execution-affecting settings attached to a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Optional wall-clock budget for the whole execution.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// What happens when a node fails.
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// Upper bound on concurrently running nodes within one execution.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-node wall-clock budget unless a node overrides it.
    #[serde(default = "default_node_timeout", with = "humantime_serde")]
    pub default_node_timeout: Duration,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_node_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            error_policy: ErrorPolicy::default(),
            max_concurrency: default_max_concurrency(),
            default_node_timeout: default_node_timeout(),
        }
    }
}

/// How strictly to validate a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidateMode {
    /// Validate everything, including the trigger-node requirement.
    #[default]
    Full,
    /// Skip the trigger requirement — used when an execution is started
    /// from an arbitrary node with inputs supplied directly.
    ResumeFromNode,
}

/// An immutable workflow snapshot: nodes, connections and settings.
///
/// A definition is read-only for the duration of any execution that uses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Snapshot version.
    pub version: Version,
    /// Vertices, in authoring order.
    pub nodes: Vec<NodeDefinition>,
    /// Edges, in authoring order. Edge order is significant for input
    /// aggregation.
    pub connections: Vec<Connection>,
    /// Execution settings.
    #[serde(default)]
    pub settings: WorkflowSettings,
    /// When this snapshot was created.
    pub created_at: DateTime<Utc>,
    /// When this snapshot was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create a workflow with default settings and version 0.1.0.
    #[must_use]
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            version: Version::new(0, 1, 0),
            nodes: Vec::new(),
            connections: Vec::new(),
            settings: WorkflowSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a node.
    #[must_use]
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append a connection.
    #[must_use]
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Look up a node by display name.
    #[must_use]
    pub fn node_by_name(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// All nodes of the given kind.
    #[must_use]
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&NodeDefinition> {
        self.nodes.iter().filter(|n| n.kind == kind).collect()
    }

    /// Validate the structural invariants of this workflow.
    ///
    /// Checks id/name uniqueness, endpoint resolution, self-loops,
    /// acyclicity, port declarations and (in [`ValidateMode::Full`]) the
    /// presence of at least one trigger node. Per-subtype configuration
    /// validation is the runner registry's responsibility and happens
    /// separately, before dispatch.
    pub fn validate(&self, mode: ValidateMode) -> Result<(), WorkflowError> {
        if self.nodes.is_empty() {
            return Err(WorkflowError::Empty);
        }

        let mut ids: HashSet<NodeId> = HashSet::with_capacity(self.nodes.len());
        let mut names: HashSet<&str> = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(WorkflowError::DuplicateNodeId(node.id));
            }
            if node.name.is_empty() || node.name.chars().any(char::is_whitespace) {
                return Err(WorkflowError::InvalidNodeName(node.name.clone()));
            }
            if !names.insert(node.name.as_str()) {
                return Err(WorkflowError::DuplicateNodeName(node.name.clone()));
            }
        }

        let by_id: HashMap<NodeId, &NodeDefinition> =
            self.nodes.iter().map(|n| (n.id, n)).collect();

        for conn in &self.connections {
            let source = by_id
                .get(&conn.source)
                .ok_or(WorkflowError::UnknownEndpoint(conn.source))?;
            let target = by_id
                .get(&conn.target)
                .ok_or(WorkflowError::UnknownEndpoint(conn.target))?;
            if conn.source == conn.target {
                return Err(WorkflowError::SelfLoop(conn.source));
            }
            if !source.has_output_port(&conn.output_key) {
                return Err(WorkflowError::UnknownOutputPort {
                    node: conn.source,
                    port: conn.output_key.clone(),
                });
            }
            if !target.has_input_port(&conn.input_key) {
                return Err(WorkflowError::UnknownInputPort {
                    node: conn.target,
                    port: conn.input_key.clone(),
                });
            }
        }

        // Acyclicity — DependencyGraph construction runs Kahn and reports
        // any leftover (cyclic) nodes.
        DependencyGraph::from_definition(self)?;

        if mode == ValidateMode::Full && !self.nodes.iter().any(|n| n.kind == NodeKind::Trigger) {
            return Err(WorkflowError::NoTriggerNode);
        }

        Ok(())
    }
}
