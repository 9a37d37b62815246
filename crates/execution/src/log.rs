//! User-facing progress log entries.
//!
//! Log entries live in two tiers: a hot in-memory cache receives every
//! entry, while the persistent store only receives entries whose
//! `milestone` flag is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{ExecutionId, NodeId};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    #[default]
    Info,
    /// Something unusual that did not stop the execution.
    Warn,
    /// A failure.
    Error,
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The execution started.
    WorkflowStarted,
    /// A node began executing.
    StepStarted,
    /// A node finished successfully.
    StepCompleted,
    /// A node failed.
    StepError,
    /// The execution finished successfully.
    WorkflowCompleted,
    /// The execution failed.
    WorkflowFailed,
    /// The execution paused for a human response.
    HumanInteraction,
    /// A pause deadline is approaching.
    TimeoutWarning,
    /// A pause deadline passed.
    TimedOut,
    /// A for-each loop hit its iteration cap.
    LoopTruncated,
    /// The execution was cancelled.
    Cancelled,
}

impl EventType {
    /// Whether entries of this type cross the persistent boundary by default.
    ///
    /// Step start/completion chatter stays in the hot cache; everything a
    /// user would want to see later is a milestone.
    #[must_use]
    pub fn default_milestone(&self) -> bool {
        !matches!(self, Self::StepStarted | Self::StepCompleted)
    }
}

/// One user-facing log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// The execution this entry belongs to.
    pub execution_id: ExecutionId,
    /// The node this entry concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Severity.
    pub level: LogLevel,
    /// Event classification.
    pub event: EventType,
    /// Human-readable message with step marker.
    pub message: String,
    /// Structured payload (error kind, advice, summaries).
    #[serde(default)]
    pub data: serde_json::Value,
    /// Step number within the execution, 1-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    /// Total number of steps, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    /// Duration of the step in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Whether this entry crosses the persistent boundary.
    pub milestone: bool,
    /// When the entry was emitted.
    pub ts: DateTime<Utc>,
}

impl LogEntry {
    /// Create an entry with the event's default level and milestone flag.
    #[must_use]
    pub fn new(execution_id: ExecutionId, event: EventType, message: impl Into<String>) -> Self {
        let level = match event {
            EventType::StepError | EventType::WorkflowFailed => LogLevel::Error,
            EventType::TimeoutWarning | EventType::TimedOut | EventType::LoopTruncated => {
                LogLevel::Warn
            }
            _ => LogLevel::Info,
        };
        Self {
            execution_id,
            node_id: None,
            level,
            event,
            message: message.into(),
            data: serde_json::Value::Null,
            step: None,
            total_steps: None,
            duration_ms: None,
            milestone: event.default_milestone(),
            ts: Utc::now(),
        }
    }

    /// Attach the node this entry concerns.
    #[must_use]
    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// Attach structured data.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Attach the step position.
    #[must_use]
    pub fn with_step(mut self, step: u32, total: u32) -> Self {
        self.step = Some(step);
        self.total_steps = Some(total);
        self
    }

    /// Attach the step duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Override the milestone flag.
    #[must_use]
    pub fn with_milestone(mut self, milestone: bool) -> Self {
        self.milestone = milestone;
        self
    }

    /// Override the level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}
