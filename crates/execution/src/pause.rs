//! Pause records — persisted markers that an execution awaits an external event.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{ExecutionId, InteractionId, NodeId};

/// Why an execution is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// Waiting for a human response on a channel.
    HumanInteraction,
    /// Waiting for a timer to elapse.
    TimerWait,
}

/// Policy applied when a pause deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Mark the node timed-out and apply the workflow error policy.
    #[default]
    Fail,
    /// Materialize an empty output and continue.
    Continue,
    /// Materialize the configured default response and continue.
    InjectDefault,
}

/// Conditions an incoming response must satisfy to resume a pause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeConditions {
    /// Required channel, matched against the responder's channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Required responder identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
    /// Minimum relevance score from the response classifier; responses
    /// scoring below are discarded and the pause stays open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_relevance: Option<f64>,
    /// The interaction prompt, retained for relevance scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl ResumeConditions {
    /// Conditions that accept any response.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Require a specific channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Require a specific responder.
    #[must_use]
    pub fn with_responder(mut self, responder: impl Into<String>) -> Self {
        self.responder = Some(responder.into());
        self
    }

    /// Require a minimum relevance score.
    #[must_use]
    pub fn with_min_relevance(mut self, score: f64) -> Self {
        self.min_relevance = Some(score);
        self
    }

    /// Retain the interaction prompt for relevance scoring.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// A persisted pause: one per paused execution.
///
/// Created atomically with the engine releasing the execution; deleted on
/// resume or timeout. Deletion (compare-and-set on `version`) is the
/// linearization point between an external resume and the timeout monitor —
/// whichever deletes first wins, the other observes no pending pause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseRecord {
    /// The paused execution.
    pub execution_id: ExecutionId,
    /// The waiting node.
    pub node_id: NodeId,
    /// Why the execution paused.
    pub reason: PauseReason,
    /// What an acceptable response looks like.
    #[serde(default)]
    pub resume_conditions: ResumeConditions,
    /// When the pause times out.
    pub deadline: DateTime<Utc>,
    /// What to do when the deadline passes.
    pub timeout_action: TimeoutAction,
    /// Response injected on timeout when `timeout_action` is `InjectDefault`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_response: Option<serde_json::Value>,
    /// External interaction id for human-in-the-loop pauses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<InteractionId>,
    /// Whether the pre-deadline warning has been emitted.
    #[serde(default)]
    pub warned: bool,
    /// Optimistic concurrency version.
    pub version: u64,
    /// When the pause was created.
    pub created_at: DateTime<Utc>,
}

impl PauseRecord {
    /// Create a pause record with a deadline `timeout` from now.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        node_id: NodeId,
        reason: PauseReason,
        timeout: std::time::Duration,
        timeout_action: TimeoutAction,
    ) -> Self {
        let now = Utc::now();
        Self {
            execution_id,
            node_id,
            reason,
            resume_conditions: ResumeConditions::default(),
            deadline: now + Duration::from_std(timeout).unwrap_or(Duration::zero()),
            timeout_action,
            default_response: None,
            interaction_id: None,
            warned: false,
            version: 0,
            created_at: now,
        }
    }

    /// Attach resume conditions.
    #[must_use]
    pub fn with_resume_conditions(mut self, conditions: ResumeConditions) -> Self {
        self.resume_conditions = conditions;
        self
    }

    /// Attach the default response used by `InjectDefault`.
    #[must_use]
    pub fn with_default_response(mut self, response: serde_json::Value) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Attach an external interaction id.
    #[must_use]
    pub fn with_interaction_id(mut self, id: InteractionId) -> Self {
        self.interaction_id = Some(id);
        self
    }

    /// Returns `true` if the deadline has passed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Returns `true` if `now` is inside the pre-deadline warning window
    /// and no warning has been emitted yet.
    #[must_use]
    pub fn warning_due(&self, now: DateTime<Utc>, window: std::time::Duration) -> bool {
        if self.warned || self.is_expired(now) {
            return false;
        }
        let window = Duration::from_std(window).unwrap_or(Duration::zero());
        now >= self.deadline - window
    }
}
