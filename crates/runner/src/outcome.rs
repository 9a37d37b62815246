//! Runner outcomes — the explicit sum a runner returns to the engine.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_execution::{PauseReason, ResumeConditions, TimeoutAction};
use weft_workflow::DEFAULT_OUTPUT_PORT;

/// Output values keyed by output port, in deterministic order.
pub type PortMap = BTreeMap<String, serde_json::Value>;

/// What a runner produced.
///
/// Failures are `Err(RunnerError)` on the run call itself, completing the
/// `Result | WaitSignal | Failure` sum. The engine matches on this to decide
/// what happens next:
/// - `Finished` → route port values along outgoing edges
/// - `Wait` → persist a pause record and release the execution
#[derive(Debug, Clone)]
pub enum RunnerOutcome {
    /// The node finished; values are keyed by output port. Outgoing edges
    /// whose output key was not produced are treated as not taken.
    Finished(PortMap),
    /// The node needs an external event (human response or timer) before
    /// it can produce output.
    Wait(WaitSignal),
}

impl RunnerOutcome {
    /// Finish with a single value on the conventional `result` port.
    #[must_use]
    pub fn result(value: serde_json::Value) -> Self {
        Self::on_port(DEFAULT_OUTPUT_PORT, value)
    }

    /// Finish with a single value on a named port.
    #[must_use]
    pub fn on_port(port: impl Into<String>, value: serde_json::Value) -> Self {
        let mut ports = PortMap::new();
        ports.insert(port.into(), value);
        Self::Finished(ports)
    }

    /// Finish with no output at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::Finished(PortMap::new())
    }

    /// Returns `true` if this outcome pauses the execution.
    #[must_use]
    pub fn is_wait(&self) -> bool {
        matches!(self, Self::Wait(_))
    }

    /// Access the port map of a finished outcome.
    #[must_use]
    pub fn ports(&self) -> Option<&PortMap> {
        match self {
            Self::Finished(ports) => Some(ports),
            Self::Wait(_) => None,
        }
    }
}

/// Kind of interaction requested from a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// Binary approve/reject decision.
    Approval,
    /// Free-form text or structured data input.
    Input,
    /// Choose from a set of options.
    Selection,
    /// Review content and respond with feedback.
    Review,
}

/// Channel a human interaction is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Slack message.
    Slack,
    /// Email.
    Email,
    /// Outbound webhook; the response arrives on a callback.
    Webhook,
    /// In-app notification.
    InApp,
}

impl Channel {
    /// Stable name used in resume-condition matching.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Email => "email",
            Self::Webhook => "webhook",
            Self::InApp => "in_app",
        }
    }
}

/// Everything the pause controller needs to create an external interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionSpec {
    /// What kind of interaction.
    pub interaction_type: InteractionType,
    /// Where to deliver it.
    pub channel: Channel,
    /// Message shown to the human.
    pub prompt: String,
    /// Options for `Selection`/`Approval`, form schema for `Input`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// A pause request: interaction kind, timeout, and resume conditions.
#[derive(Debug, Clone)]
pub struct WaitSignal {
    /// Why the execution pauses.
    pub reason: PauseReason,
    /// Human interaction details; `None` for pure timers.
    pub interaction: Option<InteractionSpec>,
    /// How long to wait before the timeout action applies.
    pub timeout: Duration,
    /// What to do when the deadline passes.
    pub timeout_action: TimeoutAction,
    /// Response injected by `TimeoutAction::InjectDefault`.
    pub default_response: Option<serde_json::Value>,
    /// How to decide whether an incoming response matches.
    pub resume_conditions: ResumeConditions,
}

impl WaitSignal {
    /// A human-interaction wait.
    #[must_use]
    pub fn human(
        interaction: InteractionSpec,
        timeout: Duration,
        timeout_action: TimeoutAction,
    ) -> Self {
        let resume_conditions = ResumeConditions::any()
            .with_channel(interaction.channel.as_str())
            .with_prompt(interaction.prompt.clone());
        Self {
            reason: PauseReason::HumanInteraction,
            interaction: Some(interaction),
            timeout,
            timeout_action,
            default_response: None,
            resume_conditions,
        }
    }

    /// A pure timer wait: at the deadline the node continues with an
    /// empty output.
    #[must_use]
    pub fn timer(duration: Duration) -> Self {
        Self {
            reason: PauseReason::TimerWait,
            interaction: None,
            timeout: duration,
            timeout_action: TimeoutAction::Continue,
            default_response: None,
            resume_conditions: ResumeConditions::any(),
        }
    }

    /// Attach the default response used by `InjectDefault`.
    #[must_use]
    pub fn with_default_response(mut self, response: serde_json::Value) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Replace the resume conditions.
    #[must_use]
    pub fn with_resume_conditions(mut self, conditions: ResumeConditions) -> Self {
        self.resume_conditions = conditions;
        self
    }
}
