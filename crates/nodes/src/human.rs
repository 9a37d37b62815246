//! Human-in-the-loop runners — yield a wait signal and let the pause
//! controller create the external interaction.

use std::time::Duration;

use async_trait::async_trait;
use weft_execution::{ResumeConditions, TimeoutAction};
use weft_runner::{
    Channel, ConfigSchema, FieldSpec, InteractionSpec, InteractionType, NodeInput, NodeRunner,
    RunContext, RunnerError, RunnerOutcome, RunnerSpec, WaitSignal,
};
use weft_workflow::NodeKind;

/// Minimum HIL timeout: 60 seconds.
pub const MIN_TIMEOUT_SECS: u64 = 60;
/// Maximum HIL timeout: 24 hours.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;
const DEFAULT_TIMEOUT_SECS: u64 = 3_600;

/// Runner for `human_in_loop` subtypes (`approval`, `input`, `selection`,
/// `review`).
///
/// Config:
/// - `channel` (required enum `slack` | `email` | `webhook` | `in_app`)
/// - `prompt` (string; falls back to the input's `message` field)
/// - `timeout` (integer seconds, 60..=86400, default 3600)
/// - `timeout_action` (enum `fail` | `continue` | `inject_default`, default `fail`)
/// - `default_response` (required whenever `timeout_action` is `inject_default`)
/// - `options` (array, e.g. approval options)
/// - `responder` (string: only this identity may resume)
/// - `min_relevance` (number 0..=1: classifier threshold override)
/// - `fail_on_rejection` (bool: a rejected response fails the node)
pub struct HumanInLoopRunner {
    spec: RunnerSpec,
    interaction_type: InteractionType,
}

impl HumanInLoopRunner {
    /// Create a runner for one interaction subtype.
    #[must_use]
    pub fn new(subtype: &str) -> Self {
        let interaction_type = match subtype {
            "input" => InteractionType::Input,
            "selection" => InteractionType::Selection,
            "review" => InteractionType::Review,
            _ => InteractionType::Approval,
        };
        Self {
            spec: RunnerSpec::new(
                NodeKind::HumanInLoop,
                subtype,
                format!("Pauses for a human {subtype} response"),
            )
            .with_schema(
                ConfigSchema::new()
                    .field(FieldSpec::string("channel").required().with_enum([
                        "slack", "email", "webhook", "in_app",
                    ]))
                    .field(FieldSpec::string("prompt"))
                    .field(
                        FieldSpec::integer("timeout")
                            .with_range(MIN_TIMEOUT_SECS as f64, MAX_TIMEOUT_SECS as f64),
                    )
                    .field(FieldSpec::string("timeout_action").with_enum([
                        "fail",
                        "continue",
                        "inject_default",
                    ]))
                    .field(FieldSpec::array("options"))
                    .field(FieldSpec::string("responder"))
                    .field(FieldSpec::new("min_relevance", weft_runner::FieldKind::Float)
                        .with_range(0.0, 1.0))
                    .field(FieldSpec::boolean("fail_on_rejection")),
            ),
            interaction_type,
        }
    }

    fn parse_channel(value: &str) -> Result<Channel, RunnerError> {
        match value {
            "slack" => Ok(Channel::Slack),
            "email" => Ok(Channel::Email),
            "webhook" => Ok(Channel::Webhook),
            "in_app" => Ok(Channel::InApp),
            other => Err(RunnerError::invalid_configuration(format!(
                "unknown channel {other:?}"
            ))),
        }
    }

    fn parse_timeout_action(value: Option<&str>) -> Result<TimeoutAction, RunnerError> {
        match value {
            None | Some("fail") => Ok(TimeoutAction::Fail),
            Some("continue") => Ok(TimeoutAction::Continue),
            Some("inject_default") => Ok(TimeoutAction::InjectDefault),
            Some(other) => Err(RunnerError::invalid_configuration(format!(
                "unknown timeout_action {other:?}"
            ))),
        }
    }
}

#[async_trait]
impl NodeRunner for HumanInLoopRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;

        let channel = Self::parse_channel(ctx.config_str("channel")?)?;
        let timeout_secs = ctx.config_u64("timeout").unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(RunnerError::invalid_configuration(format!(
                "timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds, got {timeout_secs}"
            )));
        }
        let timeout_action = Self::parse_timeout_action(ctx.config_str_opt("timeout_action"))?;

        let default_response = ctx.config_value("default_response").cloned();
        if timeout_action == TimeoutAction::InjectDefault && default_response.is_none() {
            return Err(RunnerError::invalid_configuration(
                "timeout_action \"inject_default\" requires a \"default_response\"",
            ));
        }

        let prompt = ctx
            .config_str_opt("prompt")
            .map(str::to_owned)
            .or_else(|| {
                input
                    .primary()
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| format!("Response requested by {}", ctx.node_name));

        let interaction = InteractionSpec {
            interaction_type: self.interaction_type,
            channel,
            prompt: prompt.clone(),
            options: ctx.config_value("options").cloned(),
        };

        let mut conditions = ResumeConditions::any()
            .with_channel(channel.as_str())
            .with_prompt(prompt);
        if let Some(responder) = ctx.config_str_opt("responder") {
            conditions = conditions.with_responder(responder);
        }
        if let Some(score) = ctx
            .config_value("min_relevance")
            .and_then(serde_json::Value::as_f64)
        {
            conditions = conditions.with_min_relevance(score);
        }

        let mut signal = WaitSignal::human(
            interaction,
            Duration::from_secs(timeout_secs),
            timeout_action,
        )
        .with_resume_conditions(conditions);
        if let Some(default_response) = default_response {
            signal = signal.with_default_response(default_response);
        }

        Ok(RunnerOutcome::Wait(signal))
    }
}
