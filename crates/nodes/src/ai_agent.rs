//! AI agent runner — completion with tool fan-out.

use async_trait::async_trait;
use weft_runner::{
    AiMessage, AiRequest, ConfigSchema, FieldSpec, NodeInput, NodeRunner, RunContext, RunnerError,
    RunnerOutcome, RunnerSpec,
};
use weft_workflow::NodeKind;

const DEFAULT_MAX_TOOL_ROUNDS: u64 = 5;

/// `ai_agent/agent` — calls the AI adapter with a system prompt plus the
/// node's input context. When the model requests tool calls, the runner
/// invokes the matching tool nodes through the engine's tool handle and
/// feeds the results back, up to a bounded number of rounds.
///
/// Config:
/// - `system_prompt` (required string)
/// - `model_config` (object): provider-specific settings passed through.
/// - `max_tool_rounds` (integer 1..=20, default 5)
pub struct AiAgentRunner {
    spec: RunnerSpec,
}

impl AiAgentRunner {
    /// Create the agent runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(
                NodeKind::AiAgent,
                "agent",
                "Runs an AI agent over the node's input, with tool fan-out",
            )
            .with_schema(
                ConfigSchema::new()
                    .field(FieldSpec::string("system_prompt").required())
                    .field(FieldSpec::object("model_config"))
                    .field(FieldSpec::integer("max_tool_rounds").with_range(1.0, 20.0)),
            ),
        }
    }
}

impl Default for AiAgentRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for AiAgentRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;

        let system_prompt = ctx.config_str("system_prompt")?.to_owned();
        let model_config = ctx
            .config_value("model_config")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let max_rounds = ctx
            .config_u64("max_tool_rounds")
            .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS);

        let tools = ctx.tools().map(|handle| handle.tools()).unwrap_or_default();

        let mut messages = vec![AiMessage::user(input.primary().to_string())];
        let mut total_usage = weft_runner::AiUsage::default();
        let mut rounds = 0u64;

        loop {
            ctx.check_cancelled()?;
            rounds += 1;

            let response = ctx
                .ai()?
                .complete(AiRequest {
                    system_prompt: system_prompt.clone(),
                    messages: messages.clone(),
                    tools: tools.clone(),
                    config: model_config.clone(),
                })
                .await?;

            total_usage.input_tokens += response.usage.input_tokens;
            total_usage.output_tokens += response.usage.output_tokens;

            if response.tool_calls.is_empty() {
                return Ok(RunnerOutcome::result(serde_json::json!({
                    "text": response.text,
                    "usage": {
                        "input_tokens": total_usage.input_tokens,
                        "output_tokens": total_usage.output_tokens,
                    },
                    "rounds": rounds,
                })));
            }

            if rounds >= max_rounds {
                return Err(RunnerError::internal(format!(
                    "agent exceeded {max_rounds} tool rounds without a final answer"
                )));
            }

            let handle = ctx.tools().ok_or_else(|| {
                RunnerError::internal("model requested tools but no tool handle is attached")
            })?;

            messages.push(AiMessage::assistant(response.text.clone()));
            for call in response.tool_calls {
                tracing::debug!(tool = %call.name, "agent tool call");
                let result = handle.invoke_tool(&call.name, call.arguments).await?;
                messages.push(AiMessage::tool(result.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::Mutex;
    use weft_core::{ExecutionId, NodeId, WorkflowId};
    use weft_runner::{Adapters, AiProvider, AiResponse, AiUsage, ToolCall, ToolDescriptor, ToolHandle};

    struct ScriptedAi {
        responses: Mutex<Vec<AiResponse>>,
    }

    #[async_trait]
    impl AiProvider for ScriptedAi {
        async fn complete(&self, _request: AiRequest) -> Result<AiResponse, RunnerError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(RunnerError::internal("script exhausted"));
            }
            Ok(responses.remove(0))
        }
    }

    struct FakeTools {
        invocations: Mutex<Vec<(String, serde_json::Value)>>,
    }

    #[async_trait]
    impl ToolHandle for FakeTools {
        fn tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor {
                name: "search".into(),
                description: "Searches things".into(),
            }]
        }

        async fn invoke_tool(
            &self,
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<serde_json::Value, RunnerError> {
            self.invocations
                .lock()
                .unwrap()
                .push((name.to_owned(), arguments));
            Ok(json!({"hits": 3}))
        }
    }

    fn final_response(text: &str) -> AiResponse {
        AiResponse {
            text: text.into(),
            tool_calls: vec![],
            usage: AiUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }

    fn tool_response(tool: &str) -> AiResponse {
        AiResponse {
            text: "thinking".into(),
            tool_calls: vec![ToolCall {
                name: tool.into(),
                arguments: json!({"q": "weather"}),
            }],
            usage: AiUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }

    fn context(ai: Arc<ScriptedAi>, tools: Option<Arc<FakeTools>>) -> RunContext {
        let mut ctx = RunContext::new(ExecutionId::v4(), WorkflowId::v4(), NodeId::v4(), "agent")
            .with_config(
                json!({"system_prompt": "You are helpful."})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .with_adapters(Adapters {
                ai: Some(ai),
                ..Adapters::default()
            });
        if let Some(tools) = tools {
            ctx = ctx.with_tools(tools);
        }
        ctx
    }

    #[tokio::test]
    async fn direct_answer_without_tools() {
        let ai = Arc::new(ScriptedAi {
            responses: Mutex::new(vec![final_response("done")]),
        });
        let ctx = context(ai, None);

        let outcome = AiAgentRunner::new()
            .run(&ctx, &NodeInput::new().with("input", json!("hello")))
            .await
            .unwrap();

        let result = outcome.ports().unwrap().get("result").unwrap().clone();
        assert_eq!(result["text"], json!("done"));
        assert_eq!(result["rounds"], json!(1));
        assert_eq!(result["usage"]["input_tokens"], json!(10));
    }

    #[tokio::test]
    async fn tool_round_then_final() {
        let ai = Arc::new(ScriptedAi {
            responses: Mutex::new(vec![tool_response("search"), final_response("sunny")]),
        });
        let tools = Arc::new(FakeTools {
            invocations: Mutex::new(Vec::new()),
        });
        let ctx = context(ai, Some(tools.clone()));

        let outcome = AiAgentRunner::new()
            .run(&ctx, &NodeInput::new().with("input", json!("weather?")))
            .await
            .unwrap();

        let result = outcome.ports().unwrap().get("result").unwrap().clone();
        assert_eq!(result["text"], json!("sunny"));
        assert_eq!(result["rounds"], json!(2));
        // Usage accumulates across rounds.
        assert_eq!(result["usage"]["output_tokens"], json!(10));

        let invocations = tools.invocations.lock().unwrap();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].0, "search");
        assert_eq!(invocations[0].1, json!({"q": "weather"}));
    }

    #[tokio::test]
    async fn tool_calls_without_handle_error() {
        let ai = Arc::new(ScriptedAi {
            responses: Mutex::new(vec![tool_response("search")]),
        });
        let ctx = context(ai, None);

        let err = AiAgentRunner::new()
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Internal(_)));
    }

    #[tokio::test]
    async fn round_cap_enforced() {
        // The model keeps asking for tools forever.
        let ai = Arc::new(ScriptedAi {
            responses: Mutex::new(vec![
                tool_response("search"),
                tool_response("search"),
                tool_response("search"),
                tool_response("search"),
                tool_response("search"),
            ]),
        });
        let tools = Arc::new(FakeTools {
            invocations: Mutex::new(Vec::new()),
        });
        let mut config = json!({"system_prompt": "s"}).as_object().cloned().unwrap();
        config.insert("max_tool_rounds".into(), json!(2));
        let ctx = RunContext::new(ExecutionId::v4(), WorkflowId::v4(), NodeId::v4(), "agent")
            .with_config(config)
            .with_adapters(Adapters {
                ai: Some(ai),
                ..Adapters::default()
            })
            .with_tools(tools);

        let err = AiAgentRunner::new()
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tool rounds"));
    }

    #[tokio::test]
    async fn missing_ai_adapter() {
        let ctx = RunContext::new(ExecutionId::v4(), WorkflowId::v4(), NodeId::v4(), "agent")
            .with_config(
                json!({"system_prompt": "s"}).as_object().cloned().unwrap(),
            );
        let err = AiAgentRunner::new()
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Internal(_)));
    }
}
