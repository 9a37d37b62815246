//! Tool runners — effectful tools usable as graph nodes or invoked inline
//! by AI agents.

use std::time::Duration;

use async_trait::async_trait;
use weft_expression::EvaluationContext;
use weft_runner::{
    ConfigSchema, FieldSpec, HttpRequest, NodeInput, NodeRunner, RunContext, RunnerError,
    RunnerOutcome, RunnerSpec,
};
use weft_workflow::NodeKind;

/// Runner for tool subtypes (`http`, `code`, `web_scraper`, `mcp`).
///
/// Config (per subtype):
/// - `http`: `url` (required), `method` (default `GET`)
/// - `code`: `expression` (required)
/// - `web_scraper`: `url` (required)
/// - `mcp`: `operation` (required), `server` (string)
pub struct ToolRunner {
    spec: RunnerSpec,
}

impl ToolRunner {
    /// Create a tool runner for one subtype.
    #[must_use]
    pub fn new(subtype: &str) -> Self {
        let schema = match subtype {
            "code" => ConfigSchema::new().field(FieldSpec::expression("expression").required()),
            "mcp" => ConfigSchema::new()
                .field(FieldSpec::string("operation").required())
                .field(FieldSpec::string("server")),
            // http and web_scraper
            _ => ConfigSchema::new()
                .field(FieldSpec::string("url").required())
                .field(FieldSpec::string("method").with_enum(["GET", "POST"])),
        };
        Self {
            spec: RunnerSpec::new(NodeKind::Tool, subtype, format!("{subtype} tool"))
                .with_schema(schema),
        }
    }
}

#[async_trait]
impl NodeRunner for ToolRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;

        match self.spec.subtype.as_str() {
            "code" => {
                let source = ctx.config_str("expression")?;
                let eval_ctx = EvaluationContext::new()
                    .with_input(input.primary())
                    .with_trigger(ctx.trigger.clone());
                let value = weft_expression::evaluate(source, &eval_ctx)
                    .map_err(|e| RunnerError::Expression(e.to_string()))?;
                Ok(RunnerOutcome::result(value))
            }
            "mcp" => {
                let operation = ctx.config_str("operation")?;
                let server = ctx.config_str_opt("server").unwrap_or("mcp");
                let credentials = weft_runner::SecureString::new("");
                let result = ctx
                    .services()?
                    .invoke(server, operation, input.primary(), &credentials)
                    .await?;
                if result.success {
                    Ok(RunnerOutcome::result(result.data))
                } else {
                    Err(RunnerError::ProviderError {
                        provider: server.to_owned(),
                        status: result.status.unwrap_or(0),
                        message: result.error.unwrap_or_else(|| "tool error".to_owned()),
                    })
                }
            }
            // http and web_scraper both issue one request; the scraper
            // returns the body only.
            _ => {
                let url = ctx.config_str("url")?.to_owned();
                let method = ctx.config_str_opt("method").unwrap_or("GET").to_owned();
                let body = match input.primary() {
                    serde_json::Value::Null => None,
                    other => Some(other),
                };
                let response = ctx
                    .http()?
                    .request(HttpRequest {
                        method,
                        url,
                        headers: Vec::new(),
                        body,
                        timeout: Duration::from_secs(30),
                    })
                    .await?;

                if self.spec.subtype == "web_scraper" {
                    Ok(RunnerOutcome::result(response.body))
                } else {
                    Ok(RunnerOutcome::result(serde_json::json!({
                        "status": response.status,
                        "body": response.body,
                    })))
                }
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
    use weft_core::{ExecutionId, NodeId, WorkflowId};
    use weft_runner::{Adapters, HttpInvoker, HttpResponse, ServiceInvoker, ServiceResult};

    struct StaticHttp {
        response: HttpResponse,
    }

    #[async_trait]
    impl HttpInvoker for StaticHttp {
        async fn request(&self, _request: HttpRequest) -> Result<HttpResponse, RunnerError> {
            Ok(self.response.clone())
        }
    }

    struct StaticServices {
        result: ServiceResult,
    }

    #[async_trait]
    impl ServiceInvoker for StaticServices {
        async fn invoke(
            &self,
            _provider: &str,
            _operation: &str,
            _params: serde_json::Value,
            _credentials: &weft_runner::SecureString,
        ) -> Result<ServiceResult, RunnerError> {
            Ok(self.result.clone())
        }
    }

    fn context(config: serde_json::Value, adapters: Adapters) -> RunContext {
        RunContext::new(ExecutionId::v4(), WorkflowId::v4(), NodeId::v4(), "tool")
            .with_config(config.as_object().cloned().unwrap_or_default())
            .with_adapters(adapters)
    }

    #[tokio::test]
    async fn code_tool_evaluates_expression() {
        let ctx = context(json!({"expression": "input.a + input.b"}), Adapters::default());
        let input = NodeInput::new().with("input", json!({"a": 2, "b": 3}));
        let outcome = ToolRunner::new("code").run(&ctx, &input).await.unwrap();
        assert_eq!(outcome.ports().unwrap().get("result"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn http_tool_returns_status_and_body() {
        let adapters = Adapters {
            http: Some(Arc::new(StaticHttp {
                response: HttpResponse {
                    status: 200,
                    headers: vec![],
                    body: json!({"ok": true}),
                },
            })),
            ..Adapters::default()
        };
        let ctx = context(json!({"url": "https://api.example"}), adapters);
        let outcome = ToolRunner::new("http")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!({"status": 200, "body": {"ok": true}}))
        );
    }

    #[tokio::test]
    async fn web_scraper_returns_body_only() {
        let adapters = Adapters {
            http: Some(Arc::new(StaticHttp {
                response: HttpResponse {
                    status: 200,
                    headers: vec![],
                    body: json!("<html>hi</html>"),
                },
            })),
            ..Adapters::default()
        };
        let ctx = context(json!({"url": "https://page.example"}), adapters);
        let outcome = ToolRunner::new("web_scraper")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!("<html>hi</html>"))
        );
    }

    #[tokio::test]
    async fn mcp_tool_invokes_service() {
        let adapters = Adapters {
            services: Some(Arc::new(StaticServices {
                result: ServiceResult::ok(json!({"answer": 42})),
            })),
            ..Adapters::default()
        };
        let ctx = context(json!({"operation": "ask"}), adapters);
        let outcome = ToolRunner::new("mcp")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!({"answer": 42}))
        );
    }

    #[tokio::test]
    async fn mcp_tool_failure_is_provider_error() {
        let adapters = Adapters {
            services: Some(Arc::new(StaticServices {
                result: ServiceResult::err(502, "bad gateway"),
            })),
            ..Adapters::default()
        };
        let ctx = context(json!({"operation": "ask"}), adapters);
        let err = ToolRunner::new("mcp")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "provider_error");
        assert!(err.is_retryable());
    }
}
