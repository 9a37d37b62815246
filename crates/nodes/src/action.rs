//! Action runners — pure internal operations.

use std::time::Duration;

use async_trait::async_trait;
use weft_expression::EvaluationContext;
use weft_runner::{
    ConfigSchema, FieldSpec, HttpRequest, NodeInput, NodeRunner, PortMap, RunContext, RunnerError,
    RunnerOutcome, RunnerSpec,
};
use weft_workflow::NodeKind;

fn expression_context(ctx: &RunContext, input: &NodeInput) -> EvaluationContext {
    EvaluationContext::new()
        .with_input(input.primary())
        .with_trigger(ctx.trigger.clone())
}

/// `action/transform` — evaluates an expression per output field and merges
/// the results over the incoming object.
///
/// Config:
/// - `fields` (required object): output field name → expression source.
pub struct TransformRunner {
    spec: RunnerSpec,
}

impl TransformRunner {
    /// Create the transform runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(
                NodeKind::Action,
                "transform",
                "Adds computed fields to the incoming object",
            )
            .with_schema(ConfigSchema::new().field(FieldSpec::object("fields").required())),
        }
    }
}

impl Default for TransformRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for TransformRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;

        let fields = ctx
            .config_value("fields")
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| {
                RunnerError::invalid_configuration("missing object parameter \"fields\"")
            })?;

        let mut output = match input.primary() {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("input".to_owned(), other);
                map
            }
        };

        let eval_ctx = expression_context(ctx, input);
        for (name, source) in fields {
            let source = source.as_str().ok_or_else(|| {
                RunnerError::invalid_configuration(format!(
                    "field {name:?} must be an expression string"
                ))
            })?;
            let value = weft_expression::evaluate(source, &eval_ctx)
                .map_err(|e| RunnerError::Expression(e.to_string()))?;
            output.insert(name.clone(), value);
        }

        Ok(RunnerOutcome::result(serde_json::Value::Object(output)))
    }
}

/// `action/set` — merges static values over the incoming object.
///
/// Config:
/// - `values` (required object): field name → literal JSON value.
pub struct SetRunner {
    spec: RunnerSpec,
}

impl SetRunner {
    /// Create the set runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(
                NodeKind::Action,
                "set",
                "Sets static fields on the incoming object",
            )
            .with_schema(ConfigSchema::new().field(FieldSpec::object("values").required())),
        }
    }
}

impl Default for SetRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for SetRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;

        let values = ctx
            .config_value("values")
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| {
                RunnerError::invalid_configuration("missing object parameter \"values\"")
            })?;

        let mut output = match input.primary() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (key, value) in values {
            output.insert(key.clone(), value.clone());
        }

        Ok(RunnerOutcome::result(serde_json::Value::Object(output)))
    }
}

/// `action/http_request` — one outbound HTTP request through the HTTP
/// invoker adapter. Surfaces the status and parsed body; transport-level
/// failures become provider errors.
///
/// Config:
/// - `url` (required string)
/// - `method` (enum, default `GET`)
/// - `headers` (object of string values)
/// - `body` (any JSON, sent as the request body)
/// - `body_expression` (expression producing the body from the input)
/// - `timeout_secs` (integer 1..=300, default 30)
pub struct HttpRequestRunner {
    spec: RunnerSpec,
}

impl HttpRequestRunner {
    /// Create the HTTP request runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(
                NodeKind::Action,
                "http_request",
                "Issues one outbound HTTP request",
            )
            .with_schema(
                ConfigSchema::new()
                    .field(FieldSpec::string("url").required())
                    .field(FieldSpec::string("method").with_enum([
                        "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD",
                    ]))
                    .field(FieldSpec::object("headers"))
                    .field(FieldSpec::expression("body_expression"))
                    .field(FieldSpec::integer("timeout_secs").with_range(1.0, 300.0)),
            ),
        }
    }
}

impl Default for HttpRequestRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for HttpRequestRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;

        let url = ctx.config_str("url")?.to_owned();
        let method = ctx.config_str_opt("method").unwrap_or("GET").to_owned();
        let headers: Vec<(String, String)> = ctx
            .config_value("headers")
            .and_then(serde_json::Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let value = v.as_str().map_or_else(|| v.to_string(), str::to_owned);
                        (k.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let body = if let Some(source) = ctx.config_str_opt("body_expression") {
            let eval_ctx = expression_context(ctx, input);
            Some(
                weft_expression::evaluate(source, &eval_ctx)
                    .map_err(|e| RunnerError::Expression(e.to_string()))?,
            )
        } else {
            ctx.config_value("body").cloned()
        };

        let timeout = Duration::from_secs(ctx.config_u64("timeout_secs").unwrap_or(30));

        let response = ctx
            .http()?
            .request(HttpRequest {
                method,
                url,
                headers,
                body,
                timeout,
            })
            .await?;

        let mut ports = PortMap::new();
        ports.insert(
            weft_workflow::DEFAULT_OUTPUT_PORT.to_owned(),
            serde_json::json!({
                "status": response.status,
                "body": response.body,
            }),
        );
        Ok(RunnerOutcome::Finished(ports))
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
    use weft_runner::{Adapters, HttpInvoker, HttpResponse};

    fn context(config: serde_json::Value) -> RunContext {
        let config = config.as_object().cloned().unwrap_or_default();
        RunContext::new(ExecutionId::v4(), WorkflowId::v4(), NodeId::v4(), "node")
            .with_config(config)
    }

    #[tokio::test]
    async fn transform_merges_computed_fields() {
        let runner = TransformRunner::new();
        let ctx = context(json!({"fields": {"y": "input.x * 2"}}));
        let input = NodeInput::new().with("input", json!({"x": 21}));

        let outcome = runner.run(&ctx, &input).await.unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!({"x": 21, "y": 42}))
        );
    }

    #[tokio::test]
    async fn transform_wraps_scalar_input() {
        let runner = TransformRunner::new();
        let ctx = context(json!({"fields": {"doubled": "input * 2"}}));
        let input = NodeInput::new().with("input", json!(5));

        let outcome = runner.run(&ctx, &input).await.unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!({"input": 5, "doubled": 10}))
        );
    }

    #[tokio::test]
    async fn transform_bad_expression_is_expression_error() {
        let runner = TransformRunner::new();
        let ctx = context(json!({"fields": {"y": "input.x +"}}));
        let input = NodeInput::new().with("input", json!({"x": 1}));

        let err = runner.run(&ctx, &input).await.unwrap_err();
        assert!(matches!(err, RunnerError::Expression(_)));
    }

    #[tokio::test]
    async fn transform_missing_fields_config() {
        let runner = TransformRunner::new();
        let ctx = context(json!({}));
        let err = runner.run(&ctx, &NodeInput::new()).await.unwrap_err();
        assert!(matches!(err, RunnerError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn set_overwrites_fields() {
        let runner = SetRunner::new();
        let ctx = context(json!({"values": {"status": "ready", "count": 2}}));
        let input = NodeInput::new().with("input", json!({"status": "new", "kept": true}));

        let outcome = runner.run(&ctx, &input).await.unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!({"status": "ready", "count": 2, "kept": true}))
        );
    }

    struct RecordingHttp {
        requests: Mutex<Vec<HttpRequest>>,
        response: HttpResponse,
    }

    #[async_trait]
    impl HttpInvoker for RecordingHttp {
        async fn request(&self, request: HttpRequest) -> Result<HttpResponse, RunnerError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn http_request_surfaces_status_and_body() {
        let http = Arc::new(RecordingHttp {
            requests: Mutex::new(Vec::new()),
            response: HttpResponse {
                status: 201,
                headers: vec![],
                body: json!({"id": 7}),
            },
        });
        let adapters = Adapters {
            http: Some(http.clone()),
            ..Adapters::default()
        };
        let ctx = context(json!({
            "url": "https://sink.example/items",
            "method": "POST",
            "body_expression": "input",
            "timeout_secs": 5
        }))
        .with_adapters(adapters);

        let runner = HttpRequestRunner::new();
        let input = NodeInput::new().with("input", json!({"x": 21, "y": 42}));
        let outcome = runner.run(&ctx, &input).await.unwrap();

        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!({"status": 201, "body": {"id": 7}}))
        );

        let requests = http.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].url, "https://sink.example/items");
        assert_eq!(requests[0].body, Some(json!({"x": 21, "y": 42})));
        assert_eq!(requests[0].timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn http_request_without_adapter_fails() {
        let runner = HttpRequestRunner::new();
        let ctx = context(json!({"url": "https://x"}));
        let err = runner.run(&ctx, &NodeInput::new()).await.unwrap_err();
        assert!(matches!(err, RunnerError::Internal(_)));
    }
}
