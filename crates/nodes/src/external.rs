//! External action runners — operations on third-party systems.

use async_trait::async_trait;
use weft_expression::EvaluationContext;
use weft_runner::{
    ConfigSchema, CredentialStatus, FieldSpec, NodeInput, NodeRunner, RunContext, RunnerError,
    RunnerOutcome, RunnerSpec, SecureString,
};
use weft_workflow::NodeKind;

/// Runner for external integrations (`slack`, `github`, `calendar`,
/// `notion`, `api_call`).
///
/// Credentials are resolved through the vault keyed by `(user, provider)`;
/// an expired credential is refreshed once before giving up. Provider
/// responses are shaped into the uniform error kinds so the engine can
/// retry transient ones.
///
/// Config:
/// - `operation` (required string): provider operation name.
/// - `params` (object): static operation parameters.
/// - `params_expression` (expression): parameters computed from the input;
///   merged over `params`.
pub struct ExternalActionRunner {
    spec: RunnerSpec,
    provider: String,
}

impl ExternalActionRunner {
    /// Create a runner for one provider subtype.
    #[must_use]
    pub fn new(provider: &str) -> Self {
        Self {
            spec: RunnerSpec::new(
                NodeKind::ExternalAction,
                provider,
                format!("Invokes an operation on {provider}"),
            )
            .with_schema(
                ConfigSchema::new()
                    .field(FieldSpec::string("operation").required())
                    .field(FieldSpec::object("params"))
                    .field(FieldSpec::expression("params_expression")),
            ),
            provider: provider.to_owned(),
        }
    }

    async fn resolve_credentials(&self, ctx: &RunContext) -> Result<SecureString, RunnerError> {
        let user = ctx.user_id.ok_or_else(|| {
            RunnerError::invalid_configuration("external action requires an acting user")
        })?;
        let vault = ctx.vault()?;

        match vault.fetch(user, &self.provider).await? {
            CredentialStatus::Token(token) => Ok(token),
            CredentialStatus::Missing => Err(RunnerError::CredentialsMissing {
                provider: self.provider.clone(),
            }),
            CredentialStatus::Expired { refresh_token } => {
                // One refresh attempt, then a user-actionable error.
                if let Some(refresh_token) = refresh_token {
                    tracing::debug!(provider = %self.provider, "credential expired, refreshing");
                    if let Ok(token) = vault.refresh(&self.provider, &refresh_token).await {
                        return Ok(token);
                    }
                }
                Err(RunnerError::CredentialsExpired {
                    provider: self.provider.clone(),
                })
            }
        }
    }

    fn shape_provider_error(&self, status: Option<u16>, message: String) -> RunnerError {
        match status {
            Some(429) => RunnerError::RateLimited { retry_after: None },
            Some(400) | Some(422) => RunnerError::InvalidRequest(message),
            Some(401) | Some(403) => RunnerError::CredentialsExpired {
                provider: self.provider.clone(),
            },
            Some(status) => RunnerError::ProviderError {
                provider: self.provider.clone(),
                status,
                message,
            },
            None => RunnerError::ProviderError {
                provider: self.provider.clone(),
                status: 0,
                message,
            },
        }
    }
}

#[async_trait]
impl NodeRunner for ExternalActionRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;

        let operation = ctx.config_str("operation")?.to_owned();
        let mut params = ctx
            .config_value("params")
            .and_then(serde_json::Value::as_object)
            .cloned()
            .unwrap_or_default();

        if let Some(source) = ctx.config_str_opt("params_expression") {
            let eval_ctx = EvaluationContext::new()
                .with_input(input.primary())
                .with_trigger(ctx.trigger.clone());
            let computed = weft_expression::evaluate(source, &eval_ctx)
                .map_err(|e| RunnerError::Expression(e.to_string()))?;
            if let serde_json::Value::Object(map) = computed {
                for (key, value) in map {
                    params.insert(key, value);
                }
            } else {
                params.insert("value".to_owned(), computed);
            }
        }

        let credentials = self.resolve_credentials(ctx).await?;
        ctx.check_cancelled()?;

        let result = ctx
            .services()?
            .invoke(
                &self.provider,
                &operation,
                serde_json::Value::Object(params),
                &credentials,
            )
            .await?;

        if result.success {
            Ok(RunnerOutcome::result(result.data))
        } else {
            Err(self.shape_provider_error(
                result.status,
                result.error.unwrap_or_else(|| "provider error".to_owned()),
            ))
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
    use weft_core::{ExecutionId, NodeId, UserId, WorkflowId};
    use weft_runner::{Adapters, CredentialVault, ServiceInvoker, ServiceResult};

    struct FakeVault {
        status: CredentialStatus,
        refreshed: Mutex<u32>,
        refresh_succeeds: bool,
    }

    #[async_trait]
    impl CredentialVault for FakeVault {
        async fn fetch(
            &self,
            _user: UserId,
            _provider: &str,
        ) -> Result<CredentialStatus, RunnerError> {
            Ok(self.status.clone())
        }

        async fn refresh(
            &self,
            _provider: &str,
            _refresh_token: &SecureString,
        ) -> Result<SecureString, RunnerError> {
            *self.refreshed.lock().unwrap() += 1;
            if self.refresh_succeeds {
                Ok(SecureString::new("fresh-token"))
            } else {
                Err(RunnerError::CredentialsExpired {
                    provider: "slack".into(),
                })
            }
        }
    }

    struct FakeServices {
        calls: Mutex<Vec<(String, String, serde_json::Value)>>,
        result: ServiceResult,
    }

    #[async_trait]
    impl ServiceInvoker for FakeServices {
        async fn invoke(
            &self,
            provider: &str,
            operation: &str,
            params: serde_json::Value,
            _credentials: &SecureString,
        ) -> Result<ServiceResult, RunnerError> {
            self.calls
                .lock()
                .unwrap()
                .push((provider.to_owned(), operation.to_owned(), params));
            Ok(self.result.clone())
        }
    }

    fn context(
        config: serde_json::Value,
        vault: Arc<FakeVault>,
        services: Arc<FakeServices>,
    ) -> RunContext {
        RunContext::new(ExecutionId::v4(), WorkflowId::v4(), NodeId::v4(), "notify")
            .with_config(config.as_object().cloned().unwrap_or_default())
            .with_user(UserId::v4())
            .with_adapters(Adapters {
                vault: Some(vault),
                services: Some(services),
                ..Adapters::default()
            })
    }

    fn live_vault() -> Arc<FakeVault> {
        Arc::new(FakeVault {
            status: CredentialStatus::Token(SecureString::new("token")),
            refreshed: Mutex::new(0),
            refresh_succeeds: true,
        })
    }

    fn services_with(result: ServiceResult) -> Arc<FakeServices> {
        Arc::new(FakeServices {
            calls: Mutex::new(Vec::new()),
            result,
        })
    }

    #[tokio::test]
    async fn invokes_operation_with_merged_params() {
        let services = services_with(ServiceResult::ok(json!({"ts": "123"})));
        let ctx = context(
            json!({
                "operation": "post_message",
                "params": {"channel": "#ops"},
                "params_expression": "input"
            }),
            live_vault(),
            services.clone(),
        );
        let input = NodeInput::new().with("input", json!({"text": "ship it"}));

        let runner = ExternalActionRunner::new("slack");
        let outcome = runner.run(&ctx, &input).await.unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!({"ts": "123"}))
        );

        let calls = services.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "slack");
        assert_eq!(calls[0].1, "post_message");
        assert_eq!(calls[0].2, json!({"channel": "#ops", "text": "ship it"}));
    }

    #[tokio::test]
    async fn missing_credentials() {
        let vault = Arc::new(FakeVault {
            status: CredentialStatus::Missing,
            refreshed: Mutex::new(0),
            refresh_succeeds: true,
        });
        let services = services_with(ServiceResult::ok(json!(null)));
        let ctx = context(json!({"operation": "op"}), vault, services);

        let err = ExternalActionRunner::new("slack")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "credentials_missing");
        assert!(err.advice().unwrap().contains("slack"));
    }

    #[tokio::test]
    async fn expired_credentials_refresh_once_and_succeed() {
        let vault = Arc::new(FakeVault {
            status: CredentialStatus::Expired {
                refresh_token: Some(SecureString::new("refresh")),
            },
            refreshed: Mutex::new(0),
            refresh_succeeds: true,
        });
        let services = services_with(ServiceResult::ok(json!({"ok": true})));
        let ctx = context(json!({"operation": "op"}), vault.clone(), services);

        let outcome = ExternalActionRunner::new("github")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap();
        assert!(!outcome.is_wait());
        assert_eq!(*vault.refreshed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_credentials_failing_refresh_surfaces_expired() {
        let vault = Arc::new(FakeVault {
            status: CredentialStatus::Expired {
                refresh_token: Some(SecureString::new("refresh")),
            },
            refreshed: Mutex::new(0),
            refresh_succeeds: false,
        });
        let services = services_with(ServiceResult::ok(json!(null)));
        let ctx = context(json!({"operation": "op"}), vault.clone(), services);

        let err = ExternalActionRunner::new("github")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "credentials_expired");
        assert_eq!(*vault.refreshed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn provider_error_shapes() {
        for (status, expected_kind, retryable) in [
            (429u16, "rate_limited", true),
            (400, "invalid_request", false),
            (401, "credentials_expired", false),
            (500, "provider_error", true),
            (503, "provider_error", true),
            (404, "provider_error", false),
        ] {
            let services = services_with(ServiceResult::err(status, "nope"));
            let ctx = context(json!({"operation": "op"}), live_vault(), services);
            let err = ExternalActionRunner::new("notion")
                .run(&ctx, &NodeInput::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), expected_kind, "status {status}");
            assert_eq!(err.is_retryable(), retryable, "status {status}");
        }
    }

    #[tokio::test]
    async fn requires_acting_user() {
        let ctx = RunContext::new(ExecutionId::v4(), WorkflowId::v4(), NodeId::v4(), "n")
            .with_config(
                json!({"operation": "op"}).as_object().cloned().unwrap(),
            )
            .with_adapters(Adapters {
                vault: Some(live_vault()),
                services: Some(services_with(ServiceResult::ok(json!(null)))),
                ..Adapters::default()
            });

        let err = ExternalActionRunner::new("slack")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_configuration");
    }
}
