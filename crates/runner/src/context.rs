//! Runtime context provided to every runner invocation.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use weft_core::{ExecutionId, NodeId, UserId, WorkflowId};

use crate::adapters::{
    AiProvider, CredentialVault, HttpInvoker, MemoryStore, ResponseClassifier, ServiceInvoker,
    SubgraphHandle, ToolHandle,
};
use crate::error::RunnerError;

/// A string that redacts its contents in Debug and Display.
///
/// Used for credential values to prevent accidental logging.
#[derive(Clone)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Create a new secure string.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Access the underlying value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString(***)")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// External adapters available to runners. All optional — a runner asks the
/// context for the one it needs and gets a structured error when it is not
/// wired up.
#[derive(Clone, Default)]
pub struct Adapters {
    /// AI model provider.
    pub ai: Option<Arc<dyn AiProvider>>,
    /// Outbound HTTP.
    pub http: Option<Arc<dyn HttpInvoker>>,
    /// Credential vault.
    pub vault: Option<Arc<dyn CredentialVault>>,
    /// External service integrations.
    pub services: Option<Arc<dyn ServiceInvoker>>,
    /// Keyed memory store.
    pub memory: Option<Arc<dyn MemoryStore>>,
    /// Response relevance classifier.
    pub classifier: Option<Arc<dyn ResponseClassifier>>,
}

impl fmt::Debug for Adapters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapters")
            .field("ai", &self.ai.is_some())
            .field("http", &self.http.is_some())
            .field("vault", &self.vault.is_some())
            .field("services", &self.services.is_some())
            .field("memory", &self.memory.is_some())
            .field("classifier", &self.classifier.is_some())
            .finish()
    }
}

/// Context handed to a runner for exactly one node invocation.
///
/// Constructed by the engine per invocation — runners keep no state between
/// calls, and every external effect goes through the adapters carried here.
/// Runners **must** check [`check_cancelled`](Self::check_cancelled) in
/// long-running loops to support cooperative cancellation.
#[non_exhaustive]
pub struct RunContext {
    /// Unique execution run identifier.
    pub execution_id: ExecutionId,
    /// Workflow this execution belongs to.
    pub workflow_id: WorkflowId,
    /// Node being executed.
    pub node_id: NodeId,
    /// Display name of the node.
    pub node_name: String,
    /// The node's static configuration.
    pub config: serde_json::Map<String, serde_json::Value>,
    /// The execution's trigger event.
    pub trigger: serde_json::Value,
    /// User the execution runs on behalf of, for credential resolution.
    pub user_id: Option<UserId>,
    /// Cancellation signal — checked cooperatively by runners.
    pub cancellation: CancellationToken,
    adapters: Adapters,
    subgraph: Option<Arc<dyn SubgraphHandle>>,
    tools: Option<Arc<dyn ToolHandle>>,
}

impl RunContext {
    /// Create a context with no adapters wired.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        node_id: NodeId,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            execution_id,
            workflow_id,
            node_id,
            node_name: node_name.into(),
            config: serde_json::Map::new(),
            trigger: serde_json::Value::Null,
            user_id: None,
            cancellation: CancellationToken::new(),
            adapters: Adapters::default(),
            subgraph: None,
            tools: None,
        }
    }

    /// Attach the node's static configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Map<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    /// Attach the trigger event.
    #[must_use]
    pub fn with_trigger(mut self, trigger: serde_json::Value) -> Self {
        self.trigger = trigger;
        self
    }

    /// Attach the acting user.
    #[must_use]
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Use a pre-existing cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attach the adapter set.
    #[must_use]
    pub fn with_adapters(mut self, adapters: Adapters) -> Self {
        self.adapters = adapters;
        self
    }

    /// Attach the engine's subgraph handle (for `for_each`).
    #[must_use]
    pub fn with_subgraph(mut self, handle: Arc<dyn SubgraphHandle>) -> Self {
        self.subgraph = Some(handle);
        self
    }

    /// Attach the engine's tool handle (for AI agents).
    #[must_use]
    pub fn with_tools(mut self, handle: Arc<dyn ToolHandle>) -> Self {
        self.tools = Some(handle);
        self
    }

    /// Check whether execution has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), RunnerError> {
        if self.cancellation.is_cancelled() {
            Err(RunnerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The AI adapter, or a structured error when not configured.
    pub fn ai(&self) -> Result<&Arc<dyn AiProvider>, RunnerError> {
        self.adapters
            .ai
            .as_ref()
            .ok_or_else(|| RunnerError::internal("no AI provider configured"))
    }

    /// The HTTP adapter.
    pub fn http(&self) -> Result<&Arc<dyn HttpInvoker>, RunnerError> {
        self.adapters
            .http
            .as_ref()
            .ok_or_else(|| RunnerError::internal("no HTTP invoker configured"))
    }

    /// The credential vault.
    pub fn vault(&self) -> Result<&Arc<dyn CredentialVault>, RunnerError> {
        self.adapters
            .vault
            .as_ref()
            .ok_or_else(|| RunnerError::internal("no credential vault configured"))
    }

    /// The external service invoker.
    pub fn services(&self) -> Result<&Arc<dyn ServiceInvoker>, RunnerError> {
        self.adapters
            .services
            .as_ref()
            .ok_or_else(|| RunnerError::internal("no service invoker configured"))
    }

    /// The memory store.
    pub fn memory(&self) -> Result<&Arc<dyn MemoryStore>, RunnerError> {
        self.adapters
            .memory
            .as_ref()
            .ok_or_else(|| RunnerError::internal("no memory store configured"))
    }

    /// The response classifier, if one is configured.
    #[must_use]
    pub fn classifier(&self) -> Option<&Arc<dyn ResponseClassifier>> {
        self.adapters.classifier.as_ref()
    }

    /// The subgraph handle, present only on `for_each` invocations.
    pub fn subgraph(&self) -> Result<&Arc<dyn SubgraphHandle>, RunnerError> {
        self.subgraph
            .as_ref()
            .ok_or_else(|| RunnerError::internal("no subgraph handle attached"))
    }

    /// The tool handle, if the engine attached one.
    #[must_use]
    pub fn tools(&self) -> Option<&Arc<dyn ToolHandle>> {
        self.tools.as_ref()
    }

    // ── Typed config accessors ──────────────────────────────────────────────

    /// A required string configuration value.
    pub fn config_str(&self, key: &str) -> Result<&str, RunnerError> {
        self.config
            .get(key)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                RunnerError::invalid_configuration(format!("missing string parameter {key:?}"))
            })
    }

    /// An optional string configuration value.
    #[must_use]
    pub fn config_str_opt(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(serde_json::Value::as_str)
    }

    /// An optional integer configuration value.
    #[must_use]
    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(serde_json::Value::as_u64)
    }

    /// An optional boolean configuration value.
    #[must_use]
    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(serde_json::Value::as_bool)
    }

    /// Any configuration value.
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("execution_id", &self.execution_id)
            .field("workflow_id", &self.workflow_id)
            .field("node_id", &self.node_id)
            .field("node_name", &self.node_name)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> RunContext {
        RunContext::new(ExecutionId::v4(), WorkflowId::v4(), NodeId::v4(), "node")
    }

    #[test]
    fn secure_string_redacts() {
        let secret = SecureString::new("token-123");
        assert_eq!(format!("{secret:?}"), "SecureString(***)");
        assert_eq!(format!("{secret}"), "***");
        assert_eq!(secret.expose(), "token-123");
    }

    #[test]
    fn check_cancelled() {
        let ctx = test_context();
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancellation.cancel();
        assert!(matches!(
            ctx.check_cancelled(),
            Err(RunnerError::Cancelled)
        ));
    }

    #[test]
    fn with_cancellation_token() {
        let token = CancellationToken::new();
        let ctx = test_context().with_cancellation(token.child_token());
        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert!(ctx.check_cancelled().is_err());
    }

    #[test]
    fn missing_adapters_error() {
        let ctx = test_context();
        assert!(matches!(ctx.ai(), Err(RunnerError::Internal(_))));
        assert!(matches!(ctx.http(), Err(RunnerError::Internal(_))));
        assert!(matches!(ctx.vault(), Err(RunnerError::Internal(_))));
        assert!(matches!(ctx.services(), Err(RunnerError::Internal(_))));
        assert!(matches!(ctx.memory(), Err(RunnerError::Internal(_))));
        assert!(ctx.classifier().is_none());
        assert!(ctx.tools().is_none());
        assert!(ctx.subgraph().is_err());
    }

    #[test]
    fn typed_config_accessors() {
        let mut config = serde_json::Map::new();
        config.insert("url".into(), serde_json::json!("https://example.com"));
        config.insert("retries".into(), serde_json::json!(3));
        config.insert("follow".into(), serde_json::json!(true));

        let ctx = test_context().with_config(config);
        assert_eq!(ctx.config_str("url").unwrap(), "https://example.com");
        assert_eq!(ctx.config_u64("retries"), Some(3));
        assert_eq!(ctx.config_bool("follow"), Some(true));
        assert!(ctx.config_str_opt("missing").is_none());

        let err = ctx.config_str("missing").unwrap_err();
        assert!(matches!(err, RunnerError::InvalidConfiguration(_)));
    }

    #[test]
    fn debug_hides_nothing_sensitive() {
        let ctx = test_context();
        let debug = format!("{ctx:?}");
        assert!(debug.contains("RunContext"));
        assert!(debug.contains("adapters"));
    }
}
