//! Runner registry — maps `(node kind, subtype)` to runner implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use weft_workflow::{NodeDefinition, NodeKind};

use crate::config::ConfigSchema;
use crate::context::RunContext;
use crate::error::RunnerError;
use crate::input::NodeInput;
use crate::outcome::RunnerOutcome;

/// Static description of a runner: its registry key, config schema, and the
/// output ports its subtype produces.
#[derive(Debug, Clone)]
pub struct RunnerSpec {
    /// Node family this runner serves.
    pub kind: NodeKind,
    /// Subtype key within the family.
    pub subtype: String,
    /// Short description of what the runner does.
    pub description: String,
    /// Configuration schema validated before dispatch.
    pub config_schema: ConfigSchema,
    /// Output ports this subtype produces.
    pub output_ports: Vec<String>,
}

impl RunnerSpec {
    /// Create a spec with an empty schema and the default `result` port.
    #[must_use]
    pub fn new(kind: NodeKind, subtype: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            subtype: subtype.into(),
            description: description.into(),
            config_schema: ConfigSchema::new(),
            output_ports: vec![weft_workflow::DEFAULT_OUTPUT_PORT.to_owned()],
        }
    }

    /// Attach a configuration schema.
    #[must_use]
    pub fn with_schema(mut self, schema: ConfigSchema) -> Self {
        self.config_schema = schema;
        self
    }

    /// Replace the produced output ports.
    #[must_use]
    pub fn with_output_ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_ports = ports.into_iter().map(Into::into).collect();
        self
    }
}

/// A node runner. One implementation per `(kind, subtype)`.
///
/// Runners are deterministic given their inputs plus declared external
/// effects, hold no state between invocations, and route all I/O through
/// the adapters on the [`RunContext`].
#[async_trait]
pub trait NodeRunner: Send + Sync + 'static {
    /// The runner's static spec.
    fn spec(&self) -> &RunnerSpec;

    /// Execute one node invocation.
    async fn run(&self, ctx: &RunContext, input: &NodeInput)
    -> Result<RunnerOutcome, RunnerError>;
}

/// Type-erased registry for resolving runners from node definitions.
///
/// The engine populates this at startup. Runners are stored as
/// `Arc<dyn NodeRunner>` so concurrent executions share them.
#[derive(Default)]
pub struct RunnerRegistry {
    runners: HashMap<(NodeKind, String), Arc<dyn NodeRunner>>,
}

impl RunnerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner under its spec's `(kind, subtype)`. Overwrites any
    /// previous registration for the same key.
    pub fn register(&mut self, runner: Arc<dyn NodeRunner>) {
        let spec = runner.spec();
        self.runners
            .insert((spec.kind, spec.subtype.clone()), runner);
    }

    /// Look up the runner for a `(kind, subtype)` pair.
    #[must_use]
    pub fn get(&self, kind: NodeKind, subtype: &str) -> Option<&Arc<dyn NodeRunner>> {
        self.runners.get(&(kind, subtype.to_owned()))
    }

    /// Returns `true` if a runner is registered for the pair.
    #[must_use]
    pub fn contains(&self, kind: NodeKind, subtype: &str) -> bool {
        self.runners.contains_key(&(kind, subtype.to_owned()))
    }

    /// Number of registered runners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runners.len()
    }

    /// Returns `true` if no runners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Validate that a node resolves to a registered runner and that its
    /// configuration satisfies the runner's schema.
    pub fn validate_node(&self, node: &NodeDefinition) -> Result<(), RunnerError> {
        let runner = self.get(node.kind, &node.subtype).ok_or_else(|| {
            RunnerError::invalid_configuration(format!(
                "no runner registered for {}/{}",
                node.kind, node.subtype
            ))
        })?;
        runner
            .spec()
            .config_schema
            .validate(&node.config)
            .map_err(|e| match e {
                RunnerError::InvalidConfiguration(msg) => RunnerError::InvalidConfiguration(
                    format!("node {:?}: {msg}", node.name),
                ),
                other => other,
            })
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self
            .runners
            .keys()
            .map(|(kind, subtype)| format!("{kind}/{subtype}"))
            .collect();
        keys.sort();
        f.debug_struct("RunnerRegistry")
            .field("count", &self.runners.len())
            .field("keys", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldSpec;
    use weft_core::NodeId;

    struct EchoRunner {
        spec: RunnerSpec,
    }

    impl EchoRunner {
        fn new() -> Self {
            Self {
                spec: RunnerSpec::new(NodeKind::Action, "echo", "echoes input").with_schema(
                    ConfigSchema::new().field(FieldSpec::string("prefix")),
                ),
            }
        }
    }

    #[async_trait]
    impl NodeRunner for EchoRunner {
        fn spec(&self) -> &RunnerSpec {
            &self.spec
        }

        async fn run(
            &self,
            _ctx: &RunContext,
            input: &NodeInput,
        ) -> Result<RunnerOutcome, RunnerError> {
            Ok(RunnerOutcome::result(input.primary()))
        }
    }

    fn node(kind: NodeKind, subtype: &str) -> NodeDefinition {
        NodeDefinition::new(NodeId::v4(), "n", kind, subtype)
    }

    #[test]
    fn empty_registry() {
        let registry = RunnerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get(NodeKind::Action, "echo").is_none());
    }

    #[test]
    fn register_and_get() {
        let mut registry = RunnerRegistry::new();
        registry.register(Arc::new(EchoRunner::new()));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(NodeKind::Action, "echo"));
        assert!(!registry.contains(NodeKind::Flow, "echo"));
        assert!(!registry.contains(NodeKind::Action, "other"));

        let runner = registry.get(NodeKind::Action, "echo").unwrap();
        assert_eq!(runner.spec().subtype, "echo");
    }

    #[test]
    fn validate_node_unknown_subtype() {
        let registry = RunnerRegistry::new();
        let err = registry
            .validate_node(&node(NodeKind::Action, "ghost"))
            .unwrap_err();
        assert!(err.to_string().contains("no runner registered"));
        assert!(err.to_string().contains("action/ghost"));
    }

    #[test]
    fn validate_node_checks_schema() {
        let mut registry = RunnerRegistry::new();
        registry.register(Arc::new(EchoRunner::new()));

        let good = node(NodeKind::Action, "echo")
            .with_config_value("prefix", serde_json::json!(">>"));
        assert!(registry.validate_node(&good).is_ok());

        let bad = node(NodeKind::Action, "echo")
            .with_config_value("prefix", serde_json::json!(42));
        let err = registry.validate_node(&bad).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
        assert!(err.to_string().contains('n'));
    }

    #[tokio::test]
    async fn runner_executes() {
        let runner = EchoRunner::new();
        let ctx = RunContext::new(
            weft_core::ExecutionId::v4(),
            weft_core::WorkflowId::v4(),
            NodeId::v4(),
            "echo",
        );
        let input = NodeInput::new().with("input", serde_json::json!("hello"));
        let outcome = runner.run(&ctx, &input).await.unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&serde_json::json!("hello"))
        );
    }

    #[test]
    fn debug_lists_keys() {
        let mut registry = RunnerRegistry::new();
        registry.register(Arc::new(EchoRunner::new()));
        let debug = format!("{registry:?}");
        assert!(debug.contains("action/echo"));
        assert!(debug.contains("count: 1"));
    }
}
