//! Node definitions — the typed vertices of a workflow graph.

use serde::{Deserialize, Serialize};
use weft_core::NodeId;

/// Default input port key used when a connection omits one.
pub const DEFAULT_INPUT_PORT: &str = "input";

/// Default output port key. Extracting this key from a producer that did not
/// declare it yields the producer's whole output object.
pub const DEFAULT_OUTPUT_PORT: &str = "result";

/// The eight node families understood by the engine.
///
/// A node is fully identified by `(kind, subtype)`; the runner registry is
/// keyed the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Produces the initial payload of an execution.
    Trigger,
    /// Calls an AI model, optionally fanning out to connected tools.
    AiAgent,
    /// Pure internal operation (transform, HTTP request, set fields).
    Action,
    /// Calls an external system through the service invoker (Slack, GitHub, ...).
    ExternalAction,
    /// Directs control flow (if, switch, filter, for_each, merge, wait).
    Flow,
    /// Pauses the execution until a human responds on a channel.
    HumanInLoop,
    /// Wraps an effectful tool, callable inline from AI agents.
    Tool,
    /// Reads or writes a keyed memory store.
    Memory,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trigger => write!(f, "trigger"),
            Self::AiAgent => write!(f, "ai_agent"),
            Self::Action => write!(f, "action"),
            Self::ExternalAction => write!(f, "external_action"),
            Self::Flow => write!(f, "flow"),
            Self::HumanInLoop => write!(f, "human_in_loop"),
            Self::Tool => write!(f, "tool"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// A typed vertex in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within the workflow.
    pub id: NodeId,
    /// Display name. Must be unique, non-empty and whitespace-free.
    pub name: String,
    /// Node family.
    pub kind: NodeKind,
    /// Subtype key within the family (e.g. `"http_request"`, `"if"`).
    pub subtype: String,
    /// Canvas position. Opaque to the engine.
    #[serde(default)]
    pub position: (f64, f64),
    /// Static configuration, validated against the subtype's schema
    /// before dispatch.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Declared input port keys.
    #[serde(default = "default_input_ports")]
    pub input_ports: Vec<String>,
    /// Declared output port keys.
    #[serde(default = "default_output_ports")]
    pub output_ports: Vec<String>,
}

fn default_input_ports() -> Vec<String> {
    vec![DEFAULT_INPUT_PORT.to_owned()]
}

fn default_output_ports() -> Vec<String> {
    vec![DEFAULT_OUTPUT_PORT.to_owned()]
}

impl NodeDefinition {
    /// Create a node with default ports and empty configuration.
    #[must_use]
    pub fn new(
        id: NodeId,
        name: impl Into<String>,
        kind: NodeKind,
        subtype: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            subtype: subtype.into(),
            position: (0.0, 0.0),
            config: serde_json::Map::new(),
            input_ports: default_input_ports(),
            output_ports: default_output_ports(),
        }
    }

    /// Replace the static configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Map<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    /// Set a single configuration key.
    #[must_use]
    pub fn with_config_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Replace the declared input ports.
    #[must_use]
    pub fn with_input_ports(mut self, ports: Vec<String>) -> Self {
        self.input_ports = ports;
        self
    }

    /// Replace the declared output ports.
    #[must_use]
    pub fn with_output_ports(mut self, ports: Vec<String>) -> Self {
        self.output_ports = ports;
        self
    }

    /// Set the canvas position.
    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = (x, y);
        self
    }

    /// Returns `true` if `key` is a declared output port.
    #[must_use]
    pub fn has_output_port(&self, key: &str) -> bool {
        self.output_ports.iter().any(|p| p == key)
    }

    /// Returns `true` if `key` is a declared input port.
    #[must_use]
    pub fn has_input_port(&self, key: &str) -> bool {
        self.input_ports.iter().any(|p| p == key)
    }

    /// Look up a configuration value by key.
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_node_has_default_ports() {
        let node = NodeDefinition::new(NodeId::v4(), "fetch", NodeKind::Action, "http_request");
        assert_eq!(node.input_ports, vec![DEFAULT_INPUT_PORT]);
        assert_eq!(node.output_ports, vec![DEFAULT_OUTPUT_PORT]);
        assert!(node.config.is_empty());
        assert_eq!(node.position, (0.0, 0.0));
    }

    #[test]
    fn port_membership() {
        let node = NodeDefinition::new(NodeId::v4(), "branch", NodeKind::Flow, "if")
            .with_output_ports(vec!["true".into(), "false".into()]);
        assert!(node.has_output_port("true"));
        assert!(node.has_output_port("false"));
        assert!(!node.has_output_port("result"));
        assert!(node.has_input_port("input"));
    }

    #[test]
    fn config_builder() {
        let node = NodeDefinition::new(NodeId::v4(), "t", NodeKind::Action, "transform")
            .with_config_value("expression", serde_json::json!("input.x * 2"));
        assert_eq!(
            node.config_value("expression"),
            Some(&serde_json::json!("input.x * 2"))
        );
        assert!(node.config_value("missing").is_none());
    }

    #[test]
    fn kind_display() {
        assert_eq!(NodeKind::Trigger.to_string(), "trigger");
        assert_eq!(NodeKind::AiAgent.to_string(), "ai_agent");
        assert_eq!(NodeKind::ExternalAction.to_string(), "external_action");
        assert_eq!(NodeKind::HumanInLoop.to_string(), "human_in_loop");
    }

    #[test]
    fn kind_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&NodeKind::HumanInLoop).unwrap(),
            "\"human_in_loop\""
        );
        let back: NodeKind = serde_json::from_str("\"ai_agent\"").unwrap();
        assert_eq!(back, NodeKind::AiAgent);
    }

    #[test]
    fn node_serde_roundtrip() {
        let node = NodeDefinition::new(NodeId::v4(), "notify", NodeKind::ExternalAction, "slack")
            .with_config_value("channel", serde_json::json!("#ops"))
            .with_position(120.0, 40.0);
        let json = serde_json::to_string(&node).unwrap();
        let back: NodeDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, node.id);
        assert_eq!(back.name, "notify");
        assert_eq!(back.kind, NodeKind::ExternalAction);
        assert_eq!(back.subtype, "slack");
        assert_eq!(back.position, (120.0, 40.0));
    }

    #[test]
    fn node_deserialize_defaults_ports() {
        let json = format!(
            r#"{{"id":"{}","name":"n","kind":"action","subtype":"set"}}"#,
            NodeId::v4()
        );
        let node: NodeDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(node.input_ports, vec![DEFAULT_INPUT_PORT]);
        assert_eq!(node.output_ports, vec![DEFAULT_OUTPUT_PORT]);
    }
}
