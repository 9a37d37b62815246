//! Connections — directed port-to-port edges between nodes.

use serde::{Deserialize, Serialize};
use weft_core::NodeId;

use crate::node::{DEFAULT_INPUT_PORT, DEFAULT_OUTPUT_PORT};

/// Category of a connection, driving how the router aggregates inputs.
///
/// `Main` edges contribute to the target's declared input key. Non-main
/// categories are grouped under their category name so that an AI agent can
/// tell its tools apart from its memory and from main data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Primary data flow.
    #[default]
    Main,
    /// Tool supply for an AI agent node.
    AiTool,
    /// Memory supply for an AI agent node.
    AiMemory,
}

impl ConnectionKind {
    /// The aggregation slot for non-main categories, `None` for `Main`.
    #[must_use]
    pub fn slot(&self) -> Option<&'static str> {
        match self {
            Self::Main => None,
            Self::AiTool => Some("ai_tool"),
            Self::AiMemory => Some("ai_memory"),
        }
    }
}

/// A directed edge from a source node's output port to a target node's
/// input port, with an optional pure conversion expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Producer node.
    pub source: NodeId,
    /// Output port on the producer. Defaults to [`DEFAULT_OUTPUT_PORT`].
    #[serde(default = "default_output_key")]
    pub output_key: String,
    /// Consumer node.
    pub target: NodeId,
    /// Input port on the consumer. Defaults to [`DEFAULT_INPUT_PORT`].
    #[serde(default = "default_input_key")]
    pub input_key: String,
    /// Connection category.
    #[serde(default)]
    pub kind: ConnectionKind,
    /// Optional conversion expression applied to the edge value, with the
    /// producer's value bound as `input`. Absent means identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<String>,
}

fn default_output_key() -> String {
    DEFAULT_OUTPUT_PORT.to_owned()
}

fn default_input_key() -> String {
    DEFAULT_INPUT_PORT.to_owned()
}

impl Connection {
    /// Create a main connection between default ports.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            output_key: default_output_key(),
            target,
            input_key: default_input_key(),
            kind: ConnectionKind::Main,
            convert: None,
        }
    }

    /// Set the producer output port.
    #[must_use]
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    /// Set the consumer input port.
    #[must_use]
    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = key.into();
        self
    }

    /// Set the connection category.
    #[must_use]
    pub fn with_kind(mut self, kind: ConnectionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach a conversion expression.
    #[must_use]
    pub fn with_convert(mut self, expr: impl Into<String>) -> Self {
        self.convert = Some(expr.into());
        self
    }

    /// Stable identity of this edge, used for delivered/skipped bookkeeping.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}:{}->{}:{}",
            self.source, self.output_key, self.target, self.input_key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_connection_defaults() {
        let conn = Connection::new(NodeId::v4(), NodeId::v4());
        assert_eq!(conn.output_key, DEFAULT_OUTPUT_PORT);
        assert_eq!(conn.input_key, DEFAULT_INPUT_PORT);
        assert_eq!(conn.kind, ConnectionKind::Main);
        assert!(conn.convert.is_none());
    }

    #[test]
    fn builder_chain() {
        let conn = Connection::new(NodeId::v4(), NodeId::v4())
            .with_output_key("true")
            .with_input_key("left")
            .with_kind(ConnectionKind::AiTool)
            .with_convert("input.value");
        assert_eq!(conn.output_key, "true");
        assert_eq!(conn.input_key, "left");
        assert_eq!(conn.kind, ConnectionKind::AiTool);
        assert_eq!(conn.convert.as_deref(), Some("input.value"));
    }

    #[test]
    fn key_is_stable_and_distinct_per_ports() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c1 = Connection::new(a, b);
        let c2 = Connection::new(a, b).with_output_key("true");
        assert_eq!(c1.key(), c1.clone().key());
        assert_ne!(c1.key(), c2.key());
    }

    #[test]
    fn kind_slot_names() {
        assert_eq!(ConnectionKind::Main.slot(), None);
        assert_eq!(ConnectionKind::AiTool.slot(), Some("ai_tool"));
        assert_eq!(ConnectionKind::AiMemory.slot(), Some("ai_memory"));
    }

    #[test]
    fn serde_roundtrip() {
        let conn = Connection::new(NodeId::v4(), NodeId::v4()).with_convert("input * 2");
        let json = serde_json::to_string(&conn).unwrap();
        let back: Connection = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source, conn.source);
        assert_eq!(back.convert.as_deref(), Some("input * 2"));
    }

    #[test]
    fn deserialize_defaults_keys_and_kind() {
        let json = format!(
            r#"{{"source":"{}","target":"{}"}}"#,
            NodeId::v4(),
            NodeId::v4()
        );
        let conn: Connection = serde_json::from_str(&json).unwrap();
        assert_eq!(conn.output_key, DEFAULT_OUTPUT_PORT);
        assert_eq!(conn.input_key, DEFAULT_INPUT_PORT);
        assert_eq!(conn.kind, ConnectionKind::Main);
    }
}
