//! Workflow validation error types.

use thiserror::Error;
use weft_core::NodeId;

/// Errors raised while validating or deriving structure from a workflow.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// Two nodes share the same id.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),

    /// Two nodes share the same display name.
    #[error("duplicate node name: {0}")]
    DuplicateNodeName(String),

    /// A node name is empty or contains whitespace.
    #[error("invalid node name: {0:?}")]
    InvalidNodeName(String),

    /// A connection endpoint does not refer to an existing node.
    #[error("connection references unknown node: {0}")]
    UnknownEndpoint(NodeId),

    /// A connection loops a node back onto itself.
    #[error("self-loop on node {0}")]
    SelfLoop(NodeId),

    /// The connection graph contains a cycle.
    #[error("cycle detected involving nodes: {0}")]
    CycleDetected(String),

    /// A connection names an output port the source does not declare.
    #[error("node {node} has no output port {port:?}")]
    UnknownOutputPort {
        /// The offending source node.
        node: NodeId,
        /// The undeclared port key.
        port: String,
    },

    /// A connection names an input port the target does not declare.
    #[error("node {node} has no input port {port:?}")]
    UnknownInputPort {
        /// The offending target node.
        node: NodeId,
        /// The undeclared port key.
        port: String,
    },

    /// The workflow has no trigger node.
    #[error("workflow has no trigger node")]
    NoTriggerNode,

    /// The workflow has no nodes at all.
    #[error("workflow has no nodes")]
    Empty,

    /// A referenced node does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formatting() {
        let id = NodeId::nil();
        assert_eq!(
            WorkflowError::DuplicateNodeId(id).to_string(),
            format!("duplicate node id: {id}")
        );
        assert_eq!(
            WorkflowError::InvalidNodeName("a b".into()).to_string(),
            "invalid node name: \"a b\""
        );
        assert_eq!(
            WorkflowError::NoTriggerNode.to_string(),
            "workflow has no trigger node"
        );
    }

    #[test]
    fn unknown_port_display() {
        let id = NodeId::nil();
        let err = WorkflowError::UnknownOutputPort {
            node: id,
            port: "maybe".into(),
        };
        assert!(err.to_string().contains("no output port"));
        assert!(err.to_string().contains("maybe"));
    }
}
