//! Execution record error types.

use thiserror::Error;
use weft_core::NodeId;

use crate::status::ExecutionStatus;

/// Errors that can occur while mutating execution records.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A state transition is not valid for the current status.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// A referenced node does not exist in the execution state.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExecutionError {
    /// Create an invalid-transition error from execution statuses.
    pub fn invalid_execution_transition(from: ExecutionStatus, to: ExecutionStatus) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display() {
        let err = ExecutionError::InvalidTransition {
            from: "running".into(),
            to: "created".into(),
        };
        assert_eq!(err.to_string(), "invalid transition from running to created");
    }

    #[test]
    fn node_not_found_display() {
        let id = NodeId::v4();
        let err = ExecutionError::NodeNotFound(id);
        assert!(err.to_string().contains("node not found"));
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err = ExecutionError::from(serde_err);
        assert!(err.to_string().starts_with("serialization:"));
    }
}
