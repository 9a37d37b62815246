//! Engine error types.

use thiserror::Error;
use weft_core::ExecutionId;
use weft_execution::ExecutionError;
use weft_storage::StorageError;
use weft_workflow::WorkflowError;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The workflow failed structural or configuration validation.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// The supplied trigger does not match any trigger node.
    #[error("trigger not applicable: {0}")]
    TriggerNotApplicable(String),

    /// The referenced execution does not exist.
    #[error("execution not found: {0}")]
    NotFound(ExecutionId),

    /// There is no open pause to resume (or the race was lost).
    #[error("no pending pause for execution {0}")]
    NoPendingPause(ExecutionId),

    /// The response did not satisfy the pause's resume conditions; the
    /// pause remains open.
    #[error("response filtered: {0}")]
    ResponseFiltered(String),

    /// A persistence-boundary failure.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// An execution-record failure.
    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),

    /// An engine invariant was broken.
    #[error("internal: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<WorkflowError> for EngineError {
    fn from(err: WorkflowError) -> Self {
        Self::InvalidGraph(err.to_string())
    }
}
