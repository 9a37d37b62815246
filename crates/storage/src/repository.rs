//! Repository traits — the only surface the engine persists through.

use async_trait::async_trait;
use weft_core::{ExecutionId, WorkflowId};
use weft_execution::{ExecutionState, LogEntry, PauseRecord};
use weft_workflow::WorkflowDefinition;

use crate::error::StorageError;

/// Storage for immutable workflow snapshots.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Persist a workflow snapshot, replacing any previous one with the
    /// same id.
    async fn save(&self, workflow: WorkflowDefinition) -> Result<(), StorageError>;

    /// Load a workflow by id.
    async fn get(&self, id: WorkflowId) -> Result<Option<WorkflowDefinition>, StorageError>;

    /// Delete a workflow. Returns `true` when something was removed.
    async fn delete(&self, id: WorkflowId) -> Result<bool, StorageError>;
}

/// Storage for execution states.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Upsert the full execution state.
    async fn save(&self, state: &ExecutionState) -> Result<(), StorageError>;

    /// Load an execution by id.
    async fn get(&self, id: ExecutionId) -> Result<Option<ExecutionState>, StorageError>;
}

/// Storage for pause records — at most one per execution.
///
/// `delete_if_version` is the linearization point between an external
/// resume and the timeout monitor: exactly one of the two racers observes
/// `true`.
#[async_trait]
pub trait PauseRepository: Send + Sync {
    /// Create the pause record for an execution. Fails with
    /// [`StorageError::Conflict`] when one already exists.
    async fn create(&self, record: PauseRecord) -> Result<(), StorageError>;

    /// Load the pause record for an execution.
    async fn get(&self, execution_id: ExecutionId) -> Result<Option<PauseRecord>, StorageError>;

    /// All open pause records, for the timeout monitor's scan.
    async fn list(&self) -> Result<Vec<PauseRecord>, StorageError>;

    /// Set the warned flag if the record still has `expected_version`;
    /// bumps the version. Returns `true` when the flag was set by this call.
    async fn mark_warned(
        &self,
        execution_id: ExecutionId,
        expected_version: u64,
    ) -> Result<bool, StorageError>;

    /// Delete the record if it still has `expected_version`. Returns `true`
    /// when this call performed the deletion.
    async fn delete_if_version(
        &self,
        execution_id: ExecutionId,
        expected_version: u64,
    ) -> Result<bool, StorageError>;
}

/// Storage for milestone log entries.
#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Append one entry.
    async fn append(&self, entry: LogEntry) -> Result<(), StorageError>;

    /// All persisted entries for an execution, in append order.
    async fn for_execution(&self, execution_id: ExecutionId)
    -> Result<Vec<LogEntry>, StorageError>;
}
