//! In-memory repository implementations over `DashMap`.
//!
//! Per-key atomicity comes from DashMap's entry locking, which is all the
//! pause repository's compare-and-set operations need.

use async_trait::async_trait;
use dashmap::DashMap;
use weft_core::{ExecutionId, WorkflowId};
use weft_execution::{ExecutionState, LogEntry, PauseRecord};
use weft_workflow::WorkflowDefinition;

use crate::error::StorageError;
use crate::repository::{
    ExecutionRepository, LogRepository, PauseRepository, WorkflowRepository,
};

/// In-memory workflow store.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: DashMap<WorkflowId, WorkflowDefinition>,
}

impl InMemoryWorkflowRepository {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save(&self, workflow: WorkflowDefinition) -> Result<(), StorageError> {
        self.workflows.insert(workflow.id, workflow);
        Ok(())
    }

    async fn get(&self, id: WorkflowId) -> Result<Option<WorkflowDefinition>, StorageError> {
        Ok(self.workflows.get(&id).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, id: WorkflowId) -> Result<bool, StorageError> {
        Ok(self.workflows.remove(&id).is_some())
    }
}

/// In-memory execution store.
#[derive(Debug, Default)]
pub struct InMemoryExecutionRepository {
    executions: DashMap<ExecutionId, ExecutionState>,
}

impl InMemoryExecutionRepository {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn save(&self, state: &ExecutionState) -> Result<(), StorageError> {
        self.executions.insert(state.execution_id, state.clone());
        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<Option<ExecutionState>, StorageError> {
        Ok(self.executions.get(&id).map(|entry| entry.value().clone()))
    }
}

/// In-memory pause store with compare-and-set semantics.
#[derive(Debug, Default)]
pub struct InMemoryPauseRepository {
    pauses: DashMap<ExecutionId, PauseRecord>,
}

impl InMemoryPauseRepository {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PauseRepository for InMemoryPauseRepository {
    async fn create(&self, record: PauseRecord) -> Result<(), StorageError> {
        match self.pauses.entry(record.execution_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StorageError::conflict(format!(
                "pause record already exists for execution {}",
                record.execution_id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, execution_id: ExecutionId) -> Result<Option<PauseRecord>, StorageError> {
        Ok(self.pauses.get(&execution_id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<PauseRecord>, StorageError> {
        Ok(self.pauses.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn mark_warned(
        &self,
        execution_id: ExecutionId,
        expected_version: u64,
    ) -> Result<bool, StorageError> {
        match self.pauses.get_mut(&execution_id) {
            Some(mut entry) if entry.version == expected_version => {
                entry.warned = true;
                entry.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_version(
        &self,
        execution_id: ExecutionId,
        expected_version: u64,
    ) -> Result<bool, StorageError> {
        Ok(self
            .pauses
            .remove_if(&execution_id, |_, record| record.version == expected_version)
            .is_some())
    }
}

/// In-memory log store.
#[derive(Debug, Default)]
pub struct InMemoryLogRepository {
    logs: DashMap<ExecutionId, Vec<LogEntry>>,
}

impl InMemoryLogRepository {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogRepository for InMemoryLogRepository {
    async fn append(&self, entry: LogEntry) -> Result<(), StorageError> {
        self.logs.entry(entry.execution_id).or_default().push(entry);
        Ok(())
    }

    async fn for_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<LogEntry>, StorageError> {
        Ok(self
            .logs
            .get(&execution_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
