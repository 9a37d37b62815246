#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Storage
//!
//! The persistence boundary for the Weft workflow engine: narrow repository
//! traits for workflows, executions, pause records and logs, plus in-memory
//! implementations used by tests and single-process deployments.
//!
//! Transactions span at most a single execution's updates. The pause
//! repository's compare-and-set delete is the linearization point between an
//! external resume and the timeout monitor.

pub mod error;
pub mod memory;
pub mod repository;

pub use error::StorageError;
pub use memory::{
    InMemoryExecutionRepository, InMemoryLogRepository, InMemoryPauseRepository,
    InMemoryWorkflowRepository,
};
pub use repository::{
    ExecutionRepository, LogRepository, PauseRepository, WorkflowRepository,
};
