#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Execution
//!
//! Runtime execution records for the Weft workflow engine. This crate models
//! execution-time state — it does NOT contain the engine orchestrator. It
//! defines:
//!
//! - [`ExecutionStatus`] — execution-level state machine (8 states)
//! - [`ExecutionState`] and [`NodeRun`] — the persistent record of one run
//! - [`PauseRecord`] — marker that an execution awaits a human or a timer
//! - [`LogEntry`] — user-facing progress log rows with the milestone bit
//! - State machine transitions validated by the [`transition`] module

pub mod error;
pub mod log;
pub mod pause;
pub mod state;
pub mod status;
pub mod transition;

pub use error::ExecutionError;
pub use log::{EventType, LogEntry, LogLevel};
pub use pause::{PauseReason, PauseRecord, ResumeConditions, TimeoutAction};
pub use state::{ExecutionState, NodeRun, RunFailure};
pub use status::ExecutionStatus;
