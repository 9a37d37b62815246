#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Engine
//!
//! The workflow execution engine: takes a validated workflow plus a trigger
//! event and runs it to completion, producing a deterministic execution
//! record with per-node status, inputs, outputs and logs, pausing for human
//! approvals and timers along the way.
//!
//! The pieces:
//!
//! - [`WorkflowEngine`] — topological dispatcher with a bounded worker pool,
//!   data routing, retries, the error policy, and the public
//!   execute/resume/cancel/get operations
//! - [`TimeoutMonitor`] — background loop applying warnings and timeout
//!   actions to pause records
//! - [`LogSink`] — two-tier log fan-out (hot cache + persisted milestones)
//! - [`EngineConfig`] / [`RetryPolicy`] — tunables
//! - [`ReqwestInvoker`] — production HTTP adapter
//!
//! Everything external (AI, HTTP, credentials, services, memory, storage)
//! is reached through the adapter and repository traits, so the whole
//! engine runs against in-memory fakes in tests.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod monitor;
pub mod retry;
pub mod router;
pub mod sink;

pub use config::EngineConfig;
pub use engine::{
    ExecuteOptions, ExecutionHandle, ExecutionRecord, ResumeClassification, WorkflowEngine,
};
pub use error::EngineError;
pub use http::ReqwestInvoker;
pub use monitor::TimeoutMonitor;
pub use retry::RetryPolicy;
pub use sink::LogSink;
