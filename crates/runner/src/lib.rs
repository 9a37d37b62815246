#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Runner
//!
//! The runner contract for Weft workflow nodes. A runner executes one node:
//! given a [`RunContext`] and the node's aggregated input, it returns either
//! a [`RunnerOutcome::Finished`] with per-port values, a
//! [`RunnerOutcome::Wait`] signal that pauses the execution, or an
//! `Err(RunnerError)` — an explicit sum type, never exception-driven control
//! flow.
//!
//! Runners route all I/O through the adapter port traits in [`adapters`],
//! so the engine can be tested end-to-end with in-memory fakes. They hold
//! no state between invocations.

pub mod adapters;
pub mod config;
pub mod context;
pub mod error;
pub mod input;
pub mod outcome;
pub mod registry;

pub use adapters::{
    AiMessage, AiProvider, AiRequest, AiResponse, AiUsage, Classification, CredentialStatus,
    CredentialVault, HttpInvoker, HttpRequest, HttpResponse, MemoryStore, ResponseClassifier,
    ServiceInvoker, ServiceResult, SubgraphHandle, ToolCall, ToolDescriptor, ToolHandle, Verdict,
};
pub use config::{ConfigSchema, FieldKind, FieldSpec};
pub use context::{Adapters, RunContext, SecureString};
pub use error::RunnerError;
pub use input::{InputValue, NodeInput};
pub use outcome::{Channel, InteractionSpec, InteractionType, PortMap, RunnerOutcome, WaitSignal};
pub use registry::{NodeRunner, RunnerRegistry, RunnerSpec};
