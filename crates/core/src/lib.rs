#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Core
//!
//! Core identifier types for the Weft workflow engine. Every other Weft
//! crate builds on the strongly-typed ids defined here.

pub mod id;

pub use id::{ExecutionId, InteractionId, NodeId, UserId, WorkflowId};
pub use id::UuidParseError;
