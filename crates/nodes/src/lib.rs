#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Nodes
//!
//! Built-in runners for the eight node families: trigger, action, external
//! action, AI agent, flow control, human-in-the-loop, tool, and memory.
//!
//! [`register_builtins`] installs every runner into a [`RunnerRegistry`];
//! the engine resolves nodes against it by `(kind, subtype)`.

pub mod action;
pub mod ai_agent;
pub mod external;
pub mod flow;
pub mod human;
pub mod memory;
pub mod tool;
pub mod trigger;

use std::sync::Arc;

use weft_runner::RunnerRegistry;

/// Register every built-in runner.
pub fn register_builtins(registry: &mut RunnerRegistry) {
    for subtype in ["manual", "webhook", "schedule"] {
        registry.register(Arc::new(trigger::TriggerRunner::new(subtype)));
    }

    registry.register(Arc::new(action::TransformRunner::new()));
    registry.register(Arc::new(action::SetRunner::new()));
    registry.register(Arc::new(action::HttpRequestRunner::new()));

    for provider in ["slack", "github", "calendar", "notion", "api_call"] {
        registry.register(Arc::new(external::ExternalActionRunner::new(provider)));
    }

    registry.register(Arc::new(ai_agent::AiAgentRunner::new()));

    registry.register(Arc::new(flow::IfRunner::new()));
    registry.register(Arc::new(flow::SwitchRunner::new()));
    registry.register(Arc::new(flow::FilterRunner::new()));
    registry.register(Arc::new(flow::ForEachRunner::new()));
    registry.register(Arc::new(flow::MergeRunner::new()));
    registry.register(Arc::new(flow::WaitRunner::new()));

    for interaction in ["approval", "input", "selection", "review"] {
        registry.register(Arc::new(human::HumanInLoopRunner::new(interaction)));
    }

    for subtype in ["http", "code", "web_scraper", "mcp"] {
        registry.register(Arc::new(tool::ToolRunner::new(subtype)));
    }

    for subtype in ["key_value", "buffer", "document", "vector_search"] {
        registry.register(Arc::new(memory::MemoryRunner::new(subtype)));
    }
}
