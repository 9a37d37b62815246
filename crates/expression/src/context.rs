//! Evaluation context — the variables an expression can see.

use std::collections::HashMap;

use serde_json::Value;

/// Variables available during expression evaluation.
///
/// The engine binds well-known names per call site: `input` (the value on
/// the edge or the node's aggregated input), `item` (the current loop
/// element), `trigger` (the execution's trigger event), and `vars`
/// (workflow variables). Arbitrary extra bindings are allowed.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    vars: HashMap<String, Value>,
}

impl EvaluationContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Bind a variable, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Bind the conventional `input` variable.
    #[must_use]
    pub fn with_input(self, value: Value) -> Self {
        self.with("input", value)
    }

    /// Bind the conventional `item` variable.
    #[must_use]
    pub fn with_item(self, value: Value) -> Self {
        self.with("item", value)
    }

    /// Bind the conventional `trigger` variable.
    #[must_use]
    pub fn with_trigger(self, value: Value) -> Self {
        self.with("trigger", value)
    }

    /// Resolve a variable by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}
