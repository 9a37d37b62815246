//! Aggregated node input — the map a runner sees, keyed by input port.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A value delivered to an input slot.
///
/// A slot receiving one edge holds `Single`; when multiple edges target the
/// same input key their values collect into `Many`, preserving edge order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputValue {
    /// Exactly one edge delivered to this slot.
    Single(serde_json::Value),
    /// Several edges delivered to this slot, in edge order.
    Many(Vec<serde_json::Value>),
}

impl InputValue {
    /// View as a single value; `Many` yields `None`.
    #[must_use]
    pub fn as_single(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Single(v) => Some(v),
            Self::Many(_) => None,
        }
    }

    /// All contributed values, in order.
    #[must_use]
    pub fn values(&self) -> Vec<&serde_json::Value> {
        match self {
            Self::Single(v) => vec![v],
            Self::Many(vs) => vs.iter().collect(),
        }
    }

    /// Convert into one JSON value (`Many` becomes an array).
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        match self {
            Self::Single(v) => v,
            Self::Many(vs) => serde_json::Value::Array(vs),
        }
    }

    /// Number of contributing edges.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(vs) => vs.len(),
        }
    }

    /// Always `false`: a slot exists only once something was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Many(vs) if vs.is_empty())
    }
}

/// The aggregated input map handed to a runner: input key → delivered value.
///
/// Deterministic iteration order (BTreeMap) keeps snapshots and logs stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    slots: BTreeMap<String, InputValue>,
}

impl NodeInput {
    /// An empty input map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a value to a slot. A second delivery to the same key turns
    /// the slot into an ordered list.
    pub fn deliver(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        match self.slots.remove(&key) {
            None => {
                self.slots.insert(key, InputValue::Single(value));
            }
            Some(InputValue::Single(first)) => {
                self.slots.insert(key, InputValue::Many(vec![first, value]));
            }
            Some(InputValue::Many(mut values)) => {
                values.push(value);
                self.slots.insert(key, InputValue::Many(values));
            }
        }
    }

    /// Builder-style delivery.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.deliver(key, value);
        self
    }

    /// Get a slot.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&InputValue> {
        self.slots.get(key)
    }

    /// Get a slot as a single value. `Many` slots yield `None`.
    #[must_use]
    pub fn single(&self, key: &str) -> Option<&serde_json::Value> {
        self.slots.get(key).and_then(InputValue::as_single)
    }

    /// The conventional primary slot (`"input"`), as a single value when
    /// one edge delivered, or an array when several did.
    #[must_use]
    pub fn primary(&self) -> serde_json::Value {
        self.slots
            .get(PRIMARY_SLOT)
            .cloned()
            .map_or(serde_json::Value::Null, InputValue::into_value)
    }

    /// Slot keys in deterministic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Returns `true` if nothing has been delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of populated slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Snapshot as one JSON object (lists for `Many` slots). This is what
    /// the engine records as the node run's input.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .slots
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into_value()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// The conventional primary input slot name.
pub const PRIMARY_SLOT: &str = "input";

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn single_delivery() {
        let input = NodeInput::new().with("input", json!({"x": 1}));
        assert_eq!(input.single("input"), Some(&json!({"x": 1})));
        assert_eq!(input.primary(), json!({"x": 1}));
        assert_eq!(input.len(), 1);
    }

    #[test]
    fn repeated_delivery_collects_in_order() {
        let input = NodeInput::new()
            .with("input", json!(1))
            .with("input", json!(2))
            .with("input", json!(3));

        assert!(input.single("input").is_none());
        assert_eq!(
            input.get("input"),
            Some(&InputValue::Many(vec![json!(1), json!(2), json!(3)]))
        );
        assert_eq!(input.primary(), json!([1, 2, 3]));
    }

    #[test]
    fn category_slots_are_separate() {
        let input = NodeInput::new()
            .with("input", json!("main"))
            .with("ai_tool", json!({"name": "search"}))
            .with("ai_memory", json!({"kind": "buffer"}));

        assert_eq!(input.len(), 3);
        assert_eq!(input.single("ai_tool"), Some(&json!({"name": "search"})));
        let keys: Vec<&str> = input.keys().collect();
        assert_eq!(keys, vec!["ai_memory", "ai_tool", "input"]);
    }

    #[test]
    fn primary_missing_is_null() {
        let input = NodeInput::new();
        assert_eq!(input.primary(), serde_json::Value::Null);
        assert!(input.is_empty());
    }

    #[test]
    fn to_value_snapshot() {
        let input = NodeInput::new()
            .with("input", json!(1))
            .with("input", json!(2))
            .with("side", json!("x"));
        assert_eq!(input.to_value(), json!({"input": [1, 2], "side": "x"}));
    }

    #[test]
    fn input_value_helpers() {
        let single = InputValue::Single(json!(5));
        assert_eq!(single.len(), 1);
        assert_eq!(single.values(), vec![&json!(5)]);
        assert!(!single.is_empty());

        let many = InputValue::Many(vec![json!(1), json!(2)]);
        assert_eq!(many.len(), 2);
        assert!(many.as_single().is_none());
        assert_eq!(many.into_value(), json!([1, 2]));
    }

    #[test]
    fn serde_roundtrip() {
        let input = NodeInput::new()
            .with("input", json!(1))
            .with("input", json!(2));
        let json = serde_json::to_string(&input).unwrap();
        let back: NodeInput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, input);
    }
}
