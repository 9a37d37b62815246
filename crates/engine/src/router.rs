//! Data router — edge value extraction, conversion, and input aggregation.
//!
//! Invoked at producer completion (to decide what each outgoing edge
//! carries) and at consumer dispatch (to aggregate delivered values into
//! the consumer's input map).

use serde_json::Value;
use weft_expression::EvaluationContext;
use weft_runner::{NodeInput, PortMap};
use weft_workflow::{Connection, ConnectionKind, DEFAULT_OUTPUT_PORT, NodeDefinition};

/// Extract the value an edge carries from its producer's port map.
///
/// `producer_output[edge.output_key]`, or the whole output object when the
/// output key is the conventional default and the producer did not declare
/// such a port.
#[must_use]
pub fn edge_value(ports: &PortMap, output_key: &str) -> Option<Value> {
    if let Some(value) = ports.get(output_key) {
        return Some(value.clone());
    }
    if output_key == DEFAULT_OUTPUT_PORT {
        let map: serde_json::Map<String, Value> =
            ports.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        return Some(Value::Object(map));
    }
    None
}

/// Apply an edge's conversion expression to the value it carries.
///
/// Conversion failures deliver `null` on the edge — logged by the caller,
/// never fatal to the workflow.
#[must_use]
pub fn convert_edge_value(connection: &Connection, value: Value) -> (Value, Option<String>) {
    let Some(source) = &connection.convert else {
        return (value, None);
    };
    let ctx = EvaluationContext::new().with_input(value);
    match weft_expression::evaluate(source, &ctx) {
        Ok(converted) => (converted, None),
        Err(err) => (Value::Null, Some(err.to_string())),
    }
}

/// The input slot an edge delivers into: non-main categories group under
/// their category name so consumers can tell tools and memory apart from
/// main data.
#[must_use]
pub fn input_slot(connection: &Connection) -> &str {
    match connection.kind.slot() {
        Some(slot) => slot,
        None => &connection.input_key,
    }
}

/// The descriptor delivered on a support edge (`ai_tool` / `ai_memory`) in
/// place of runtime data: enough for an agent to know what is connected.
#[must_use]
pub fn support_descriptor(node: &NodeDefinition) -> Value {
    let description = node
        .config_value("description")
        .and_then(Value::as_str)
        .map_or_else(|| node.subtype.clone(), str::to_owned);
    serde_json::json!({
        "node_id": node.id,
        "name": node.name,
        "subtype": node.subtype,
        "description": description,
    })
}

/// Aggregate `(connection, value)` pairs, in edge order, into a consumer's
/// input map.
#[must_use]
pub fn aggregate<'a, I>(deliveries: I) -> NodeInput
where
    I: IntoIterator<Item = (&'a Connection, Value)>,
{
    let mut input = NodeInput::new();
    for (connection, value) in deliveries {
        input.deliver(input_slot(connection), value);
    }
    input
}
