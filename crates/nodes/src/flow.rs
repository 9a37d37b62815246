//! Flow-control runners: `if`, `switch`, `filter`, `for_each`, `merge`, `wait`.

use std::time::Duration;

use async_trait::async_trait;
use weft_expression::EvaluationContext;
use weft_runner::{
    ConfigSchema, FieldSpec, InputValue, NodeInput, NodeRunner, PortMap, RunContext, RunnerError,
    RunnerOutcome, RunnerSpec, WaitSignal,
};
use weft_workflow::NodeKind;

const DEFAULT_MAX_ITERATIONS: u64 = 1000;

fn eval_ctx(ctx: &RunContext, input: &NodeInput) -> EvaluationContext {
    EvaluationContext::new()
        .with_input(input.primary())
        .with_trigger(ctx.trigger.clone())
}

/// `flow/if` — evaluates a boolean condition and produces the incoming
/// value on port `true` or `false`.
///
/// Config:
/// - `condition` (required expression)
pub struct IfRunner {
    spec: RunnerSpec,
}

impl IfRunner {
    /// Create the if runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(NodeKind::Flow, "if", "Routes to `true` or `false`")
                .with_schema(
                    ConfigSchema::new().field(FieldSpec::expression("condition").required()),
                )
                .with_output_ports(["true", "false"]),
        }
    }
}

impl Default for IfRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for IfRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;
        let condition = ctx.config_str("condition")?;
        let taken = weft_expression::evaluate_bool(condition, &eval_ctx(ctx, input))
            .map_err(|e| RunnerError::Expression(e.to_string()))?;
        let port = if taken { "true" } else { "false" };
        Ok(RunnerOutcome::on_port(port, input.primary()))
    }
}

/// `flow/switch` — evaluates a selector and produces on the matching case
/// port, else `default`.
///
/// Config:
/// - `selector` (required expression)
/// - `cases` (required array of strings): declared case ports.
pub struct SwitchRunner {
    spec: RunnerSpec,
}

impl SwitchRunner {
    /// Create the switch runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(NodeKind::Flow, "switch", "Routes to a named case port")
                .with_schema(
                    ConfigSchema::new()
                        .field(FieldSpec::expression("selector").required())
                        .field(FieldSpec::array("cases").required()),
                )
                .with_output_ports(["default"]),
        }
    }
}

impl Default for SwitchRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for SwitchRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;
        let selector = ctx.config_str("selector")?;
        let cases: Vec<String> = ctx
            .config_value("cases")
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .ok_or_else(|| {
                RunnerError::invalid_configuration("missing array parameter \"cases\"")
            })?;

        let selected = weft_expression::evaluate(selector, &eval_ctx(ctx, input))
            .map_err(|e| RunnerError::Expression(e.to_string()))?;
        let selected = match &selected {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let port = if cases.iter().any(|c| *c == selected) {
            selected
        } else {
            "default".to_owned()
        };
        Ok(RunnerOutcome::on_port(port, input.primary()))
    }
}

/// `flow/filter` — forwards an array, dropping items that fail the
/// predicate. Kept items go to `result`, dropped items to `filtered`.
///
/// Config:
/// - `predicate` (required expression, evaluated with each element bound
///   as `item`)
pub struct FilterRunner {
    spec: RunnerSpec,
}

impl FilterRunner {
    /// Create the filter runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(NodeKind::Flow, "filter", "Drops items failing a predicate")
                .with_schema(
                    ConfigSchema::new().field(FieldSpec::expression("predicate").required()),
                )
                .with_output_ports(["result", "filtered"]),
        }
    }
}

impl Default for FilterRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for FilterRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;
        let predicate = ctx.config_str("predicate")?;
        let expr = weft_expression::Expression::parse(predicate)
            .map_err(|e| RunnerError::Expression(e.to_string()))?;

        let serde_json::Value::Array(items) = input.primary() else {
            return Err(RunnerError::invalid_configuration(
                "filter input must be an array",
            ));
        };

        let mut kept = Vec::new();
        let mut dropped = Vec::new();
        let base = eval_ctx(ctx, input);
        for item in items {
            let item_ctx = base.clone().with_item(item.clone());
            let keep = expr
                .evaluate_bool(&item_ctx)
                .map_err(|e| RunnerError::Expression(e.to_string()))?;
            if keep {
                kept.push(item);
            } else {
                dropped.push(item);
            }
        }

        let mut ports = PortMap::new();
        ports.insert("result".to_owned(), serde_json::Value::Array(kept));
        ports.insert("filtered".to_owned(), serde_json::Value::Array(dropped));
        Ok(RunnerOutcome::Finished(ports))
    }
}

/// `flow/for_each` — dispatches the body subgraph once per input element,
/// sequentially, through the engine's subgraph handle. Iterations are
/// capped; truncation is reported on the output so the engine can emit a
/// warning.
///
/// Config:
/// - `items_expression` (expression): where to find the array; defaults to
///   the primary input.
/// - `max_iterations` (integer >= 1, default 1000)
pub struct ForEachRunner {
    spec: RunnerSpec,
}

impl ForEachRunner {
    /// Create the for-each runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(NodeKind::Flow, "for_each", "Runs the body once per element")
                .with_schema(
                    ConfigSchema::new()
                        .field(FieldSpec::expression("items_expression"))
                        .field(FieldSpec::integer("max_iterations").with_range(1.0, 1_000_000.0)),
                )
                .with_output_ports(["item", "done"]),
        }
    }
}

impl Default for ForEachRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for ForEachRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;

        let items = if let Some(source) = ctx.config_str_opt("items_expression") {
            weft_expression::evaluate(source, &eval_ctx(ctx, input))
                .map_err(|e| RunnerError::Expression(e.to_string()))?
        } else {
            input.primary()
        };
        let serde_json::Value::Array(items) = items else {
            return Err(RunnerError::invalid_configuration(
                "for_each input must be an array",
            ));
        };

        let cap = ctx
            .config_u64("max_iterations")
            .unwrap_or(DEFAULT_MAX_ITERATIONS) as usize;
        let truncated = items.len() > cap;
        let total = items.len();

        let subgraph = ctx.subgraph()?;
        let mut outputs = Vec::with_capacity(items.len().min(cap));
        for (index, item) in items.into_iter().take(cap).enumerate() {
            ctx.check_cancelled()?;
            let output = subgraph.run_body(index, item).await?;
            outputs.push(output);
        }

        let iterations = outputs.len();
        let mut ports = PortMap::new();
        ports.insert(
            "done".to_owned(),
            serde_json::json!({
                "results": outputs,
                "iterations": iterations,
                "total_items": total,
                "truncated": truncated,
            }),
        );
        Ok(RunnerOutcome::Finished(ports))
    }
}

/// Merge strategy for `flow/merge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Fire once every incoming edge has delivered (or been skipped).
    WaitAll,
    /// Fire as soon as any incoming edge has delivered.
    WaitAny,
    /// Like `WaitAll`, but merge object contributions into one object.
    MergeObjects,
}

impl MergeStrategy {
    /// Parse from a node's `strategy` configuration value.
    pub fn from_config(
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, RunnerError> {
        match config.get("strategy").and_then(serde_json::Value::as_str) {
            None | Some("wait_all") => Ok(Self::WaitAll),
            Some("wait_any") => Ok(Self::WaitAny),
            Some("merge_objects") => Ok(Self::MergeObjects),
            Some(other) => Err(RunnerError::invalid_configuration(format!(
                "unknown merge strategy {other:?}"
            ))),
        }
    }
}

/// `flow/merge` — joins multiple incoming paths. Readiness (wait_all vs
/// wait_any) is enforced by the engine's scheduler; the runner aggregates
/// whatever was delivered.
///
/// Config:
/// - `strategy` (enum `wait_all` | `wait_any` | `merge_objects`, default
///   `wait_all`)
pub struct MergeRunner {
    spec: RunnerSpec,
}

impl MergeRunner {
    /// Create the merge runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(NodeKind::Flow, "merge", "Joins multiple incoming paths")
                .with_schema(ConfigSchema::new().field(
                    FieldSpec::string("strategy").with_enum([
                        "wait_all",
                        "wait_any",
                        "merge_objects",
                    ]),
                )),
        }
    }
}

impl Default for MergeRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for MergeRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;
        let strategy = MergeStrategy::from_config(&ctx.config)?;

        let contributions: Vec<serde_json::Value> = input
            .get(weft_runner::input::PRIMARY_SLOT)
            .map(|slot| match slot {
                InputValue::Single(v) => vec![v.clone()],
                InputValue::Many(vs) => vs.clone(),
            })
            .unwrap_or_default();

        let merged = match strategy {
            MergeStrategy::WaitAll | MergeStrategy::WaitAny => {
                serde_json::Value::Array(contributions)
            }
            MergeStrategy::MergeObjects => {
                let mut merged = serde_json::Map::new();
                for value in contributions {
                    match value {
                        serde_json::Value::Object(map) => merged.extend(map),
                        other => {
                            return Err(RunnerError::invalid_configuration(format!(
                                "merge_objects requires object inputs, got {other}"
                            )));
                        }
                    }
                }
                serde_json::Value::Object(merged)
            }
        };

        Ok(RunnerOutcome::result(merged))
    }
}

/// `flow/wait` — pauses the execution on a pure timer. At the deadline the
/// node continues with an empty output.
///
/// Config:
/// - `duration_secs` (required integer 1..=604800)
pub struct WaitRunner {
    spec: RunnerSpec,
}

impl WaitRunner {
    /// Create the wait runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: RunnerSpec::new(NodeKind::Flow, "wait", "Pauses on a timer").with_schema(
                ConfigSchema::new().field(
                    FieldSpec::integer("duration_secs")
                        .required()
                        .with_range(1.0, 604_800.0),
                ),
            ),
        }
    }
}

impl Default for WaitRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for WaitRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, _input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;
        let secs = ctx.config_u64("duration_secs").ok_or_else(|| {
            RunnerError::invalid_configuration("missing integer parameter \"duration_secs\"")
        })?;
        Ok(RunnerOutcome::Wait(WaitSignal::timer(Duration::from_secs(
            secs,
        ))))
    }
}
