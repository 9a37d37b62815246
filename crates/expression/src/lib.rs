#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Expression
//!
//! A small, pure expression language over JSON values, used by flow
//! predicates (`if`, `switch`, `filter`), transform actions, and per-edge
//! conversion functions.
//!
//! Syntax is n8n-flavoured: variables (`input`, `item`, `trigger`, `vars`),
//! property access (`input.user.name`), index access (`items[0]`),
//! arithmetic, comparisons, boolean logic, and a compact builtin set
//! (`length`, `upper`, `contains`, ...).
//!
//! Evaluation is pure: the same expression over the same context always
//! produces the same value, and no I/O can occur.
//!
//! ```text
//! input.temp > 30
//! { "y": input.x * 2 }        // via transform runners, field by field
//! upper(trim(input.name))
//! ```

pub mod ast;
pub mod builtins;
pub mod context;
pub mod error;
pub mod eval;
pub mod parser;
pub mod value;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use context::EvaluationContext;
pub use error::ExpressionError;

/// A parsed, reusable expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parse an expression from source text.
    pub fn parse(source: impl Into<String>) -> Result<Self, ExpressionError> {
        let source = source.into();
        let ast = parser::parse(&source)?;
        Ok(Self { source, ast })
    }

    /// The original source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a context.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<serde_json::Value, ExpressionError> {
        eval::eval(&self.ast, ctx)
    }

    /// Evaluate and coerce to a boolean using JSON truthiness.
    pub fn evaluate_bool(&self, ctx: &EvaluationContext) -> Result<bool, ExpressionError> {
        Ok(value::is_truthy(&self.evaluate(ctx)?))
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(
    source: &str,
    ctx: &EvaluationContext,
) -> Result<serde_json::Value, ExpressionError> {
    Expression::parse(source)?.evaluate(ctx)
}

/// Parse and evaluate to a boolean in one step.
pub fn evaluate_bool(source: &str, ctx: &EvaluationContext) -> Result<bool, ExpressionError> {
    Expression::parse(source)?.evaluate_bool(ctx)
}
