//! Expression error types.

use thiserror::Error;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    /// The source text could not be parsed.
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset into the source where parsing failed.
        offset: usize,
        /// What went wrong.
        message: String,
    },

    /// A variable is not bound in the evaluation context.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// An operand had the wrong type.
    #[error("type error: expected {expected}, got {actual}")]
    Type {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: &'static str,
    },

    /// A called function is not a known builtin.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A builtin was called with the wrong number of arguments.
    #[error("{function} expects {expected} argument(s), got {actual}")]
    Arity {
        /// Function name.
        function: String,
        /// Expected argument count.
        expected: usize,
        /// Actual argument count.
        actual: usize,
    },

    /// A general evaluation failure (division by zero, depth exceeded, ...).
    #[error("evaluation error: {0}")]
    Eval(String),
}

impl ExpressionError {
    /// Create a parse error.
    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }

    /// Create an evaluation error.
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formatting() {
        assert_eq!(
            ExpressionError::parse(4, "unexpected token").to_string(),
            "parse error at offset 4: unexpected token"
        );
        assert_eq!(
            ExpressionError::UnknownVariable("foo".into()).to_string(),
            "unknown variable: foo"
        );
        assert_eq!(
            ExpressionError::Type {
                expected: "number",
                actual: "string"
            }
            .to_string(),
            "type error: expected number, got string"
        );
        assert_eq!(
            ExpressionError::Arity {
                function: "min".into(),
                expected: 2,
                actual: 1
            }
            .to_string(),
            "min expects 2 argument(s), got 1"
        );
    }
}
