//! Expression AST.

use serde_json::Value;

/// A parsed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal JSON value (null, bool, number, string).
    Literal(Value),
    /// A variable reference resolved from the evaluation context.
    Variable(String),
    /// Property access: `object.name`.
    Property {
        /// Expression producing the object.
        object: Box<Expr>,
        /// Property name.
        name: String,
    },
    /// Index access: `object[index]`.
    Index {
        /// Expression producing the array or object.
        object: Box<Expr>,
        /// Expression producing the index or key.
        index: Box<Expr>,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        expr: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Builtin function call: `name(args...)`.
    Call {
        /// Function name.
        function: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Numeric negation `-x`.
    Neg,
    /// Boolean negation `!x`.
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+` — numeric addition or string concatenation.
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `==` — deep equality with numeric coercion.
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&` — short-circuit, truthiness semantics.
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    /// Left binding power for Pratt parsing; higher binds tighter.
    #[must_use]
    pub(crate) fn binding_power(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne => 3,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Mod => 6,
        }
    }
}
