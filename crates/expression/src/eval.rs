//! AST evaluation.

use serde_json::Value;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::builtins;
use crate::context::EvaluationContext;
use crate::error::ExpressionError;
use crate::value::{is_truthy, number_as_f64, type_name, values_equal};

/// Maximum recursion depth for expression evaluation.
const MAX_RECURSION_DEPTH: usize = 128;

/// Evaluate an expression in the given context.
pub fn eval(expr: &Expr, ctx: &EvaluationContext) -> Result<Value, ExpressionError> {
    eval_with_depth(expr, ctx, 0)
}

fn eval_with_depth(
    expr: &Expr,
    ctx: &EvaluationContext,
    depth: usize,
) -> Result<Value, ExpressionError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(ExpressionError::eval(format!(
            "maximum recursion depth ({MAX_RECURSION_DEPTH}) exceeded"
        )));
    }

    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Variable(name) => ctx
            .resolve(name)
            .cloned()
            .ok_or_else(|| ExpressionError::UnknownVariable(name.clone())),

        Expr::Property { object, name } => {
            let obj = eval_with_depth(object, ctx, depth + 1)?;
            access_property(&obj, name)
        }

        Expr::Index { object, index } => {
            let obj = eval_with_depth(object, ctx, depth + 1)?;
            let idx = eval_with_depth(index, ctx, depth + 1)?;
            access_index(&obj, &idx)
        }

        Expr::Unary { op, expr } => {
            let val = eval_with_depth(expr, ctx, depth + 1)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&val))),
                UnaryOp::Neg => match &val {
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            Ok(Value::from(-i))
                        } else if let Some(f) = n.as_f64() {
                            Ok(serde_json::json!(-f))
                        } else {
                            Err(ExpressionError::eval("cannot negate number"))
                        }
                    }
                    other => Err(ExpressionError::Type {
                        expected: "number",
                        actual: type_name(other),
                    }),
                },
            }
        }

        Expr::Binary { left, op, right } => match op {
            // Short-circuiting operators evaluate the right side lazily.
            BinaryOp::And => {
                let l = eval_with_depth(left, ctx, depth + 1)?;
                if !is_truthy(&l) {
                    return Ok(Value::Bool(false));
                }
                let r = eval_with_depth(right, ctx, depth + 1)?;
                Ok(Value::Bool(is_truthy(&r)))
            }
            BinaryOp::Or => {
                let l = eval_with_depth(left, ctx, depth + 1)?;
                if is_truthy(&l) {
                    return Ok(Value::Bool(true));
                }
                let r = eval_with_depth(right, ctx, depth + 1)?;
                Ok(Value::Bool(is_truthy(&r)))
            }
            _ => {
                let l = eval_with_depth(left, ctx, depth + 1)?;
                let r = eval_with_depth(right, ctx, depth + 1)?;
                eval_binary(*op, &l, &r)
            }
        },

        Expr::Call { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval_with_depth(arg, ctx, depth + 1)?);
            }
            builtins::call(function, &values)
        }
    }
}

fn access_property(obj: &Value, name: &str) -> Result<Value, ExpressionError> {
    match obj {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        // `.length` is supported on arrays and strings for convenience
        Value::Array(arr) if name == "length" => Ok(Value::from(arr.len() as u64)),
        Value::String(s) if name == "length" => Ok(Value::from(s.chars().count() as u64)),
        Value::Null => Ok(Value::Null),
        other => Err(ExpressionError::Type {
            expected: "object",
            actual: type_name(other),
        }),
    }
}

fn access_index(obj: &Value, index: &Value) -> Result<Value, ExpressionError> {
    match (obj, index) {
        (Value::Array(arr), Value::Number(n)) => {
            let idx = n
                .as_i64()
                .ok_or_else(|| ExpressionError::eval("array index must be an integer"))?;
            let idx = if idx < 0 { arr.len() as i64 + idx } else { idx };
            if idx < 0 {
                return Ok(Value::Null);
            }
            Ok(arr.get(idx as usize).cloned().unwrap_or(Value::Null))
        }
        (Value::Object(map), Value::String(key)) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Null, _) => Ok(Value::Null),
        (other, _) => Err(ExpressionError::Type {
            expected: "array or object",
            actual: type_name(other),
        }),
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, left, right),
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited by the caller"),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    let ordering = match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            let (Some(a), Some(b)) = (number_as_f64(l), number_as_f64(r)) else {
                return Err(ExpressionError::eval("numbers are not comparable"));
            };
            a.partial_cmp(&b)
                .ok_or_else(|| ExpressionError::eval("numbers are not comparable"))?
        }
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (l, r) => {
            return Err(ExpressionError::Type {
                expected: "two numbers or two strings",
                actual: if l.is_number() || l.is_string() {
                    type_name(r)
                } else {
                    type_name(l)
                },
            });
        }
    };

    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn add(left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(Value::String(format!("{l}{r}"))),
        (Value::Number(_), Value::Number(_)) => arithmetic(BinaryOp::Add, left, right),
        (l, r) => Err(ExpressionError::Type {
            expected: "two numbers or two strings",
            actual: if l.is_number() || l.is_string() {
                type_name(r)
            } else {
                type_name(l)
            },
        }),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    let (Value::Number(l), Value::Number(r)) = (left, right) else {
        let bad = if left.is_number() { right } else { left };
        return Err(ExpressionError::Type {
            expected: "number",
            actual: type_name(bad),
        });
    };

    // Integer arithmetic when both sides are integers and the result is
    // representable; otherwise fall through to f64.
    if let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) {
        match op {
            BinaryOp::Add => {
                if let Some(sum) = a.checked_add(b) {
                    return Ok(Value::from(sum));
                }
            }
            BinaryOp::Sub => {
                if let Some(diff) = a.checked_sub(b) {
                    return Ok(Value::from(diff));
                }
            }
            BinaryOp::Mul => {
                if let Some(product) = a.checked_mul(b) {
                    return Ok(Value::from(product));
                }
            }
            BinaryOp::Div => {
                if b == 0 {
                    return Err(ExpressionError::eval("division by zero"));
                }
                if a % b == 0 {
                    return Ok(Value::from(a / b));
                }
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(ExpressionError::eval("division by zero"));
                }
                return Ok(Value::from(a % b));
            }
            _ => unreachable!(),
        }
    }

    let (Some(a), Some(b)) = (number_as_f64(l), number_as_f64(r)) else {
        return Err(ExpressionError::eval("numbers are not representable as f64"));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(ExpressionError::eval("division by zero"));
            }
            a / b
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(ExpressionError::eval("division by zero"));
            }
            a % b
        }
        _ => unreachable!(),
    };
    serde_json::Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::eval("arithmetic produced a non-finite number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn run(source: &str, ctx: &EvaluationContext) -> Result<Value, ExpressionError> {
        eval(&parse(source).unwrap(), ctx)
    }

    fn empty() -> EvaluationContext {
        EvaluationContext::new()
    }

    #[rstest]
    #[case("1 + 2", json!(3))]
    #[case("7 - 10", json!(-3))]
    #[case("6 * 7", json!(42))]
    #[case("8 / 2", json!(4))]
    #[case("7 / 2", json!(3.5))]
    #[case("7 % 3", json!(1))]
    #[case("1.5 + 1", json!(2.5))]
    #[case("'a' + 'b'", json!("ab"))]
    fn arithmetic_cases(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(run(source, &empty()).unwrap(), expected);
    }

    #[rstest]
    #[case("1 < 2", true)]
    #[case("2 <= 2", true)]
    #[case("3 > 4", false)]
    #[case("4 >= 4", true)]
    #[case("1 == 1.0", true)]
    #[case("1 != 2", true)]
    #[case("'a' < 'b'", true)]
    #[case("'x' == 'x'", true)]
    fn comparison_cases(#[case] source: &str, #[case] expected: bool) {
        assert_eq!(run(source, &empty()).unwrap(), json!(expected));
    }

    #[rstest]
    #[case("true && true", true)]
    #[case("true && false", false)]
    #[case("false || true", true)]
    #[case("false || false", false)]
    #[case("!false", true)]
    #[case("1 && 'x'", true)]
    #[case("0 || ''", false)]
    fn boolean_cases(#[case] source: &str, #[case] expected: bool) {
        assert_eq!(run(source, &empty()).unwrap(), json!(expected));
    }

    #[test]
    fn short_circuit_skips_right_side() {
        // The right side references an unbound variable; short-circuit
        // means it is never evaluated.
        assert_eq!(run("false && missing", &empty()).unwrap(), json!(false));
        assert_eq!(run("true || missing", &empty()).unwrap(), json!(true));
        assert!(run("true && missing", &empty()).is_err());
    }

    #[test]
    fn property_access() {
        let ctx = empty().with_input(json!({"user": {"name": "ada"}}));
        assert_eq!(run("input.user.name", &ctx).unwrap(), json!("ada"));
        // Missing properties yield null rather than erroring.
        assert_eq!(run("input.user.age", &ctx).unwrap(), Value::Null);
        assert_eq!(run("input.missing.deeper", &ctx).unwrap(), Value::Null);
    }

    #[test]
    fn property_on_scalar_errors() {
        let ctx = empty().with_input(json!(42));
        let err = run("input.field", &ctx).unwrap_err();
        assert!(matches!(err, ExpressionError::Type { .. }));
    }

    #[test]
    fn length_pseudo_property() {
        let ctx = empty().with_input(json!({"items": [1, 2, 3], "name": "ada"}));
        assert_eq!(run("input.items.length", &ctx).unwrap(), json!(3));
        assert_eq!(run("input.name.length", &ctx).unwrap(), json!(3));
    }

    #[test]
    fn index_access() {
        let ctx = empty().with_input(json!({"items": [10, 20, 30]}));
        assert_eq!(run("input.items[0]", &ctx).unwrap(), json!(10));
        assert_eq!(run("input.items[2]", &ctx).unwrap(), json!(30));
        assert_eq!(run("input.items[-1]", &ctx).unwrap(), json!(30));
        assert_eq!(run("input.items[9]", &ctx).unwrap(), Value::Null);
        assert_eq!(run("input['items'][1]", &ctx).unwrap(), json!(20));
    }

    #[test]
    fn negation() {
        let ctx = empty().with_input(json!({"x": 5}));
        assert_eq!(run("-input.x", &ctx).unwrap(), json!(-5));
        assert_eq!(run("-2.5", &ctx).unwrap(), json!(-2.5));
    }

    #[test]
    fn unknown_variable_errors() {
        let err = run("nope", &empty()).unwrap_err();
        assert_eq!(err, ExpressionError::UnknownVariable("nope".into()));
    }

    #[test]
    fn division_by_zero() {
        assert!(run("1 / 0", &empty()).is_err());
        assert!(run("1 % 0", &empty()).is_err());
        assert!(run("1.0 / 0.0", &empty()).is_err());
    }

    #[test]
    fn integer_overflow_falls_back_to_float() {
        let result = run("9223372036854775807 + 1", &empty()).unwrap();
        assert!(result.is_f64());
    }

    #[test]
    fn type_error_on_mixed_add() {
        let err = run("1 + 'a'", &empty()).unwrap_err();
        assert!(matches!(err, ExpressionError::Type { .. }));
    }
}
