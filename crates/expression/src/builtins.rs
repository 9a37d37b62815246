//! Builtin functions callable from expressions.

use serde_json::Value;

use crate::error::ExpressionError;
use crate::value::{number_as_f64, type_name};

/// Dispatch a builtin call by name.
pub fn call(function: &str, args: &[Value]) -> Result<Value, ExpressionError> {
    match function {
        "length" => length(one(function, args)?),
        "upper" => string_fn(function, args, str::to_uppercase),
        "lower" => string_fn(function, args, str::to_lowercase),
        "trim" => string_fn(function, args, |s| s.trim().to_owned()),
        "contains" => contains(two(function, args)?),
        "abs" => numeric_fn(function, args, f64::abs),
        "round" => numeric_fn(function, args, f64::round),
        "min" => min_max(function, args, true),
        "max" => min_max(function, args, false),
        "keys" => keys(one(function, args)?),
        "to_string" => to_string(one(function, args)?),
        "to_number" => to_number(one(function, args)?),
        _ => Err(ExpressionError::UnknownFunction(function.to_owned())),
    }
}

fn one<'a>(function: &str, args: &'a [Value]) -> Result<&'a Value, ExpressionError> {
    match args {
        [v] => Ok(v),
        _ => Err(ExpressionError::Arity {
            function: function.to_owned(),
            expected: 1,
            actual: args.len(),
        }),
    }
}

fn two<'a>(function: &str, args: &'a [Value]) -> Result<(&'a Value, &'a Value), ExpressionError> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(ExpressionError::Arity {
            function: function.to_owned(),
            expected: 2,
            actual: args.len(),
        }),
    }
}

fn length(value: &Value) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => Ok(Value::from(s.chars().count() as u64)),
        Value::Array(arr) => Ok(Value::from(arr.len() as u64)),
        Value::Object(map) => Ok(Value::from(map.len() as u64)),
        other => Err(ExpressionError::Type {
            expected: "string, array or object",
            actual: type_name(other),
        }),
    }
}

fn string_fn(
    function: &str,
    args: &[Value],
    f: impl Fn(&str) -> String,
) -> Result<Value, ExpressionError> {
    match one(function, args)? {
        Value::String(s) => Ok(Value::String(f(s))),
        other => Err(ExpressionError::Type {
            expected: "string",
            actual: type_name(other),
        }),
    }
}

fn contains((haystack, needle): (&Value, &Value)) -> Result<Value, ExpressionError> {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => Ok(Value::Bool(s.contains(n.as_str()))),
            other => Err(ExpressionError::Type {
                expected: "string",
                actual: type_name(other),
            }),
        },
        Value::Array(arr) => Ok(Value::Bool(
            arr.iter().any(|v| crate::value::values_equal(v, needle)),
        )),
        Value::Object(map) => match needle {
            Value::String(key) => Ok(Value::Bool(map.contains_key(key))),
            other => Err(ExpressionError::Type {
                expected: "string",
                actual: type_name(other),
            }),
        },
        other => Err(ExpressionError::Type {
            expected: "string, array or object",
            actual: type_name(other),
        }),
    }
}

fn numeric_fn(
    function: &str,
    args: &[Value],
    f: impl Fn(f64) -> f64,
) -> Result<Value, ExpressionError> {
    match one(function, args)? {
        Value::Number(n) => {
            let x = number_as_f64(n)
                .ok_or_else(|| ExpressionError::eval("number not representable"))?;
            let result = f(x);
            if result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
                Ok(Value::from(result as i64))
            } else {
                serde_json::Number::from_f64(result)
                    .map(Value::Number)
                    .ok_or_else(|| ExpressionError::eval("non-finite result"))
            }
        }
        other => Err(ExpressionError::Type {
            expected: "number",
            actual: type_name(other),
        }),
    }
}

fn min_max(function: &str, args: &[Value], take_min: bool) -> Result<Value, ExpressionError> {
    let (a, b) = two(function, args)?;
    let (Value::Number(l), Value::Number(r)) = (a, b) else {
        let bad = if a.is_number() { b } else { a };
        return Err(ExpressionError::Type {
            expected: "number",
            actual: type_name(bad),
        });
    };
    let (x, y) = (
        number_as_f64(l).ok_or_else(|| ExpressionError::eval("number not representable"))?,
        number_as_f64(r).ok_or_else(|| ExpressionError::eval("number not representable"))?,
    );
    let pick_left = if take_min { x <= y } else { x >= y };
    Ok(if pick_left { a.clone() } else { b.clone() })
}

fn keys(value: &Value) -> Result<Value, ExpressionError> {
    match value {
        Value::Object(map) => Ok(Value::Array(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        other => Err(ExpressionError::Type {
            expected: "object",
            actual: type_name(other),
        }),
    }
}

fn to_string(value: &Value) -> Result<Value, ExpressionError> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_owned(),
        other => other.to_string(),
    };
    Ok(Value::String(s))
}

fn to_number(value: &Value) -> Result<Value, ExpressionError> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        Value::String(s) => {
            if let Ok(i) = s.trim().parse::<i64>() {
                Ok(Value::from(i))
            } else if let Ok(f) = s.trim().parse::<f64>() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| ExpressionError::eval("non-finite number"))
            } else {
                Err(ExpressionError::eval(format!(
                    "cannot convert {s:?} to a number"
                )))
            }
        }
        other => Err(ExpressionError::Type {
            expected: "number, boolean or string",
            actual: type_name(other),
        }),
    }
}
