//! Per-subtype configuration schemas.
//!
//! Node configurations are never handed to runners as opaque dictionaries:
//! every registered subtype declares a [`ConfigSchema`], and the engine
//! validates a node's configuration against it before dispatch. Missing
//! required keys, wrong types, unknown enum values and out-of-bounds
//! numbers all fail fast as `invalid_configuration`.

use serde_json::Value;

use crate::error::RunnerError;

/// The expected shape of one configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A JSON string.
    String,
    /// An integer.
    Integer,
    /// Any number.
    Float,
    /// A boolean.
    Bool,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
    /// A string holding a parseable weft expression.
    Expression,
}

impl FieldKind {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Expression => "expression",
        }
    }
}

/// Declaration of one configuration field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Configuration key.
    pub key: String,
    /// Expected shape.
    pub kind: FieldKind,
    /// Whether the key must be present.
    pub required: bool,
    /// Allowed values, for enumerated string fields.
    pub enum_values: Option<Vec<String>>,
    /// Inclusive lower bound, for numeric fields.
    pub min: Option<f64>,
    /// Inclusive upper bound, for numeric fields.
    pub max: Option<f64>,
}

impl FieldSpec {
    /// Declare a field of the given kind, optional by default.
    #[must_use]
    pub fn new(key: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            kind,
            required: false,
            enum_values: None,
            min: None,
            max: None,
        }
    }

    /// A string field.
    #[must_use]
    pub fn string(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::String)
    }

    /// An integer field.
    #[must_use]
    pub fn integer(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Integer)
    }

    /// A boolean field.
    #[must_use]
    pub fn boolean(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Bool)
    }

    /// An array field.
    #[must_use]
    pub fn array(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Array)
    }

    /// An object field.
    #[must_use]
    pub fn object(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Object)
    }

    /// An expression field.
    #[must_use]
    pub fn expression(key: impl Into<String>) -> Self {
        Self::new(key, FieldKind::Expression)
    }

    /// Mark the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict to an enumerated set of string values.
    #[must_use]
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict a numeric field to an inclusive range.
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn validate(&self, value: &Value) -> Result<(), RunnerError> {
        let key = &self.key;
        let type_ok = match self.kind {
            FieldKind::String | FieldKind::Expression => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        };
        if !type_ok {
            return Err(RunnerError::invalid_configuration(format!(
                "parameter {key:?} must be a {}",
                self.kind.name()
            )));
        }

        if self.kind == FieldKind::Expression {
            let source = value.as_str().unwrap_or_default();
            weft_expression::Expression::parse(source).map_err(|e| {
                RunnerError::invalid_configuration(format!("parameter {key:?}: {e}"))
            })?;
        }

        if let Some(allowed) = &self.enum_values {
            let actual = value.as_str().unwrap_or_default();
            if !allowed.iter().any(|v| v == actual) {
                return Err(RunnerError::invalid_configuration(format!(
                    "parameter {key:?} must be one of {allowed:?}, got {actual:?}"
                )));
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.min {
                if n < min {
                    return Err(RunnerError::invalid_configuration(format!(
                        "parameter {key:?} must be >= {min}, got {n}"
                    )));
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    return Err(RunnerError::invalid_configuration(format!(
                        "parameter {key:?} must be <= {max}, got {n}"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// The configuration schema of one node subtype.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    /// Declared fields.
    pub fields: Vec<FieldSpec>,
}

impl ConfigSchema {
    /// An empty schema accepting any configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field declaration.
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Validate a node configuration against this schema.
    pub fn validate(
        &self,
        config: &serde_json::Map<String, Value>,
    ) -> Result<(), RunnerError> {
        for spec in &self.fields {
            match config.get(&spec.key) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(RunnerError::invalid_configuration(format!(
                            "missing required parameter {:?}",
                            spec.key
                        )));
                    }
                }
                Some(value) => spec.validate(value)?,
            }
        }
        Ok(())
    }
}
