//! Dynamic scalar values and their canonical coercion.
//!
//! Expected values come from YAML spec documents and actual values come from
//! NRQL result rows (JSON). Both are lowered into [`Value`] and then passed
//! through [`coerce`] independently before any comparison happens.

use std::fmt;

/// A scalar value as it appears in a spec document or a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Null,
}

impl Value {
    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Whether the value is the canonical null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Text(s.clone()),
            // Arrays and objects never coerce; keep their JSON rendering.
            composite => Self::Text(composite.to_string()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::from(&value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Null => write!(f, "nil"),
        }
    }
}

/// Normalize a value into its canonical comparable form.
///
/// Integers become floats, `"nil"` becomes [`Value::Null`] and
/// `"true"`/`"false"` become booleans (all case-insensitive). Anything else is
/// returned unchanged. The result only ever holds `Float`, `Text`, `Boolean`
/// or `Null`, so applying it twice is the same as applying it once.
pub fn coerce(value: &Value) -> Value {
    match value {
        Value::Integer(n) => Value::Float(*n as f64),
        Value::Text(s) if s.eq_ignore_ascii_case("nil") => Value::Null,
        Value::Text(s) if s.eq_ignore_ascii_case("true") => Value::Boolean(true),
        Value::Text(s) if s.eq_ignore_ascii_case("false") => Value::Boolean(false),
        other => other.clone(),
    }
}
