//! Runtime value model for records and predicate expressions.
//!
//! Defines [`Value`], the dynamically-typed field value every pipe reads and
//! writes, and [`ValueKind`], the parallel type tag used by
//! [`Schema`](crate::schema::Schema) declarations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single record field value.
///
/// Deliberately small: pipes translate backend-native representations
/// (SQL columns, grid cells, delimited-file tokens) into this common set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / unknown value. Round-trips through the file pipe's
    /// null-sentinel token and SQL `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit IEEE 754 float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

/// Type tag for a [`Value`], used by schema declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Matches [`Value::Null`] only.
    Null,
    /// Matches [`Value::Bool`].
    Bool,
    /// Matches [`Value::Int`].
    Int,
    /// Matches [`Value::Float`] (and accepts `Int` values, see
    /// [`ValueKind::accepts`]).
    Float,
    /// Matches [`Value::Text`].
    Text,
}

impl Value {
    /// Returns the type tag of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
        }
    }

    /// Returns `true` if this is [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl ValueKind {
    /// Assignability (covariance) check for record-instance validation.
    ///
    /// `Null` is assignable to every kind, and `Int` values are accepted
    /// where `Float` is declared. Everything else requires an exact match.
    /// Schema-to-schema compatibility is stricter and does NOT use this
    /// rule; see [`Schema::compatible_with`](crate::schema::Schema::compatible_with).
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        let actual = value.kind();
        actual == self || (self == ValueKind::Float && actual == ValueKind::Int)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
