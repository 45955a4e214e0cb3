use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar held by a reactive cell or produced by an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    /// Numeric view used by arithmetic. Booleans map to 1/0, numeric strings
    /// parse, everything else is 0. Never NaN.
    pub fn as_number(&self) -> f64 {
        let number = match self {
            Self::Number(n) => *n,
            Self::Bool(true) => 1.0,
            Self::Bool(false) => 0.0,
            Self::Text(text) => text.trim().parse().unwrap_or(0.0),
        };
        if number.is_nan() {
            0.0
        } else {
            number
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Bool(b) => *b,
            Self::Text(text) => !text.is_empty(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Number(_) => ValueType::Number,
            Self::Bool(_) => ValueType::Boolean,
            Self::Text(_) => ValueType::String,
        }
    }

    /// Converts the value to the requested cell type.
    pub fn coerce(self, ty: ValueType) -> Self {
        match (ty, self) {
            (ValueType::Number, value) => Self::Number(value.as_number()),
            (ValueType::Boolean, value) => Self::Bool(value.is_truthy()),
            (ValueType::String, Self::Text(text)) => Self::Text(text),
            (ValueType::String, value) => Self::Text(value.to_string()),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Null => Self::Number(0.0),
            other => Self::Text(other.to_string()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Number(0.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Declared type of a cell in `CreateCell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
    Boolean,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercion_never_produces_nan() {
        assert_eq!(Value::from("12.5").as_number(), 12.5);
        assert_eq!(Value::from("blue").as_number(), 0.0);
        assert_eq!(Value::from(true).as_number(), 1.0);
        assert_eq!(Value::Number(f64::NAN).as_number(), 0.0);
    }

    #[test]
    fn coerces_to_declared_type() {
        assert_eq!(Value::from(3.0).coerce(ValueType::Boolean), Value::Bool(true));
        assert_eq!(Value::from("").coerce(ValueType::Boolean), Value::Bool(false));
        assert_eq!(Value::from(2.0).coerce(ValueType::String), Value::from("2"));
        assert_eq!(Value::from("7").coerce(ValueType::Number), Value::Number(7.0));
    }

    #[test]
    fn deserializes_untagged_scalars() {
        let values: Vec<Value> = serde_json::from_str(r#"[1, true, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![Value::Number(1.0), Value::Bool(true), Value::from("x")]
        );
    }
}
