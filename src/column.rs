use crate::error::{PivotError, Result};
use crate::schema::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell value. Serializes as the bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Boolean(b) => write!(f, "{}", b),
            ScalarValue::Int64(i) => write!(f, "{}", i),
            ScalarValue::Float64(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            ScalarValue::Utf8(s) => write!(f, "{}", s),
            ScalarValue::Null => write!(f, "NULL"),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self { ScalarValue::Utf8(s.to_string()) }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self { ScalarValue::Utf8(s) }
}

impl From<i64> for ScalarValue {
    fn from(i: i64) -> Self { ScalarValue::Int64(i) }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self { ScalarValue::Float64(v) }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self { ScalarValue::Boolean(b) }
}

impl ScalarValue {
    pub fn is_null(&self) -> bool { matches!(self, ScalarValue::Null) }

    /// Type of a non-null value.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Boolean(_) => Some(DataType::Boolean),
            ScalarValue::Int64(_) => Some(DataType::Int64),
            ScalarValue::Float64(_) => Some(DataType::Float64),
            ScalarValue::Utf8(_) => Some(DataType::Utf8),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int64(i) => Some(*i as f64),
            ScalarValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// Converts to `target`, parsing text where needed. Used for path
    /// values, which arrive as text keys.
    pub fn coerce_to(self, target: &DataType) -> Result<ScalarValue> {
        match (&self, target) {
            (ScalarValue::Null, _) => Ok(ScalarValue::Null),
            (ScalarValue::Int64(_), DataType::Int64)
            | (ScalarValue::Float64(_), DataType::Float64)
            | (ScalarValue::Boolean(_), DataType::Boolean)
            | (ScalarValue::Utf8(_), DataType::Utf8) => Ok(self),
            (ScalarValue::Int64(i), DataType::Float64) => Ok(ScalarValue::Float64(*i as f64)),
            (ScalarValue::Float64(v), DataType::Int64) if v.fract() == 0.0 => {
                Ok(ScalarValue::Int64(*v as i64))
            }
            (ScalarValue::Utf8(s), DataType::Int64) => s.trim().parse::<i64>()
                .map(ScalarValue::Int64)
                .map_err(|_| PivotError::TypeError(format!("Cannot parse integer: {}", s))),
            (ScalarValue::Utf8(s), DataType::Float64) => s.trim().parse::<f64>()
                .map(ScalarValue::Float64)
                .map_err(|_| PivotError::TypeError(format!("Cannot parse real: {}", s))),
            (ScalarValue::Utf8(s), DataType::Boolean) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(ScalarValue::Boolean(true)),
                "false" | "f" | "0" => Ok(ScalarValue::Boolean(false)),
                _ => Err(PivotError::TypeError(format!("Cannot parse boolean: {}", s))),
            },
            (other, DataType::Utf8) => Ok(ScalarValue::Utf8(other.to_string())),
            (other, target) => Err(PivotError::TypeError(format!(
                "Cannot convert {} to {}", other, target
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_scalars() {
        let vals = vec![
            ScalarValue::Null,
            ScalarValue::Boolean(true),
            ScalarValue::Int64(3),
            ScalarValue::Float64(2.5),
            ScalarValue::from("x"),
        ];
        let json = serde_json::to_string(&vals).unwrap();
        assert_eq!(json, r#"[null,true,3,2.5,"x"]"#);
        let back: Vec<ScalarValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vals);
    }

    #[test]
    fn coerce_path_keys() {
        assert_eq!(ScalarValue::from("42").coerce_to(&DataType::Int64).unwrap(), ScalarValue::Int64(42));
        assert_eq!(ScalarValue::Int64(7).coerce_to(&DataType::Utf8).unwrap(), ScalarValue::from("7"));
        assert!(matches!(
            ScalarValue::from("abc").coerce_to(&DataType::Int64),
            Err(PivotError::TypeError(_))
        ));
    }
}
