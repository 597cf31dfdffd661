//! Scalar values and rows exchanged with the database driver.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single result row: column name to value, in select-list order.
pub type Row = IndexMap<String, Value>;

/// A bound parameter or column value.
///
/// Values are what the query compiler binds as parameters and what the
/// driver returns as column data. They are also what lands in the cache
/// store, so they must survive a serde round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical string form used for cache key suffixes and result indexing.
    ///
    /// Integers and their decimal text share a key (`Int(7)` and `Text("7")`
    /// both render as `"7"`), matching how lookup values arrive from callers
    /// as either numbers or strings. NULL has no lookup key.
    pub fn lookup_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(hex::encode(b)),
        }
    }

    /// Integer view of the value, parsing text when needed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of the value, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "x'{}'", hex::encode(b)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Build a [`Row`] from `(column, value)` pairs.
pub fn row<I, K, V>(columns: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    columns
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lookup_key_int_and_text_collide() {
        assert_eq!(Value::Int(7).lookup_key(), Value::from("7").lookup_key());
        assert_eq!(Value::Null.lookup_key(), None);
    }

    #[test]
    fn test_as_i64_parses_text() {
        assert_eq!(Value::from(" 42 ").as_i64(), Some(42));
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn test_row_builder_preserves_column_order() {
        let r = row([("b", Value::Int(1)), ("a", Value::Int(2))]);
        let columns: Vec<&str> = r.keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["b", "a"]);
    }

    proptest! {
        /// Numeric lookup values and their decimal text address the same key.
        #[test]
        fn prop_int_and_text_share_lookup_key(n in any::<i64>()) {
            prop_assert_eq!(Value::Int(n).lookup_key(), Value::Text(n.to_string()).lookup_key());
        }
    }

    #[test]
    fn test_value_serde_roundtrip_keeps_variant() {
        let values = vec![Value::Int(1), Value::Float(1.0), Value::from("1"), Value::Null];
        let json = serde_json::to_string(&values).unwrap();
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(values, back);
    }
}
