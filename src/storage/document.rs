//! Document representation
//!
//! A document is one row of a collection: a primary key plus a sparse map
//! of field values. A field with no entry reads as null.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;

/// A typed cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    /// Free-form JSON payload (brick inputs/outputs)
    Json(serde_json::Value),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view across int and float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Check if this value matches a LIKE pattern (`%` any run, `_` one char).
    /// Non-string scalars match against their textual rendering; a list
    /// matches when any element does; null never matches.
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        match self {
            Value::Null => false,
            Value::List(items) => items.iter().any(|v| v.matches_pattern(pattern)),
            Value::String(s) => text_matches_pattern(s, pattern),
            other => text_matches_pattern(&crate::storage::codec::format_value(other), pattern),
        }
    }
}

/// LIKE pattern match on plain text. Regex metacharacters in the pattern
/// are escaped before the wildcards are translated.
pub fn text_matches_pattern(text: &str, pattern: &str) -> bool {
    let regex_pattern = regex::escape(pattern).replace('%', ".*").replace('_', ".");
    regex::Regex::new(&format!("^{}$", regex_pattern))
        .map(|r| r.is_match(text))
        .unwrap_or(false)
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::Time(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// A map of field names to values
pub type Fields = HashMap<String, Value>;

/// A document in a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Primary key value (for scans, the project-relative file path)
    pub key: String,
    /// Sparse cell values; absent means null
    pub fields: Fields,
}

impl Document {
    /// Create a new document with the given primary key
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Fields::new(),
        }
    }

    /// Set a field value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Get a field value; `None` reads as null
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Owned field value with sparse cells resolved to null
    pub fn value(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or(Value::Null)
    }
}
