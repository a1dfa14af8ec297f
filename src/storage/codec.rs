//! Typed value codec
//!
//! Converts between the textual renderings users see, the in-memory
//! [`Value`] type, and the JSON storage form of document cells. Parsing and
//! formatting are pure and deterministic: `parse_value(format_value(v)) == v`
//! for every value a field can hold.
//!
//! Textual formats:
//!
//! - date: `dd/mm/yyyy`
//! - datetime: `dd/mm/yyyy HH:MM:SS.ffffff`
//! - time: `HH:MM:SS.ffffff`
//! - bool: exactly `true` / `false`
//! - list: `['a', 'b']` with string-like elements quoted

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::Error;
use crate::schema::FieldType;
use crate::storage::document::Value;

pub const DATE_FORMAT: &str = "%d/%m/%Y";
const DATETIME_PARSE_FORMAT: &str = "%d/%m/%Y %H:%M:%S%.f";
const DATETIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S%.6f";
const TIME_PARSE_FORMAT: &str = "%H:%M:%S%.f";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// A value's text or storage form does not fit the declared field type.
/// Carries the offending rendering so dialogs can echo it back.
#[derive(Debug, Clone, thiserror::Error)]
#[error("expected {expected}, got '{value}'")]
pub struct TypeMismatch {
    pub value: String,
    pub expected: String,
}

impl TypeMismatch {
    fn new(value: impl Into<String>, expected: &FieldType) -> Self {
        Self {
            value: value.into(),
            expected: expected.to_string(),
        }
    }

    /// Attach the field name, producing the crate-level error
    pub fn for_field(self, field: &str) -> Error {
        Error::TypeMismatch {
            field: field.to_string(),
            expected: self.expected,
            value: self.value,
        }
    }
}

/// Parse a textual rendering into a typed value
pub fn parse_value(text: &str, field_type: &FieldType) -> Result<Value, TypeMismatch> {
    match field_type {
        FieldType::String => Ok(Value::String(text.to_string())),
        FieldType::Int => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| TypeMismatch::new(text, field_type)),
        // An int literal is a valid float rendering; not the other way round
        FieldType::Float => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| TypeMismatch::new(text, field_type)),
        FieldType::Bool => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(TypeMismatch::new(text, field_type)),
        },
        FieldType::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Value::Date)
            .map_err(|_| TypeMismatch::new(text, field_type)),
        FieldType::DateTime => NaiveDateTime::parse_from_str(text, DATETIME_PARSE_FORMAT)
            .map(Value::DateTime)
            .map_err(|_| TypeMismatch::new(text, field_type)),
        FieldType::Time => NaiveTime::parse_from_str(text, TIME_PARSE_FORMAT)
            .map(Value::Time)
            .map_err(|_| TypeMismatch::new(text, field_type)),
        FieldType::Json => serde_json::from_str::<serde_json::Value>(text)
            .map(Value::Json)
            .map_err(|_| TypeMismatch::new(text, field_type)),
        FieldType::List(element) => {
            let literals =
                scanql::parse_list(text).map_err(|_| TypeMismatch::new(text, field_type))?;
            let mut items = Vec::with_capacity(literals.len());
            for literal in &literals {
                items.push(literal_to_value(literal, element)?);
            }
            Ok(Value::List(items))
        }
    }
}

/// Check a textual rendering against a field type without keeping the value
pub fn validate_value(text: &str, field_type: &FieldType) -> Result<(), TypeMismatch> {
    parse_value(text, field_type).map(|_| ())
}

/// Convert a parsed literal into a typed value. String literals go back
/// through [`parse_value`] so quoted dates inside lists work.
pub fn literal_to_value(
    literal: &scanql::Literal,
    field_type: &FieldType,
) -> Result<Value, TypeMismatch> {
    match (literal, field_type) {
        (scanql::Literal::Null, _) => Ok(Value::Null),
        (scanql::Literal::Bool(b), FieldType::Bool) => Ok(Value::Bool(*b)),
        (scanql::Literal::Int(i), FieldType::Int) => Ok(Value::Int(*i)),
        (scanql::Literal::Int(i), FieldType::Float) => Ok(Value::Float(*i as f64)),
        (scanql::Literal::Float(f), FieldType::Float) => Ok(Value::Float(*f)),
        (scanql::Literal::String(s), _) => parse_value(s, field_type),
        (scanql::Literal::Array(items), FieldType::List(element)) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(literal_to_value(item, element)?);
            }
            Ok(Value::List(values))
        }
        (other, _) => Err(TypeMismatch::new(render_literal(other), field_type)),
    }
}

fn render_literal(literal: &scanql::Literal) -> String {
    match literal {
        scanql::Literal::Null => "null".to_string(),
        scanql::Literal::Bool(b) => b.to_string(),
        scanql::Literal::Int(i) => i.to_string(),
        scanql::Literal::Float(f) => f.to_string(),
        scanql::Literal::String(s) => s.clone(),
        scanql::Literal::Array(_) => "[...]".to_string(),
    }
}

/// Render a typed value as text. Null renders empty at the top level and as
/// `null` inside lists.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::Date(d) => d.format(DATE_FORMAT).to_string(),
        Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
        Value::Time(t) => t.format(TIME_FORMAT).to_string(),
        Value::Json(json) => json.to_string(),
        Value::List(items) => {
            let rendered: Vec<String> = items.iter().map(format_element).collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}

/// Element rendering inside a list: string-like values are quoted so the
/// list reparses unambiguously
fn format_element(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => format_value(value),
        Value::List(_) => format_value(value),
        other => scanql::quote_string(&format_value(other)),
    }
}

/// Runtime check of an in-memory value against a declared type. Null is
/// assignable to any field (a null write clears the cell); an int is a
/// valid float.
pub fn check_value_type(value: &Value, field_type: &FieldType) -> bool {
    match (value, field_type) {
        (Value::Null, _) => true,
        (Value::Bool(_), FieldType::Bool) => true,
        (Value::Int(_), FieldType::Int) => true,
        (Value::Int(_), FieldType::Float) => true,
        (Value::Float(_), FieldType::Float) => true,
        (Value::String(_), FieldType::String) => true,
        (Value::Date(_), FieldType::Date) => true,
        (Value::DateTime(_), FieldType::DateTime) => true,
        (Value::Time(_), FieldType::Time) => true,
        (Value::Json(_), FieldType::Json) => true,
        (Value::List(items), FieldType::List(element)) => {
            items.iter().all(|item| check_value_type(item, element))
        }
        _ => false,
    }
}

/// Wrap a scalar into a single-element list when the field is list-typed
pub fn promote_to_list(value: Value, field_type: &FieldType) -> Value {
    match (&value, field_type) {
        (Value::Null, _) => value,
        (Value::List(_), _) => value,
        (_, FieldType::List(_)) => Value::List(vec![value]),
        _ => value,
    }
}

// ============================================================================
// Storage form (document cells as plain JSON)
// ============================================================================

/// Map a value to its JSON storage form. Dates keep their textual formats;
/// the schema's field type disambiguates them on load.
pub fn to_storage(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
        Value::DateTime(dt) => serde_json::Value::String(dt.format(DATETIME_FORMAT).to_string()),
        Value::Time(t) => serde_json::Value::String(t.format(TIME_FORMAT).to_string()),
        Value::Json(json) => json.clone(),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_storage).collect()),
    }
}

/// Rebuild a typed value from its JSON storage form, driven by the schema
pub fn from_storage(
    json: &serde_json::Value,
    field_type: &FieldType,
) -> Result<Value, TypeMismatch> {
    match (json, field_type) {
        (serde_json::Value::Null, _) => Ok(Value::Null),
        (serde_json::Value::Bool(b), FieldType::Bool) => Ok(Value::Bool(*b)),
        (serde_json::Value::Number(n), FieldType::Int) => n
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| TypeMismatch::new(n.to_string(), field_type)),
        (serde_json::Value::Number(n), FieldType::Float) => n
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| TypeMismatch::new(n.to_string(), field_type)),
        (serde_json::Value::String(s), FieldType::String) => Ok(Value::String(s.clone())),
        (serde_json::Value::String(s), FieldType::Date)
        | (serde_json::Value::String(s), FieldType::DateTime)
        | (serde_json::Value::String(s), FieldType::Time) => parse_value(s, field_type),
        (json, FieldType::Json) => Ok(Value::Json(json.clone())),
        (serde_json::Value::Array(items), FieldType::List(element)) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(from_storage(item, element)?);
            }
            Ok(Value::List(values))
        }
        (other, _) => Err(TypeMismatch::new(other.to_string(), field_type)),
    }
}
