//! Predicate evaluation against documents
//!
//! Comparisons are typed: dates compare chronologically, int and float
//! compare cross-numerically, strings lexically. A string operand standing
//! where a date/datetime/time is expected is parsed with the codec formats
//! first (filter values arrive as text). A null cell matches nothing but
//! IS NULL.

use std::cmp::Ordering;

use scanql::{CompareOp, Expr, LinkOp, Literal};

use crate::storage::codec;
use crate::storage::document::{Document, Value};

/// Evaluate a compiled predicate against a document
pub fn evaluate(expr: &Expr, doc: &Document, primary_key: &str) -> bool {
    match expr {
        Expr::MatchAll => true,

        Expr::Compare { field, op, value } => {
            let cell = field_value(doc, field, primary_key);
            if cell.is_null() {
                return false;
            }
            let rhs = literal_to_value(value);
            match op {
                CompareOp::Eq => values_equal(&cell, &rhs),
                CompareOp::Ne => !values_equal(&cell, &rhs),
                CompareOp::Lt => compare_values(&cell, &rhs) == Some(Ordering::Less),
                CompareOp::Le => matches!(
                    compare_values(&cell, &rhs),
                    Some(Ordering::Less) | Some(Ordering::Equal)
                ),
                CompareOp::Gt => compare_values(&cell, &rhs) == Some(Ordering::Greater),
                CompareOp::Ge => matches!(
                    compare_values(&cell, &rhs),
                    Some(Ordering::Greater) | Some(Ordering::Equal)
                ),
            }
        }

        Expr::Like {
            field,
            pattern,
            negated,
        } => {
            let cell = field_value(doc, field, primary_key);
            if cell.is_null() {
                return false;
            }
            cell.matches_pattern(pattern) != *negated
        }

        Expr::In {
            field,
            values,
            negated,
        } => {
            let cell = field_value(doc, field, primary_key);
            if cell.is_null() {
                return false;
            }
            let found = values
                .iter()
                .any(|lit| values_equal(&cell, &literal_to_value(lit)));
            found != *negated
        }

        Expr::Between {
            field,
            low,
            high,
            negated,
        } => {
            let cell = field_value(doc, field, primary_key);
            if cell.is_null() {
                return false;
            }
            let low = literal_to_value(low);
            let high = literal_to_value(high);
            let in_range = matches!(
                compare_values(&cell, &low),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ) && matches!(
                compare_values(&cell, &high),
                Some(Ordering::Less) | Some(Ordering::Equal)
            );
            in_range != *negated
        }

        Expr::Contains { field, needle } => {
            let cell = field_value(doc, field, primary_key);
            match &cell {
                Value::Null => false,
                Value::List(items) => items
                    .iter()
                    .any(|item| codec::format_value(item).contains(needle.as_str())),
                other => codec::format_value(other).contains(needle.as_str()),
            }
        }

        Expr::IsNull { field, negated } => {
            let is_null = field_value(doc, field, primary_key).is_null();
            is_null != *negated
        }

        Expr::Not(inner) => !evaluate(inner, doc, primary_key),

        Expr::Link { left, op, right } => match op {
            LinkOp::And => {
                evaluate(left, doc, primary_key) && evaluate(right, doc, primary_key)
            }
            LinkOp::Or => evaluate(left, doc, primary_key) || evaluate(right, doc, primary_key),
        },
    }
}

/// Cell lookup; the primary key field reads as the document key
fn field_value(doc: &Document, field: &str, primary_key: &str) -> Value {
    if field == primary_key {
        Value::String(doc.key.clone())
    } else {
        doc.value(field)
    }
}

fn literal_to_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Array(items) => Value::List(items.iter().map(literal_to_value).collect()),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    if let Some(ordering) = compare_values(a, b) {
        return ordering == Ordering::Equal;
    }
    a == b
}

/// Typed ordering; `None` means the operands are incomparable
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        // Filter values arrive as text; coerce to the cell's date kind
        (Value::Date(_), Value::String(s)) => {
            let parsed = codec::parse_value(s, &crate::schema::FieldType::Date).ok()?;
            compare_values(a, &parsed)
        }
        (Value::String(s), Value::Date(_)) => {
            let parsed = codec::parse_value(s, &crate::schema::FieldType::Date).ok()?;
            compare_values(&parsed, b)
        }
        (Value::DateTime(_), Value::String(s)) => {
            let parsed = codec::parse_value(s, &crate::schema::FieldType::DateTime).ok()?;
            compare_values(a, &parsed)
        }
        (Value::String(s), Value::DateTime(_)) => {
            let parsed = codec::parse_value(s, &crate::schema::FieldType::DateTime).ok()?;
            compare_values(&parsed, b)
        }
        (Value::Time(_), Value::String(s)) => {
            let parsed = codec::parse_value(s, &crate::schema::FieldType::Time).ok()?;
            compare_values(a, &parsed)
        }
        (Value::String(s), Value::Time(_)) => {
            let parsed = codec::parse_value(s, &crate::schema::FieldType::Time).ok()?;
            compare_values(&parsed, b)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn scan(key: &str) -> Document {
        let mut doc = Document::new(key);
        doc.set("Type", "Scan")
            .set("Age", 34i64)
            .set(
                "AcquisitionDate",
                Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            )
            .set(
                "SequenceName",
                Value::List(vec![Value::String("T1".into())]),
            );
        doc
    }

    fn eq(field: &str, value: Literal) -> Expr {
        Expr::Compare {
            field: field.to_string(),
            op: CompareOp::Eq,
            value,
        }
    }

    #[test]
    fn test_compare_date_against_text_value() {
        let doc = scan("a.nii");
        let expr = Expr::Compare {
            field: "AcquisitionDate".to_string(),
            op: CompareOp::Ge,
            value: Literal::String("01/01/2024".to_string()),
        };
        assert!(evaluate(&expr, &doc, "FileName"));

        let expr = Expr::Compare {
            field: "AcquisitionDate".to_string(),
            op: CompareOp::Lt,
            value: Literal::String("01/01/2024".to_string()),
        };
        assert!(!evaluate(&expr, &doc, "FileName"));
    }

    #[test]
    fn test_primary_key_reads_as_document_key() {
        let doc = scan("data/raw_data/a.nii");
        let expr = Expr::In {
            field: "FileName".to_string(),
            values: vec![Literal::String("data/raw_data/a.nii".to_string())],
            negated: false,
        };
        assert!(evaluate(&expr, &doc, "FileName"));
    }

    #[test]
    fn test_null_cell_matches_nothing_but_is_null() {
        let doc = scan("a.nii");
        assert!(!evaluate(
            &eq("Ghost", Literal::String("x".into())),
            &doc,
            "FileName"
        ));
        let ne = Expr::Compare {
            field: "Ghost".to_string(),
            op: CompareOp::Ne,
            value: Literal::String("x".to_string()),
        };
        assert!(!evaluate(&ne, &doc, "FileName"));
        let like = Expr::Like {
            field: "Ghost".to_string(),
            pattern: "%".to_string(),
            negated: false,
        };
        assert!(!evaluate(&like, &doc, "FileName"));

        let is_null = Expr::IsNull {
            field: "Ghost".to_string(),
            negated: false,
        };
        assert!(evaluate(&is_null, &doc, "FileName"));
    }

    #[test]
    fn test_like_on_non_string_scalar() {
        let doc = scan("a.nii");
        let expr = Expr::Like {
            field: "Age".to_string(),
            pattern: "3_".to_string(),
            negated: false,
        };
        assert!(evaluate(&expr, &doc, "FileName"));
    }

    #[test]
    fn test_contains_checks_list_elements() {
        let doc = scan("a.nii");
        let expr = Expr::Contains {
            field: "SequenceName".to_string(),
            needle: "T1".to_string(),
        };
        assert!(evaluate(&expr, &doc, "FileName"));
        let expr = Expr::Contains {
            field: "SequenceName".to_string(),
            needle: "T2".to_string(),
        };
        assert!(!evaluate(&expr, &doc, "FileName"));
    }

    #[test]
    fn test_between_is_inclusive() {
        let doc = scan("a.nii");
        let expr = Expr::Between {
            field: "Age".to_string(),
            low: Literal::Int(34),
            high: Literal::Int(40),
            negated: false,
        };
        assert!(evaluate(&expr, &doc, "FileName"));
    }

    #[test]
    fn test_not_wraps_a_row() {
        let doc = scan("a.nii");
        let expr = Expr::Not(Box::new(eq("Type", Literal::String("Scan".into()))));
        assert!(!evaluate(&expr, &doc, "FileName"));
    }

    #[test]
    fn test_cross_numeric_comparison() {
        let doc = scan("a.nii");
        let expr = Expr::Compare {
            field: "Age".to_string(),
            op: CompareOp::Lt,
            value: Literal::Float(34.5),
        };
        assert!(evaluate(&expr, &doc, "FileName"));
    }
}
