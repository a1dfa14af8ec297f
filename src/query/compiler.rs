//! Search compilation
//!
//! Turns rapid-search text and advanced-search rows into predicate trees.
//! Mixed AND/OR chains fold strictly left to right, matching how the rows
//! were authored. Saved filters from existing projects encode that order,
//! so the compiler must never rebalance a chain into AND-before-OR
//! precedence. Every compiled predicate is ANDed with a primary-key scope
//! restriction, so results are always a subset of the supplied scope.

use scanql::{CompareOp, Condition, Expr, Filter, LinkOp, Literal, NOT_DEFINED_VALUE};

use crate::error::{Error, Result};
use crate::project::TAG_BRICKS;

/// Compile a rapid search: one free-text value matched with surrounding
/// wildcards against every candidate field (`%`/`_` inside the text stay
/// wildcards). The not-defined sentinel instead matches fields with no
/// value. The `Bricks` back-reference field is never searched.
pub fn compile_rapid_search(
    text: &str,
    candidate_fields: &[String],
    primary_key: &str,
    scope: &[String],
) -> Expr {
    let mut predicate: Option<Expr> = None;
    for field in candidate_fields {
        if field == TAG_BRICKS {
            continue;
        }
        let row = if text == NOT_DEFINED_VALUE {
            Expr::IsNull {
                field: field.clone(),
                negated: false,
            }
        } else {
            Expr::Like {
                field: field.clone(),
                pattern: format!("%{}%", text),
                negated: false,
            }
        };
        predicate = Some(match predicate {
            Some(acc) => acc.or(row),
            None => row,
        });
    }
    predicate
        .unwrap_or(Expr::MatchAll)
        .and(scope_expr(primary_key, scope))
}

/// Compile advanced-search rows held in parallel arrays. A row whose field
/// list names several fields becomes an OR across them with the same
/// condition and value. `nots[i]` wraps row i in NOT; `links[i]` joins row
/// i to row i+1, left to right.
pub fn compile_advanced_search(
    links: &[LinkOp],
    fields: &[Vec<String>],
    conditions: &[Condition],
    values: &[Literal],
    nots: &[bool],
    primary_key: &str,
    scope: &[String],
) -> Result<Expr> {
    let rows = fields.len();
    if conditions.len() != rows || values.len() != rows || nots.len() != rows {
        return Err(Error::InvalidFilter {
            message: format!(
                "row arrays disagree: {} fields, {} conditions, {} values, {} nots",
                rows,
                conditions.len(),
                values.len(),
                nots.len()
            ),
        });
    }
    let expected_links = rows.saturating_sub(1);
    if links.len() != expected_links {
        return Err(Error::InvalidFilter {
            message: format!(
                "{} rows need {} links, got {}",
                rows,
                expected_links,
                links.len()
            ),
        });
    }

    let mut chain: Option<Expr> = None;
    for i in 0..rows {
        let mut row_fields = fields[i].iter();
        let first = row_fields.next().ok_or_else(|| Error::InvalidFilter {
            message: format!("row {} names no field", i),
        })?;
        let mut row = row_predicate(first, conditions[i], &values[i])?;
        for field in row_fields {
            row = row.or(row_predicate(field, conditions[i], &values[i])?);
        }
        if nots[i] {
            row = Expr::Not(Box::new(row));
        }
        chain = Some(match chain {
            Some(acc) => Expr::Link {
                left: Box::new(acc),
                op: links[i - 1],
                right: Box::new(row),
            },
            None => row,
        });
    }

    Ok(chain
        .unwrap_or(Expr::MatchAll)
        .and(scope_expr(primary_key, scope)))
}

/// Compile a saved filter's structured rows
pub fn compile_filter(filter: &Filter, primary_key: &str, scope: &[String]) -> Result<Expr> {
    if !filter.is_well_formed() {
        return Err(Error::InvalidFilter {
            message: format!("filter '{}' has mismatched row arrays", filter.name),
        });
    }
    compile_advanced_search(
        &filter.links,
        &filter.fields,
        &filter.conditions,
        &filter.values,
        &filter.nots,
        primary_key,
        scope,
    )
}

fn scope_expr(primary_key: &str, scope: &[String]) -> Expr {
    Expr::In {
        field: primary_key.to_string(),
        values: scope.iter().cloned().map(Literal::String).collect(),
        negated: false,
    }
}

fn row_predicate(field: &str, condition: Condition, value: &Literal) -> Result<Expr> {
    let field = field.to_string();
    Ok(match condition {
        Condition::Eq => Expr::Compare {
            field,
            op: CompareOp::Eq,
            value: value.clone(),
        },
        Condition::Ne => Expr::Compare {
            field,
            op: CompareOp::Ne,
            value: value.clone(),
        },
        Condition::Lt => Expr::Compare {
            field,
            op: CompareOp::Lt,
            value: value.clone(),
        },
        Condition::Gt => Expr::Compare {
            field,
            op: CompareOp::Gt,
            value: value.clone(),
        },
        Condition::Le => Expr::Compare {
            field,
            op: CompareOp::Le,
            value: value.clone(),
        },
        Condition::Ge => Expr::Compare {
            field,
            op: CompareOp::Ge,
            value: value.clone(),
        },
        Condition::In => {
            let items = value.as_array().ok_or_else(|| Error::InvalidFilter {
                message: format!("IN on field '{}' needs an array value", field),
            })?;
            Expr::In {
                field,
                values: items.to_vec(),
                negated: false,
            }
        }
        Condition::Between => {
            let items = value.as_array().ok_or_else(|| Error::InvalidFilter {
                message: format!("BETWEEN on field '{}' needs an array value", field),
            })?;
            if items.len() != 2 {
                return Err(Error::InvalidFilter {
                    message: format!(
                        "BETWEEN on field '{}' needs exactly two bounds, got {}",
                        field,
                        items.len()
                    ),
                });
            }
            Expr::Between {
                field,
                low: items[0].clone(),
                high: items[1].clone(),
                negated: false,
            }
        }
        Condition::Contains => {
            let needle = match value {
                Literal::String(s) => s.clone(),
                Literal::Int(i) => i.to_string(),
                Literal::Float(f) => f.to_string(),
                Literal::Bool(b) => b.to_string(),
                _ => {
                    return Err(Error::InvalidFilter {
                        message: format!("CONTAINS on field '{}' needs a scalar value", field),
                    })
                }
            };
            Expr::Contains { field, needle }
        }
        Condition::HasValue => Expr::IsNull {
            field,
            negated: true,
        },
        Condition::HasNoValue => Expr::IsNull {
            field,
            negated: false,
        },
    })
}
