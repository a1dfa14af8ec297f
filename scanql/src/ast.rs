//! Filter model and compiled predicate tree for ScanQL

use serde::{Deserialize, Serialize};

/// A saved search: parallel rows of negation/field/condition/value joined
/// by links, plus an independent rapid-search string.
///
/// Serializes to the on-disk filter JSON (`filters/<name>.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Filter name (file stem when persisted)
    pub name: String,
    /// Rapid-search text, kept independently of the structured rows
    #[serde(rename = "search_bar_text", default)]
    pub search_bar: String,
    /// Per-row negation flags
    #[serde(default)]
    pub nots: Vec<bool>,
    /// Per-row candidate fields: one entry for a concrete tag, several for
    /// an "all visible tags" row (the row ORs across its entries)
    #[serde(default)]
    pub fields: Vec<Vec<String>>,
    /// Per-row conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Per-row values; `IN` and `BETWEEN` rows hold an array literal
    #[serde(default)]
    pub values: Vec<Literal>,
    /// Joins row i to row i+1; always one shorter than the rows
    #[serde(default)]
    pub links: Vec<LinkOp>,
}

impl Filter {
    /// Create an empty filter with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            search_bar: String::new(),
            nots: vec![],
            fields: vec![],
            conditions: vec![],
            values: vec![],
            links: vec![],
        }
    }

    /// Number of structured rows
    pub fn row_count(&self) -> usize {
        self.fields.len()
    }

    /// Check the parallel-array invariant: `nots`, `fields`, `conditions`
    /// and `values` share one length and `links` is one shorter (or empty
    /// when there are no rows).
    pub fn is_well_formed(&self) -> bool {
        let rows = self.fields.len();
        if self.nots.len() != rows || self.conditions.len() != rows || self.values.len() != rows {
            return false;
        }
        if rows == 0 {
            self.links.is_empty()
        } else {
            self.links.len() == rows - 1
        }
    }
}

/// Condition of one filter row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "BETWEEN")]
    Between,
    #[serde(rename = "CONTAINS")]
    Contains,
    #[serde(rename = "HAS VALUE")]
    HasValue,
    #[serde(rename = "HAS NO VALUE")]
    HasNoValue,
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Condition::Eq => "=",
            Condition::Ne => "!=",
            Condition::Lt => "<",
            Condition::Gt => ">",
            Condition::Le => "<=",
            Condition::Ge => ">=",
            Condition::In => "IN",
            Condition::Between => "BETWEEN",
            Condition::Contains => "CONTAINS",
            Condition::HasValue => "HAS VALUE",
            Condition::HasNoValue => "HAS NO VALUE",
        };
        write!(f, "{}", s)
    }
}

/// Operator joining two consecutive filter rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkOp {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// Scalar comparison operators in compiled predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Literal>),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Literal]> {
        match self {
            Literal::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// A compiled search predicate, evaluated row-wise against documents.
///
/// Links evaluate strictly left-to-right in the order the rows were
/// authored; the compiler never rebalances an AND/OR chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Matches every document (a filter with no rows)
    MatchAll,
    /// Scalar comparison: `field <op> value`
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    /// SQL-style pattern match with `%`/`_` wildcards
    Like {
        field: String,
        pattern: String,
        negated: bool,
    },
    /// Membership in a literal set
    In {
        field: String,
        values: Vec<Literal>,
        negated: bool,
    },
    /// Inclusive range check
    Between {
        field: String,
        low: Literal,
        high: Literal,
        negated: bool,
    },
    /// Substring match
    Contains { field: String, needle: String },
    /// Null-ness test: `HAS NO VALUE`, or `HAS VALUE` when negated
    IsNull { field: String, negated: bool },
    /// Logical negation of a whole row
    Not(Box<Expr>),
    /// Two sub-predicates joined by a row link
    Link {
        left: Box<Expr>,
        op: LinkOp,
        right: Box<Expr>,
    },
}

impl Expr {
    /// AND two predicates, eliding `MatchAll` operands
    pub fn and(self, other: Expr) -> Expr {
        match (self, other) {
            (Expr::MatchAll, e) | (e, Expr::MatchAll) => e,
            (l, r) => Expr::Link {
                left: Box::new(l),
                op: LinkOp::And,
                right: Box::new(r),
            },
        }
    }

    /// OR two predicates
    pub fn or(self, other: Expr) -> Expr {
        Expr::Link {
            left: Box::new(self),
            op: LinkOp::Or,
            right: Box::new(other),
        }
    }
}
