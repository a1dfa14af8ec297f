//! ScanQL - filter model for the scanbase project database
//!
//! A filter is a set of parallel rows (`nots` / `fields` / `conditions` /
//! `values`) joined by `AND`/`OR` links, plus an independent rapid-search
//! string. Filters persist as JSON and compile into an [`Expr`] predicate
//! tree that the database evaluates document by document.
//!
//! # Filter JSON
//!
//! ```json
//! {
//!   "name": "recent_scans",
//!   "search_bar_text": "",
//!   "nots": [false, true],
//!   "fields": [["AcquisitionDate"], ["Type"]],
//!   "conditions": [">=", "="],
//!   "values": ["01/01/2024", "Scan"],
//!   "links": ["AND"]
//! }
//! ```
//!
//! Links apply strictly left to right: row 1 joins row 2, the result joins
//! row 3, and so on. There is no operator precedence between `AND` and `OR`.
//!
//! The crate also provides the grammar for value literals as the database
//! renders them: scalars plus bracketed lists such as `['a', 'b']`.

mod ast;
mod error;
mod parser;

pub use ast::*;
pub use error::ParseError;
pub use parser::{parse_list, parse_literal, quote_string};

/// Rapid-search sentinel matching documents where a field has no value
pub const NOT_DEFINED_VALUE: &str = "*Not Defined*";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_round_trips_through_json() {
        let mut filter = Filter::new("recent_scans");
        filter.nots = vec![false, true];
        filter.fields = vec![
            vec!["AcquisitionDate".to_string()],
            vec!["Type".to_string()],
        ];
        filter.conditions = vec![Condition::Ge, Condition::Eq];
        filter.values = vec![
            Literal::String("01/01/2024".to_string()),
            Literal::String("Scan".to_string()),
        ];
        filter.links = vec![LinkOp::And];
        assert!(filter.is_well_formed());

        let json = serde_json::to_string(&filter).unwrap();
        assert!(json.contains("\"search_bar_text\""));
        assert!(json.contains("\">=\""));
        assert!(json.contains("\"AND\""));

        let back: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }

    #[test]
    fn test_condition_json_names() {
        let json = serde_json::to_string(&Condition::HasNoValue).unwrap();
        assert_eq!(json, "\"HAS NO VALUE\"");
        let back: Condition = serde_json::from_str("\"BETWEEN\"").unwrap();
        assert_eq!(back, Condition::Between);
    }

    #[test]
    fn test_mismatched_rows_are_ill_formed() {
        let mut filter = Filter::new("broken");
        filter.fields = vec![vec!["Type".to_string()]];
        // nots/conditions/values left empty
        assert!(!filter.is_well_formed());
    }

    #[test]
    fn test_expr_and_elides_match_all() {
        let scope = Expr::In {
            field: "FileName".to_string(),
            values: vec![Literal::String("a.nii".to_string())],
            negated: false,
        };
        assert_eq!(Expr::MatchAll.and(scope.clone()), scope);
    }
}
