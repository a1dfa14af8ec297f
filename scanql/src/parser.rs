//! Value-literal grammar using nom
//!
//! Parses the textual renderings of typed values: scalars (`null`, `true`,
//! `42`, `1.5`, quoted strings) and bracketed list renderings such as
//! `['a', 'b']` or `[1, 2, 3]`.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0, none_of},
    combinator::{map, map_res, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, tuple},
};

use crate::ast::Literal;
use crate::error::ParseError;

/// Parse a complete literal
pub fn parse_literal(input: &str) -> Result<Literal, ParseError> {
    let input = input.trim();
    let (remaining, lit) = literal(input)?;

    let remaining = remaining.trim();
    if !remaining.is_empty() {
        return Err(ParseError::new(format!(
            "Unexpected trailing content: {}",
            remaining
        )));
    }

    Ok(lit)
}

/// Parse a complete bracketed list rendering such as `['a', 'b']`
pub fn parse_list(input: &str) -> Result<Vec<Literal>, ParseError> {
    let input = input.trim();
    let (remaining, items) = array_literal(input)?;

    let remaining = remaining.trim();
    if !remaining.is_empty() {
        return Err(ParseError::new(format!(
            "Unexpected trailing content: {}",
            remaining
        )));
    }

    Ok(items)
}

/// Render a string element in its quoted form, doubling embedded quotes.
/// Inverse of the single-quoted branch of [`string_literal`].
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// ============================================================================
// Primitives
// ============================================================================

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        value(Literal::Null, tag("null")),
        // Bool tokens are case sensitive
        value(Literal::Bool(true), tag("true")),
        value(Literal::Bool(false), tag("false")),
        map(float_literal, Literal::Float),
        map(integer_literal, Literal::Int),
        map(string_literal, Literal::String),
        map(array_literal, Literal::Array),
    ))(input)
}

// An out-of-range integer is a parse failure, not a silent zero
fn integer_literal(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse)(input)
}

fn float_literal(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
        str::parse,
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    alt((
        delimited(
            char('\''),
            map(
                many0(alt((
                    map(tag("''"), |_| "'".to_string()),
                    map(none_of("'"), |c| c.to_string()),
                ))),
                |v| v.join(""),
            ),
            char('\''),
        ),
        delimited(
            char('"'),
            map(
                many0(alt((
                    map(tag("\\\""), |_| "\"".to_string()),
                    map(tag("\\n"), |_| "\n".to_string()),
                    map(tag("\\t"), |_| "\t".to_string()),
                    map(tag("\\\\"), |_| "\\".to_string()),
                    map(none_of("\"\\"), |c| c.to_string()),
                ))),
                |v| v.join(""),
            ),
            char('"'),
        ),
    ))(input)
}

fn array_literal(input: &str) -> IResult<&str, Vec<Literal>> {
    delimited(
        tuple((char('['), multispace0)),
        separated_list0(tuple((multispace0, char(','), multispace0)), literal),
        tuple((multispace0, char(']'))),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_literal("42").unwrap(), Literal::Int(42));
        assert_eq!(parse_literal("-7").unwrap(), Literal::Int(-7));
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_literal("1.5").unwrap(), Literal::Float(1.5));
        assert_eq!(parse_literal("-0.25").unwrap(), Literal::Float(-0.25));
    }

    #[test]
    fn test_out_of_range_int_is_error() {
        // one past i64::MAX
        assert!(parse_literal("9223372036854775808").is_err());
        assert!(parse_list("[99999999999999999999]").is_err());
        assert_eq!(
            parse_literal("9223372036854775807").unwrap(),
            Literal::Int(i64::MAX)
        );
        assert_eq!(
            parse_literal("-9223372036854775808").unwrap(),
            Literal::Int(i64::MIN)
        );
    }

    #[test]
    fn test_parse_bool_is_case_sensitive() {
        assert_eq!(parse_literal("true").unwrap(), Literal::Bool(true));
        assert_eq!(parse_literal("false").unwrap(), Literal::Bool(false));
        assert!(parse_literal("True").is_err());
        assert!(parse_literal("FALSE").is_err());
    }

    #[test]
    fn test_parse_null() {
        assert_eq!(parse_literal("null").unwrap(), Literal::Null);
    }

    #[test]
    fn test_parse_single_quoted_string() {
        assert_eq!(
            parse_literal("'hello'").unwrap(),
            Literal::String("hello".to_string())
        );
        // Doubled quote escapes an embedded quote
        assert_eq!(
            parse_literal("'it''s'").unwrap(),
            Literal::String("it's".to_string())
        );
    }

    #[test]
    fn test_parse_double_quoted_string() {
        assert_eq!(
            parse_literal("\"a\\nb\"").unwrap(),
            Literal::String("a\nb".to_string())
        );
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list("['a', 'b']").unwrap(),
            vec![
                Literal::String("a".to_string()),
                Literal::String("b".to_string())
            ]
        );
        assert_eq!(
            parse_list("[1, 2, 3]").unwrap(),
            vec![Literal::Int(1), Literal::Int(2), Literal::Int(3)]
        );
    }

    #[test]
    fn test_parse_empty_list() {
        assert_eq!(parse_list("[]").unwrap(), vec![]);
    }

    #[test]
    fn test_parse_nested_list() {
        assert_eq!(
            parse_literal("[[1, 2], [3]]").unwrap(),
            Literal::Array(vec![
                Literal::Array(vec![Literal::Int(1), Literal::Int(2)]),
                Literal::Array(vec![Literal::Int(3)]),
            ])
        );
    }

    #[test]
    fn test_trailing_content_rejected() {
        assert!(parse_literal("42 extra").is_err());
        assert!(parse_list("[1] [2]").is_err());
    }

    #[test]
    fn test_quote_string_round_trips() {
        let quoted = quote_string("it's");
        assert_eq!(quoted, "'it''s'");
        assert_eq!(
            parse_literal(&quoted).unwrap(),
            Literal::String("it's".to_string())
        );
    }
}
