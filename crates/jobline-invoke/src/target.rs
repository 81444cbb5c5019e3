//! Invocation-target grammar.
//!
//! ```text
//! text            := qualifiedMethod [ "(" argList ")" ]
//! qualifiedMethod := component "." method        (split on the last dot)
//! argList         := arg ( "," arg )*
//! ```
//!
//! Literals: `'text'` / `"text"`, `true` / `false`, `12L`, `1.5D`, `42`.

use std::fmt;
use std::str::FromStr;

use crate::args::{Arg, ArgType};
use crate::error::ParseError;

/// Marks the following quote character as literal text.
///
/// The marker is detected but kept in the resulting string value.
const ESCAPE: char = '\\';

/// Decoded invocation target.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInvocation {
    /// Short or fully-qualified component name (`ReportJob`, `jobs.ReportJob`).
    pub component: String,
    pub method: String,
    pub args: Vec<Arg>,
}

impl ParsedInvocation {
    pub fn arg_types(&self) -> Vec<ArgType> {
        self.args.iter().map(Arg::arg_type).collect()
    }
}

impl fmt::Display for ParsedInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.method)?;
        if !self.args.is_empty() {
            let rendered: Vec<String> = self.args.iter().map(ToString::to_string).collect();
            write!(f, "({})", rendered.join(", "))?;
        }
        Ok(())
    }
}

impl FromStr for ParsedInvocation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parse an invocation target such as `SyncJob.Run(true, 1000L, 99.9D, 5)`.
pub fn parse(text: &str) -> Result<ParsedInvocation, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let (head, args) = match text.find('(') {
        Some(open) => (&text[..open], parse_arg_list(&text[open + 1..], open + 1)?),
        None => (text, Vec::new()),
    };
    let (component, method) = split_qualified(head.trim())?;

    Ok(ParsedInvocation {
        component: component.to_string(),
        method: method.to_string(),
        args,
    })
}

fn split_qualified(head: &str) -> Result<(&str, &str), ParseError> {
    let (component, method) = head.rsplit_once('.').ok_or_else(|| ParseError::MissingMethod {
        text: head.to_string(),
    })?;
    if !component.split('.').all(is_identifier) {
        return Err(ParseError::InvalidName {
            name: component.to_string(),
        });
    }
    if !is_identifier(method) {
        return Err(ParseError::InvalidName {
            name: method.to_string(),
        });
    }
    Ok((component, method))
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// `rest` is everything after the opening parenthesis; `base` its byte offset
/// in the full target, used for error positions.
fn parse_arg_list(rest: &str, base: usize) -> Result<Vec<Arg>, ParseError> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut open_quote: Option<(char, usize)> = None;
    let mut prev: Option<char> = None;
    let mut close = None;

    for (i, c) in rest.char_indices() {
        let escaped = prev == Some(ESCAPE);
        match open_quote {
            Some((quote, _)) => {
                if c == quote && !escaped {
                    open_quote = None;
                }
            }
            None => match c {
                '\'' | '"' if !escaped => open_quote = Some((c, i)),
                ',' => {
                    pieces.push(&rest[start..i]);
                    start = i + 1;
                }
                ')' => {
                    pieces.push(&rest[start..i]);
                    close = Some(i);
                    break;
                }
                _ => {}
            },
        }
        prev = Some(c);
    }

    if let Some((quote, offset)) = open_quote {
        return Err(ParseError::UnterminatedQuote {
            quote,
            offset: base + offset,
        });
    }
    let close = close.ok_or(ParseError::UnterminatedParen)?;
    let trailing = rest[close + 1..].trim();
    if !trailing.is_empty() {
        return Err(ParseError::TrailingInput {
            rest: trailing.to_string(),
        });
    }

    // `Foo.Bar()` and `Foo.Bar( )` carry no arguments, not one empty one.
    if let [only] = pieces.as_slice() {
        if only.trim().is_empty() {
            return Ok(Vec::new());
        }
    }

    pieces
        .iter()
        .enumerate()
        .map(|(index, raw)| match raw.trim() {
            "" => Err(ParseError::EmptyArgument { index }),
            literal => parse_literal(literal),
        })
        .collect()
}

fn parse_literal(raw: &str) -> Result<Arg, ParseError> {
    if let Some(quote) = raw.chars().next().filter(|c| *c == '\'' || *c == '"') {
        return parse_string(raw, quote);
    }
    if raw.eq_ignore_ascii_case("true") {
        return Ok(Arg::Bool(true));
    }
    if raw.eq_ignore_ascii_case("false") {
        return Ok(Arg::Bool(false));
    }
    if let Some(digits) = raw.strip_suffix(&['L', 'l'][..]) {
        return digits
            .parse::<i64>()
            .map(Arg::Long)
            .map_err(|_| invalid_number(raw, ArgType::Long));
    }
    if let Some(digits) = raw.strip_suffix(&['D', 'd'][..]) {
        return digits
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Arg::Double)
            .ok_or_else(|| invalid_number(raw, ArgType::Double));
    }
    raw.parse::<i32>()
        .map(Arg::Integer)
        .map_err(|_| invalid_number(raw, ArgType::Integer))
}

/// The closing quote must be the literal's last character.
fn parse_string(raw: &str, quote: char) -> Result<Arg, ParseError> {
    let body = &raw[quote.len_utf8()..];
    let mut prev = None;
    for (i, c) in body.char_indices() {
        if c == quote && prev != Some(ESCAPE) {
            if i + c.len_utf8() == body.len() {
                return Ok(Arg::String(body[..i].to_string()));
            }
            break;
        }
        prev = Some(c);
    }
    Err(ParseError::MalformedString {
        literal: raw.to_string(),
    })
}

fn invalid_number(literal: &str, expected: ArgType) -> ParseError {
    ParseError::InvalidNumber {
        literal: literal.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(parsed: &ParsedInvocation) -> Vec<ArgType> {
        parsed.arg_types()
    }

    #[test]
    fn bare_method_has_no_arguments() {
        let parsed = parse("Foo.Bar").unwrap();
        assert_eq!(parsed.component, "Foo");
        assert_eq!(parsed.method, "Bar");
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn empty_parentheses_have_no_arguments() {
        assert!(parse("Foo.Bar()").unwrap().args.is_empty());
        assert!(parse("Foo.Bar(   )").unwrap().args.is_empty());
    }

    #[test]
    fn single_string_argument() {
        let parsed = parse("DemoTask.SingleParam('hello world')").unwrap();
        assert_eq!(parsed.component, "DemoTask");
        assert_eq!(parsed.method, "SingleParam");
        assert_eq!(parsed.args, vec![Arg::String("hello world".into())]);
    }

    #[test]
    fn multiple_typed_arguments_in_order() {
        let parsed = parse("DemoTask.MultipleParams('x', true, 1000L, 9.99D, 2)").unwrap();
        assert_eq!(
            types(&parsed),
            vec![
                ArgType::String,
                ArgType::Bool,
                ArgType::Long,
                ArgType::Double,
                ArgType::Integer
            ]
        );
        assert_eq!(
            parsed.args,
            vec![
                Arg::String("x".into()),
                Arg::Bool(true),
                Arg::Long(1000),
                Arg::Double(9.99),
                Arg::Integer(2),
            ]
        );
    }

    #[test]
    fn component_is_everything_before_the_last_dot() {
        let parsed = parse("app.jobs.ReportJob.GenerateReport('a.b')").unwrap();
        assert_eq!(parsed.component, "app.jobs.ReportJob");
        assert_eq!(parsed.method, "GenerateReport");
        assert_eq!(parsed.args, vec![Arg::String("a.b".into())]);
    }

    #[test]
    fn commas_and_parens_inside_quotes_do_not_split() {
        let parsed = parse(r#"Foo.Bar('a,b', "c)d", 3)"#).unwrap();
        assert_eq!(
            parsed.args,
            vec![
                Arg::String("a,b".into()),
                Arg::String("c)d".into()),
                Arg::Integer(3)
            ]
        );
    }

    #[test]
    fn other_quote_kind_is_plain_text_inside_a_string() {
        let parsed = parse(r#"Foo.Bar("it's")"#).unwrap();
        assert_eq!(parsed.args, vec![Arg::String("it's".into())]);
    }

    #[test]
    fn escape_marker_is_kept_in_the_value() {
        let parsed = parse(r"Foo.Bar('it\'s')").unwrap();
        assert_eq!(parsed.args, vec![Arg::String(r"it\'s".into())]);
    }

    #[test]
    fn bool_literals_ignore_case_and_suffixes_ignore_case() {
        let parsed = parse("Foo.Bar(TRUE, False, 5l, 2.5d)").unwrap();
        assert_eq!(
            parsed.args,
            vec![
                Arg::Bool(true),
                Arg::Bool(false),
                Arg::Long(5),
                Arg::Double(2.5)
            ]
        );
    }

    #[test]
    fn unterminated_parenthesis_is_an_error() {
        assert_eq!(
            parse("Foo.Bar('a,b', true, 7L, 1.5D, 3"),
            Err(ParseError::UnterminatedParen)
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(
            parse("Foo.Bar('abc)"),
            Err(ParseError::UnterminatedQuote {
                quote: '\'',
                offset: 8
            })
        );
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        assert_eq!(
            parse("Foo.Bar(1) extra"),
            Err(ParseError::TrailingInput {
                rest: "extra".into()
            })
        );
        assert!(matches!(
            parse("Foo.Bar('a' 'b')"),
            Err(ParseError::MalformedString { .. })
        ));
    }

    #[test]
    fn bad_numbers_are_errors_not_fallbacks() {
        assert_eq!(
            parse("Foo.Bar(1.5)"),
            Err(ParseError::InvalidNumber {
                literal: "1.5".into(),
                expected: ArgType::Integer
            })
        );
        assert!(matches!(
            parse("Foo.Bar(abcL)"),
            Err(ParseError::InvalidNumber {
                expected: ArgType::Long,
                ..
            })
        ));
        for literal in ["NaND", "infD", "-infinityd", "1e999D"] {
            assert_eq!(
                parse(&format!("Foo.Bar({literal})")),
                Err(ParseError::InvalidNumber {
                    literal: literal.into(),
                    expected: ArgType::Double
                }),
                "{literal}"
            );
        }
        assert!(matches!(
            parse("Foo.Bar(99999999999)"),
            Err(ParseError::InvalidNumber {
                expected: ArgType::Integer,
                ..
            })
        ));
    }

    #[test]
    fn empty_arguments_are_errors() {
        assert_eq!(
            parse("Foo.Bar(1,,2)"),
            Err(ParseError::EmptyArgument { index: 1 })
        );
        assert_eq!(
            parse("Foo.Bar(1,)"),
            Err(ParseError::EmptyArgument { index: 1 })
        );
    }

    #[test]
    fn names_are_validated() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert!(matches!(
            parse("JustAName"),
            Err(ParseError::MissingMethod { .. })
        ));
        assert!(matches!(parse(".Run"), Err(ParseError::InvalidName { .. })));
        assert!(matches!(parse("Foo."), Err(ParseError::InvalidName { .. })));
        assert!(matches!(
            parse("Foo..Bar"),
            Err(ParseError::InvalidName { .. })
        ));
        assert!(matches!(
            parse("Foo.Bar-Baz()"),
            Err(ParseError::InvalidName { .. })
        ));
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = "SyncJob.Run(true, 1000L, 99.9D, 5)";
        assert_eq!(parse(text), parse(text));
    }

    #[test]
    fn rendering_round_trips() {
        for text in [
            "Foo.Bar",
            "ReportJob.GenerateReport('daily')",
            "SyncJob.Run(true, 1000l, 99.9d, 5)",
            r#"DemoTask.MultipleParams("it's", false, -3L, 0.25D, -7)"#,
            r#"Foo.Bar('it\'s "x"')"#,
            r#"Foo.Bar("say \"hi\" it's", 'plain')"#,
            r#"Foo.Bar(1e300D, -0.5d)"#,
        ] {
            let parsed = parse(text).unwrap();
            let reparsed = parse(&parsed.to_string()).unwrap();
            assert_eq!(parsed, reparsed, "round trip of {text}");
        }
    }

    #[test]
    fn from_str_delegates_to_parse() {
        let parsed: ParsedInvocation = "Foo.Bar(1)".parse().unwrap();
        assert_eq!(parsed.args, vec![Arg::Integer(1)]);
    }
}
