//! Source Reader
//!
//! Turns program text into `Expr` trees for the compiler. Only the surface
//! syntax is checked here; the shape of special forms is validated while
//! compiling.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{is_not, take_while1},
    character::complete::{char, multispace1},
    combinator::{cut, opt, value},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::preceded,
    IResult, Parser,
};

use crate::error::{LvmError, LvmResult};

/// Maximum list nesting accepted by the reader
pub const MAX_DEPTH: usize = 256;

/// Non-alphanumeric characters allowed inside symbols
const SYMBOL_CHARS: &str = "+-*/<>=!?_";

/// Parsed source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    Str(String),
    Symbol(String),
    List(Vec<Expr>),
}

impl Expr {
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Expr]> {
        match self {
            Expr::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this is a list headed by the symbol `tag`
    pub fn is_form(&self, tag: &str) -> bool {
        match self.as_list() {
            Some([head, ..]) => head.as_symbol() == Some(tag),
            _ => false,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Str(s) => write!(f, "{:?}", s),
            Expr::Symbol(name) => write!(f, "{}", name),
            Expr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parse every top-level expression in `source`.
pub fn parse_program(source: &str) -> LvmResult<Vec<Expr>> {
    let parsed = (many0(preceded(skip, |input| expr(input, 0))), skip).parse(source);

    match parsed {
        Ok(("", (exprs, ()))) => Ok(exprs),
        Ok((rest, _)) => Err(LvmError::Parse {
            message: format!(
                "unexpected input at position {} near '{}'",
                source.len() - rest.len(),
                snippet(rest)
            ),
        }),
        Err(err) => Err(describe(source, err)),
    }
}

/// Parse exactly one expression.
pub fn parse(source: &str) -> LvmResult<Expr> {
    let mut exprs = parse_program(source)?;
    match exprs.len() {
        1 => Ok(exprs.remove(0)),
        n => Err(LvmError::Parse {
            message: format!("expected a single expression, found {}", n),
        }),
    }
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_CHARS.contains(c)
}

/// Skip whitespace and `;` line comments
fn skip(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), preceded(char(';'), opt(is_not("\n")))),
        ))),
    )
    .parse(input)
}

fn expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    if depth >= MAX_DEPTH {
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
    }
    alt((|input| list(input, depth), string, atom)).parse(input)
}

fn list(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = char('(').parse(input)?;
    let (input, items) = many0(preceded(skip, |input| expr(input, depth + 1))).parse(input)?;
    let (input, _) = skip(input)?;
    let (input, _) = cut(char(')')).parse(input)?;
    Ok((input, Expr::List(items)))
}

/// Integers and symbols share one token class; a leading digit (after an
/// optional minus) makes the token an integer.
fn atom(input: &str) -> IResult<&str, Expr> {
    let (rest, token) = take_while1(is_symbol_char).parse(input)?;

    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.starts_with(|c: char| c.is_ascii_digit()) {
        return match token.parse::<i64>() {
            Ok(n) => Ok((rest, Expr::Number(n))),
            Err(_) => Err(nom::Err::Failure(Error::new(input, ErrorKind::Digit))),
        };
    }

    Ok((rest, Expr::Symbol(token.to_string())))
}

fn string(input: &str) -> IResult<&str, Expr> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), Expr::Str(text))),
            Some('\\') => {
                match chars.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    _ => {
                        return Err(nom::Err::Failure(Error::new(remaining, ErrorKind::Escaped)));
                    }
                }
                remaining = chars.as_str();
            }
            Some(c) => {
                text.push(c);
                remaining = chars.as_str();
            }
            None => return Err(nom::Err::Failure(Error::new(remaining, ErrorKind::Char))),
        }
    }
}

fn snippet(input: &str) -> String {
    input.chars().take(12).collect()
}

fn describe(source: &str, err: nom::Err<Error<&str>>) -> LvmError {
    let message = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = source.len() - e.input.len();
            match e.code {
                ErrorKind::TooLarge => {
                    format!("expression nested deeper than {} levels", MAX_DEPTH)
                }
                ErrorKind::Digit => {
                    format!("invalid integer literal at position {}", position)
                }
                ErrorKind::Escaped => {
                    format!("invalid escape sequence at position {}", position)
                }
                _ if e.input.is_empty() => "unexpected end of input".to_string(),
                _ => format!(
                    "invalid syntax at position {} near '{}'",
                    position,
                    snippet(e.input)
                ),
            }
        }
        nom::Err::Incomplete(_) => "incomplete input".to_string(),
    };
    LvmError::Parse { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Expr {
        Expr::Symbol(name.to_string())
    }

    #[test]
    fn parses_nested_lists() {
        let expr = parse("(+ 10 (- x -1))").expect("parse failed");
        assert_eq!(
            expr,
            Expr::List(vec![
                sym("+"),
                Expr::Number(10),
                Expr::List(vec![sym("-"), sym("x"), Expr::Number(-1)]),
            ])
        );
    }

    #[test]
    fn parses_program_with_comments() {
        let source = "; factorial\n(var x 1) ; trailing\n  x\n";
        let exprs = parse_program(source).expect("parse failed");
        assert_eq!(exprs.len(), 2);
        assert!(exprs[0].is_form("var"));
        assert_eq!(exprs[1], sym("x"));
    }

    #[test]
    fn parses_strings_with_escapes() {
        let expr = parse(r#""a\"b\n""#).expect("parse failed");
        assert_eq!(expr, Expr::Str("a\"b\n".to_string()));
    }

    #[test]
    fn operators_are_symbols() {
        let exprs = parse_program("- == != <= >= lambda").expect("parse failed");
        let names: Vec<_> = exprs.iter().filter_map(Expr::as_symbol).collect();
        assert_eq!(names, vec!["-", "==", "!=", "<=", ">=", "lambda"]);
    }

    #[test]
    fn empty_program_is_allowed() {
        assert_eq!(parse_program("  ; nothing\n"), Ok(vec![]));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_program("(+ 1 2"), Err(LvmError::Parse { .. })));
        assert!(matches!(parse_program("(+ 1 2))"), Err(LvmError::Parse { .. })));
        assert!(matches!(parse_program("\"open"), Err(LvmError::Parse { .. })));
        assert!(matches!(parse_program("\"bad \\q\""), Err(LvmError::Parse { .. })));
        assert!(matches!(parse_program("12abc"), Err(LvmError::Parse { .. })));
        assert!(matches!(parse("1 2"), Err(LvmError::Parse { .. })));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let source = format!("{}{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        match parse_program(&source) {
            Err(LvmError::Parse { message }) => assert!(message.contains("nested")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn display_round_trips_shape() {
        let expr = parse("(print \"hi\" (f 1))").expect("parse failed");
        assert_eq!(expr.to_string(), "(print \"hi\" (f 1))");
    }
}
