//! Syntax check of rendered SQL against a reference parser
//!
//! The reference parser does not understand every parameter spelling, so
//! `$name` placeholders are replaced by the literal `1` before the text is
//! handed over. Only the placeholder payload changes; token count and
//! clause boundaries stay the same.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::{Parser as SqlParser, ParserError};

use crate::sql::error::{SqlError, SqlResult};

/// Narrow contract to an external SQL syntax checker
pub trait SyntaxChecker: Send + Sync {
    /// `Ok(())` when `sql` is syntactically valid
    fn check_syntax(&self, sql: &str) -> SqlResult<()>;
}

/// Reference checker backed by sqlparser's PostgreSQL dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceParser;

impl SyntaxChecker for ReferenceParser {
    fn check_syntax(&self, sql: &str) -> SqlResult<()> {
        let dialect = PostgreSqlDialect {};
        SqlParser::parse_sql(&dialect, sql)
            .map(|_| ())
            .map_err(syntax_error)
    }
}

static POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Line: (\d+), Column:? (\d+)").expect("valid regex"));

/// Convert a sqlparser error into a syntax error with its position, when
/// the message carries one
pub fn syntax_error(err: ParserError) -> SqlError {
    let message = match err {
        ParserError::TokenizerError(msg) | ParserError::ParserError(msg) => msg,
        ParserError::RecursionLimitExceeded => "recursion limit exceeded".to_string(),
    };
    let (line, column) = POSITION
        .captures(&message)
        .and_then(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .unwrap_or((0, 0));
    SqlError::Syntax {
        message,
        line,
        column,
    }
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\w+").expect("valid regex"));

/// Span of statement text: SQL code, or an opaque literal, quoted
/// identifier, or comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment<'a> {
    pub text: &'a str,
    pub code: bool,
}

/// Split `sql` into code and opaque segments, in order
///
/// Every delimiter is ASCII, so segment bounds are always char boundaries.
/// Unterminated literals and comments run to the end of the text.
pub(crate) fn segments(sql: &str) -> Vec<Segment<'_>> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let end = match bytes[i] {
            quote @ (b'\'' | b'"') => quoted_end(bytes, i, quote),
            b'-' if bytes.get(i + 1) == Some(&b'-') => bytes[i..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |n| i + n + 1),
            // Search starts past the opener, so `/*/` does not close itself
            b'/' if bytes.get(i + 1) == Some(&b'*') => bytes[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(bytes.len(), |n| i + 2 + n + 2),
            _ => {
                i += 1;
                continue;
            }
        };
        if start < i {
            out.push(Segment {
                text: &sql[start..i],
                code: true,
            });
        }
        out.push(Segment {
            text: &sql[i..end],
            code: false,
        });
        i = end;
        start = end;
    }

    if start < bytes.len() {
        out.push(Segment {
            text: &sql[start..],
            code: true,
        });
    }
    out
}

/// End of the quoted span opened at `open`; a doubled quote is an escape
fn quoted_end(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Replace every `$word` placeholder outside literals, quoted identifiers,
/// and comments with `1`
pub fn substitute_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    for segment in segments(sql) {
        if segment.code {
            out.push_str(&PLACEHOLDER.replace_all(segment.text, "1"));
        } else {
            out.push_str(segment.text);
        }
    }
    out
}

/// Substitute placeholders, then forward to the checker
pub fn check(checker: &dyn SyntaxChecker, sql: &str) -> SqlResult<()> {
    let substituted = substitute_placeholders(sql);
    tracing::trace!(sql = %substituted, "Checking syntax");
    checker.check_syntax(&substituted)
}
