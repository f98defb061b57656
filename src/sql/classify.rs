//! Statement classification
//!
//! Labels raw statement text before planning:
//!
//! ```text
//! SELECT ... | INSERT ... | UPDATE ... | DELETE ... | WITH ...   -> Dml
//! method(arg, ...)                                                -> ActionCall
//! [$r1, $r2 =] extension.method(arg, ...)                         -> ExtensionCall
//! ```
//!
//! Classification is purely structural. Anything else is an
//! `UnclassifiableStatement` error.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::sql::ast::{Expr, FunctionCall, SelectItem, SetExpr, Statement};
use crate::sql::error::{SqlError, SqlResult};
use crate::sql::parser::Parser;

const DML_KEYWORDS: &[Keyword] = &[
    Keyword::SELECT,
    Keyword::INSERT,
    Keyword::UPDATE,
    Keyword::DELETE,
    Keyword::WITH,
];

static RECEIVERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(\$[A-Za-z_][A-Za-z0-9_]*(?:\s*,\s*\$[A-Za-z_][A-Za-z0-9_]*)*)\s*=(.*)$")
        .expect("valid regex")
});

/// Statement class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Dml,
    ActionCall,
    ExtensionCall,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Dml => write!(f, "DML"),
            StatementKind::ActionCall => write!(f, "action call"),
            StatementKind::ExtensionCall => write!(f, "extension call"),
        }
    }
}

/// Classified statement
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedStatement {
    /// Data manipulation; the text is planned as-is
    Dml { sql: String },
    ActionCall {
        method: String,
        args: Vec<Expr>,
    },
    ExtensionCall {
        extension: String,
        method: String,
        args: Vec<Expr>,
        /// Receiver variable names, without the `$`
        receivers: Vec<String>,
    },
}

impl ClassifiedStatement {
    pub fn kind(&self) -> StatementKind {
        match self {
            ClassifiedStatement::Dml { .. } => StatementKind::Dml,
            ClassifiedStatement::ActionCall { .. } => StatementKind::ActionCall,
            ClassifiedStatement::ExtensionCall { .. } => StatementKind::ExtensionCall,
        }
    }
}

/// Structural statement classifier
pub struct StatementClassifier;

impl StatementClassifier {
    /// Classify one statement
    pub fn classify(text: &str) -> SqlResult<ClassifiedStatement> {
        let text = text.trim();
        let text = text.strip_suffix(';').unwrap_or(text).trim_end();

        if is_dml(text) {
            return Ok(ClassifiedStatement::Dml {
                sql: text.to_string(),
            });
        }

        let (receivers, call_text) = match RECEIVERS.captures(text) {
            Some(caps) => {
                let receivers = caps[1]
                    .split(',')
                    .map(|r| r.trim().trim_start_matches('$').to_lowercase())
                    .collect::<Vec<_>>();
                (receivers, caps.get(2).map_or("", |m| m.as_str()).trim())
            }
            None => (Vec::new(), text),
        };

        let call = parse_call(call_text)?;
        let FunctionCall {
            schema, name, args, ..
        } = call;

        match schema {
            Some(extension) => Ok(ClassifiedStatement::ExtensionCall {
                extension,
                method: name,
                args,
                receivers,
            }),
            None if receivers.is_empty() => {
                Ok(ClassifiedStatement::ActionCall { method: name, args })
            }
            None => Err(unclassifiable("action calls cannot have receivers")),
        }
    }
}

/// First keyword past whitespace, comments, and opening parentheses
fn is_dml(text: &str) -> bool {
    let dialect = PostgreSqlDialect {};
    let Ok(tokens) = Tokenizer::new(&dialect, text).tokenize() else {
        return false;
    };
    tokens
        .iter()
        .find(|t| !matches!(t, Token::Whitespace(_) | Token::LParen))
        .is_some_and(|t| match t {
            Token::Word(w) => w.quote_style.is_none() && DML_KEYWORDS.contains(&w.keyword),
            _ => false,
        })
}

/// Parse `name(args)` or `extension.name(args)` as a bare call expression
fn parse_call(text: &str) -> SqlResult<FunctionCall> {
    if text.is_empty() {
        return Err(unclassifiable("empty statement"));
    }
    let stmt = Parser::parse_one(&format!("SELECT {}", text))
        .map_err(|e| unclassifiable(format!("{}: {}", text, e)))?;

    let Statement::Query(query) = stmt else {
        return Err(unclassifiable(text));
    };
    if !query.ctes.is_empty()
        || !query.order_by.is_empty()
        || query.limit.is_some()
        || query.offset.is_some()
    {
        return Err(unclassifiable(text));
    }
    let SetExpr::Select(select) = query.body else {
        return Err(unclassifiable(text));
    };
    if select.distinct
        || select.from.is_some()
        || select.selection.is_some()
        || !select.group_by.is_empty()
        || select.having.is_some()
        || !select.windows.is_empty()
    {
        return Err(unclassifiable(text));
    }

    let mut projection = select.projection;
    match (projection.pop(), projection.is_empty()) {
        (
            Some(SelectItem::Expr {
                expr: Expr::Function(call),
                alias: None,
            }),
            true,
        ) => {
            if call.distinct || call.star || call.filter.is_some() || call.over.is_some() {
                return Err(unclassifiable(text));
            }
            Ok(call)
        }
        _ => Err(unclassifiable(text)),
    }
}

fn unclassifiable(detail: impl fmt::Display) -> SqlError {
    SqlError::UnclassifiableStatement(detail.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ast::Literal;

    #[test]
    fn test_dml() {
        for sql in [
            "SELECT 1",
            "insert into t values (1)",
            "  Update t set a = 1",
            "DELETE FROM t;",
            "WITH x AS (SELECT 1) SELECT * FROM x",
        ] {
            let classified = StatementClassifier::classify(sql).unwrap();
            assert_eq!(classified.kind(), StatementKind::Dml, "{}", sql);
        }
        assert_eq!(
            StatementClassifier::classify("DELETE FROM t;").unwrap(),
            ClassifiedStatement::Dml {
                sql: "DELETE FROM t".to_string()
            }
        );
    }

    #[test]
    fn test_dml_behind_comments_and_parens() {
        for sql in [
            "(SELECT id FROM t) UNION (SELECT id FROM t)",
            "-- note\nSELECT id FROM t",
            "/* c */ SELECT id FROM t",
            "((select 1))",
        ] {
            let classified = StatementClassifier::classify(sql).unwrap();
            assert_eq!(classified.kind(), StatementKind::Dml, "{}", sql);
        }
        // A quoted identifier is not a keyword
        let classified = StatementClassifier::classify(r#""select"()"#).unwrap();
        assert_eq!(classified.kind(), StatementKind::ActionCall);
    }

    #[test]
    fn test_action_call() {
        let classified = StatementClassifier::classify("transfer($to, 100)").unwrap();
        assert_eq!(
            classified,
            ClassifiedStatement::ActionCall {
                method: "transfer".to_string(),
                args: vec![
                    Expr::Placeholder("$to".to_string()),
                    Expr::Literal(Literal::Integer(100)),
                ],
            }
        );
    }

    #[test]
    fn test_extension_call_with_receivers() {
        let classified =
            StatementClassifier::classify("$balance, $ok = token.balance_of($owner);").unwrap();
        let ClassifiedStatement::ExtensionCall {
            extension,
            method,
            args,
            receivers,
        } = classified
        else {
            panic!("Expected extension call");
        };
        assert_eq!(extension, "token");
        assert_eq!(method, "balance_of");
        assert_eq!(args.len(), 1);
        assert_eq!(receivers, vec!["balance", "ok"]);
    }

    #[test]
    fn test_unclassifiable() {
        for text in [
            "",
            "CREATE TABLE t (id INT)",
            "1 + 2",
            "$a = do_thing()",
            "a.b.c()",
            "count(*)",
            "f() OVER ()",
            "$a = ",
        ] {
            assert!(
                matches!(
                    StatementClassifier::classify(text),
                    Err(SqlError::UnclassifiableStatement(_))
                ),
                "expected {:?} to be unclassifiable",
                text
            );
        }
    }
}
