//! SQL error types

use thiserror::Error;

/// Errors raised before planning: parsing, classification, parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    /// Parse error from sqlparser
    #[error("Parse error: {0}")]
    Parse(String),

    /// Syntax error reported by the reference parser on rendered text
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: u64,
        column: u64,
    },

    /// Statement form the planner intentionally rejects
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Text is neither DML nor an action or extension call
    #[error("Unclassifiable statement: {0}")]
    UnclassifiableStatement(String),

    /// Bind parameter spelled with a prefix other than `$` or `@`
    #[error("Bind parameter prefix not supported: {0}")]
    BindParameterPrefixNotSupported(String),

    /// Positional and named parameters in one statement
    #[error("Cannot mix positional and named parameters")]
    MixedParameterStyles,

    /// Malformed parameter reference
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl SqlError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        SqlError::Unsupported(what.into())
    }
}

impl From<sqlparser::parser::ParserError> for SqlError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        SqlError::Parse(err.to_string())
    }
}

/// Result type for SQL operations
pub type SqlResult<T> = Result<T, SqlError>;
