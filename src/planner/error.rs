//! Planner error types

use std::fmt;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::sql::SqlError;

/// Stable error classification shared by the SQL and planner layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Parse,
    Syntax,
    Unsupported,
    UnclassifiableStatement,
    BindParameterPrefixNotSupported,
    MixedParameterStyles,
    InvalidParameter,
    UnknownTable,
    ColumnNotFound,
    AmbiguousColumn,
    DuplicateColumn,
    IllegalAggregate,
    IllegalWindowFunction,
    InvalidWindowFunction,
    WindowNotDefined,
    WindowAlreadyDefined,
    UpdateOrDeleteWithoutWhere,
    SetIncompatibleSchemas,
    NotNullableColumn,
    IllegalConflictArbiter,
    FunctionDoesNotExist,
    TypeMismatch,
    InvalidPlan,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::UnclassifiableStatement => "unclassifiable_statement",
            ErrorKind::BindParameterPrefixNotSupported => "bind_parameter_prefix_not_supported",
            ErrorKind::MixedParameterStyles => "mixed_parameter_styles",
            ErrorKind::InvalidParameter => "invalid_parameter",
            ErrorKind::UnknownTable => "unknown_table",
            ErrorKind::ColumnNotFound => "column_not_found",
            ErrorKind::AmbiguousColumn => "ambiguous_column",
            ErrorKind::DuplicateColumn => "duplicate_column",
            ErrorKind::IllegalAggregate => "illegal_aggregate",
            ErrorKind::IllegalWindowFunction => "illegal_window_function",
            ErrorKind::InvalidWindowFunction => "invalid_window_function",
            ErrorKind::WindowNotDefined => "window_not_defined",
            ErrorKind::WindowAlreadyDefined => "window_already_defined",
            ErrorKind::UpdateOrDeleteWithoutWhere => "update_or_delete_without_where",
            ErrorKind::SetIncompatibleSchemas => "set_incompatible_schemas",
            ErrorKind::NotNullableColumn => "not_nullable_column",
            ErrorKind::IllegalConflictArbiter => "illegal_conflict_arbiter",
            ErrorKind::FunctionDoesNotExist => "function_does_not_exist",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::InvalidPlan => "invalid_plan",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SqlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SqlError::Parse(_) => ErrorKind::Parse,
            SqlError::Syntax { .. } => ErrorKind::Syntax,
            SqlError::Unsupported(_) => ErrorKind::Unsupported,
            SqlError::UnclassifiableStatement(_) => ErrorKind::UnclassifiableStatement,
            SqlError::BindParameterPrefixNotSupported(_) => {
                ErrorKind::BindParameterPrefixNotSupported
            }
            SqlError::MixedParameterStyles => ErrorKind::MixedParameterStyles,
            SqlError::InvalidParameter(_) => ErrorKind::InvalidParameter,
        }
    }
}

/// Planner error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Ambiguous column: {0}")]
    AmbiguousColumn(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Illegal aggregate: {0}")]
    IllegalAggregate(String),

    #[error("Illegal window function: {0}")]
    IllegalWindowFunction(String),

    #[error("Invalid window function: {0} is neither a window nor an aggregate function")]
    InvalidWindowFunction(String),

    #[error("Window not defined: {0}")]
    WindowNotDefined(String),

    #[error("Window already defined: {0}")]
    WindowAlreadyDefined(String),

    #[error("{0} with additional sources requires a WHERE clause")]
    UpdateOrDeleteWithoutWhere(&'static str),

    #[error("Incompatible {op} inputs: {detail}")]
    SetIncompatibleSchemas { op: String, detail: String },

    #[error("Column not nullable: {0}")]
    NotNullableColumn(String),

    #[error("Illegal conflict arbiter: {0}")]
    IllegalConflictArbiter(String),

    #[error("Function does not exist: {0}")]
    FunctionDoesNotExist(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl PlannerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlannerError::Sql(err) => err.kind(),
            PlannerError::UnknownTable(_) => ErrorKind::UnknownTable,
            PlannerError::ColumnNotFound(_) => ErrorKind::ColumnNotFound,
            PlannerError::AmbiguousColumn(_) => ErrorKind::AmbiguousColumn,
            PlannerError::DuplicateColumn(_) => ErrorKind::DuplicateColumn,
            PlannerError::IllegalAggregate(_) => ErrorKind::IllegalAggregate,
            PlannerError::IllegalWindowFunction(_) => ErrorKind::IllegalWindowFunction,
            PlannerError::InvalidWindowFunction(_) => ErrorKind::InvalidWindowFunction,
            PlannerError::WindowNotDefined(_) => ErrorKind::WindowNotDefined,
            PlannerError::WindowAlreadyDefined(_) => ErrorKind::WindowAlreadyDefined,
            PlannerError::UpdateOrDeleteWithoutWhere(_) => ErrorKind::UpdateOrDeleteWithoutWhere,
            PlannerError::SetIncompatibleSchemas { .. } => ErrorKind::SetIncompatibleSchemas,
            PlannerError::NotNullableColumn(_) => ErrorKind::NotNullableColumn,
            PlannerError::IllegalConflictArbiter(_) => ErrorKind::IllegalConflictArbiter,
            PlannerError::FunctionDoesNotExist(_) => ErrorKind::FunctionDoesNotExist,
            PlannerError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            PlannerError::InvalidPlan(_) => ErrorKind::InvalidPlan,
            PlannerError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        PlannerError::Unsupported(what.into())
    }

    pub fn invalid_plan(msg: impl Into<String>) -> Self {
        PlannerError::InvalidPlan(msg.into())
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        PlannerError::TypeMismatch(msg.into())
    }
}

impl From<CatalogError> for PlannerError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::TableNotFound(name) => PlannerError::UnknownTable(name),
            CatalogError::ColumnNotFound(table, column) => {
                PlannerError::ColumnNotFound(format!("{}.{}", table, column))
            }
            CatalogError::DuplicateColumn(table, column) => {
                PlannerError::DuplicateColumn(format!("{}.{}", table, column))
            }
            other => PlannerError::InvalidPlan(other.to_string()),
        }
    }
}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_errors_keep_their_kind() {
        let err: PlannerError = SqlError::MixedParameterStyles.into();
        assert_eq!(err.kind(), ErrorKind::MixedParameterStyles);
        assert_eq!(err.to_string(), SqlError::MixedParameterStyles.to_string());
    }

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(
            PlannerError::UpdateOrDeleteWithoutWhere("UPDATE").kind().as_str(),
            "update_or_delete_without_where"
        );
        assert_eq!(ErrorKind::AmbiguousColumn.to_string(), "ambiguous_column");
    }

    #[test]
    fn test_catalog_error_conversion() {
        let err: PlannerError = CatalogError::TableNotFound("users".to_string()).into();
        assert_eq!(err, PlannerError::UnknownTable("users".to_string()));
    }
}
