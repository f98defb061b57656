//! Semantic validation
//!
//! Legality rules the plan builder applies while it builds. Each check
//! returns the first violation it finds; the builder stops at the first
//! error, so reported errors follow build order.

use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::{TableDef, TableSource};
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::TypedExpr;
use crate::planner::schema::Field;
use crate::sql::{ConflictAction, Expr, Literal, OnConflict, Over, WindowDef, WindowSpec};

use super::logical::expr::strip_nested;

/// Clause an expression appears in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Select,
    Where,
    JoinOn,
    GroupBy,
    Having,
    OrderBy,
    Values,
    Set,
    Limit,
    ConflictWhere,
}

impl Clause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Clause::Select => "SELECT",
            Clause::Where => "WHERE",
            Clause::JoinOn => "JOIN/ON",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
            Clause::Values => "VALUES",
            Clause::Set => "SET",
            Clause::Limit => "LIMIT",
            Clause::ConflictWhere => "ON CONFLICT WHERE",
        }
    }

    pub fn allows_aggregate(&self) -> bool {
        matches!(self, Clause::Select | Clause::Having | Clause::OrderBy)
    }

    pub fn allows_window(&self) -> bool {
        matches!(self, Clause::Select | Clause::OrderBy)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate call `name` appearing in `clause`, possibly inside another
/// aggregate's arguments
pub fn check_aggregate(clause: Clause, name: &str, nested: bool) -> PlannerResult<()> {
    if nested {
        return Err(PlannerError::IllegalAggregate(format!(
            "aggregate function calls cannot be nested ({})",
            name
        )));
    }
    if !clause.allows_aggregate() {
        return Err(PlannerError::IllegalAggregate(format!(
            "aggregate functions are not allowed in {} ({})",
            clause, name
        )));
    }
    Ok(())
}

/// Window call `name` appearing in `clause`
pub fn check_window(
    clause: Clause,
    name: &str,
    in_window: bool,
    in_aggregate: bool,
) -> PlannerResult<()> {
    if in_window {
        return Err(PlannerError::IllegalWindowFunction(format!(
            "window function calls cannot be nested ({})",
            name
        )));
    }
    if in_aggregate {
        return Err(PlannerError::IllegalWindowFunction(format!(
            "aggregate function calls cannot contain window function calls ({})",
            name
        )));
    }
    if !clause.allows_window() {
        return Err(PlannerError::IllegalWindowFunction(format!(
            "window functions are not allowed in {} ({})",
            clause, name
        )));
    }
    Ok(())
}

/// Window-only function called without OVER
pub fn window_requires_over(name: &str) -> PlannerError {
    PlannerError::IllegalWindowFunction(format!("window function {} requires an OVER clause", name))
}

/// Check a WINDOW clause and index its definitions by name
///
/// A definition may build on an earlier one (`w2 AS (w1 ORDER BY ...)`).
pub fn window_definitions(defs: &[WindowDef]) -> PlannerResult<BTreeMap<String, WindowSpec>> {
    let mut windows = BTreeMap::new();
    for def in defs {
        if windows.contains_key(&def.name) {
            return Err(PlannerError::WindowAlreadyDefined(def.name.clone()));
        }
        if let Some(base) = &def.spec.base {
            if !windows.contains_key(base) {
                return Err(PlannerError::WindowNotDefined(base.clone()));
            }
        }
        windows.insert(def.name.clone(), def.spec.clone());
    }
    Ok(windows)
}

/// Every window name an OVER clause references must be defined
pub fn check_over(over: &Over, windows: &BTreeMap<String, WindowSpec>) -> PlannerResult<()> {
    let referenced = match over {
        Over::Named(name) => Some(name),
        Over::Spec(spec) => spec.base.as_ref(),
    };
    match referenced {
        Some(name) if !windows.contains_key(name) => {
            Err(PlannerError::WindowNotDefined(name.clone()))
        }
        _ => Ok(()),
    }
}

/// UPDATE ... FROM and DELETE ... USING must carry a WHERE clause.
/// A single-table UPDATE or DELETE without WHERE is allowed.
pub fn check_write_sources(
    statement: &'static str,
    has_sources: bool,
    has_where: bool,
) -> PlannerResult<()> {
    if has_sources && !has_where {
        return Err(PlannerError::UpdateOrDeleteWithoutWhere(statement));
    }
    Ok(())
}

/// A NULL literal may not be written to a NOT NULL column
pub fn check_not_null(column: &Field, value: &Expr) -> PlannerResult<()> {
    if !column.nullable && matches!(strip_nested(value), Expr::Literal(Literal::Null)) {
        return Err(PlannerError::NotNullableColumn(column.name.clone()));
    }
    Ok(())
}

/// Columns left out of an INSERT must be nullable or have a default
pub fn check_omitted_columns(table: &TableDef, columns: &[String]) -> PlannerResult<()> {
    match table
        .columns
        .iter()
        .find(|c| !columns.contains(&c.name) && !c.may_omit())
    {
        Some(col) => Err(PlannerError::NotNullableColumn(col.name.clone())),
        None => Ok(()),
    }
}

/// Value must be storable in the column
pub fn check_assignable(column: &Field, value: &TypedExpr) -> PlannerResult<()> {
    if !column.data_type.is_compatible(&value.data_type) {
        return Err(PlannerError::type_mismatch(format!(
            "column {} is of type {} but expression is of type {}",
            column.name, column.data_type, value.data_type
        )));
    }
    Ok(())
}

/// ON CONFLICT target must be exactly a primary key, unique constraint, or
/// unique index; DO UPDATE needs a target
pub fn check_conflict_arbiter(
    source: &TableSource<'_>,
    on_conflict: &OnConflict,
) -> PlannerResult<()> {
    let table = source.table();
    if let Some(missing) = on_conflict
        .target
        .iter()
        .find(|c| table.get_column(c).is_none())
    {
        return Err(PlannerError::ColumnNotFound(format!(
            "{}.{}",
            table.name, missing
        )));
    }

    if on_conflict.target.is_empty() {
        return match on_conflict.action {
            ConflictAction::DoNothing => Ok(()),
            ConflictAction::DoUpdate { .. } => Err(PlannerError::IllegalConflictArbiter(
                "ON CONFLICT DO UPDATE requires a conflict target".to_string(),
            )),
        };
    }

    if !source.is_unique_key(&on_conflict.target) {
        return Err(PlannerError::IllegalConflictArbiter(format!(
            "({}) is not a unique key of {}",
            on_conflict.target.join(", "),
            table.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ColumnDef, Constraint, DataType, IndexDef};
    use crate::sql::Assignment;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                TableDef::new("accounts")
                    .column(ColumnDef::new("id", DataType::Int).nullable(false))
                    .column(ColumnDef::new("email", DataType::Text).nullable(false))
                    .column(
                        ColumnDef::new("region", DataType::Text)
                            .nullable(false)
                            .default("'eu'"),
                    )
                    .column(ColumnDef::new("note", DataType::Text))
                    .constraint(Constraint::PrimaryKey(vec!["id".to_string()])),
            )
            .unwrap();
        catalog
            .create_index(
                IndexDef::new("accounts_email", "accounts", vec!["email".to_string()]).unique(),
            )
            .unwrap();
        catalog
    }

    fn do_update() -> ConflictAction {
        ConflictAction::DoUpdate {
            assignments: vec![Assignment {
                column: "note".to_string(),
                value: Expr::Literal(Literal::String("x".to_string())),
            }],
            selection: None,
        }
    }

    #[test]
    fn test_clause_rules() {
        assert!(check_aggregate(Clause::Select, "count", false).is_ok());
        assert!(check_aggregate(Clause::Having, "count", false).is_ok());
        for clause in [
            Clause::Where,
            Clause::JoinOn,
            Clause::GroupBy,
            Clause::Values,
            Clause::Set,
            Clause::Limit,
        ] {
            assert!(matches!(
                check_aggregate(clause, "count", false),
                Err(PlannerError::IllegalAggregate(_))
            ));
        }
        assert!(matches!(
            check_aggregate(Clause::Select, "sum", true),
            Err(PlannerError::IllegalAggregate(_))
        ));

        assert!(check_window(Clause::Select, "rank", false, false).is_ok());
        for clause in [
            Clause::Where,
            Clause::GroupBy,
            Clause::Having,
            Clause::JoinOn,
            Clause::Set,
        ] {
            assert!(matches!(
                check_window(clause, "rank", false, false),
                Err(PlannerError::IllegalWindowFunction(_))
            ));
        }
        assert!(check_window(Clause::Select, "rank", true, false).is_err());
    }

    #[test]
    fn test_window_definitions() {
        let def = |name: &str, base: Option<&str>| WindowDef {
            name: name.to_string(),
            spec: WindowSpec {
                base: base.map(str::to_string),
                ..Default::default()
            },
        };

        let windows = window_definitions(&[def("w1", None), def("w2", Some("w1"))]).unwrap();
        assert_eq!(windows.len(), 2);

        assert_eq!(
            window_definitions(&[def("w", None), def("w", None)]).unwrap_err(),
            PlannerError::WindowAlreadyDefined("w".to_string())
        );
        assert_eq!(
            window_definitions(&[def("w2", Some("w1"))]).unwrap_err(),
            PlannerError::WindowNotDefined("w1".to_string())
        );

        assert!(check_over(&Over::Named("w1".to_string()), &windows).is_ok());
        assert_eq!(
            check_over(&Over::Named("nope".to_string()), &windows).unwrap_err(),
            PlannerError::WindowNotDefined("nope".to_string())
        );
    }

    #[test]
    fn test_write_sources_guard() {
        assert!(check_write_sources("UPDATE", false, false).is_ok());
        assert!(check_write_sources("DELETE", true, true).is_ok());
        assert_eq!(
            check_write_sources("UPDATE", true, false).unwrap_err().kind(),
            crate::planner::ErrorKind::UpdateOrDeleteWithoutWhere
        );
    }

    #[test]
    fn test_not_null() {
        let required = Field::new("id", DataType::Int, false);
        let optional = Field::new("note", DataType::Text, true);
        let null = Expr::Nested(Box::new(Expr::Literal(Literal::Null)));

        assert!(check_not_null(&optional, &null).is_ok());
        assert_eq!(
            check_not_null(&required, &null).unwrap_err(),
            PlannerError::NotNullableColumn("id".to_string())
        );
        assert!(check_not_null(&required, &Expr::Parameter(1)).is_ok());
    }

    #[test]
    fn test_omitted_columns() {
        let catalog = catalog();
        let table = catalog.get_table("accounts").unwrap();
        let cols = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();

        // region has a default and note is nullable
        assert!(check_omitted_columns(table, &cols(&["id", "email"])).is_ok());
        assert_eq!(
            check_omitted_columns(table, &cols(&["id"])).unwrap_err(),
            PlannerError::NotNullableColumn("email".to_string())
        );
    }

    #[test]
    fn test_conflict_arbiter() {
        let catalog = catalog();
        let source = catalog.source("accounts").unwrap();
        let on = |target: &[&str], action: ConflictAction| OnConflict {
            target: target.iter().map(|t| t.to_string()).collect(),
            action,
        };

        assert!(check_conflict_arbiter(&source, &on(&["id"], do_update())).is_ok());
        assert!(check_conflict_arbiter(&source, &on(&["email"], do_update())).is_ok());
        assert!(check_conflict_arbiter(&source, &on(&[], ConflictAction::DoNothing)).is_ok());

        assert!(matches!(
            check_conflict_arbiter(&source, &on(&["note"], do_update())),
            Err(PlannerError::IllegalConflictArbiter(_))
        ));
        assert!(matches!(
            check_conflict_arbiter(&source, &on(&[], do_update())),
            Err(PlannerError::IllegalConflictArbiter(_))
        ));
        assert!(matches!(
            check_conflict_arbiter(&source, &on(&["id", "email"], ConflictAction::DoNothing)),
            Err(PlannerError::IllegalConflictArbiter(_))
        ));
        assert!(matches!(
            check_conflict_arbiter(&source, &on(&["nope"], ConflictAction::DoNothing)),
            Err(PlannerError::ColumnNotFound(_))
        ));
    }
}
