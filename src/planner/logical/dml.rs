//! Write plans (INSERT, UPDATE, DELETE) and the statement-level plan

use std::fmt;

use crate::planner::schema::{Field, Schema};

use super::{LogicalPlan, TypedExpr};

/// `column = value` with the target field resolved
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentPlan {
    pub column: Field,
    pub value: TypedExpr,
}

impl fmt::Display for AssignmentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column.name, self.value)
    }
}

/// Rows to insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertInput {
    Values(Vec<Vec<TypedExpr>>),
    Query(Box<LogicalPlan>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictPlanAction {
    DoNothing,
    DoUpdate {
        assignments: Vec<AssignmentPlan>,
        predicate: Option<TypedExpr>,
    },
}

/// ON CONFLICT with a verified arbiter
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictPlan {
    /// Arbiter columns; empty only for DO NOTHING
    pub target: Vec<String>,
    pub action: ConflictPlanAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    pub table: String,
    /// Target columns in insertion order
    pub columns: Vec<Field>,
    pub input: InsertInput,
    pub on_conflict: Option<ConflictPlan>,
}

/// UPDATE over the rows produced by `input` (target scan, joined sources,
/// filter)
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    pub table: String,
    pub input: LogicalPlan,
    pub assignments: Vec<AssignmentPlan>,
}

/// DELETE of the target rows produced by `input`
#[derive(Debug, Clone, PartialEq)]
pub struct DeletePlan {
    pub table: String,
    pub input: LogicalPlan,
}

/// Plan of a whole statement
#[derive(Debug, Clone, PartialEq)]
pub enum StatementPlan {
    Query(LogicalPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
}

impl StatementPlan {
    /// Result schema; writes return no rows
    pub fn schema(&self) -> Schema {
        match self {
            StatementPlan::Query(plan) => plan.schema().clone(),
            _ => Schema::empty(),
        }
    }

    pub fn is_mutative(&self) -> bool {
        !matches!(self, StatementPlan::Query(_))
    }

    /// The query plan, when this is a query
    pub fn as_query(&self) -> Option<&LogicalPlan> {
        match self {
            StatementPlan::Query(plan) => Some(plan),
            _ => None,
        }
    }
}

impl fmt::Display for InsertPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        write!(f, "Insert: {} [{}]", self.table, columns.join(", "))?;
        if let InsertInput::Values(rows) = &self.input {
            write!(f, " rows={}", rows.len())?;
        }
        match &self.on_conflict {
            Some(ConflictPlan {
                target,
                action: ConflictPlanAction::DoNothing,
            }) if target.is_empty() => write!(f, " on_conflict=nothing"),
            Some(ConflictPlan {
                target,
                action: ConflictPlanAction::DoNothing,
            }) => write!(f, " on_conflict=({}) nothing", target.join(", ")),
            Some(ConflictPlan {
                target,
                action: ConflictPlanAction::DoUpdate { assignments, .. },
            }) => {
                let sets: Vec<String> = assignments.iter().map(|a| a.to_string()).collect();
                write!(
                    f,
                    " on_conflict=({}) update [{}]",
                    target.join(", "),
                    sets.join(", ")
                )
            }
            None => Ok(()),
        }
    }
}

impl fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sets: Vec<String> = self.assignments.iter().map(|a| a.to_string()).collect();
        write!(f, "Update: {} set [{}]", self.table, sets.join(", "))
    }
}

impl fmt::Display for DeletePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delete: {}", self.table)
    }
}
