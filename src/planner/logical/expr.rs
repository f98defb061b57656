//! Logical expression types for the query planner

use std::fmt;

use crate::catalog::DataType;
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::schema::{Field, Schema};
use crate::sql::{Expr, Over, ToSql};

use super::LogicalPlan;

/// Reference to a column of an input schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnExpr {
    pub relation: Option<String>,
    pub name: String,
}

impl ColumnExpr {
    pub fn new(relation: Option<String>, name: impl Into<String>) -> Self {
        Self {
            relation,
            name: name.into(),
        }
    }

    /// The field this reference denotes, if `schema` has one
    pub fn find_in(&self, schema: &Schema) -> PlannerResult<Option<Field>> {
        Ok(schema
            .find(self.relation.as_deref(), &self.name)?
            .map(|i| schema.field(i).clone()))
    }

    /// The field this reference denotes; never defaults
    pub fn to_field(&self, schema: &Schema) -> PlannerResult<Field> {
        self.find_in(schema)?
            .ok_or_else(|| PlannerError::ColumnNotFound(self.to_string()))
    }
}

impl fmt::Display for ColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(rel) => write!(f, "{}.{}", rel, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Expression with its derived type
///
/// The expression is kept in its source form (parameters already resolved)
/// so that plan descriptions use the same canonical text as the rendered
/// statement.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub expr: Expr,
    pub data_type: DataType,
    pub nullable: bool,
    /// Field referenced, when the expression is a plain column reference
    pub origin: Option<Field>,
    /// Plans of subqueries nested in the expression, in source order
    pub subqueries: Vec<LogicalPlan>,
}

impl TypedExpr {
    pub fn new(expr: Expr, data_type: DataType, nullable: bool) -> Self {
        Self {
            expr,
            data_type,
            nullable,
            origin: None,
            subqueries: Vec::new(),
        }
    }

    /// Typed reference to `field`
    pub fn column(field: &Field) -> Self {
        Self {
            expr: Expr::Column {
                relation: field.relation.clone(),
                name: field.name.clone(),
            },
            data_type: field.data_type.clone(),
            nullable: field.nullable,
            origin: Some(field.clone()),
            subqueries: Vec::new(),
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.data_type, DataType::Boolean | DataType::Unknown)
    }

    /// Canonical SQL text of the expression
    pub fn to_sql(&self) -> String {
        self.expr.to_sql()
    }
}

impl fmt::Display for TypedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Direct sub-expressions, in source order; subquery bodies are not entered
pub(crate) fn children(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Column { .. }
        | Expr::Literal(_)
        | Expr::Placeholder(_)
        | Expr::Parameter(_)
        | Expr::Subquery(_)
        | Expr::Exists { .. } => vec![],
        Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        Expr::UnaryOp { expr, .. }
        | Expr::IsNull { expr, .. }
        | Expr::InSubquery { expr, .. }
        | Expr::Cast { expr, .. }
        | Expr::Nested(expr) => vec![expr.as_ref()],
        Expr::Operator { left, right, .. } => {
            let mut out: Vec<&Expr> = left.iter().map(|l| l.as_ref()).collect();
            out.push(right.as_ref());
            out
        }
        Expr::Function(call) => {
            let mut out: Vec<&Expr> = call.args.iter().collect();
            if let Some(filter) = &call.filter {
                out.push(filter.as_ref());
            }
            if let Some(Over::Spec(spec)) = &call.over {
                out.extend(spec.partition_by.iter());
                out.extend(spec.order_by.iter().map(|o| &o.expr));
            }
            out
        }
        Expr::InList { expr, list, .. } => {
            let mut out: Vec<&Expr> = vec![expr.as_ref()];
            out.extend(list.iter());
            out
        }
        Expr::Between {
            expr, low, high, ..
        } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
        Expr::Like { expr, pattern, .. } => vec![expr.as_ref(), pattern.as_ref()],
        Expr::Case {
            operand,
            branches,
            else_result,
        } => {
            let mut out: Vec<&Expr> = operand.iter().map(|o| o.as_ref()).collect();
            for (cond, result) in branches {
                out.push(cond);
                out.push(result);
            }
            out.extend(else_result.iter().map(|e| e.as_ref()));
            out
        }
    }
}

/// Mutable counterpart of [`children`]
pub(crate) fn children_mut(expr: &mut Expr) -> Vec<&mut Expr> {
    match expr {
        Expr::Column { .. }
        | Expr::Literal(_)
        | Expr::Placeholder(_)
        | Expr::Parameter(_)
        | Expr::Subquery(_)
        | Expr::Exists { .. } => vec![],
        Expr::BinaryOp { left, right, .. } => vec![left.as_mut(), right.as_mut()],
        Expr::UnaryOp { expr, .. }
        | Expr::IsNull { expr, .. }
        | Expr::InSubquery { expr, .. }
        | Expr::Cast { expr, .. }
        | Expr::Nested(expr) => vec![expr.as_mut()],
        Expr::Operator { left, right, .. } => {
            let mut out: Vec<&mut Expr> = left.iter_mut().map(|l| l.as_mut()).collect();
            out.push(right.as_mut());
            out
        }
        Expr::Function(call) => {
            let mut out: Vec<&mut Expr> = call.args.iter_mut().collect();
            if let Some(filter) = &mut call.filter {
                out.push(filter.as_mut());
            }
            if let Some(Over::Spec(spec)) = &mut call.over {
                out.extend(spec.partition_by.iter_mut());
                out.extend(spec.order_by.iter_mut().map(|o| &mut o.expr));
            }
            out
        }
        Expr::InList { expr, list, .. } => {
            let mut out: Vec<&mut Expr> = vec![expr.as_mut()];
            out.extend(list.iter_mut());
            out
        }
        Expr::Between {
            expr, low, high, ..
        } => vec![expr.as_mut(), low.as_mut(), high.as_mut()],
        Expr::Like { expr, pattern, .. } => vec![expr.as_mut(), pattern.as_mut()],
        Expr::Case {
            operand,
            branches,
            else_result,
        } => {
            let mut out: Vec<&mut Expr> = operand.iter_mut().map(|o| o.as_mut()).collect();
            for (cond, result) in branches {
                out.push(cond);
                out.push(result);
            }
            out.extend(else_result.iter_mut().map(|e| e.as_mut()));
            out
        }
    }
}

/// Copy of `expr` with every column reference that resolves in `schema`
/// spelled with its field's qualifier, so equivalent spellings compare equal
pub(crate) fn qualify(expr: &Expr, schema: &Schema) -> Expr {
    let mut out = expr.clone();
    qualify_in_place(&mut out, schema);
    out
}

fn qualify_in_place(expr: &mut Expr, schema: &Schema) {
    if let Expr::Column { relation, name } = expr {
        if let Ok(Some(i)) = schema.find(relation.as_deref(), name) {
            *relation = schema.field(i).relation.clone();
        }
        return;
    }
    for child in children_mut(expr) {
        qualify_in_place(child, schema);
    }
}

/// `expr` with any number of enclosing parentheses removed
pub(crate) fn strip_nested(expr: &Expr) -> &Expr {
    match expr {
        Expr::Nested(inner) => strip_nested(inner),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{BinaryOp, FunctionCall, Literal};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::qualified("u", "id", DataType::Int, false),
            Field::qualified("u", "name", DataType::Text, true),
        ])
        .unwrap()
    }

    #[test]
    fn test_column_to_field() {
        let schema = schema();
        let field = ColumnExpr::new(None, "name").to_field(&schema).unwrap();
        assert_eq!(field.qualified_name(), "u.name");

        let err = ColumnExpr::new(Some("o".to_string()), "id")
            .to_field(&schema)
            .unwrap_err();
        assert_eq!(err, PlannerError::ColumnNotFound("o.id".to_string()));
    }

    #[test]
    fn test_qualify() {
        let schema = schema();
        let expr = Expr::binary(
            Expr::column("id"),
            BinaryOp::Add,
            Expr::Function(FunctionCall::new("length", vec![Expr::column("name")])),
        );
        let expected = Expr::binary(
            Expr::qualified("u", "id"),
            BinaryOp::Add,
            Expr::Function(FunctionCall::new(
                "length",
                vec![Expr::qualified("u", "name")],
            )),
        );
        assert_eq!(qualify(&expr, &schema), expected);

        // Unresolvable references are left alone
        assert_eq!(qualify(&Expr::column("zzz"), &schema), Expr::column("zzz"));
    }

    #[test]
    fn test_children_source_order() {
        let expr = Expr::Between {
            expr: Box::new(Expr::column("a")),
            low: Box::new(Expr::Literal(Literal::Integer(1))),
            high: Box::new(Expr::Literal(Literal::Integer(2))),
            negated: false,
        };
        let kids = children(&expr);
        assert_eq!(kids.len(), 3);
        assert_eq!(kids[0], &Expr::column("a"));
    }
}
