//! Logical plan representation
//!
//! Logical plans describe what a statement computes. The operator set is
//! closed: every consumer matches on [`LogicalPlan`] exhaustively. Each node
//! derives its output [`Schema`] when it is constructed and is immutable
//! afterwards, so a plan is always built bottom-up.

pub mod builder;
pub mod dml;
pub mod expr;

use std::fmt;

pub use builder::LogicalPlanBuilder;
pub use dml::{
    AssignmentPlan, ConflictPlan, ConflictPlanAction, DeletePlan, InsertInput, InsertPlan,
    StatementPlan, UpdatePlan,
};
pub use expr::{ColumnExpr, TypedExpr};

use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::functions::common_type;
use crate::planner::schema::{DataSource, Field, Schema};
use crate::sql::{JoinType, SetOperator};

/// Logical plan node
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    /// Read a data source
    Scan(Scan),
    /// Keep rows matching a predicate
    Filter(Filter),
    /// Compute the output columns (SELECT list)
    Projection(Projection),
    /// Combine two inputs
    Join(Join),
    /// Group rows and compute aggregates
    Aggregate(Aggregate),
    /// Remove duplicate rows
    Distinct(Distinct),
    /// Take at most N rows, after an optional offset
    Limit(Limit),
    /// UNION / INTERSECT / EXCEPT
    Set(SetOperation),
    /// Order rows
    Sort(Sort),
    /// Aliased derived table or CTE reference
    Subquery(Subquery),
}

impl LogicalPlan {
    /// Output schema of this node
    pub fn schema(&self) -> &Schema {
        match self {
            LogicalPlan::Scan(node) => &node.schema,
            LogicalPlan::Filter(node) => node.input.schema(),
            LogicalPlan::Projection(node) => &node.schema,
            LogicalPlan::Join(node) => &node.schema,
            LogicalPlan::Aggregate(node) => &node.schema,
            LogicalPlan::Distinct(node) => node.input.schema(),
            LogicalPlan::Limit(node) => node.input.schema(),
            LogicalPlan::Set(node) => node.left.schema(),
            LogicalPlan::Sort(node) => node.input.schema(),
            LogicalPlan::Subquery(node) => &node.schema,
        }
    }

    /// Input plans, left before right
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan(_) => vec![],
            LogicalPlan::Filter(node) => vec![node.input.as_ref()],
            LogicalPlan::Projection(node) => vec![node.input.as_ref()],
            LogicalPlan::Join(node) => vec![node.left.as_ref(), node.right.as_ref()],
            LogicalPlan::Aggregate(node) => vec![node.input.as_ref()],
            LogicalPlan::Distinct(node) => vec![node.input.as_ref()],
            LogicalPlan::Limit(node) => vec![node.input.as_ref()],
            LogicalPlan::Set(node) => vec![node.left.as_ref(), node.right.as_ref()],
            LogicalPlan::Sort(node) => vec![node.input.as_ref()],
            LogicalPlan::Subquery(node) => vec![node.input.as_ref()],
        }
    }

    /// Expressions held by this node, in clause order
    pub fn expressions(&self) -> Vec<&TypedExpr> {
        match self {
            LogicalPlan::Scan(_)
            | LogicalPlan::Distinct(_)
            | LogicalPlan::Set(_)
            | LogicalPlan::Subquery(_) => vec![],
            LogicalPlan::Filter(node) => vec![&node.predicate],
            LogicalPlan::Projection(node) => node.exprs.iter().collect(),
            LogicalPlan::Join(node) => node.condition.iter().collect(),
            LogicalPlan::Aggregate(node) => {
                node.group_by.iter().chain(node.aggregates.iter()).collect()
            }
            LogicalPlan::Limit(node) => node.count.iter().chain(node.offset.iter()).collect(),
            LogicalPlan::Sort(node) => node.order_by.iter().map(|s| &s.expr).collect(),
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalPlan::Scan(node) => fmt::Display::fmt(node, f),
            LogicalPlan::Filter(node) => fmt::Display::fmt(node, f),
            LogicalPlan::Projection(node) => fmt::Display::fmt(node, f),
            LogicalPlan::Join(node) => fmt::Display::fmt(node, f),
            LogicalPlan::Aggregate(node) => fmt::Display::fmt(node, f),
            LogicalPlan::Distinct(node) => fmt::Display::fmt(node, f),
            LogicalPlan::Limit(node) => fmt::Display::fmt(node, f),
            LogicalPlan::Set(node) => fmt::Display::fmt(node, f),
            LogicalPlan::Sort(node) => fmt::Display::fmt(node, f),
            LogicalPlan::Subquery(node) => fmt::Display::fmt(node, f),
        }
    }
}

fn write_exprs(f: &mut fmt::Formatter<'_>, exprs: &[TypedExpr]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", expr)?;
    }
    Ok(())
}

fn check_predicate(predicate: &TypedExpr, clause: &str) -> PlannerResult<()> {
    if !predicate.is_boolean() {
        return Err(PlannerError::type_mismatch(format!(
            "argument of {} must be type BOOLEAN, not type {}",
            clause, predicate.data_type
        )));
    }
    Ok(())
}

// ============ Scan ============

/// Read a data source, optionally narrowed to some of its columns
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    table: String,
    alias: Option<String>,
    projection: Option<Vec<String>>,
    schema: Schema,
}

impl Scan {
    /// Fields come out in projection order (source order for `None`),
    /// qualified by the alias or else the source name
    pub fn try_new(
        source: &dyn DataSource,
        alias: Option<&str>,
        projection: Option<&[String]>,
    ) -> PlannerResult<Self> {
        let table = source.name().to_string();
        let relation = alias.unwrap_or(&table).to_string();
        let source_schema = source.schema();

        let fields: Vec<Field> = match projection {
            Some(columns) => columns
                .iter()
                .map(|c| {
                    source_schema
                        .index_of(None, c)
                        .map(|i| source_schema.field(i).clone())
                        .map_err(|_| PlannerError::ColumnNotFound(format!("{}.{}", table, c)))
                })
                .collect::<PlannerResult<_>>()?,
            None => source_schema.fields().to_vec(),
        };
        let fields = fields
            .into_iter()
            .map(|f| f.with_relation(Some(relation.clone())))
            .collect::<Vec<_>>();

        // Keys survive only if every key column is still present
        let keys = source_schema
            .keys()
            .iter()
            .filter(|key| key.iter().all(|k| fields.iter().any(|f| &f.name == k)))
            .cloned()
            .collect();

        Ok(Self {
            table,
            alias: alias.map(str::to_string),
            projection: projection.map(<[String]>::to_vec),
            schema: Schema::new(fields)?.with_keys(keys),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl fmt::Display for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scan: {}", self.table)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", alias)?;
        }
        if let Some(columns) = &self.projection {
            write!(f, " projection=[{}]", columns.join(", "))?;
        }
        Ok(())
    }
}

// ============ Filter ============

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    input: Box<LogicalPlan>,
    predicate: TypedExpr,
}

impl Filter {
    pub fn try_new(input: LogicalPlan, predicate: TypedExpr) -> PlannerResult<Self> {
        check_predicate(&predicate, "WHERE")?;
        Ok(Self {
            input: Box::new(input),
            predicate,
        })
    }

    pub fn input(&self) -> &LogicalPlan {
        &self.input
    }

    pub fn predicate(&self) -> &TypedExpr {
        &self.predicate
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter: {}", self.predicate)
    }
}

// ============ Projection ============

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    input: Box<LogicalPlan>,
    exprs: Vec<TypedExpr>,
    schema: Schema,
}

impl Projection {
    /// One output field per `(expression, alias)`
    ///
    /// A field is named by its alias, else by the referenced column (keeping
    /// its qualifier), else by the expression's canonical text.
    pub fn try_new(
        input: LogicalPlan,
        items: Vec<(TypedExpr, Option<String>)>,
    ) -> PlannerResult<Self> {
        let mut exprs = Vec::with_capacity(items.len());
        let mut fields = Vec::with_capacity(items.len());
        for (expr, alias) in items {
            fields.push(Self::output_field(&expr, alias));
            exprs.push(expr);
        }
        Ok(Self {
            input: Box::new(input),
            exprs,
            schema: Schema::new(fields)?,
        })
    }

    pub(crate) fn output_field(expr: &TypedExpr, alias: Option<String>) -> Field {
        match (alias, &expr.origin) {
            (Some(alias), _) => Field::new(alias, expr.data_type.clone(), expr.nullable),
            (None, Some(origin)) => origin.clone().with_nullable(expr.nullable),
            (None, None) => Field::new(expr.to_sql(), expr.data_type.clone(), expr.nullable),
        }
    }

    pub fn input(&self) -> &LogicalPlan {
        &self.input
    }

    pub fn exprs(&self) -> &[TypedExpr] {
        &self.exprs
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Projection: ")?;
        for (i, (expr, field)) in self.exprs.iter().zip(self.schema.fields()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let text = expr.to_sql();
            let renamed = match &expr.origin {
                Some(origin) => origin.name != field.name,
                None => text != field.name,
            };
            if renamed {
                write!(f, "{} AS {}", text, field.name)?;
            } else {
                write!(f, "{}", text)?;
            }
        }
        Ok(())
    }
}

// ============ Join ============

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    left: Box<LogicalPlan>,
    right: Box<LogicalPlan>,
    join_type: JoinType,
    condition: Option<TypedExpr>,
    schema: Schema,
}

impl Join {
    /// Left fields then right fields; outer sides become nullable
    pub fn output_schema(
        left: &Schema,
        right: &Schema,
        join_type: JoinType,
    ) -> PlannerResult<Schema> {
        let left = match join_type {
            JoinType::Right | JoinType::Full => left.to_nullable(),
            _ => left.clone(),
        };
        let right = match join_type {
            JoinType::Left | JoinType::Full => right.to_nullable(),
            _ => right.clone(),
        };
        left.join(&right)
    }

    pub fn try_new(
        left: LogicalPlan,
        right: LogicalPlan,
        join_type: JoinType,
        condition: Option<TypedExpr>,
    ) -> PlannerResult<Self> {
        match (&condition, join_type) {
            (Some(_), JoinType::Cross) => {
                return Err(PlannerError::invalid_plan("CROSS JOIN cannot have a condition"))
            }
            (None, jt) if jt != JoinType::Cross => {
                return Err(PlannerError::invalid_plan(format!(
                    "{} requires a condition",
                    jt.as_str()
                )))
            }
            (Some(cond), _) => check_predicate(cond, "JOIN/ON")?,
            _ => {}
        }
        let schema = Self::output_schema(left.schema(), right.schema(), join_type)?;
        Ok(Self {
            left: Box::new(left),
            right: Box::new(right),
            join_type,
            condition,
            schema,
        })
    }

    pub fn left(&self) -> &LogicalPlan {
        &self.left
    }

    pub fn right(&self) -> &LogicalPlan {
        &self.right
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn condition(&self) -> Option<&TypedExpr> {
        self.condition.as_ref()
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Join: {}", self.join_type.as_str())?;
        if let Some(cond) = &self.condition {
            write!(f, " ON {}", cond)?;
        }
        Ok(())
    }
}

// ============ Aggregate ============

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    input: Box<LogicalPlan>,
    group_by: Vec<TypedExpr>,
    aggregates: Vec<TypedExpr>,
    schema: Schema,
}

impl Aggregate {
    /// Group-by fields (nullability preserved) then one field per aggregate,
    /// named by canonical text
    pub fn try_new(
        input: LogicalPlan,
        group_by: Vec<TypedExpr>,
        aggregates: Vec<TypedExpr>,
    ) -> PlannerResult<Self> {
        let mut fields: Vec<Field> = group_by
            .iter()
            .map(|g| match &g.origin {
                Some(origin) => origin.clone(),
                None => Field::new(g.to_sql(), g.data_type.clone(), g.nullable),
            })
            .collect();
        fields.extend(
            aggregates
                .iter()
                .map(|a| Field::new(a.to_sql(), a.data_type.clone(), a.nullable)),
        );
        Ok(Self {
            input: Box::new(input),
            group_by,
            aggregates,
            schema: Schema::new(fields)?,
        })
    }

    pub fn input(&self) -> &LogicalPlan {
        &self.input
    }

    pub fn group_by(&self) -> &[TypedExpr] {
        &self.group_by
    }

    pub fn aggregates(&self) -> &[TypedExpr] {
        &self.aggregates
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aggregate: group_by=[")?;
        write_exprs(f, &self.group_by)?;
        write!(f, "] aggregates=[")?;
        write_exprs(f, &self.aggregates)?;
        write!(f, "]")
    }
}

// ============ Distinct ============

#[derive(Debug, Clone, PartialEq)]
pub struct Distinct {
    input: Box<LogicalPlan>,
}

impl Distinct {
    pub fn new(input: LogicalPlan) -> Self {
        Self {
            input: Box::new(input),
        }
    }

    pub fn input(&self) -> &LogicalPlan {
        &self.input
    }
}

impl fmt::Display for Distinct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distinct")
    }
}

// ============ Limit ============

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    input: Box<LogicalPlan>,
    count: Option<TypedExpr>,
    offset: Option<TypedExpr>,
}

impl Limit {
    pub fn try_new(
        input: LogicalPlan,
        count: Option<TypedExpr>,
        offset: Option<TypedExpr>,
    ) -> PlannerResult<Self> {
        if count.is_none() && offset.is_none() {
            return Err(PlannerError::invalid_plan("LIMIT without count or offset"));
        }
        for (clause, value) in [("LIMIT", &count), ("OFFSET", &offset)] {
            if let Some(value) = value {
                if !(value.data_type.is_integer() || value.data_type.is_unknown()) {
                    return Err(PlannerError::type_mismatch(format!(
                        "argument of {} must be an integer, not type {}",
                        clause, value.data_type
                    )));
                }
            }
        }
        Ok(Self {
            input: Box::new(input),
            count,
            offset,
        })
    }

    pub fn input(&self) -> &LogicalPlan {
        &self.input
    }

    pub fn count(&self) -> Option<&TypedExpr> {
        self.count.as_ref()
    }

    pub fn offset(&self) -> Option<&TypedExpr> {
        self.offset.as_ref()
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(count) = &self.count {
            parts.push(format!("count={}", count));
        }
        if let Some(offset) = &self.offset {
            parts.push(format!("offset={}", offset));
        }
        write!(f, "Limit: {}", parts.join(" "))
    }
}

// ============ Set ============

#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    op: SetOperator,
    all: bool,
    left: Box<LogicalPlan>,
    right: Box<LogicalPlan>,
}

impl SetOperation {
    /// Both inputs must have the same column count and pairwise compatible
    /// types; the output takes the left schema
    pub fn try_new(
        op: SetOperator,
        all: bool,
        left: LogicalPlan,
        right: LogicalPlan,
    ) -> PlannerResult<Self> {
        let (l, r) = (left.schema(), right.schema());
        let incompatible = |detail: String| PlannerError::SetIncompatibleSchemas {
            op: op.as_str().to_string(),
            detail,
        };
        if l.len() != r.len() {
            return Err(incompatible(format!(
                "left has {} columns, right has {}",
                l.len(),
                r.len()
            )));
        }
        for (i, (lf, rf)) in l.fields().iter().zip(r.fields()).enumerate() {
            if common_type(&lf.data_type, &rf.data_type).is_none() {
                return Err(incompatible(format!(
                    "column {} types {} and {} cannot be matched",
                    i + 1,
                    lf.data_type,
                    rf.data_type
                )));
            }
        }
        Ok(Self {
            op,
            all,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn op(&self) -> SetOperator {
        self.op
    }

    pub fn all(&self) -> bool {
        self.all
    }

    pub fn left(&self) -> &LogicalPlan {
        &self.left
    }

    pub fn right(&self) -> &LogicalPlan {
        &self.right
    }
}

impl fmt::Display for SetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Set: {}", self.op.as_str())?;
        if self.all {
            write!(f, " ALL")?;
        }
        Ok(())
    }
}

// ============ Sort ============

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub expr: TypedExpr,
    /// `None` when no direction was written (ascending)
    pub asc: Option<bool>,
    pub nulls_first: Option<bool>,
}

impl fmt::Display for SortExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        match self.asc {
            Some(true) => write!(f, " ASC")?,
            Some(false) => write!(f, " DESC")?,
            None => {}
        }
        match self.nulls_first {
            Some(true) => write!(f, " NULLS FIRST"),
            Some(false) => write!(f, " NULLS LAST"),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    input: Box<LogicalPlan>,
    order_by: Vec<SortExpr>,
}

impl Sort {
    pub fn try_new(input: LogicalPlan, order_by: Vec<SortExpr>) -> PlannerResult<Self> {
        if order_by.is_empty() {
            return Err(PlannerError::invalid_plan("Sort without keys"));
        }
        Ok(Self {
            input: Box::new(input),
            order_by,
        })
    }

    pub fn input(&self) -> &LogicalPlan {
        &self.input
    }

    pub fn order_by(&self) -> &[SortExpr] {
        &self.order_by
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sort: ")?;
        for (i, key) in self.order_by.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

// ============ Subquery ============

#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    input: Box<LogicalPlan>,
    alias: String,
    schema: Schema,
}

impl Subquery {
    /// Input schema re-qualified with `alias`
    pub fn try_new(input: LogicalPlan, alias: impl Into<String>) -> PlannerResult<Self> {
        let alias = alias.into();
        let schema = input.schema().requalify(&alias)?;
        Ok(Self {
            input: Box::new(input),
            alias,
            schema,
        })
    }

    pub fn input(&self) -> &LogicalPlan {
        &self.input
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl fmt::Display for Subquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subquery: {}", self.alias)
    }
}
