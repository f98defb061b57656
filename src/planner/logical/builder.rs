//! Logical plan builder
//!
//! Converts parsed statements into logical plans. Every expression is typed
//! against the schema of the plan it runs over, and the semantic checks in
//! [`validate`](crate::planner::validate) are applied as each clause is
//! planned.

use std::collections::BTreeMap;

use crate::catalog::{Catalog, DataType};
use crate::planner::config::PlannerConfig;
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::functions::{common_type, FunctionKind, FunctionRegistry};
use crate::planner::schema::{DataSource, Field, Schema};
use crate::planner::validate::{self, Clause};
use crate::sql::{
    Assignment, BinaryOp, ConflictAction, Delete, Expr, FromClause, FunctionCall, Insert,
    InsertSource, JoinType, Literal, OrderByItem, Over, Query, Select, SelectItem, SetExpr,
    Statement, TableRef, UnaryOp, Update, WindowSpec,
};

use super::dml::{
    AssignmentPlan, ConflictPlan, ConflictPlanAction, DeletePlan, InsertInput, InsertPlan,
    StatementPlan, UpdatePlan,
};
use super::expr::{children, qualify, strip_nested, ColumnExpr, TypedExpr};
use super::{
    Aggregate, Distinct, Filter, Join, Limit, LogicalPlan, Projection, Scan, SetOperation, Sort,
    SortExpr, Subquery,
};

/// Name resolution scope: the current input schema plus enclosing queries
#[derive(Clone, Copy)]
struct Scope<'s> {
    schema: &'s Schema,
    outer: Option<&'s Scope<'s>>,
}

impl<'s> Scope<'s> {
    fn new(schema: &'s Schema, outer: Option<&'s Scope<'s>>) -> Self {
        Self { schema, outer }
    }

    /// Field a column reference denotes, and whether it belongs to an
    /// enclosing query
    fn resolve(&self, column: &ColumnExpr) -> PlannerResult<(Field, bool)> {
        if let Some(field) = column.find_in(self.schema)? {
            return Ok((field, false));
        }
        match self.outer {
            Some(outer) => outer.resolve(column).map(|(field, _)| (field, true)),
            None => Err(PlannerError::ColumnNotFound(column.to_string())),
        }
    }
}

/// Output of an Aggregate node, as seen by the clauses above it
struct Grouping {
    /// Group keys, column references qualified
    keys: Vec<Expr>,
    /// Aggregate calls, column references qualified
    calls: Vec<Expr>,
    schema: Schema,
}

impl Grouping {
    fn position(&self, qualified: &Expr) -> Option<usize> {
        self.keys.iter().position(|k| k == qualified).or_else(|| {
            self.calls
                .iter()
                .position(|c| c == qualified)
                .map(|i| self.keys.len() + i)
        })
    }
}

#[derive(Clone, Copy)]
struct ExprContext<'s> {
    scope: Scope<'s>,
    clause: Clause,
    grouping: Option<&'s Grouping>,
    windows: Option<&'s BTreeMap<String, WindowSpec>>,
    in_aggregate: bool,
    in_window: bool,
}

impl<'s> ExprContext<'s> {
    fn new(scope: Scope<'s>, clause: Clause) -> Self {
        Self {
            scope,
            clause,
            grouping: None,
            windows: None,
            in_aggregate: false,
            in_window: false,
        }
    }
}

/// Derived type of a sub-expression
struct Typed {
    data_type: DataType,
    nullable: bool,
    origin: Option<Field>,
}

impl Typed {
    fn new(data_type: DataType, nullable: bool) -> Self {
        Self {
            data_type,
            nullable,
            origin: None,
        }
    }

    fn is_boolean(&self) -> bool {
        matches!(self.data_type, DataType::Boolean | DataType::Unknown)
    }

    fn is_numeric(&self) -> bool {
        self.data_type.is_numeric() || self.data_type.is_unknown()
    }

    fn is_string(&self) -> bool {
        self.data_type.is_string() || self.data_type.is_unknown()
    }
}

/// Builder for logical plans
///
/// One builder plans one statement; CTE bindings and subquery depth are
/// tracked while it descends.
pub struct LogicalPlanBuilder<'a> {
    catalog: &'a Catalog,
    functions: &'a FunctionRegistry,
    config: &'a PlannerConfig,
    /// Visible CTEs, innermost last
    ctes: Vec<(String, LogicalPlan)>,
    depth: usize,
}

impl<'a> LogicalPlanBuilder<'a> {
    pub fn new(
        catalog: &'a Catalog,
        functions: &'a FunctionRegistry,
        config: &'a PlannerConfig,
    ) -> Self {
        Self {
            catalog,
            functions,
            config,
            ctes: Vec::new(),
            depth: 0,
        }
    }

    /// Build the plan of a statement whose parameters are already resolved
    pub fn build(mut self, stmt: &Statement) -> PlannerResult<StatementPlan> {
        match stmt {
            Statement::Query(query) => Ok(StatementPlan::Query(self.build_query(query, None)?)),
            Statement::Insert(insert) => self.build_insert(insert).map(StatementPlan::Insert),
            Statement::Update(update) => self.build_update(update).map(StatementPlan::Update),
            Statement::Delete(delete) => self.build_delete(delete).map(StatementPlan::Delete),
        }
    }

    // ============ Queries ============

    fn build_query(
        &mut self,
        query: &Query,
        outer: Option<&Scope<'_>>,
    ) -> PlannerResult<LogicalPlan> {
        let visible = self.ctes.len();
        let result = self.build_query_body(query, outer);
        self.ctes.truncate(visible);
        result
    }

    fn build_query_body(
        &mut self,
        query: &Query,
        outer: Option<&Scope<'_>>,
    ) -> PlannerResult<LogicalPlan> {
        for (i, cte) in query.ctes.iter().enumerate() {
            if query.ctes[..i].iter().any(|c| c.name == cte.name) {
                return Err(PlannerError::invalid_plan(format!(
                    "WITH query name \"{}\" specified more than once",
                    cte.name
                )));
            }
            let plan = self.build_subquery(&cte.query, outer)?;
            self.ctes.push((cte.name.clone(), plan));
        }

        let mut plan = match &query.body {
            SetExpr::Select(select) => self.build_select(select, &query.order_by, outer)?,
            body => {
                let plan = self.build_set_expr(body, outer)?;
                self.build_output_sort(plan, &query.order_by)?
            }
        };

        if query.limit.is_some() || query.offset.is_some() {
            let empty = Schema::empty();
            let cx = ExprContext::new(Scope::new(&empty, None), Clause::Limit);
            let count = query
                .limit
                .as_ref()
                .map(|e| self.type_expr(e, &cx))
                .transpose()?;
            let offset = query
                .offset
                .as_ref()
                .map(|e| self.type_expr(e, &cx))
                .transpose()?;
            plan = LogicalPlan::Limit(Limit::try_new(plan, count, offset)?);
        }
        Ok(plan)
    }

    fn build_subquery(
        &mut self,
        query: &Query,
        outer: Option<&Scope<'_>>,
    ) -> PlannerResult<LogicalPlan> {
        if self.depth >= self.config.max_subquery_depth {
            return Err(PlannerError::unsupported(format!(
                "subqueries nested deeper than {} levels",
                self.config.max_subquery_depth
            )));
        }
        self.depth += 1;
        let result = self.build_query(query, outer);
        self.depth -= 1;
        result
    }

    fn build_set_expr(
        &mut self,
        body: &SetExpr,
        outer: Option<&Scope<'_>>,
    ) -> PlannerResult<LogicalPlan> {
        match body {
            SetExpr::Select(select) => self.build_select(select, &[], outer),
            SetExpr::Query(query) => self.build_query(query, outer),
            SetExpr::SetOperation {
                op,
                all,
                left,
                right,
            } => {
                let left = self.build_set_expr(left, outer)?;
                let right = self.build_set_expr(right, outer)?;
                Ok(LogicalPlan::Set(SetOperation::try_new(*op, *all, left, right)?))
            }
            SetExpr::Values(_) => Err(PlannerError::unsupported("VALUES outside of INSERT")),
        }
    }

    /// ORDER BY over the output of a set operation
    fn build_output_sort(
        &mut self,
        plan: LogicalPlan,
        order_by: &[OrderByItem],
    ) -> PlannerResult<LogicalPlan> {
        if order_by.is_empty() {
            return Ok(plan);
        }
        let schema = plan.schema().clone();
        let cx = ExprContext::new(Scope::new(&schema, None), Clause::OrderBy);
        let mut keys = Vec::with_capacity(order_by.len());
        for item in order_by {
            let expr = match strip_nested(&item.expr) {
                Expr::Literal(Literal::Integer(n)) => {
                    let field = schema.field(position_index(*n, schema.len(), "ORDER BY")?);
                    output_key(&item.expr, field)
                }
                _ => self.type_expr(&item.expr, &cx)?,
            };
            keys.push(SortExpr {
                expr,
                asc: item.asc,
                nulls_first: item.nulls_first,
            });
        }
        Ok(LogicalPlan::Sort(Sort::try_new(plan, keys)?))
    }

    fn build_select(
        &mut self,
        select: &Select,
        order_by: &[OrderByItem],
        outer: Option<&Scope<'_>>,
    ) -> PlannerResult<LogicalPlan> {
        let windows = validate::window_definitions(&select.windows)?;

        let Some(from) = &select.from else {
            return Err(PlannerError::invalid_plan("SELECT requires a FROM clause"));
        };
        let mut plan = self.build_from(from, outer)?;
        let input_schema = plan.schema().clone();
        let scope = Scope::new(&input_schema, outer);

        if let Some(selection) = &select.selection {
            let predicate = self.type_expr(selection, &ExprContext::new(scope, Clause::Where))?;
            plan = LogicalPlan::Filter(Filter::try_new(plan, predicate)?);
        }

        let items = expand_select_items(&select.projection, &input_schema)?;

        let mut calls = Vec::new();
        for (expr, _) in &items {
            self.collect_aggregates(expr, &mut calls);
        }
        if let Some(having) = &select.having {
            self.collect_aggregates(having, &mut calls);
        }
        for item in order_by {
            self.collect_aggregates(&item.expr, &mut calls);
        }

        let mut grouping = None;
        if !select.group_by.is_empty() || !calls.is_empty() || select.having.is_some() {
            let (aggregate, g) =
                self.build_aggregate(plan, &select.group_by, &calls, &items, scope)?;
            plan = aggregate;
            grouping = Some(g);
        }

        let cx = ExprContext {
            grouping: grouping.as_ref(),
            windows: Some(&windows),
            ..ExprContext::new(scope, Clause::Select)
        };

        if let Some(having) = &select.having {
            let predicate = self.type_expr(
                having,
                &ExprContext {
                    clause: Clause::Having,
                    ..cx
                },
            )?;
            plan = LogicalPlan::Filter(Filter::try_new(plan, predicate)?);
        }

        let mut projected = Vec::with_capacity(items.len());
        for (expr, alias) in &items {
            projected.push((self.type_expr(expr, &cx)?, alias.clone()));
        }
        let output = Schema::new(
            projected
                .iter()
                .map(|(expr, alias)| Projection::output_field(expr, alias.clone()))
                .collect(),
        )?;

        // ORDER BY keys naming output columns sort after the projection;
        // anything else sorts the input, which DISTINCT forbids
        let positions = order_by
            .iter()
            .map(|item| order_by_position(&item.expr, &output, &items, &input_schema))
            .collect::<PlannerResult<Vec<_>>>()?;
        let sort_output = positions.iter().all(Option::is_some);

        if !sort_output {
            if select.distinct {
                return Err(PlannerError::invalid_plan(
                    "for SELECT DISTINCT, ORDER BY expressions must appear in select list",
                ));
            }
            let ocx = ExprContext {
                clause: Clause::OrderBy,
                ..cx
            };
            let mut keys = Vec::with_capacity(order_by.len());
            for (item, position) in order_by.iter().zip(&positions) {
                let expr = match position {
                    Some(i) => projected[*i].0.clone(),
                    None => self.type_expr(&item.expr, &ocx)?,
                };
                keys.push(SortExpr {
                    expr,
                    asc: item.asc,
                    nulls_first: item.nulls_first,
                });
            }
            plan = LogicalPlan::Sort(Sort::try_new(plan, keys)?);
        }

        plan = LogicalPlan::Projection(Projection::try_new(plan, projected)?);
        if select.distinct {
            plan = LogicalPlan::Distinct(Distinct::new(plan));
        }

        if sort_output && !order_by.is_empty() {
            let keys = order_by
                .iter()
                .zip(&positions)
                .filter_map(|(item, position)| {
                    position.map(|i| SortExpr {
                        expr: output_key(&item.expr, output.field(i)),
                        asc: item.asc,
                        nulls_first: item.nulls_first,
                    })
                })
                .collect();
            plan = LogicalPlan::Sort(Sort::try_new(plan, keys)?);
        }
        Ok(plan)
    }

    fn build_from(
        &mut self,
        from: &FromClause,
        outer: Option<&Scope<'_>>,
    ) -> PlannerResult<LogicalPlan> {
        if from.joins.len() > self.config.max_joins {
            return Err(PlannerError::unsupported(format!(
                "{} joins exceed the limit of {}",
                from.joins.len(),
                self.config.max_joins
            )));
        }

        let mut plan = self.build_relation(&from.relation, outer)?;
        for join in &from.joins {
            let right = self.build_relation(&join.relation, outer)?;
            let condition = if join.join_type == JoinType::Cross {
                None
            } else {
                let schema = Join::output_schema(plan.schema(), right.schema(), join.join_type)?;
                let cx = ExprContext::new(Scope::new(&schema, outer), Clause::JoinOn);
                Some(self.type_expr(&join.on, &cx)?)
            };
            plan = LogicalPlan::Join(Join::try_new(plan, right, join.join_type, condition)?);
        }
        Ok(plan)
    }

    fn build_relation(
        &mut self,
        relation: &TableRef,
        outer: Option<&Scope<'_>>,
    ) -> PlannerResult<LogicalPlan> {
        match relation {
            TableRef::Table { name, alias } => {
                if let Some((_, cte)) = self.ctes.iter().rev().find(|(n, _)| n == name) {
                    let reference = alias.as_deref().unwrap_or(name.as_str());
                    return Ok(LogicalPlan::Subquery(Subquery::try_new(cte.clone(), reference)?));
                }
                let catalog = self.catalog;
                let source = catalog
                    .source(name)
                    .ok_or_else(|| PlannerError::UnknownTable(name.clone()))?;
                Ok(LogicalPlan::Scan(Scan::try_new(&source, alias.as_deref(), None)?))
            }
            TableRef::Subquery { query, alias } => {
                let plan = self.build_subquery(query, outer)?;
                Ok(LogicalPlan::Subquery(Subquery::try_new(plan, alias.clone())?))
            }
        }
    }

    fn build_aggregate(
        &mut self,
        input: LogicalPlan,
        group_by: &[Expr],
        calls: &[&Expr],
        items: &[(Expr, Option<String>)],
        scope: Scope<'_>,
    ) -> PlannerResult<(LogicalPlan, Grouping)> {
        let gcx = ExprContext::new(scope, Clause::GroupBy);
        let mut keys = Vec::new();
        let mut group_exprs = Vec::new();
        for expr in group_by {
            let expr = match strip_nested(expr) {
                Expr::Literal(Literal::Integer(n)) => {
                    &items[position_index(*n, items.len(), "GROUP BY")?].0
                }
                _ => expr,
            };
            let key = qualify(expr, scope.schema);
            if keys.contains(&key) {
                continue;
            }
            group_exprs.push(self.type_expr(expr, &gcx)?);
            keys.push(key);
        }

        let acx = ExprContext::new(scope, Clause::Select);
        let mut qualified_calls = Vec::new();
        let mut aggregates = Vec::new();
        for call in calls {
            let key = qualify(call, scope.schema);
            if qualified_calls.contains(&key) {
                continue;
            }
            aggregates.push(self.type_expr(call, &acx)?);
            qualified_calls.push(key);
        }

        let plan = LogicalPlan::Aggregate(Aggregate::try_new(input, group_exprs, aggregates)?);
        let grouping = Grouping {
            keys,
            calls: qualified_calls,
            schema: plan.schema().clone(),
        };
        Ok((plan, grouping))
    }

    /// Aggregate calls in `expr` that are not window calls, outermost only
    fn collect_aggregates<'e>(&self, expr: &'e Expr, out: &mut Vec<&'e Expr>) {
        if let Expr::Function(call) = expr {
            if call.over.is_none()
                && call.schema.is_none()
                && self.functions.is_aggregate(&call.name)
            {
                if !out.contains(&expr) {
                    out.push(expr);
                }
                return;
            }
        }
        for child in children(expr) {
            self.collect_aggregates(child, out);
        }
    }

    // ============ Writes ============

    fn build_insert(&mut self, insert: &Insert) -> PlannerResult<InsertPlan> {
        let catalog = self.catalog;
        let source = catalog
            .source(&insert.table)
            .ok_or_else(|| PlannerError::UnknownTable(insert.table.clone()))?;
        let table = source.table();
        let target = Scan::try_new(&source, insert.alias.as_deref(), None)?;
        let target_schema = target.schema().clone();

        let names: Vec<String> = if insert.columns.is_empty() {
            table.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            insert.columns.clone()
        };
        let mut columns = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(PlannerError::DuplicateColumn(name.clone()));
            }
            let field = ColumnExpr::new(None, name.clone())
                .to_field(&target_schema)
                .map_err(|_| PlannerError::ColumnNotFound(format!("{}.{}", table.name, name)))?;
            columns.push(field);
        }
        validate::check_omitted_columns(table, &names)?;

        let input = match &insert.source {
            InsertSource::Values(rows) => {
                let empty = Schema::empty();
                let cx = ExprContext::new(Scope::new(&empty, None), Clause::Values);
                let mut typed_rows = Vec::with_capacity(rows.len());
                for row in rows {
                    if row.len() != columns.len() {
                        return Err(PlannerError::invalid_plan(format!(
                            "INSERT has {} target columns but {} expressions",
                            columns.len(),
                            row.len()
                        )));
                    }
                    let mut typed = Vec::with_capacity(row.len());
                    for (column, value) in columns.iter().zip(row) {
                        validate::check_not_null(column, value)?;
                        let value = self.type_expr(value, &cx)?;
                        validate::check_assignable(column, &value)?;
                        typed.push(value);
                    }
                    typed_rows.push(typed);
                }
                InsertInput::Values(typed_rows)
            }
            InsertSource::Query(query) => {
                let plan = self.build_query(query, None)?;
                let produced = plan.schema();
                if produced.len() != columns.len() {
                    return Err(PlannerError::invalid_plan(format!(
                        "INSERT has {} target columns but the query returns {}",
                        columns.len(),
                        produced.len()
                    )));
                }
                for (column, field) in columns.iter().zip(produced.fields()) {
                    if !column.data_type.is_compatible(&field.data_type) {
                        return Err(PlannerError::type_mismatch(format!(
                            "column {} is of type {} but query column {} is of type {}",
                            column.name, column.data_type, field.name, field.data_type
                        )));
                    }
                }
                InsertInput::Query(Box::new(plan))
            }
        };

        let on_conflict = match &insert.on_conflict {
            None => None,
            Some(on_conflict) => {
                validate::check_conflict_arbiter(&source, on_conflict)?;
                let action = match &on_conflict.action {
                    ConflictAction::DoNothing => ConflictPlanAction::DoNothing,
                    ConflictAction::DoUpdate {
                        assignments,
                        selection,
                    } => {
                        let excluded = source.schema().requalify("excluded")?;
                        let schema = target_schema.join(&excluded)?;
                        let scope = Scope::new(&schema, None);
                        let assignments =
                            self.build_assignments(assignments, &target_schema, scope)?;
                        let predicate = match selection {
                            Some(selection) => Some(self.predicate(
                                selection,
                                &ExprContext::new(scope, Clause::ConflictWhere),
                            )?),
                            None => None,
                        };
                        ConflictPlanAction::DoUpdate {
                            assignments,
                            predicate,
                        }
                    }
                };
                Some(ConflictPlan {
                    target: on_conflict.target.clone(),
                    action,
                })
            }
        };

        Ok(InsertPlan {
            table: insert.table.clone(),
            columns,
            input,
            on_conflict,
        })
    }

    fn build_update(&mut self, update: &Update) -> PlannerResult<UpdatePlan> {
        validate::check_write_sources("UPDATE", update.from.is_some(), update.selection.is_some())?;
        let (input, target_schema) = self.build_write_input(
            &update.table,
            update.alias.as_deref(),
            update.from.as_ref(),
            update.selection.as_ref(),
        )?;
        let schema = input.schema().clone();
        let assignments =
            self.build_assignments(&update.assignments, &target_schema, Scope::new(&schema, None))?;
        Ok(UpdatePlan {
            table: update.table.clone(),
            input,
            assignments,
        })
    }

    fn build_delete(&mut self, delete: &Delete) -> PlannerResult<DeletePlan> {
        validate::check_write_sources(
            "DELETE",
            delete.using.is_some(),
            delete.selection.is_some(),
        )?;
        let (input, _) = self.build_write_input(
            &delete.table,
            delete.alias.as_deref(),
            delete.using.as_ref(),
            delete.selection.as_ref(),
        )?;
        Ok(DeletePlan {
            table: delete.table.clone(),
            input,
        })
    }

    /// Target scan, cross joined with any extra sources, then filtered.
    /// Returns the plan and the target's own schema.
    fn build_write_input(
        &mut self,
        table: &str,
        alias: Option<&str>,
        sources: Option<&FromClause>,
        selection: Option<&Expr>,
    ) -> PlannerResult<(LogicalPlan, Schema)> {
        let catalog = self.catalog;
        let source = catalog
            .source(table)
            .ok_or_else(|| PlannerError::UnknownTable(table.to_string()))?;
        let target = Scan::try_new(&source, alias, None)?;
        let target_schema = target.schema().clone();

        let mut plan = LogicalPlan::Scan(target);
        if let Some(from) = sources {
            let sources = self.build_from(from, None)?;
            plan = LogicalPlan::Join(Join::try_new(plan, sources, JoinType::Cross, None)?);
        }
        if let Some(selection) = selection {
            let schema = plan.schema().clone();
            let cx = ExprContext::new(Scope::new(&schema, None), Clause::Where);
            let predicate = self.type_expr(selection, &cx)?;
            plan = LogicalPlan::Filter(Filter::try_new(plan, predicate)?);
        }
        Ok((plan, target_schema))
    }

    fn build_assignments(
        &mut self,
        assignments: &[Assignment],
        target: &Schema,
        scope: Scope<'_>,
    ) -> PlannerResult<Vec<AssignmentPlan>> {
        let cx = ExprContext::new(scope, Clause::Set);
        let mut planned: Vec<AssignmentPlan> = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let column = target
                .fields()
                .iter()
                .find(|f| f.name == assignment.column)
                .cloned()
                .ok_or_else(|| PlannerError::ColumnNotFound(assignment.column.clone()))?;
            if planned.iter().any(|a| a.column.name == column.name) {
                return Err(PlannerError::DuplicateColumn(column.name));
            }
            validate::check_not_null(&column, &assignment.value)?;
            let value = self.type_expr(&assignment.value, &cx)?;
            validate::check_assignable(&column, &value)?;
            planned.push(AssignmentPlan { column, value });
        }
        Ok(planned)
    }

    // ============ Expressions ============

    fn type_expr(&mut self, expr: &Expr, cx: &ExprContext<'_>) -> PlannerResult<TypedExpr> {
        let mut subqueries = Vec::new();
        let typed = self.infer(expr, cx, &mut subqueries)?;
        Ok(TypedExpr {
            expr: expr.clone(),
            data_type: typed.data_type,
            nullable: typed.nullable,
            origin: typed.origin,
            subqueries,
        })
    }

    /// Typed boolean condition
    fn predicate(&mut self, expr: &Expr, cx: &ExprContext<'_>) -> PlannerResult<TypedExpr> {
        let typed = self.type_expr(expr, cx)?;
        if !typed.is_boolean() {
            return Err(PlannerError::type_mismatch(format!(
                "argument of {} must be type BOOLEAN, not type {}",
                cx.clause, typed.data_type
            )));
        }
        Ok(typed)
    }

    fn infer(
        &mut self,
        expr: &Expr,
        cx: &ExprContext<'_>,
        subs: &mut Vec<LogicalPlan>,
    ) -> PlannerResult<Typed> {
        if let Some(grouping) = cx.grouping {
            if let Some(i) = grouping.position(&qualify(expr, cx.scope.schema)) {
                let field = grouping.schema.field(i);
                return Ok(Typed {
                    data_type: field.data_type.clone(),
                    nullable: field.nullable,
                    origin: matches!(expr, Expr::Column { .. }).then(|| field.clone()),
                });
            }
        }

        match expr {
            Expr::Column { relation, name } => {
                let column = ColumnExpr::new(relation.clone(), name.clone());
                let (field, outer) = cx.scope.resolve(&column)?;
                if cx.grouping.is_some() && !outer {
                    return Err(PlannerError::IllegalAggregate(format!(
                        "column {} must appear in the GROUP BY clause \
                         or be used in an aggregate function",
                        field.qualified_name()
                    )));
                }
                Ok(Typed {
                    data_type: field.data_type.clone(),
                    nullable: field.nullable,
                    origin: Some(field),
                })
            }
            Expr::Literal(literal) => Ok(Typed::new(
                literal.data_type(),
                matches!(literal, Literal::Null),
            )),
            Expr::Parameter(_) => Ok(Typed::new(DataType::Unknown, true)),
            Expr::Placeholder(raw) => Err(PlannerError::invalid_plan(format!(
                "unresolved parameter {}",
                raw
            ))),
            Expr::BinaryOp { left, op, right } => {
                let l = self.infer(left, cx, subs)?;
                let r = self.infer(right, cx, subs)?;
                let data_type = binary_type(*op, &l, &r)?;
                Ok(Typed::new(data_type, l.nullable || r.nullable))
            }
            Expr::UnaryOp { op, expr: inner } => {
                let t = self.infer(inner, cx, subs)?;
                match op {
                    UnaryOp::Not if !t.is_boolean() => Err(PlannerError::type_mismatch(format!(
                        "argument of NOT must be type BOOLEAN, not type {}",
                        t.data_type
                    ))),
                    UnaryOp::Not => Ok(Typed::new(DataType::Boolean, t.nullable)),
                    UnaryOp::Neg if !t.is_numeric() => Err(PlannerError::type_mismatch(format!(
                        "operator does not exist: - {}",
                        t.data_type
                    ))),
                    UnaryOp::Neg => Ok(Typed::new(t.data_type, t.nullable)),
                }
            }
            Expr::Operator { left, right, .. } => {
                if let Some(left) = left {
                    self.infer(left, cx, subs)?;
                }
                self.infer(right, cx, subs)?;
                Ok(Typed::new(DataType::Unknown, true))
            }
            Expr::Function(call) => self.infer_function(call, cx, subs),
            Expr::IsNull { expr: inner, .. } => {
                self.infer(inner, cx, subs)?;
                Ok(Typed::new(DataType::Boolean, false))
            }
            Expr::InList {
                expr: inner, list, ..
            } => {
                let t = self.infer(inner, cx, subs)?;
                let mut nullable = t.nullable;
                for item in list {
                    let it = self.infer(item, cx, subs)?;
                    if !t.data_type.is_compatible(&it.data_type) {
                        return Err(PlannerError::type_mismatch(format!(
                            "IN list item of type {} does not match {}",
                            it.data_type, t.data_type
                        )));
                    }
                    nullable |= it.nullable;
                }
                Ok(Typed::new(DataType::Boolean, nullable))
            }
            Expr::InSubquery {
                expr: inner, query, ..
            } => {
                let t = self.infer(inner, cx, subs)?;
                let plan = self.build_expr_subquery(query, cx)?;
                let field = single_column(&plan)?;
                if !t.data_type.is_compatible(&field.data_type) {
                    return Err(PlannerError::type_mismatch(format!(
                        "IN subquery returns {}, expected {}",
                        field.data_type, t.data_type
                    )));
                }
                subs.push(plan);
                Ok(Typed::new(DataType::Boolean, true))
            }
            Expr::Between {
                expr: inner,
                low,
                high,
                ..
            } => {
                let t = self.infer(inner, cx, subs)?;
                let lo = self.infer(low, cx, subs)?;
                let hi = self.infer(high, cx, subs)?;
                for bound in [&lo, &hi] {
                    if !t.data_type.is_compatible(&bound.data_type) {
                        return Err(PlannerError::type_mismatch(format!(
                            "BETWEEN bound of type {} does not match {}",
                            bound.data_type, t.data_type
                        )));
                    }
                }
                Ok(Typed::new(
                    DataType::Boolean,
                    t.nullable || lo.nullable || hi.nullable,
                ))
            }
            Expr::Like {
                expr: inner,
                pattern,
                ..
            } => {
                let t = self.infer(inner, cx, subs)?;
                let p = self.infer(pattern, cx, subs)?;
                if !t.is_string() || !p.is_string() {
                    return Err(PlannerError::type_mismatch(format!(
                        "operator does not exist: {} LIKE {}",
                        t.data_type, p.data_type
                    )));
                }
                Ok(Typed::new(DataType::Boolean, t.nullable || p.nullable))
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                let operand = match operand {
                    Some(operand) => Some(self.infer(operand, cx, subs)?),
                    None => None,
                };
                let mut result_type = DataType::Unknown;
                let mut nullable = else_result.is_none();
                for (condition, result) in branches {
                    let c = self.infer(condition, cx, subs)?;
                    match &operand {
                        Some(op) if !op.data_type.is_compatible(&c.data_type) => {
                            return Err(PlannerError::type_mismatch(format!(
                                "CASE operand of type {} cannot match WHEN of type {}",
                                op.data_type, c.data_type
                            )));
                        }
                        None if !c.is_boolean() => {
                            return Err(PlannerError::type_mismatch(format!(
                                "argument of CASE/WHEN must be type BOOLEAN, not type {}",
                                c.data_type
                            )));
                        }
                        _ => {}
                    }
                    let r = self.infer(result, cx, subs)?;
                    result_type = merge_case_type(&result_type, &r.data_type)?;
                    nullable |= r.nullable;
                }
                if let Some(else_result) = else_result {
                    let r = self.infer(else_result, cx, subs)?;
                    result_type = merge_case_type(&result_type, &r.data_type)?;
                    nullable |= r.nullable;
                }
                Ok(Typed::new(result_type, nullable))
            }
            Expr::Cast {
                expr: inner,
                data_type,
            } => {
                let t = self.infer(inner, cx, subs)?;
                Ok(Typed::new(data_type.clone(), t.nullable))
            }
            Expr::Subquery(query) => {
                let plan = self.build_expr_subquery(query, cx)?;
                let data_type = single_column(&plan)?.data_type.clone();
                subs.push(plan);
                Ok(Typed::new(data_type, true))
            }
            Expr::Exists { query, .. } => {
                let plan = self.build_expr_subquery(query, cx)?;
                subs.push(plan);
                Ok(Typed::new(DataType::Boolean, false))
            }
            Expr::Nested(inner) => self.infer(inner, cx, subs),
        }
    }

    fn infer_function(
        &mut self,
        call: &FunctionCall,
        cx: &ExprContext<'_>,
        subs: &mut Vec<LogicalPlan>,
    ) -> PlannerResult<Typed> {
        if let Some(schema) = &call.schema {
            return Err(PlannerError::FunctionDoesNotExist(format!(
                "{}.{}",
                schema, call.name
            )));
        }
        let name = call.name.as_str();
        let functions = self.functions;
        let signature = functions.lookup(name)?;

        let arg_cx = match (&call.over, signature.kind) {
            (Some(_), FunctionKind::Scalar) => {
                return Err(PlannerError::InvalidWindowFunction(format!(
                    "OVER specified, but {} is not a window function nor an aggregate function",
                    name
                )));
            }
            (Some(over), _) => {
                validate::check_window(cx.clause, name, cx.in_window, cx.in_aggregate)?;
                match cx.windows {
                    Some(windows) => validate::check_over(over, windows)?,
                    None => validate::check_over(over, &BTreeMap::new())?,
                }
                ExprContext {
                    in_window: true,
                    ..*cx
                }
            }
            (None, FunctionKind::Window) => return Err(validate::window_requires_over(name)),
            (None, FunctionKind::Aggregate) => {
                validate::check_aggregate(cx.clause, name, cx.in_aggregate)?;
                ExprContext {
                    grouping: None,
                    in_aggregate: true,
                    ..*cx
                }
            }
            (None, FunctionKind::Scalar) => {
                if call.distinct || call.filter.is_some() {
                    return Err(PlannerError::invalid_plan(format!(
                        "DISTINCT or FILTER specified, but {} is not an aggregate function",
                        name
                    )));
                }
                *cx
            }
        };

        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            let t = self.infer(arg, &arg_cx, subs)?;
            args.push((t.data_type, t.nullable));
        }
        if let Some(filter) = &call.filter {
            let t = self.infer(filter, &arg_cx, subs)?;
            if !t.is_boolean() {
                return Err(PlannerError::type_mismatch(format!(
                    "argument of FILTER must be type BOOLEAN, not type {}",
                    t.data_type
                )));
            }
        }
        if let Some(Over::Spec(spec)) = &call.over {
            for expr in &spec.partition_by {
                self.infer(expr, &arg_cx, subs)?;
            }
            for item in &spec.order_by {
                self.infer(&item.expr, &arg_cx, subs)?;
            }
        }

        let (data_type, nullable) = signature.resolve(&args, call.star)?;
        Ok(Typed::new(data_type, nullable))
    }

    /// Plan a subquery appearing in an expression, with the current scope
    /// visible to it
    fn build_expr_subquery(
        &mut self,
        query: &Query,
        cx: &ExprContext<'_>,
    ) -> PlannerResult<LogicalPlan> {
        let outer = cx.scope;
        self.build_subquery(query, Some(&outer))
    }
}

fn binary_type(op: BinaryOp, l: &Typed, r: &Typed) -> PlannerResult<DataType> {
    if op.is_comparison() {
        if !l.data_type.is_compatible(&r.data_type) {
            return Err(PlannerError::type_mismatch(format!(
                "operator does not exist: {} {} {}",
                l.data_type,
                op.as_str(),
                r.data_type
            )));
        }
        return Ok(DataType::Boolean);
    }
    if op.is_logical() {
        if let Some(side) = [l, r].into_iter().find(|t| !t.is_boolean()) {
            return Err(PlannerError::type_mismatch(format!(
                "argument of {} must be type BOOLEAN, not type {}",
                op.as_str(),
                side.data_type
            )));
        }
        return Ok(DataType::Boolean);
    }
    if op == BinaryOp::Concat {
        return Ok(DataType::Text);
    }
    match common_type(&l.data_type, &r.data_type) {
        Some(t) if l.is_numeric() && r.is_numeric() => Ok(t),
        _ => Err(PlannerError::type_mismatch(format!(
            "operator does not exist: {} {} {}",
            l.data_type,
            op.as_str(),
            r.data_type
        ))),
    }
}

fn merge_case_type(current: &DataType, next: &DataType) -> PlannerResult<DataType> {
    common_type(current, next).ok_or_else(|| {
        PlannerError::type_mismatch(format!(
            "CASE types {} and {} cannot be matched",
            current, next
        ))
    })
}

fn single_column(plan: &LogicalPlan) -> PlannerResult<&Field> {
    let schema = plan.schema();
    if schema.len() != 1 {
        return Err(PlannerError::invalid_plan(format!(
            "subquery must return only one column, got {}",
            schema.len()
        )));
    }
    Ok(schema.field(0))
}

/// Zero-based index of a 1-based ordinal reference
fn position_index(n: i64, len: usize, clause: &str) -> PlannerResult<usize> {
    match usize::try_from(n) {
        Ok(i) if i >= 1 && i <= len => Ok(i - 1),
        _ => Err(PlannerError::invalid_plan(format!(
            "{} position {} is not in select list",
            clause, n
        ))),
    }
}

/// Sort key over an output column, displayed as written
fn output_key(written: &Expr, field: &Field) -> TypedExpr {
    TypedExpr {
        expr: written.clone(),
        ..TypedExpr::column(field)
    }
}

/// Output column an ORDER BY key refers to, if any: an ordinal, an output
/// name, or an expression that also appears in the select list
fn order_by_position(
    expr: &Expr,
    output: &Schema,
    items: &[(Expr, Option<String>)],
    input: &Schema,
) -> PlannerResult<Option<usize>> {
    match strip_nested(expr) {
        Expr::Literal(Literal::Integer(n)) => {
            return position_index(*n, output.len(), "ORDER BY").map(Some);
        }
        Expr::Column {
            relation: None,
            name,
        } => {
            let matches: Vec<usize> = output
                .fields()
                .iter()
                .enumerate()
                .filter(|(_, f)| &f.name == name)
                .map(|(i, _)| i)
                .collect();
            match matches.as_slice() {
                [i] => return Ok(Some(*i)),
                [] => {}
                _ => return Err(PlannerError::AmbiguousColumn(name.clone())),
            }
        }
        _ => {}
    }
    let wanted = qualify(expr, input);
    Ok(items
        .iter()
        .position(|(item, _)| qualify(item, input) == wanted))
}

fn expand_select_items(
    projection: &[SelectItem],
    input: &Schema,
) -> PlannerResult<Vec<(Expr, Option<String>)>> {
    let column = |f: &Field| {
        (
            Expr::Column {
                relation: f.relation.clone(),
                name: f.name.clone(),
            },
            None,
        )
    };
    let mut items = Vec::new();
    for item in projection {
        match item {
            SelectItem::Expr { expr, alias } => items.push((expr.clone(), alias.clone())),
            SelectItem::Wildcard => items.extend(input.fields().iter().map(column)),
            SelectItem::QualifiedWildcard(relation) => {
                if !input.has_relation(relation) {
                    return Err(PlannerError::UnknownTable(relation.clone()));
                }
                items.extend(
                    input
                        .fields()
                        .iter()
                        .filter(|f| f.relation.as_deref() == Some(relation.as_str()))
                        .map(column),
                );
            }
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::error::ErrorKind;
    use crate::planner::test_utils::test_catalog;
    use crate::sql::Parser;

    fn build(sql: &str) -> PlannerResult<StatementPlan> {
        build_with(sql, &PlannerConfig::default())
    }

    fn build_with(sql: &str, config: &PlannerConfig) -> PlannerResult<StatementPlan> {
        let catalog = test_catalog();
        let functions = FunctionRegistry::new();
        let stmt = Parser::parse_one(sql)?;
        LogicalPlanBuilder::new(&catalog, &functions, config).build(&stmt)
    }

    fn query(sql: &str) -> LogicalPlan {
        match build(sql).unwrap() {
            StatementPlan::Query(plan) => plan,
            other => panic!("Expected query plan, got {:?}", other),
        }
    }

    fn error_kind(sql: &str) -> ErrorKind {
        build(sql).unwrap_err().kind()
    }

    fn field_names(plan: &LogicalPlan) -> Vec<String> {
        plan.schema()
            .fields()
            .iter()
            .map(|f| f.qualified_name())
            .collect()
    }

    #[test]
    fn test_build_simple_select() {
        let plan = query("SELECT id, name FROM users");
        match &plan {
            LogicalPlan::Projection(p) => {
                assert_eq!(p.exprs().len(), 2);
                assert!(matches!(p.input(), LogicalPlan::Scan(_)));
            }
            other => panic!("Expected Projection, got {:?}", other),
        }
        assert_eq!(field_names(&plan), vec!["users.id", "users.name"]);
        assert!(!plan.schema().field(0).nullable);
    }

    #[test]
    fn test_build_select_with_filter() {
        let plan = query("SELECT name FROM users WHERE age > 18");
        let LogicalPlan::Projection(p) = &plan else {
            panic!("Expected Projection");
        };
        assert!(matches!(p.input(), LogicalPlan::Filter(_)));
    }

    #[test]
    fn test_select_star_expands() {
        let plan = query("SELECT * FROM users u");
        assert_eq!(
            field_names(&plan),
            vec!["u.id", "u.name", "u.age", "u.email"]
        );
    }

    #[test]
    fn test_qualified_wildcard_unknown_relation() {
        assert_eq!(error_kind("SELECT x.* FROM users"), ErrorKind::UnknownTable);
    }

    #[test]
    fn test_aliased_expression_names_output() {
        let plan = query("SELECT age + 1 AS next_age, upper(name) FROM users");
        let schema = plan.schema();
        assert_eq!(schema.field(0).name, "next_age");
        assert_eq!(schema.field(0).data_type, DataType::BigInt);
        assert_eq!(schema.field(1).name, "upper ( \"name\" )");
    }

    #[test]
    fn test_join_schema_and_nullability() {
        let plan = query(
            "SELECT u.id, o.id, o.amount FROM users u LEFT JOIN orders o ON u.id = o.user_id",
        );
        assert_eq!(field_names(&plan), vec!["u.id", "o.id", "o.amount"]);
        assert!(!plan.schema().field(0).nullable);
        assert!(plan.schema().field(1).nullable);
    }

    #[test]
    fn test_ambiguous_and_missing_columns() {
        assert_eq!(
            error_kind("SELECT id FROM users JOIN orders ON users.id = orders.user_id"),
            ErrorKind::AmbiguousColumn
        );
        assert_eq!(error_kind("SELECT nope FROM users"), ErrorKind::ColumnNotFound);
        assert_eq!(error_kind("SELECT * FROM missing"), ErrorKind::UnknownTable);
    }

    #[test]
    fn test_too_many_joins() {
        let config = PlannerConfig::new().with_max_joins(1);
        let err = build_with(
            "SELECT 1 FROM users a JOIN users b ON a.id = b.id JOIN users c ON b.id = c.id",
            &config,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_group_by_and_having() {
        let plan = query(
            "SELECT age, count(*) AS n FROM users GROUP BY age HAVING count(*) > 1 ORDER BY n DESC",
        );
        let LogicalPlan::Sort(sort) = &plan else {
            panic!("Expected Sort, got {:?}", plan);
        };
        let LogicalPlan::Projection(p) = sort.input() else {
            panic!("Expected Projection");
        };
        let LogicalPlan::Filter(having) = p.input() else {
            panic!("Expected HAVING filter");
        };
        let LogicalPlan::Aggregate(agg) = having.input() else {
            panic!("Expected Aggregate");
        };
        assert_eq!(agg.group_by().len(), 1);
        // count(*) in SELECT and HAVING is computed once
        assert_eq!(agg.aggregates().len(), 1);
        assert_eq!(field_names(&plan), vec!["users.age", "n"]);
        assert!(!plan.schema().field(1).nullable);
    }

    #[test]
    fn test_ungrouped_column_rejected() {
        assert_eq!(
            error_kind("SELECT name, count(*) FROM users GROUP BY age"),
            ErrorKind::IllegalAggregate
        );
        assert_eq!(
            error_kind("SELECT id FROM users WHERE count(*) > 1"),
            ErrorKind::IllegalAggregate
        );
        assert_eq!(
            error_kind("SELECT sum(count(*)) FROM users"),
            ErrorKind::IllegalAggregate
        );
    }

    #[test]
    fn test_group_by_position() {
        let plan = query("SELECT age, count(*) FROM users GROUP BY 1");
        assert_eq!(plan.schema().len(), 2);
        assert_eq!(
            error_kind("SELECT age FROM users GROUP BY 3"),
            ErrorKind::InvalidPlan
        );
    }

    #[test]
    fn test_window_functions() {
        let plan = query(
            "SELECT id, row_number() OVER w AS rn FROM users WINDOW w AS (ORDER BY age)",
        );
        assert_eq!(plan.schema().field(1).data_type, DataType::BigInt);

        assert_eq!(
            error_kind("SELECT row_number() FROM users"),
            ErrorKind::IllegalWindowFunction
        );
        assert_eq!(
            error_kind("SELECT lower(name) OVER () FROM users"),
            ErrorKind::InvalidWindowFunction
        );
        assert_eq!(
            error_kind("SELECT rank() OVER missing FROM users"),
            ErrorKind::WindowNotDefined
        );
        assert_eq!(
            error_kind("SELECT id FROM users WHERE rank() OVER () > 1"),
            ErrorKind::IllegalWindowFunction
        );
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            error_kind("SELECT frobnicate(id) FROM users"),
            ErrorKind::FunctionDoesNotExist
        );
    }

    #[test]
    fn test_order_by_input_column() {
        let plan = query("SELECT name FROM users ORDER BY age");
        let LogicalPlan::Projection(p) = &plan else {
            panic!("Expected Projection on top, got {:?}", plan);
        };
        assert!(matches!(p.input(), LogicalPlan::Sort(_)));

        assert_eq!(
            error_kind("SELECT DISTINCT name FROM users ORDER BY age"),
            ErrorKind::InvalidPlan
        );
    }

    #[test]
    fn test_order_by_position_and_limit() {
        let plan = query("SELECT name FROM users ORDER BY 1 LIMIT 10 OFFSET 5");
        let LogicalPlan::Limit(limit) = &plan else {
            panic!("Expected Limit, got {:?}", plan);
        };
        assert!(matches!(limit.input(), LogicalPlan::Sort(_)));
        assert!(limit.count().is_some());
        assert!(limit.offset().is_some());

        assert_eq!(
            error_kind("SELECT name FROM users LIMIT 'ten'"),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn test_set_operations() {
        let plan = query("SELECT id FROM users UNION ALL SELECT user_id FROM orders ORDER BY 1");
        assert!(matches!(plan, LogicalPlan::Sort(_)));
        assert_eq!(field_names(&plan), vec!["users.id"]);

        assert_eq!(
            error_kind("SELECT id, name FROM users UNION SELECT id FROM orders"),
            ErrorKind::SetIncompatibleSchemas
        );
        assert_eq!(
            error_kind("SELECT name FROM users EXCEPT SELECT amount FROM orders"),
            ErrorKind::SetIncompatibleSchemas
        );
    }

    #[test]
    fn test_derived_table_and_cte() {
        let plan = query("SELECT t.n FROM (SELECT count(*) AS n FROM orders) AS t");
        assert_eq!(field_names(&plan), vec!["t.n"]);

        let plan = query(
            "WITH big AS (SELECT user_id FROM orders WHERE amount > 100) \
             SELECT u.name FROM users u JOIN big ON u.id = big.user_id",
        );
        assert_eq!(field_names(&plan), vec!["u.name"]);

        assert_eq!(
            error_kind("WITH a AS (SELECT 1 FROM users), a AS (SELECT 2 FROM users) SELECT * FROM a"),
            ErrorKind::InvalidPlan
        );
    }

    #[test]
    fn test_correlated_subquery() {
        let plan = query(
            "SELECT name FROM users u WHERE EXISTS (SELECT 1 FROM orders o WHERE o.user_id = u.id)",
        );
        let LogicalPlan::Projection(p) = &plan else {
            panic!("Expected Projection");
        };
        let LogicalPlan::Filter(filter) = p.input() else {
            panic!("Expected Filter");
        };
        assert_eq!(filter.predicate().subqueries.len(), 1);

        assert_eq!(
            error_kind("SELECT name FROM users WHERE id IN (SELECT id, user_id FROM orders)"),
            ErrorKind::InvalidPlan
        );
    }

    #[test]
    fn test_subquery_depth_limit() {
        let config = PlannerConfig::new().with_max_subquery_depth(1);
        let sql = "SELECT id FROM users WHERE id IN \
                   (SELECT user_id FROM orders WHERE id IN (SELECT id FROM orders))";
        assert_eq!(
            build_with(sql, &config).unwrap_err().kind(),
            ErrorKind::Unsupported
        );
    }

    #[test]
    fn test_select_without_from() {
        assert_eq!(error_kind("SELECT 1"), ErrorKind::InvalidPlan);
    }

    #[test]
    fn test_type_mismatch() {
        assert_eq!(
            error_kind("SELECT id FROM users WHERE name + 1 > 2"),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            error_kind("SELECT id FROM users WHERE age"),
            ErrorKind::TypeMismatch
        );
    }

    #[test]
    fn test_build_insert() {
        let sql = "INSERT INTO users (id, name) VALUES (1, 'alice'), (2, 'bob')";
        let plan = match build(sql).unwrap() {
            StatementPlan::Insert(insert) => insert,
            other => panic!("Expected Insert, got {:?}", other),
        };
        assert_eq!(plan.table, "users");
        assert_eq!(plan.columns.len(), 2);
        let InsertInput::Values(rows) = &plan.input else {
            panic!("Expected VALUES input");
        };
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_insert_checks() {
        assert_eq!(
            error_kind("INSERT INTO users (id, id) VALUES (1, 2)"),
            ErrorKind::DuplicateColumn
        );
        assert_eq!(
            error_kind("INSERT INTO users (name) VALUES ('x')"),
            ErrorKind::NotNullableColumn
        );
        assert_eq!(
            error_kind("INSERT INTO users (id, name) VALUES (NULL, 'x')"),
            ErrorKind::NotNullableColumn
        );
        assert_eq!(
            error_kind("INSERT INTO users (id, name) VALUES (1)"),
            ErrorKind::InvalidPlan
        );
        assert_eq!(
            error_kind("INSERT INTO users (id, name) VALUES ('one', 'x')"),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            error_kind("INSERT INTO users (id, nope) VALUES (1, 2)"),
            ErrorKind::ColumnNotFound
        );
        // status has a default, so it may be left out
        assert!(build("INSERT INTO orders (id, user_id) VALUES (1, 1)").is_ok());
    }

    #[test]
    fn test_insert_from_query() {
        let plan = build("INSERT INTO orders (id, user_id) SELECT id, age FROM users").unwrap();
        let StatementPlan::Insert(insert) = plan else {
            panic!("Expected Insert");
        };
        assert!(matches!(insert.input, InsertInput::Query(_)));
    }

    #[test]
    fn test_on_conflict() {
        assert!(build(
            "INSERT INTO users (id, email) VALUES (1, 'a@b') \
             ON CONFLICT (email) DO UPDATE SET name = excluded.name WHERE users.age > 1"
        )
        .is_ok());
        assert!(build("INSERT INTO users (id) VALUES (1) ON CONFLICT DO NOTHING").is_ok());
        assert_eq!(
            error_kind("INSERT INTO users (id) VALUES (1) ON CONFLICT (name) DO NOTHING"),
            ErrorKind::IllegalConflictArbiter
        );
        assert_eq!(
            error_kind("INSERT INTO users (id) VALUES (1) ON CONFLICT DO UPDATE SET name = 'x'"),
            ErrorKind::IllegalConflictArbiter
        );
    }

    #[test]
    fn test_build_update() {
        let plan = match build("UPDATE users SET name = 'x', age = age + 1 WHERE id = 1").unwrap() {
            StatementPlan::Update(update) => update,
            other => panic!("Expected Update, got {:?}", other),
        };
        assert_eq!(plan.assignments.len(), 2);
        assert!(matches!(plan.input, LogicalPlan::Filter(_)));

        assert_eq!(
            error_kind("UPDATE users SET name = 'a', name = 'b'"),
            ErrorKind::DuplicateColumn
        );
        assert_eq!(
            error_kind("UPDATE users SET id = NULL"),
            ErrorKind::NotNullableColumn
        );
    }

    #[test]
    fn test_update_from_requires_where() {
        assert_eq!(
            error_kind("UPDATE users SET name = o.status FROM orders o"),
            ErrorKind::UpdateOrDeleteWithoutWhere
        );
        let plan = build(
            "UPDATE users SET name = o.status FROM orders o WHERE users.id = o.user_id",
        )
        .unwrap();
        let StatementPlan::Update(update) = plan else {
            panic!("Expected Update");
        };
        let LogicalPlan::Filter(filter) = &update.input else {
            panic!("Expected Filter");
        };
        assert!(matches!(filter.input(), LogicalPlan::Join(_)));

        // single-table writes may omit WHERE
        assert!(build("UPDATE users SET age = 1").is_ok());
    }

    #[test]
    fn test_build_delete() {
        assert!(matches!(
            build("DELETE FROM users WHERE id = 1").unwrap(),
            StatementPlan::Delete(_)
        ));
        assert_eq!(
            error_kind("DELETE FROM users USING orders"),
            ErrorKind::UpdateOrDeleteWithoutWhere
        );
        assert!(build("DELETE FROM users USING orders o WHERE users.id = o.user_id").is_ok());
    }
}
