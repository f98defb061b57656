//! EXPLAIN output formatting
//!
//! Renders a logical plan as an indented tree: one line per node, children
//! two spaces deeper than their parent. Plans of subqueries nested in a
//! node's expressions are listed under a `subquery:` label.

use crate::planner::logical::{
    Aggregate, Distinct, Filter, InsertInput, Join, Limit, LogicalPlan, Projection, Scan,
    SetOperation, Sort, StatementPlan, Subquery,
};
use crate::planner::visitor::PlanVisitor;

/// Visitor that accumulates explain text
#[derive(Debug, Default)]
pub struct ExplainVisitor {
    depth: usize,
    out: String,
}

impl ExplainVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(&"  ".repeat(self.depth));
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn child(&mut self, plan: &LogicalPlan) {
        self.depth += 1;
        plan.accept(self);
        self.depth -= 1;
    }

    /// Plans of subqueries nested in the current node's expressions
    fn expression_subqueries<'p>(&mut self, plans: impl Iterator<Item = &'p LogicalPlan>) {
        self.depth += 1;
        for plan in plans {
            self.line("subquery:");
            self.child(plan);
        }
        self.depth -= 1;
    }
}

impl PlanVisitor for ExplainVisitor {
    type Output = ();

    fn visit_scan(&mut self, scan: &Scan) {
        self.line(&scan.to_string());
    }

    fn visit_filter(&mut self, filter: &Filter) {
        self.line(&filter.to_string());
        self.expression_subqueries(filter.predicate().subqueries.iter());
        self.child(filter.input());
    }

    fn visit_projection(&mut self, projection: &Projection) {
        self.line(&projection.to_string());
        self.expression_subqueries(projection.exprs().iter().flat_map(|e| e.subqueries.iter()));
        self.child(projection.input());
    }

    fn visit_join(&mut self, join: &Join) {
        self.line(&join.to_string());
        self.expression_subqueries(join.condition().into_iter().flat_map(|e| e.subqueries.iter()));
        self.child(join.left());
        self.child(join.right());
    }

    fn visit_aggregate(&mut self, aggregate: &Aggregate) {
        self.line(&aggregate.to_string());
        self.expression_subqueries(
            aggregate
                .group_by()
                .iter()
                .chain(aggregate.aggregates())
                .flat_map(|e| e.subqueries.iter()),
        );
        self.child(aggregate.input());
    }

    fn visit_distinct(&mut self, distinct: &Distinct) {
        self.line(&distinct.to_string());
        self.child(distinct.input());
    }

    fn visit_limit(&mut self, limit: &Limit) {
        self.line(&limit.to_string());
        self.child(limit.input());
    }

    fn visit_set(&mut self, set: &SetOperation) {
        self.line(&set.to_string());
        self.child(set.left());
        self.child(set.right());
    }

    fn visit_sort(&mut self, sort: &Sort) {
        self.line(&sort.to_string());
        self.expression_subqueries(sort.order_by().iter().flat_map(|k| k.expr.subqueries.iter()));
        self.child(sort.input());
    }

    fn visit_subquery(&mut self, subquery: &Subquery) {
        self.line(&subquery.to_string());
        self.child(subquery.input());
    }
}

/// Indented explain text of a query plan
pub fn explain(plan: &LogicalPlan) -> String {
    let mut visitor = ExplainVisitor::new();
    plan.accept(&mut visitor);
    visitor.finish()
}

/// Explain text of any statement plan; writes describe their target
/// first, then the plan producing their rows
pub fn explain_statement(plan: &StatementPlan) -> String {
    let (header, input) = match plan {
        StatementPlan::Query(plan) => return explain(plan),
        StatementPlan::Insert(insert) => (
            insert.to_string(),
            match &insert.input {
                InsertInput::Query(query) => Some(query.as_ref()),
                InsertInput::Values(_) => None,
            },
        ),
        StatementPlan::Update(update) => (update.to_string(), Some(&update.input)),
        StatementPlan::Delete(delete) => (delete.to_string(), Some(&delete.input)),
    };
    let mut visitor = ExplainVisitor::new();
    visitor.line(&header);
    if let Some(input) = input {
        visitor.child(input);
    }
    visitor.finish()
}
