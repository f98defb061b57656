//! Plan visitor
//!
//! Passes over a logical plan (explain, cost, ...) implement
//! [`PlanVisitor`]; [`LogicalPlan::accept`] picks the method for the node's
//! variant. A visitor decides itself whether and when to descend into
//! children.

use super::logical::{
    Aggregate, Distinct, Filter, Join, Limit, LogicalPlan, Projection, Scan, SetOperation, Sort,
    Subquery,
};

/// One method per plan operator
pub trait PlanVisitor {
    type Output;

    fn visit_scan(&mut self, scan: &Scan) -> Self::Output;
    fn visit_filter(&mut self, filter: &Filter) -> Self::Output;
    fn visit_projection(&mut self, projection: &Projection) -> Self::Output;
    fn visit_join(&mut self, join: &Join) -> Self::Output;
    fn visit_aggregate(&mut self, aggregate: &Aggregate) -> Self::Output;
    fn visit_distinct(&mut self, distinct: &Distinct) -> Self::Output;
    fn visit_limit(&mut self, limit: &Limit) -> Self::Output;
    fn visit_set(&mut self, set: &SetOperation) -> Self::Output;
    fn visit_sort(&mut self, sort: &Sort) -> Self::Output;
    fn visit_subquery(&mut self, subquery: &Subquery) -> Self::Output;
}

impl LogicalPlan {
    /// Dispatch to the visitor method for this node
    pub fn accept<V: PlanVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self {
            LogicalPlan::Scan(node) => visitor.visit_scan(node),
            LogicalPlan::Filter(node) => visitor.visit_filter(node),
            LogicalPlan::Projection(node) => visitor.visit_projection(node),
            LogicalPlan::Join(node) => visitor.visit_join(node),
            LogicalPlan::Aggregate(node) => visitor.visit_aggregate(node),
            LogicalPlan::Distinct(node) => visitor.visit_distinct(node),
            LogicalPlan::Limit(node) => visitor.visit_limit(node),
            LogicalPlan::Set(node) => visitor.visit_set(node),
            LogicalPlan::Sort(node) => visitor.visit_sort(node),
            LogicalPlan::Subquery(node) => visitor.visit_subquery(node),
        }
    }
}
