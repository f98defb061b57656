//! Cost model for logical plans
//!
//! Estimates the cost of evaluating a logical plan. There are no table
//! statistics, so every scan is assumed to produce the same number of rows
//! and every predicate the same selectivity.

use crate::sql::{Expr, Literal};

use super::logical::{
    Aggregate, Distinct, Filter, Join, Limit, LogicalPlan, Projection, Scan, SetOperation, Sort,
    Subquery,
};
use super::visitor::PlanVisitor;

/// Cost estimate for a plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cost {
    /// Estimated number of rows produced
    pub rows: f64,
    /// CPU cost (arbitrary units)
    pub cpu: f64,
    /// I/O cost (arbitrary units)
    pub io: f64,
}

impl Cost {
    /// Calculate total cost (I/O weighted higher than CPU)
    pub fn total(&self) -> f64 {
        self.cpu + self.io * 10.0
    }

    /// Create a zero cost
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Cost estimator for logical plans
#[derive(Debug, Default)]
pub struct CostEstimator;

impl CostEstimator {
    /// Placeholder row count for tables (no statistics available)
    pub const DEFAULT_TABLE_ROWS: f64 = 1000.0;

    /// Placeholder selectivity for filters and join conditions
    pub const DEFAULT_SELECTIVITY: f64 = 0.1;

    /// Estimate the cost of evaluating `plan`
    pub fn estimate(plan: &LogicalPlan) -> Cost {
        plan.accept(&mut CostEstimator)
    }
}

impl PlanVisitor for CostEstimator {
    type Output = Cost;

    fn visit_scan(&mut self, _scan: &Scan) -> Cost {
        let rows = Self::DEFAULT_TABLE_ROWS;
        Cost {
            rows,
            cpu: rows,
            io: rows / 100.0, // Assume 100 rows per I/O
        }
    }

    fn visit_filter(&mut self, filter: &Filter) -> Cost {
        let input = filter.input().accept(self);
        Cost {
            rows: input.rows * Self::DEFAULT_SELECTIVITY,
            cpu: input.cpu + input.rows,
            io: input.io,
        }
    }

    fn visit_projection(&mut self, projection: &Projection) -> Cost {
        let input = projection.input().accept(self);
        Cost {
            rows: input.rows,
            cpu: input.cpu + input.rows * 0.1, // Small CPU overhead
            io: input.io,
        }
    }

    fn visit_join(&mut self, join: &Join) -> Cost {
        let left = join.left().accept(self);
        let right = join.right().accept(self);
        let pairs = left.rows * right.rows;
        let rows = match join.condition() {
            Some(_) => pairs * Self::DEFAULT_SELECTIVITY,
            None => pairs,
        };
        Cost {
            rows,
            // Every left row is compared with every right row
            cpu: left.cpu + right.cpu + pairs,
            io: left.io + right.io,
        }
    }

    fn visit_aggregate(&mut self, aggregate: &Aggregate) -> Cost {
        let input = aggregate.input().accept(self);
        let rows = if aggregate.group_by().is_empty() {
            1.0
        } else {
            // Assume ~10% of rows are unique groups
            (input.rows * 0.1).max(1.0)
        };
        Cost {
            rows,
            cpu: input.cpu + input.rows,
            io: input.io,
        }
    }

    fn visit_distinct(&mut self, distinct: &Distinct) -> Cost {
        let input = distinct.input().accept(self);
        Cost {
            // Assume ~50% of rows are unique
            rows: input.rows * 0.5,
            cpu: input.cpu + input.rows,
            io: input.io,
        }
    }

    fn visit_limit(&mut self, limit: &Limit) -> Cost {
        let input = limit.input().accept(self);
        let rows = match limit.count().map(|c| &c.expr) {
            Some(Expr::Literal(Literal::Integer(n))) => (*n as f64).min(input.rows),
            _ => input.rows,
        };
        Cost { rows, ..input }
    }

    fn visit_set(&mut self, set: &SetOperation) -> Cost {
        let left = set.left().accept(self);
        let right = set.right().accept(self);
        let cpu = left.cpu + right.cpu;
        Cost {
            rows: left.rows + right.rows,
            // Duplicate elimination hashes every row
            cpu: if set.all() { cpu } else { cpu + left.rows + right.rows },
            io: left.io + right.io,
        }
    }

    fn visit_sort(&mut self, sort: &Sort) -> Cost {
        let input = sort.input().accept(self);
        let n = input.rows;
        Cost {
            rows: n,
            // O(n log n) for sorting
            cpu: input.cpu + n * (n.ln().max(1.0)),
            io: input.io,
        }
    }

    fn visit_subquery(&mut self, subquery: &Subquery) -> Cost {
        subquery.input().accept(self)
    }
}
