//! Planner configuration

use crate::sql::params::DEFAULT_PARAM_SCHEMA;

/// Default maximum number of joins in one FROM clause
pub const DEFAULT_MAX_JOINS: usize = 8;

/// Default maximum subquery nesting depth
pub const DEFAULT_MAX_SUBQUERY_DEPTH: usize = 8;

/// Configuration for the planner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Joins allowed in a single FROM clause
    pub max_joins: usize,

    /// Nesting allowed for subqueries, derived tables, and CTE bodies
    pub max_subquery_depth: usize,

    /// Schema that reserves the `arg` / `narg` parameter functions
    pub param_schema: String,

    /// Run rendered SQL through the syntax checker
    pub syntax_check: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_joins: DEFAULT_MAX_JOINS,
            max_subquery_depth: DEFAULT_MAX_SUBQUERY_DEPTH,
            param_schema: DEFAULT_PARAM_SCHEMA.to_string(),
            syntax_check: true,
        }
    }
}

impl PlannerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the join limit
    pub fn with_max_joins(mut self, max_joins: usize) -> Self {
        self.max_joins = max_joins;
        self
    }

    /// Set the subquery depth limit
    pub fn with_max_subquery_depth(mut self, depth: usize) -> Self {
        self.max_subquery_depth = depth;
        self
    }

    /// Set the parameter function schema
    pub fn with_param_schema(mut self, schema: impl Into<String>) -> Self {
        self.param_schema = schema.into();
        self
    }

    /// Enable or disable the syntax check of rendered SQL
    pub fn with_syntax_check(mut self, enabled: bool) -> Self {
        self.syntax_check = enabled;
        self
    }
}
