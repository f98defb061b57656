//! Query planner
//!
//! Turns SQL text into a validated logical plan plus its canonical SQL.
//!
//! ## Pipeline
//!
//! ```text
//! SQL text
//!   → StatementClassifier::classify() → DML / call
//!   → Parser::parse_one() → Statement
//!   → ParameterResolver::resolve() → ParameterSet ($n ordinals)
//!   → LogicalPlanBuilder::build() → StatementPlan (validated)
//!   → ToSql → canonical SQL → syntax check
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use detsql::catalog::SharedCatalog;
//! use detsql::planner::Planner;
//!
//! let planner = Planner::new(shared.snapshot());
//! let planned = planner.plan("SELECT name FROM users WHERE id = $id")?;
//! println!("{}", planned.sql);
//! ```

pub mod config;
pub mod cost;
pub mod error;
pub mod explain;
pub mod functions;
pub mod logical;
pub mod schema;
pub mod validate;
pub mod visitor;

#[cfg(test)]
pub mod test_utils;

pub use config::PlannerConfig;
pub use cost::{Cost, CostEstimator};
pub use error::{ErrorKind, PlannerError, PlannerResult};
pub use explain::{explain, explain_statement, ExplainVisitor};
pub use functions::{FunctionKind, FunctionRegistry, FunctionSignature};
pub use logical::{LogicalPlan, LogicalPlanBuilder, StatementPlan};
pub use schema::{DataSource, Field, Schema};
pub use visitor::PlanVisitor;

use tracing::debug;

use crate::catalog::CatalogSnapshot;
use crate::sql::{
    syntax, ClassifiedStatement, ParameterResolver, ParameterSet, Parser, ReferenceParser,
    Statement, StatementClassifier, SyntaxChecker, ToSql,
};

/// Result of planning one statement
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStatement {
    pub plan: StatementPlan,
    /// Canonical SQL, parameters rendered as `$n`
    pub sql: String,
    pub parameters: ParameterSet,
    /// Version of the catalog snapshot the plan was built against
    pub catalog_version: u64,
}

/// Planner bound to one catalog snapshot
///
/// Planning is synchronous and keeps no state between calls, so a planner
/// can be shared freely once built.
pub struct Planner {
    snapshot: CatalogSnapshot,
    functions: FunctionRegistry,
    config: PlannerConfig,
    checker: Box<dyn SyntaxChecker>,
}

impl Planner {
    /// Planner with the default configuration, built-in functions and the
    /// reference syntax checker
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            snapshot,
            functions: FunctionRegistry::new(),
            config: PlannerConfig::default(),
            checker: Box::new(ReferenceParser),
        }
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_syntax_checker(mut self, checker: impl SyntaxChecker + 'static) -> Self {
        self.checker = Box::new(checker);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn catalog_version(&self) -> u64 {
        self.snapshot.version()
    }

    /// Classify statement text without planning it
    pub fn classify(&self, sql: &str) -> PlannerResult<ClassifiedStatement> {
        Ok(StatementClassifier::classify(sql)?)
    }

    /// Plan one DML statement
    pub fn plan(&self, sql: &str) -> PlannerResult<PlannedStatement> {
        match StatementClassifier::classify(sql) {
            Ok(ClassifiedStatement::Dml { .. }) => {}
            Ok(call) => {
                debug!(kind = %call.kind(), "Rejecting non-DML statement");
                return Err(PlannerError::unsupported(format!(
                    "planning {} statements",
                    call.kind()
                )));
            }
            Err(err) => {
                // The parser usually has the more precise complaint (DDL,
                // syntax errors); fall back to the classification error
                Parser::parse_one(sql)?;
                return Err(err.into());
            }
        }

        let stmt = Parser::parse_one(sql)?;
        debug!(mutative = stmt.is_mutative(), "Parsed statement");
        self.plan_statement(stmt)
    }

    /// Plan an already parsed statement
    pub fn plan_statement(&self, mut stmt: Statement) -> PlannerResult<PlannedStatement> {
        let parameters = ParameterResolver::new(self.config.param_schema.as_str())
            .resolve(&mut stmt)?;
        debug!(count = parameters.len(), "Resolved parameters");

        let plan = LogicalPlanBuilder::new(self.snapshot.catalog(), &self.functions, &self.config)
            .build(&stmt)?;
        debug!(
            catalog_version = self.snapshot.version(),
            columns = plan.schema().len(),
            "Built logical plan"
        );

        let sql = stmt.to_sql();
        debug!(sql = %sql, "Rendered statement");

        if self.config.syntax_check {
            syntax::check(self.checker.as_ref(), &sql)?;
        }

        Ok(PlannedStatement {
            plan,
            sql,
            parameters,
            catalog_version: self.snapshot.version(),
        })
    }

    /// Plan `sql` and describe the plan
    pub fn explain(&self, sql: &str) -> PlannerResult<String> {
        let planned = self.plan(sql)?;
        Ok(explain_statement(&planned.plan))
    }
}
