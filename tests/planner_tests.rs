//! Query planner integration tests

use detsql::catalog::{
    Catalog, CatalogSnapshot, ColumnDef, Constraint, DataType, IndexDef, SharedCatalog, TableDef,
};
use detsql::planner::logical::{InsertInput, Projection, Scan, TypedExpr};
use detsql::planner::{
    explain_statement, CostEstimator, DataSource, ErrorKind, Field, LogicalPlan, Planner,
    PlannerConfig, PlannerError, Schema, StatementPlan,
};

/// Create a test catalog with sample tables
fn test_catalog() -> Catalog {
    let mut catalog = Catalog::new();

    let users = TableDef::new("users")
        .column(ColumnDef::new("id", DataType::Int).nullable(false))
        .column(ColumnDef::new("name", DataType::Varchar(100)))
        .column(ColumnDef::new("email", DataType::Varchar(255)))
        .column(ColumnDef::new("age", DataType::Int))
        .constraint(Constraint::PrimaryKey(vec!["id".to_string()]));

    let orders = TableDef::new("orders")
        .column(ColumnDef::new("id", DataType::Int).nullable(false))
        .column(ColumnDef::new("user_id", DataType::Int))
        .column(ColumnDef::new("total", DataType::Double))
        .column(ColumnDef::new("status", DataType::Varchar(50)))
        .constraint(Constraint::PrimaryKey(vec!["id".to_string()]));

    let products = TableDef::new("products")
        .column(ColumnDef::new("id", DataType::Int).nullable(false))
        .column(ColumnDef::new("name", DataType::Varchar(200)).nullable(false))
        .column(ColumnDef::new("price", DataType::Double))
        .column(ColumnDef::new("quantity", DataType::Int).default("0"))
        .constraint(Constraint::PrimaryKey(vec!["id".to_string()]));

    catalog.create_table(users).unwrap();
    catalog.create_table(orders).unwrap();
    catalog.create_table(products).unwrap();
    catalog
        .create_index(IndexDef::new("users_email", "users", vec!["email".to_string()]).unique())
        .unwrap();

    catalog
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "detsql=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn planner() -> Planner {
    init_tracing();
    Planner::new(CatalogSnapshot::new(1, test_catalog()))
}

fn plan_err(sql: &str) -> PlannerError {
    planner().plan(sql).unwrap_err()
}

/// Source with a fixed schema, for tests that need exact field sets
struct FixedSource {
    name: String,
    fields: Vec<Field>,
}

impl FixedSource {
    fn new(name: &str, fields: Vec<Field>) -> Self {
        Self {
            name: name.to_string(),
            fields,
        }
    }
}

impl DataSource for FixedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Schema {
        Schema::new(self.fields.clone()).unwrap()
    }
}

// ============ Determinism ============

#[test]
fn test_planning_is_deterministic() {
    let planner = planner();
    let sql = "SELECT u.name, count(*) AS n FROM users u \
               JOIN orders o ON u.id = o.user_id \
               WHERE o.status = @status AND o.total > params.arg('min') \
               GROUP BY u.name ORDER BY n DESC LIMIT 10";

    let first = planner.plan(sql).unwrap();
    let second = planner.plan(sql).unwrap();
    assert_eq!(first.sql, second.sql);
    assert_eq!(first.parameters, second.parameters);
    assert_eq!(first.plan, second.plan);
    assert_eq!(first.parameters.names(), vec!["status", "min"]);
    assert!(first.sql.contains(r#""o"."status" = $1 AND "o"."total" > $2"#));
}

#[test]
fn test_independent_planners_agree() {
    let sql = "UPDATE users SET age = age + 1 WHERE email = $email";
    let a = planner().plan(sql).unwrap();
    let b = planner().plan(sql).unwrap();
    assert_eq!(a, b);
}

// ============ Schema propagation ============

#[test]
fn test_projection_schema_propagation() {
    let source = FixedSource::new(
        "t",
        vec![
            Field::new("a", DataType::Int, false),
            Field::new("b", DataType::Text, true),
            Field::new("c", DataType::Int, false),
        ],
    );
    let scan = Scan::try_new(&source, None, None).unwrap();
    let a = scan.schema().field(0).clone();
    let b = scan.schema().field(1).clone();
    let projection = Projection::try_new(
        LogicalPlan::Scan(scan),
        vec![(TypedExpr::column(&a), None), (TypedExpr::column(&b), None)],
    )
    .unwrap();
    let plan = LogicalPlan::Projection(projection);

    assert_eq!(plan.schema().to_string(), "[t.a:INT NOT NULL, t.b:TEXT]");
}

#[test]
fn test_select_schema_through_planner() {
    let planned = planner()
        .plan("SELECT id, name FROM products WHERE price > 10")
        .unwrap();
    let schema = planned.plan.schema();
    assert_eq!(schema.len(), 2);
    assert_eq!(schema.field(0).data_type, DataType::Int);
    assert!(!schema.field(0).nullable);
    assert!(!schema.field(1).nullable);
}

// ============ Joins ============

#[test]
fn test_join_schema_union_and_collision() {
    let left = Schema::new(vec![Field::new("id", DataType::Int, false)]).unwrap();
    let right = Schema::new(vec![
        Field::new("id", DataType::Int, false),
        Field::new("name", DataType::Text, true),
    ])
    .unwrap();

    let err = left.join(&right).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousColumn);

    let joined = left.join(&right.requalify("r").unwrap()).unwrap();
    let names: Vec<String> = joined.fields().iter().map(|f| f.qualified_name()).collect();
    assert_eq!(names, vec!["id", "r.id", "r.name"]);
}

#[test]
fn test_join_rendering_reflects_qualification() {
    let planned = planner()
        .plan("SELECT u.id, r.id FROM users u JOIN orders r ON u.id = r.user_id")
        .unwrap();
    assert_eq!(
        planned.sql,
        r#"SELECT "u"."id" , "r"."id" FROM "users" AS "u" INNER JOIN "orders" AS "r" ON "u"."id" = "r"."user_id""#
    );
    let names: Vec<String> = planned
        .plan
        .schema()
        .fields()
        .iter()
        .map(|f| f.qualified_name())
        .collect();
    assert_eq!(names, vec!["u.id", "r.id"]);
}

#[test]
fn test_unqualified_join_column_is_ambiguous() {
    let err = plan_err("SELECT id FROM users JOIN orders ON users.id = orders.user_id");
    assert_eq!(err.kind(), ErrorKind::AmbiguousColumn);
}

// ============ Write guards ============

#[test]
fn test_update_from_requires_where() {
    let err = plan_err("UPDATE users SET name = 'x' FROM orders");
    assert_eq!(err.kind(), ErrorKind::UpdateOrDeleteWithoutWhere);

    let planned = planner()
        .plan("UPDATE users SET name = 'x' FROM orders WHERE users.id = orders.user_id")
        .unwrap();
    assert!(planned.plan.is_mutative());
}

#[test]
fn test_delete_using_requires_where() {
    let err = plan_err("DELETE FROM orders USING users");
    assert_eq!(err.kind(), ErrorKind::UpdateOrDeleteWithoutWhere);
    assert!(planner()
        .plan("DELETE FROM orders USING users WHERE orders.user_id = users.id")
        .is_ok());
}

#[test]
fn test_single_table_write_without_where_allowed() {
    assert!(planner().plan("DELETE FROM orders").is_ok());
    assert!(planner().plan("UPDATE products SET price = 0").is_ok());
}

// ============ Set operations ============

#[test]
fn test_set_compatibility() {
    let err = plan_err("SELECT id, name FROM users UNION SELECT id FROM orders");
    assert_eq!(err.kind(), ErrorKind::SetIncompatibleSchemas);

    let planned = planner()
        .plan("SELECT id, name FROM users UNION SELECT id, status FROM orders")
        .unwrap();
    let names: Vec<String> = planned
        .plan
        .schema()
        .fields()
        .iter()
        .map(|f| f.qualified_name())
        .collect();
    assert_eq!(names, vec!["users.id", "users.name"]);
}

// ============ Upserts ============

#[test]
fn test_upsert_arbiter() {
    let planned = planner()
        .plan(
            "INSERT INTO users (id, email) VALUES ($1, $2) \
             ON CONFLICT (email) DO UPDATE SET name = excluded.name",
        )
        .unwrap();
    let StatementPlan::Insert(insert) = &planned.plan else {
        panic!("Expected Insert");
    };
    assert!(matches!(insert.input, InsertInput::Values(_)));
    assert!(insert.on_conflict.is_some());

    let err = plan_err("INSERT INTO users (id) VALUES (1) ON CONFLICT (age) DO NOTHING");
    assert_eq!(err.kind(), ErrorKind::IllegalConflictArbiter);
}

#[test]
fn test_insert_not_null_and_defaults() {
    let err = plan_err("INSERT INTO products (id) VALUES (1)");
    assert_eq!(err.kind(), ErrorKind::NotNullableColumn);
    // quantity has a default, price is nullable
    assert!(planner()
        .plan("INSERT INTO products (id, name) VALUES (1, 'widget')")
        .is_ok());
}

// ============ Configuration ============

#[test]
fn test_join_limit_from_config() {
    let planner = planner().with_config(PlannerConfig::new().with_max_joins(1));
    let err = planner
        .plan(
            "SELECT u.id FROM users u JOIN orders o ON u.id = o.user_id \
             JOIN products p ON p.id = o.id",
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn test_custom_param_schema() {
    let planner = planner().with_config(PlannerConfig::new().with_param_schema("p"));
    let planned = planner
        .plan("SELECT id FROM users WHERE name = p.arg('who')")
        .unwrap();
    assert_eq!(planned.parameters.names(), vec!["who"]);
    assert!(planned.sql.ends_with("$1"));
}

#[test]
fn test_plan_carries_snapshot_version() {
    let shared = SharedCatalog::new(test_catalog());
    shared
        .update(|catalog| {
            catalog.create_table(
                TableDef::new("events").column(ColumnDef::new("id", DataType::BigInt)),
            )
        })
        .unwrap();

    let planner = Planner::new(shared.snapshot());
    let planned = planner.plan("SELECT id FROM events").unwrap();
    assert_eq!(planned.catalog_version, 1);
    assert_eq!(planner.catalog_version(), 1);
}

// ============ Explain and cost ============

#[test]
fn test_explain_is_idempotent() {
    let planned = planner()
        .plan(
            "SELECT name FROM users WHERE id IN (SELECT user_id FROM orders WHERE total > 5) \
             ORDER BY name",
        )
        .unwrap();
    let first = explain_statement(&planned.plan);
    let second = explain_statement(&planned.plan);
    assert_eq!(first, second);
    assert!(first.contains("subquery:"));
}

#[test]
fn test_cost_estimate_over_planned_query() {
    let planned = planner().plan("SELECT id FROM users WHERE age > 30").unwrap();
    let plan = planned.plan.as_query().unwrap();
    let cost = CostEstimator::estimate(plan);
    assert!(cost.rows < CostEstimator::DEFAULT_TABLE_ROWS);
}
