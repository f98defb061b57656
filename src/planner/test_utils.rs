//! Shared test utilities for planner module tests

use crate::catalog::{Catalog, ColumnDef, Constraint, DataType, IndexDef, TableDef};

/// Catalog with `users`, `orders` and `products`
///
/// - users: `id` primary key, unique index on `email`
/// - orders: `id` primary key, `status` has a default
/// - products: unique constraint on `(name, vendor)`
pub fn test_catalog() -> Catalog {
    let mut catalog = Catalog::new();

    let users = TableDef::new("users")
        .column(ColumnDef::new("id", DataType::Int).nullable(false))
        .column(ColumnDef::new("name", DataType::Varchar(100)))
        .column(ColumnDef::new("age", DataType::Int))
        .column(ColumnDef::new("email", DataType::Text))
        .constraint(Constraint::PrimaryKey(vec!["id".to_string()]));

    let orders = TableDef::new("orders")
        .column(ColumnDef::new("id", DataType::Int).nullable(false))
        .column(ColumnDef::new("user_id", DataType::Int).nullable(false))
        .column(ColumnDef::new("amount", DataType::BigInt))
        .column(
            ColumnDef::new("status", DataType::Text)
                .nullable(false)
                .default("'new'"),
        )
        .constraint(Constraint::PrimaryKey(vec!["id".to_string()]));

    let products = TableDef::new("products")
        .column(ColumnDef::new("id", DataType::Int).nullable(false))
        .column(ColumnDef::new("name", DataType::Text).nullable(false))
        .column(ColumnDef::new("vendor", DataType::Text).nullable(false))
        .column(ColumnDef::new("price", DataType::Double))
        .constraint(Constraint::PrimaryKey(vec!["id".to_string()]))
        .constraint(Constraint::Unique(vec![
            "name".to_string(),
            "vendor".to_string(),
        ]));

    catalog.create_table(users).unwrap();
    catalog.create_table(orders).unwrap();
    catalog.create_table(products).unwrap();
    catalog
        .create_index(IndexDef::new("users_email", "users", vec!["email".to_string()]).unique())
        .unwrap();
    catalog
}
