//! Catalog - Schema metadata (tables, columns, indexes)
//!
//! The catalog stores metadata about database schema including
//! table definitions, column types, constraints, and indexes.
//!
//! Planning reads the catalog through a [`CatalogSnapshot`]: an immutable,
//! versioned view handed out by [`SharedCatalog`]. A planning call holds one
//! snapshot for its whole duration, so concurrent schema changes can never
//! be observed halfway through a plan.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::planner::schema::{DataSource, Field, Schema};

/// SQL data types supported by the planner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean (true/false)
    Boolean,
    /// 16-bit signed integer
    SmallInt,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    BigInt,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
    /// Variable-length string with max length
    Varchar(u32),
    /// Unlimited text
    Text,
    /// Binary data
    Blob,
    /// Timestamp (date and time)
    Timestamp,
    /// Type not known at plan time (NULL literals, bind parameters)
    Unknown,
}

impl DataType {
    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::SmallInt
                | DataType::Int
                | DataType::BigInt
                | DataType::Float
                | DataType::Double
        )
    }

    /// Check if this type is an integer
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::SmallInt | DataType::Int | DataType::BigInt)
    }

    /// Check if this type is a string type
    pub fn is_string(&self) -> bool {
        matches!(self, DataType::Varchar(_) | DataType::Text)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, DataType::Unknown)
    }

    /// Whether values of the two types can meet in one column, comparison,
    /// or assignment. Unknown is compatible with everything.
    pub fn is_compatible(&self, other: &DataType) -> bool {
        if self.is_unknown() || other.is_unknown() {
            return true;
        }
        if self.is_numeric() && other.is_numeric() {
            return true;
        }
        if self.is_string() && other.is_string() {
            return true;
        }
        self == other
    }

    /// Canonical SQL spelling of the type
    pub fn sql_name(&self) -> String {
        match self {
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::SmallInt => "SMALLINT".to_string(),
            DataType::Int => "INT".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Float => "REAL".to_string(),
            DataType::Double => "DOUBLE PRECISION".to_string(),
            DataType::Varchar(n) => format!("VARCHAR({})", n),
            DataType::Text => "TEXT".to_string(),
            DataType::Blob => "BYTEA".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::Unknown => "UNKNOWN".to_string(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql_name())
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Data type
    pub data_type: DataType,
    /// Whether NULL values are allowed
    pub nullable: bool,
    /// Default value expression (as string)
    pub default: Option<String>,
}

impl ColumnDef {
    /// Create a new column definition
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
        }
    }

    /// Set nullable
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set default value
    #[must_use]
    pub fn default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Whether an INSERT may leave this column out
    pub fn may_omit(&self) -> bool {
        self.nullable || self.default.is_some()
    }
}

/// Table constraint
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Primary key constraint
    PrimaryKey(Vec<String>),
    /// Unique constraint
    Unique(Vec<String>),
    /// Foreign key constraint
    ForeignKey {
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
    },
}

impl Constraint {
    fn columns(&self) -> &[String] {
        match self {
            Constraint::PrimaryKey(cols) | Constraint::Unique(cols) => cols,
            Constraint::ForeignKey { columns, .. } => columns,
        }
    }
}

/// Table definition
#[derive(Debug, Clone)]
pub struct TableDef {
    /// Table name
    pub name: String,
    /// Column definitions
    pub columns: Vec<ColumnDef>,
    /// Table constraints
    pub constraints: Vec<Constraint>,
}

impl TableDef {
    /// Create a new table definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a column
    #[must_use]
    pub fn column(mut self, col: ColumnDef) -> Self {
        self.columns.push(col);
        self
    }

    /// Add a constraint
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get column index by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Get primary key columns
    pub fn primary_key(&self) -> Option<&[String]> {
        for c in &self.constraints {
            if let Constraint::PrimaryKey(cols) = c {
                return Some(cols);
            }
        }
        None
    }

    /// Primary key and unique constraint column groups, declaration order
    pub fn unique_keys(&self) -> Vec<Vec<String>> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::PrimaryKey(cols) | Constraint::Unique(cols) => Some(cols.clone()),
                Constraint::ForeignKey { .. } => None,
            })
            .collect()
    }

    fn validate(&self) -> CatalogResult<()> {
        for (i, col) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.name == col.name) {
                return Err(CatalogError::DuplicateColumn(
                    self.name.clone(),
                    col.name.clone(),
                ));
            }
        }
        for constraint in &self.constraints {
            for col in constraint.columns() {
                if self.get_column(col).is_none() {
                    return Err(CatalogError::ColumnNotFound(self.name.clone(), col.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Index definition
#[derive(Debug, Clone)]
pub struct IndexDef {
    /// Index name
    pub name: String,
    /// Table this index belongs to
    pub table: String,
    /// Columns in the index
    pub columns: Vec<String>,
    /// Whether this is a unique index
    pub unique: bool,
}

impl IndexDef {
    /// Create a new index definition
    pub fn new(name: impl Into<String>, table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns,
            unique: false,
        }
    }

    /// Set unique
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Catalog error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Index '{0}' already exists")]
    IndexExists(String),

    #[error("Index '{0}' not found")]
    IndexNotFound(String),

    /// (table, column)
    #[error("Column '{1}' not found in table '{0}'")]
    ColumnNotFound(String, String),

    /// Column declared twice in one table
    #[error("Column '{1}' declared twice in table '{0}'")]
    DuplicateColumn(String, String),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Database catalog - stores schema metadata
///
/// Ordered maps keep every listing deterministic.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    /// Tables by name
    tables: BTreeMap<String, TableDef>,
    /// Indexes by name
    indexes: BTreeMap<String, IndexDef>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Create a table
    pub fn create_table(&mut self, def: TableDef) -> CatalogResult<()> {
        if self.tables.contains_key(&def.name) {
            return Err(CatalogError::TableExists(def.name.clone()));
        }
        def.validate()?;
        self.tables.insert(def.name.clone(), def);
        Ok(())
    }

    /// Drop a table
    pub fn drop_table(&mut self, name: &str) -> CatalogResult<()> {
        if self.tables.remove(name).is_none() {
            return Err(CatalogError::TableNotFound(name.to_string()));
        }
        // Also drop all indexes for this table
        self.indexes.retain(|_, idx| idx.table != name);
        Ok(())
    }

    /// Get a table definition
    pub fn get_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Check if a table exists
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// List all table names, sorted
    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    /// Create an index
    pub fn create_index(&mut self, def: IndexDef) -> CatalogResult<()> {
        let table = self
            .tables
            .get(&def.table)
            .ok_or_else(|| CatalogError::TableNotFound(def.table.clone()))?;

        for col in &def.columns {
            if table.get_column(col).is_none() {
                return Err(CatalogError::ColumnNotFound(def.table.clone(), col.clone()));
            }
        }

        if self.indexes.contains_key(&def.name) {
            return Err(CatalogError::IndexExists(def.name.clone()));
        }
        self.indexes.insert(def.name.clone(), def);
        Ok(())
    }

    /// Drop an index
    pub fn drop_index(&mut self, name: &str) -> CatalogResult<()> {
        if self.indexes.remove(name).is_none() {
            return Err(CatalogError::IndexNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Get an index definition
    pub fn get_index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.get(name)
    }

    /// Get all indexes for a table, ordered by index name
    pub fn get_indexes_for_table(&self, table: &str) -> Vec<&IndexDef> {
        self.indexes
            .values()
            .filter(|idx| idx.table == table)
            .collect()
    }

    /// Look up a table as a planner data source
    pub fn source(&self, name: &str) -> Option<TableSource<'_>> {
        let table = self.tables.get(name)?;
        Some(TableSource {
            table,
            indexes: self.get_indexes_for_table(name),
        })
    }
}

/// A catalog table viewed as a [`DataSource`]
///
/// Key groups are the table's primary key and unique constraints followed
/// by its unique indexes.
#[derive(Debug, Clone)]
pub struct TableSource<'a> {
    table: &'a TableDef,
    indexes: Vec<&'a IndexDef>,
}

impl<'a> TableSource<'a> {
    pub fn table(&self) -> &'a TableDef {
        self.table
    }

    /// Whether `columns` is exactly a primary key, unique constraint, or
    /// unique index (column order ignored)
    pub fn is_unique_key(&self, columns: &[String]) -> bool {
        let mut wanted: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
        wanted.sort_unstable();
        wanted.dedup();
        if wanted.len() != columns.len() {
            return false;
        }
        self.key_groups().iter().any(|key| {
            let mut have: Vec<&str> = key.iter().map(|c| c.as_str()).collect();
            have.sort_unstable();
            have == wanted
        })
    }

    fn key_groups(&self) -> Vec<Vec<String>> {
        let mut keys = self.table.unique_keys();
        keys.extend(
            self.indexes
                .iter()
                .filter(|idx| idx.unique)
                .map(|idx| idx.columns.clone()),
        );
        keys
    }
}

impl DataSource for TableSource<'_> {
    fn name(&self) -> &str {
        &self.table.name
    }

    fn schema(&self) -> Schema {
        let fields = self
            .table
            .columns
            .iter()
            .map(|c| Field::new(&c.name, c.data_type.clone(), c.nullable))
            .collect();
        Schema::from_fields_unchecked(fields).with_keys(self.key_groups())
    }
}

/// Immutable, versioned view of the catalog
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    version: u64,
    catalog: Arc<Catalog>,
}

impl CatalogSnapshot {
    /// Wrap a catalog as a fixed snapshot
    pub fn new(version: u64, catalog: Catalog) -> Self {
        Self {
            version,
            catalog: Arc::new(catalog),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// Shared catalog handle that publishes new snapshots on change
///
/// Readers never block writers for longer than an `Arc` clone; a schema
/// change copies the current catalog, applies the edit, and swaps in the
/// result under a new version number.
#[derive(Debug)]
pub struct SharedCatalog {
    current: RwLock<CatalogSnapshot>,
}

impl SharedCatalog {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(CatalogSnapshot::new(0, catalog)),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.current.read().clone()
    }

    /// Apply a schema change and publish it as the next version
    ///
    /// A failed change publishes nothing.
    pub fn update<R>(
        &self,
        change: impl FnOnce(&mut Catalog) -> CatalogResult<R>,
    ) -> CatalogResult<R> {
        let mut current = self.current.write();
        let mut next = Catalog::clone(&current.catalog);
        let result = change(&mut next)?;
        let version = current.version + 1;
        *current = CatalogSnapshot::new(version, next);
        tracing::info!(version, "Published catalog snapshot");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_create_drop_table() {
        let mut catalog = Catalog::new();

        let table = TableDef::new("users")
            .column(ColumnDef::new("id", DataType::Int).nullable(false))
            .column(ColumnDef::new("name", DataType::Varchar(255)))
            .constraint(Constraint::PrimaryKey(vec!["id".to_string()]));

        catalog.create_table(table).unwrap();
        assert!(catalog.table_exists("users"));

        // Duplicate should fail
        let table2 = TableDef::new("users");
        assert!(matches!(
            catalog.create_table(table2),
            Err(CatalogError::TableExists(_))
        ));

        let t = catalog.get_table("users").unwrap();
        assert_eq!(t.columns.len(), 2);
        assert_eq!(t.primary_key(), Some(&["id".to_string()][..]));

        catalog.drop_table("users").unwrap();
        assert!(!catalog.table_exists("users"));
        assert!(matches!(
            catalog.drop_table("users"),
            Err(CatalogError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_table_validation() {
        let mut catalog = Catalog::new();

        let dup = TableDef::new("t")
            .column(ColumnDef::new("a", DataType::Int))
            .column(ColumnDef::new("a", DataType::Text));
        assert!(matches!(
            catalog.create_table(dup),
            Err(CatalogError::DuplicateColumn(_, _))
        ));

        let bad_key = TableDef::new("t")
            .column(ColumnDef::new("a", DataType::Int))
            .constraint(Constraint::Unique(vec!["b".to_string()]));
        assert!(matches!(
            catalog.create_table(bad_key),
            Err(CatalogError::ColumnNotFound(_, _))
        ));
    }

    #[test]
    fn test_list_tables_sorted() {
        let mut catalog = Catalog::new();
        for name in ["zeta", "alpha", "mid"] {
            catalog
                .create_table(TableDef::new(name).column(ColumnDef::new("id", DataType::Int)))
                .unwrap();
        }
        assert_eq!(catalog.list_tables(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_catalog_indexes() {
        let mut catalog = Catalog::new();

        let table = TableDef::new("users")
            .column(ColumnDef::new("id", DataType::Int))
            .column(ColumnDef::new("email", DataType::Varchar(255)))
            .column(ColumnDef::new("name", DataType::Varchar(100)));
        catalog.create_table(table).unwrap();

        let idx = IndexDef::new("idx_email", "users", vec!["email".to_string()]).unique();
        catalog.create_index(idx).unwrap();
        assert!(catalog.get_index("idx_email").unwrap().unique);

        let idx3 = IndexDef::new("idx_email", "users", vec!["name".to_string()]);
        assert!(matches!(
            catalog.create_index(idx3),
            Err(CatalogError::IndexExists(_))
        ));

        let idx4 = IndexDef::new("idx_bad", "nonexistent", vec!["col".to_string()]);
        assert!(matches!(
            catalog.create_index(idx4),
            Err(CatalogError::TableNotFound(_))
        ));

        let idx5 = IndexDef::new("idx_bad2", "users", vec!["nonexistent".to_string()]);
        assert!(matches!(
            catalog.create_index(idx5),
            Err(CatalogError::ColumnNotFound(_, _))
        ));

        // Drop table should also drop its indexes
        catalog.drop_table("users").unwrap();
        assert!(catalog.get_indexes_for_table("users").is_empty());
    }

    #[test]
    fn test_source_key_groups() {
        let mut catalog = Catalog::new();
        let table = TableDef::new("accounts")
            .column(ColumnDef::new("id", DataType::Int).nullable(false))
            .column(ColumnDef::new("org", DataType::Int))
            .column(ColumnDef::new("handle", DataType::Text))
            .constraint(Constraint::PrimaryKey(vec!["id".to_string()]))
            .constraint(Constraint::Unique(vec![
                "org".to_string(),
                "handle".to_string(),
            ]));
        catalog.create_table(table).unwrap();
        catalog
            .create_index(
                IndexDef::new("idx_handle", "accounts", vec!["handle".to_string()]).unique(),
            )
            .unwrap();

        let source = catalog.source("accounts").unwrap();
        assert!(source.is_unique_key(&["id".to_string()]));
        assert!(source.is_unique_key(&["handle".to_string(), "org".to_string()]));
        assert!(source.is_unique_key(&["handle".to_string()]));
        assert!(!source.is_unique_key(&["org".to_string()]));

        let schema = source.schema();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.keys().len(), 3);
    }

    #[test]
    fn test_shared_catalog_versions() {
        let shared = SharedCatalog::new(Catalog::new());
        let before = shared.snapshot();
        assert_eq!(before.version(), 0);

        shared
            .update(|c| {
                c.create_table(TableDef::new("t").column(ColumnDef::new("a", DataType::Int)))
            })
            .unwrap();

        let after = shared.snapshot();
        assert_eq!(after.version(), 1);
        assert!(after.catalog().table_exists("t"));
        // Earlier snapshot is unaffected
        assert!(!before.catalog().table_exists("t"));

        // Failed change publishes nothing
        let err = shared.update(|c| c.drop_table("missing"));
        assert!(err.is_err());
        assert_eq!(shared.snapshot().version(), 1);
    }

    #[test]
    fn test_data_type_helpers() {
        assert!(DataType::Int.is_numeric());
        assert!(DataType::BigInt.is_integer());
        assert!(!DataType::Float.is_integer());
        assert!(DataType::Varchar(100).is_string());
        assert!(!DataType::Blob.is_string());
        assert!(DataType::Int.is_compatible(&DataType::Double));
        assert!(DataType::Text.is_compatible(&DataType::Varchar(10)));
        assert!(DataType::Unknown.is_compatible(&DataType::Boolean));
        assert!(!DataType::Int.is_compatible(&DataType::Text));
        assert_eq!(DataType::Varchar(8).to_string(), "VARCHAR(8)");
    }
}
