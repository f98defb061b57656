//! Schema model
//!
//! A [`Schema`] is the ordered field list of a relation. Field order is the
//! display order and never comes from a map; the name index only speeds up
//! lookups.

use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::DataType;
use crate::planner::error::{PlannerError, PlannerResult};

/// One column of a relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Qualifier (table name or alias)
    pub relation: Option<String>,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    /// Unqualified field
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            relation: None,
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Field qualified by `relation`
    pub fn qualified(
        relation: impl Into<String>,
        name: impl Into<String>,
        data_type: DataType,
        nullable: bool,
    ) -> Self {
        Self {
            relation: Some(relation.into()),
            ..Self::new(name, data_type, nullable)
        }
    }

    /// `relation.name`, or `name` when unqualified
    pub fn qualified_name(&self) -> String {
        match &self.relation {
            Some(rel) => format!("{}.{}", rel, self.name),
            None => self.name.clone(),
        }
    }

    pub fn with_relation(mut self, relation: Option<String>) -> Self {
        self.relation = relation;
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Whether a reference `relation.name` (or bare `name`) denotes this field
    pub fn matches(&self, relation: Option<&str>, name: &str) -> bool {
        self.name == name && relation.map_or(true, |r| self.relation.as_deref() == Some(r))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.qualified_name(), self.data_type)?;
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

/// Ordered, uniquely named field list plus key groups
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<Field>,
    /// Column-name groups that uniquely identify a row
    keys: Vec<Vec<String>>,
    /// Field name -> positions, for lookup only
    by_name: BTreeMap<String, Vec<usize>>,
}

impl Schema {
    /// Build a schema, rejecting duplicate qualified names
    pub fn new(fields: Vec<Field>) -> PlannerResult<Self> {
        let schema = Self::from_fields_unchecked(fields);
        schema.check_unique()?;
        Ok(schema)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a schema whose names are already known to be unique
    pub(crate) fn from_fields_unchecked(fields: Vec<Field>) -> Self {
        let mut by_name: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, field) in fields.iter().enumerate() {
            by_name.entry(field.name.clone()).or_default().push(i);
        }
        Self {
            fields,
            keys: Vec::new(),
            by_name,
        }
    }

    pub fn with_keys(mut self, keys: Vec<Vec<String>>) -> Self {
        self.keys = keys;
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> &[Vec<String>] {
        &self.keys
    }

    /// Position of the field a reference resolves to, if any
    ///
    /// More than one candidate is an `AmbiguousColumn` error.
    pub fn find(&self, relation: Option<&str>, name: &str) -> PlannerResult<Option<usize>> {
        let Some(positions) = self.by_name.get(name) else {
            return Ok(None);
        };
        let mut matches = positions
            .iter()
            .copied()
            .filter(|&i| self.fields[i].matches(relation, name));
        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            return Err(PlannerError::AmbiguousColumn(display_ref(relation, name)));
        }
        Ok(first)
    }

    /// Position of the field a reference resolves to
    pub fn index_of(&self, relation: Option<&str>, name: &str) -> PlannerResult<usize> {
        self.find(relation, name)?
            .ok_or_else(|| PlannerError::ColumnNotFound(display_ref(relation, name)))
    }

    /// Whether any field carries `relation` as its qualifier
    pub fn has_relation(&self, relation: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.relation.as_deref() == Some(relation))
    }

    /// Left fields followed by right fields
    ///
    /// A qualified name present on both sides is an `AmbiguousColumn` error.
    pub fn join(&self, right: &Schema) -> PlannerResult<Schema> {
        let mut fields = self.fields.clone();
        fields.extend(right.fields.iter().cloned());
        let schema = Self::from_fields_unchecked(fields);
        schema.check_unique().map_err(|err| match err {
            PlannerError::DuplicateColumn(name) => PlannerError::AmbiguousColumn(name),
            other => other,
        })?;
        Ok(schema)
    }

    /// Every field qualified by `alias`
    pub fn requalify(&self, alias: &str) -> PlannerResult<Schema> {
        let fields = self
            .fields
            .iter()
            .cloned()
            .map(|f| f.with_relation(Some(alias.to_string())))
            .collect();
        Ok(Schema::new(fields)?.with_keys(self.keys.clone()))
    }

    /// Every field made nullable (outer side of a join)
    pub fn to_nullable(&self) -> Schema {
        let fields = self
            .fields
            .iter()
            .cloned()
            .map(|f| f.with_nullable(true))
            .collect();
        Self::from_fields_unchecked(fields)
    }

    fn check_unique(&self) -> PlannerResult<()> {
        for (i, field) in self.fields.iter().enumerate() {
            let name = field.qualified_name();
            if self.fields[..i].iter().any(|f| f.qualified_name() == name) {
                return Err(PlannerError::DuplicateColumn(name));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, "]")
    }
}

fn display_ref(relation: Option<&str>, name: &str) -> String {
    match relation {
        Some(rel) => format!("{}.{}", rel, name),
        None => name.to_string(),
    }
}

/// Anything the planner can scan: a named relation with a schema
pub trait DataSource {
    fn name(&self) -> &str;

    /// Unqualified fields in declaration order
    fn schema(&self) -> Schema;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, data_type: DataType, nullable: bool) -> Field {
        Field::new(name, data_type, nullable)
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Schema::new(vec![
            field("id", DataType::Int, false),
            field("id", DataType::Text, true),
        ])
        .unwrap_err();
        assert_eq!(err, PlannerError::DuplicateColumn("id".to_string()));

        // Same name under different qualifiers is fine
        assert!(Schema::new(vec![
            Field::qualified("a", "id", DataType::Int, false),
            Field::qualified("b", "id", DataType::Int, false),
        ])
        .is_ok());
    }

    #[test]
    fn test_lookup() {
        let schema = Schema::new(vec![
            Field::qualified("u", "id", DataType::Int, false),
            Field::qualified("o", "id", DataType::Int, false),
            Field::qualified("o", "total", DataType::BigInt, true),
        ])
        .unwrap();

        assert_eq!(schema.index_of(Some("o"), "id").unwrap(), 1);
        assert_eq!(schema.index_of(None, "total").unwrap(), 2);
        assert_eq!(
            schema.index_of(None, "id").unwrap_err(),
            PlannerError::AmbiguousColumn("id".to_string())
        );
        assert_eq!(
            schema.index_of(Some("x"), "id").unwrap_err(),
            PlannerError::ColumnNotFound("x.id".to_string())
        );
        assert_eq!(schema.find(None, "missing").unwrap(), None);
    }

    #[test]
    fn test_join_collision_and_alias() {
        let left = Schema::new(vec![field("id", DataType::Int, false)]).unwrap();
        let right = Schema::new(vec![
            field("id", DataType::Int, false),
            field("name", DataType::Text, true),
        ])
        .unwrap();

        assert!(matches!(
            left.join(&right),
            Err(PlannerError::AmbiguousColumn(name)) if name == "id"
        ));

        let joined = left.join(&right.requalify("r").unwrap()).unwrap();
        let names: Vec<_> = joined.fields().iter().map(|f| f.qualified_name()).collect();
        assert_eq!(names, vec!["id", "r.id", "r.name"]);
        assert_eq!(joined.field(1).data_type, DataType::Int);
        assert_eq!(joined.field(2).data_type, DataType::Text);
    }

    #[test]
    fn test_display_keeps_order() {
        let schema = Schema::new(vec![
            field("b", DataType::Text, true),
            field("a", DataType::Int, false),
        ])
        .unwrap();
        assert_eq!(schema.to_string(), "[b:TEXT, a:INT NOT NULL]");
    }

    #[test]
    fn test_to_nullable() {
        let schema = Schema::new(vec![field("a", DataType::Int, false)]).unwrap();
        assert!(schema.to_nullable().field(0).nullable);
    }
}
