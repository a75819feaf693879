//! Schema-related data models.
//!
//! The same types describe a table whether it was introspected from a live
//! database or parsed out of a SQL dump, and they are stored verbatim in the
//! vector store payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every table of a database, keyed by table name.
pub type DatabaseSchema = BTreeMap<String, TableSchema>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Self::default()
        }
    }

    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key columns.
    pub fn with_primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn with_index(mut self, index: IndexInfo) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Whether `column` is part of the primary key, either through the
    /// table-level key or the column's own flag.
    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
            || self.column(column).is_some_and(|c| c.is_primary_key)
    }

    /// The single-column foreign key that starts at `column`, if any.
    pub fn reference_for(&self, column: &str) -> Option<(&str, &str)> {
        self.foreign_keys.iter().find_map(|fk| {
            let pos = fk.columns.iter().position(|c| c == column)?;
            let referred = fk.references_columns.get(pos)?;
            Some((fk.references_table.as_str(), referred.as_str()))
        })
    }

    /// Fill `primary_key` from column flags when no table-level key was found.
    pub fn derive_primary_key(&mut self) {
        if self.primary_key.is_empty() {
            self.primary_key = self
                .columns
                .iter()
                .filter(|c| c.is_primary_key)
                .map(|c| c.name.clone())
                .collect();
        }
        for column in &mut self.columns {
            if self.primary_key.contains(&column.name) {
                column.is_primary_key = true;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Full type (e.g., `varchar(30)`, `bigint unsigned`)
    pub data_type: String,
    pub nullable: bool,
    /// Default as written in the DDL (expressions stay verbatim)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
        }
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }
}

/// A foreign key constraint. Composite keys keep their columns in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub references_table: String,
    pub references_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(
        columns: Vec<String>,
        references_table: impl Into<String>,
        references_columns: Vec<String>,
    ) -> Self {
        Self {
            name: None,
            columns,
            references_table: references_table.into(),
            references_columns,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_primary: bool,
}

impl IndexInfo {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: false,
            is_primary: false,
        }
    }

    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    /// Primary key indexes are always unique.
    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        if is_primary {
            self.is_unique = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableSchema {
        TableSchema::new("orders")
            .with_column(ColumnDefinition::new("id", "int", false).with_primary_key(true))
            .with_column(ColumnDefinition::new("customer_id", "int", false))
            .with_column(ColumnDefinition::new("note", "text", true))
            .with_foreign_key(ForeignKey::new(
                vec!["customer_id".to_string()],
                "customers",
                vec!["id".to_string()],
            ))
    }

    #[test]
    fn test_table_schema_builder() {
        let schema = orders();
        assert_eq!(schema.table_name, "orders");
        assert_eq!(schema.column_names(), vec!["id", "customer_id", "note"]);
        assert!(schema.column("note").unwrap().nullable);
    }

    #[test]
    fn test_derive_primary_key_from_flags() {
        let mut schema = orders();
        schema.derive_primary_key();
        assert_eq!(schema.primary_key, vec!["id".to_string()]);
    }

    #[test]
    fn test_derive_primary_key_marks_columns() {
        let mut schema = TableSchema::new("t")
            .with_column(ColumnDefinition::new("a", "int", false))
            .with_column(ColumnDefinition::new("b", "int", false))
            .with_primary_key(vec!["a".to_string(), "b".to_string()]);
        schema.derive_primary_key();
        assert!(schema.columns.iter().all(|c| c.is_primary_key));
    }

    #[test]
    fn test_reference_for() {
        let schema = orders();
        assert_eq!(schema.reference_for("customer_id"), Some(("customers", "id")));
        assert_eq!(schema.reference_for("note"), None);
    }

    #[test]
    fn test_index_info_builder() {
        let idx = IndexInfo::new("PRIMARY", vec!["id".to_string()]).with_primary(true);
        assert!(idx.is_unique);
        assert!(idx.is_primary);
    }

    #[test]
    fn test_serialization_skips_missing_default() {
        let json = serde_json::to_value(ColumnDefinition::new("id", "int", false)).unwrap();
        assert!(json.get("default_value").is_none());
        let back: ColumnDefinition =
            serde_json::from_value(serde_json::json!({"name": "x", "data_type": "int", "nullable": true}))
                .unwrap();
        assert!(!back.is_primary_key);
    }
}
