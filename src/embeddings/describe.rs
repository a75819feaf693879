//! Text documents rendered from table schemas.
//!
//! These strings are what gets embedded, so their wording matters for
//! retrieval quality. `table_description` is the long form used for live
//! databases; `table_chunk` is the compact schema-plus-one-row form used for
//! dumps.

use crate::models::{ColumnDefinition, Row, TableSchema};
use serde_json::Value as JsonValue;
use std::fmt::Write;

const SAMPLE_CELL_WIDTH: usize = 20;
const CHUNK_VALUE_WIDTH: usize = 50;

/// Long-form description: columns, keys, indexes and a sample table.
pub fn table_description(schema: &TableSchema, samples: &[Row]) -> String {
    let mut out = format!("TABLE: {}\n", schema.table_name);

    out.push_str("\nCOLUMNS:\n");
    for column in &schema.columns {
        let mut line = format!("  - {}: {}", column.name, column_flags(schema, column));
        if let Some((table, referred)) = schema.reference_for(&column.name) {
            let _ = write!(line, " - REFERENCES {}({})", table, referred);
        }
        out.push_str(&line);
        out.push('\n');
    }

    if !schema.primary_key.is_empty() {
        let _ = writeln!(out, "\nPRIMARY KEY: {}", schema.primary_key.join(", "));
    }

    let references = column_references(schema);
    if !references.is_empty() {
        out.push_str("\nFOREIGN KEYS:\n");
        for (column, table, referred) in references {
            let _ = writeln!(out, "  - {} -> {}({})", column, table, referred);
        }
    }

    let indexes: Vec<_> = schema.indexes.iter().filter(|i| !i.is_primary).collect();
    if !indexes.is_empty() {
        out.push_str("\nINDICES:\n");
        for index in indexes {
            let unique = if index.is_unique { "UNIQUE " } else { "" };
            let _ = writeln!(
                out,
                "  - {}INDEX {} ({})",
                unique,
                index.name,
                index.columns.join(", ")
            );
        }
    }

    if let Some(first) = samples.first().filter(|r| !r.is_empty()) {
        let columns = sample_columns(schema, first);
        let header = columns.join(" | ");
        let _ = writeln!(out, "\nSAMPLE DATA:\n{}\n{}", header, "-".repeat(header.len()));
        for row in samples {
            let cells: Vec<String> = columns
                .iter()
                .map(|c| truncate(&display_value(row.get(*c)), SAMPLE_CELL_WIDTH))
                .collect();
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
    }

    out
}

/// One-line description of a single column.
pub fn column_description(table: &str, column: &ColumnDefinition) -> String {
    let nullable = if column.nullable { "NULL" } else { "NOT NULL" };
    let mut out = format!(
        "Table: {}, Column: {}, Type: {}, {}",
        table, column.name, column.data_type, nullable
    );
    if column.is_primary_key {
        out.push_str(" PRIMARY KEY");
    }
    if let Some(default) = &column.default_value {
        let _ = write!(out, " DEFAULT {}", default);
    }
    out
}

/// Compact document combining the schema with one sample row.
pub fn table_chunk(schema: &TableSchema, sample: Option<&Row>) -> String {
    let mut out = format!("TABLE: {}\n\nSCHEMA:\n", schema.table_name);

    if !schema.primary_key.is_empty() {
        let _ = writeln!(out, "PRIMARY KEY: {}", schema.primary_key.join(", "));
    }

    if !schema.foreign_keys.is_empty() {
        out.push_str("FOREIGN KEYS:\n");
        for fk in &schema.foreign_keys {
            let _ = writeln!(
                out,
                "  {} → {}({})",
                fk.columns.join(", "),
                fk.references_table,
                fk.references_columns.join(", ")
            );
        }
        out.push('\n');
    }

    out.push_str("COLUMNS WITH SAMPLE DATA:\n");
    for column in &schema.columns {
        let mut attrs = Vec::new();
        if schema.primary_key.contains(&column.name) {
            attrs.push("PK");
        }
        if !column.nullable {
            attrs.push("NOT NULL");
        }

        let _ = write!(out, "  - {}: {}", column.name, column.data_type);
        if !attrs.is_empty() {
            let _ = write!(out, " ({})", attrs.join(", "));
        }
        if let Some(value) = sample.and_then(|row| row.get(&column.name)) {
            let rendered = match value {
                JsonValue::String(s) => truncate(s, CHUNK_VALUE_WIDTH),
                other => display_value(Some(other)),
            };
            let _ = write!(out, " = {}", rendered);
        }
        out.push('\n');
    }

    out
}

fn column_flags(schema: &TableSchema, column: &ColumnDefinition) -> String {
    let mut parts = vec![
        column.data_type.clone(),
        if column.nullable { "NULL" } else { "NOT NULL" }.to_string(),
    ];
    if schema.is_primary_key(&column.name) {
        parts.push("PRIMARY KEY".to_string());
    }
    if let Some(default) = &column.default_value {
        parts.push(format!("DEFAULT {}", default));
    }
    parts.join(" ")
}

/// `(column, referred table, referred column)` for every constrained column.
/// Composite keys with fewer referred columns fall back to the first one.
fn column_references(schema: &TableSchema) -> Vec<(&str, &str, &str)> {
    let mut refs: Vec<(&str, &str, &str)> = Vec::new();
    for fk in &schema.foreign_keys {
        for (i, column) in fk.columns.iter().enumerate() {
            let Some(referred) = fk.references_columns.get(i).or(fk.references_columns.first())
            else {
                continue;
            };
            if let Some(existing) = refs.iter_mut().find(|r| r.0 == column) {
                *existing = (column, &fk.references_table, referred);
            } else {
                refs.push((column, &fk.references_table, referred));
            }
        }
    }
    refs
}

/// Schema columns present in the row, then any extra keys it carries.
fn sample_columns<'a>(schema: &'a TableSchema, row: &'a Row) -> Vec<&'a str> {
    let mut columns: Vec<&str> = schema
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|c| row.contains_key(*c))
        .collect();
    for key in row.keys() {
        if !columns.contains(&key.as_str()) {
            columns.push(key);
        }
    }
    columns
}

fn display_value(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let kept: String = value.chars().take(width - 3).collect();
        format!("{kept}...")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ForeignKey, IndexInfo};
    use serde_json::json;

    fn orders() -> TableSchema {
        let mut schema = TableSchema::new("orders")
            .with_column(ColumnDefinition::new("id", "int", false).with_primary_key(true))
            .with_column(ColumnDefinition::new("customer_id", "int", false))
            .with_column(ColumnDefinition::new("note", "text", true).with_default("''"))
            .with_foreign_key(
                ForeignKey::new(vec!["customer_id".into()], "customers", vec!["id".into()])
                    .with_name("fk_orders_customer"),
            )
            .with_index(IndexInfo::new("idx_customer", vec!["customer_id".into()]))
            .with_index(IndexInfo::new("PRIMARY", vec!["id".into()]).with_primary(true));
        schema.derive_primary_key();
        schema
    }

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_table_description_sections() {
        let text = table_description(&orders(), &[]);
        assert!(text.starts_with("TABLE: orders\n"));
        assert!(text.contains("  - id: int NOT NULL PRIMARY KEY\n"));
        assert!(text.contains("  - customer_id: int NOT NULL - REFERENCES customers(id)\n"));
        assert!(text.contains("  - note: text NULL DEFAULT ''\n"));
        assert!(text.contains("\nPRIMARY KEY: id\n"));
        assert!(text.contains("\nFOREIGN KEYS:\n  - customer_id -> customers(id)\n"));
        assert!(text.contains("\nINDICES:\n  - INDEX idx_customer (customer_id)\n"));
        assert!(!text.contains("INDEX PRIMARY"));
        assert!(!text.contains("SAMPLE DATA"));
    }

    #[test]
    fn test_table_description_samples_truncated() {
        let samples = vec![row(json!({
            "id": 1,
            "customer_id": 7,
            "note": "a very long note that goes on and on"
        }))];
        let text = table_description(&orders(), &samples);
        assert!(text.contains("\nSAMPLE DATA:\nid | customer_id | note\n"));
        assert!(text.contains("1 | 7 | a very long note ...\n"));
    }

    #[test]
    fn test_column_description() {
        let schema = orders();
        assert_eq!(
            column_description("orders", schema.column("id").unwrap()),
            "Table: orders, Column: id, Type: int, NOT NULL PRIMARY KEY"
        );
        assert_eq!(
            column_description("orders", schema.column("note").unwrap()),
            "Table: orders, Column: note, Type: text, NULL DEFAULT ''"
        );
    }

    #[test]
    fn test_table_chunk() {
        let long = "x".repeat(60);
        let sample = row(json!({"id": 3, "note": long}));
        let text = table_chunk(&orders(), Some(&sample));
        assert!(text.starts_with("TABLE: orders\n\nSCHEMA:\nPRIMARY KEY: id\n"));
        assert!(text.contains("FOREIGN KEYS:\n  customer_id → customers(id)\n\n"));
        assert!(text.contains("  - id: int (PK, NOT NULL) = 3\n"));
        assert!(text.contains("  - customer_id: int (NOT NULL)\n"));
        assert!(text.contains(&format!("  - note: text = {}...\n", "x".repeat(47))));
    }

    #[test]
    fn test_table_chunk_without_sample() {
        let text = table_chunk(&TableSchema::new("empty"), None);
        assert_eq!(text, "TABLE: empty\n\nSCHEMA:\nCOLUMNS WITH SAMPLE DATA:\n");
    }
}
