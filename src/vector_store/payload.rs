//! Documents stored alongside each vector.

use crate::models::TableSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaPayload {
    /// Full structured schema plus its rendered description.
    Table {
        name: String,
        schema: TableSchema,
        #[serde(default)]
        description: String,
    },
    /// Compact schema-plus-sample chunk.
    TableWithSamples {
        name: String,
        table: String,
        content: String,
        metadata: ChunkMetadata,
    },
    Column {
        name: String,
        table: String,
        description: String,
    },
    SampleData {
        table: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub table: String,
    pub sample_count: usize,
}

impl SchemaPayload {
    pub fn table(schema: TableSchema, description: impl Into<String>) -> Self {
        SchemaPayload::Table {
            name: schema.table_name.clone(),
            schema,
            description: description.into(),
        }
    }

    pub fn chunk(table: impl Into<String>, content: impl Into<String>, sample_count: usize) -> Self {
        let table = table.into();
        SchemaPayload::TableWithSamples {
            name: table.clone(),
            table: table.clone(),
            content: content.into(),
            metadata: ChunkMetadata {
                table,
                sample_count,
            },
        }
    }

    /// Stored `kind` column value.
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaPayload::Table { .. } => "table",
            SchemaPayload::TableWithSamples { .. } => "table_with_samples",
            SchemaPayload::Column { .. } => "column",
            SchemaPayload::SampleData { .. } => "sample_data",
        }
    }

    /// Table the document describes.
    pub fn table_name(&self) -> &str {
        match self {
            SchemaPayload::Table { name, .. } => name,
            SchemaPayload::TableWithSamples { table, .. }
            | SchemaPayload::Column { table, .. }
            | SchemaPayload::SampleData { table, .. } => table,
        }
    }

    /// Rendered text of the document.
    pub fn document(&self) -> &str {
        match self {
            SchemaPayload::Table { description, .. } | SchemaPayload::Column { description, .. } => {
                description
            }
            SchemaPayload::TableWithSamples { content, .. }
            | SchemaPayload::SampleData { content, .. } => content,
        }
    }

    /// First paragraph of the document after its `TABLE:` header.
    pub fn preview(&self) -> String {
        self.document()
            .split("\n\n")
            .map(str::trim)
            .find(|p| !p.is_empty() && !(p.starts_with("TABLE:") && !p.contains('\n')))
            .unwrap_or_default()
            .to_string()
    }

    pub fn is_table_document(&self) -> bool {
        matches!(
            self,
            SchemaPayload::Table { .. } | SchemaPayload::TableWithSamples { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag() {
        let payload = SchemaPayload::chunk("users", "TABLE: users\n\nSCHEMA:\nPRIMARY KEY: id", 1);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "table_with_samples");
        assert_eq!(json["metadata"]["sample_count"], 1);
        assert_eq!(json["name"], "users");
        assert_eq!(payload.kind(), "table_with_samples");
    }

    #[test]
    fn test_column_payload_from_json() {
        let payload: SchemaPayload = serde_json::from_str(
            r#"{"type":"column","name":"email","table":"users","description":"Table: users, Column: email"}"#,
        )
        .unwrap();
        assert_eq!(payload.table_name(), "users");
        assert!(!payload.is_table_document());
    }

    #[test]
    fn test_preview_skips_header() {
        let payload = SchemaPayload::table(
            TableSchema::new("users"),
            "TABLE: users\n\nCOLUMNS:\n  - id: int NOT NULL\n\nPRIMARY KEY: id\n",
        );
        assert_eq!(payload.preview(), "COLUMNS:\n  - id: int NOT NULL");
    }
}
