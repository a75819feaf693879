//! Question-to-SQL translation.

use super::CompletionProvider;
use crate::error::AppResult;
use crate::models::{DatabaseType, SqlGeneration, TableSchema};
use crate::vector_store::{SchemaHit, SchemaPayload};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, warn};

const FORMAT_INSTRUCTIONS: &str = r#"Respond with a single JSON object and nothing else, in this format:
{"sql": "<the SQL query to execute>", "explanation": "<explanation of what the SQL query does>"}"#;

/// Builds prompts from retrieved schema documents and parses the reply.
pub struct SqlTranslator {
    provider: Arc<dyn CompletionProvider>,
    dialect: DatabaseType,
}

impl SqlTranslator {
    pub fn new(provider: Arc<dyn CompletionProvider>, dialect: DatabaseType) -> Self {
        Self { provider, dialect }
    }

    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    /// Render search hits into the `DATABASE SCHEMA:` prompt section.
    ///
    /// The first hit for each table wins. Column hits are listed separately
    /// under `RELEVANT COLUMNS:`.
    pub fn schema_context(hits: &[SchemaHit]) -> String {
        let mut context = String::from("DATABASE SCHEMA:\n\n");
        let mut seen: Vec<&str> = Vec::new();
        let mut columns: Vec<&str> = Vec::new();

        for hit in hits {
            let table = hit.payload.table_name();
            if let SchemaPayload::Column { description, .. } = &hit.payload {
                columns.push(description);
                continue;
            }
            if table.is_empty() || seen.contains(&table) {
                continue;
            }
            seen.push(table);

            match &hit.payload {
                SchemaPayload::TableWithSamples { content, .. }
                | SchemaPayload::SampleData { content, .. } => {
                    let _ = write!(context, "{}\n\n", content);
                }
                SchemaPayload::Table { description, .. } if !description.trim().is_empty() => {
                    let _ = write!(context, "{}\n\n", description);
                }
                SchemaPayload::Table { schema, name, .. } => {
                    context.push_str(&render_schema(name, schema));
                }
                SchemaPayload::Column { .. } => {}
            }
        }

        if !columns.is_empty() {
            context.push_str("RELEVANT COLUMNS:\n");
            for column in columns {
                let _ = writeln!(context, "  - {}", column);
            }
            context.push('\n');
        }

        context
    }

    pub fn build_prompt(&self, question: &str, schema_context: &str) -> String {
        format!(
            "You are an expert SQL developer who specializes in converting natural language queries to SQL.\n\
             Your task is to convert the user's question into a valid {dialect} SQL query based on the provided database schema.\n\
             \n\
             {schema_context}\n\
             USER QUESTION: {question}\n\
             \n\
             Generate a SQL query to answer this question. Make sure your query is valid {dialect} and uses the correct table and column names from the schema.\n\
             If the schema doesn't contain enough information to answer the question directly:\n\
             1. Use exploratory SQL that would help understand the database structure\n\
             2. Explain what additional information might be needed\n\
             \n\
             {FORMAT_INSTRUCTIONS}\n",
            dialect = self.dialect.display_name(),
        )
    }

    /// Interpret the model's reply.
    ///
    /// Accepts a JSON object (optionally fenced), falls back to the first
    /// ```` ```sql ```` block, and otherwise returns an empty statement
    /// whose explanation carries the raw reply. A JSON reply with empty
    /// `sql` keeps the model's explanation.
    pub fn parse_response(raw: &str) -> SqlGeneration {
        let stripped = strip_code_fence(raw);
        if let Ok(parsed) = serde_json::from_str::<SqlGeneration>(&stripped)
            && !(parsed.sql.trim().is_empty() && parsed.explanation.trim().is_empty())
        {
            return SqlGeneration::new(parsed.sql.trim(), parsed.explanation);
        }

        warn!("Model reply was not the expected JSON object");
        if let Some(sql) = extract_sql_block(raw) {
            return SqlGeneration::new(sql, "Extracted SQL from response.");
        }

        SqlGeneration::new("", format!("Failed to generate SQL: {}", raw))
    }

    /// Ask the model for SQL answering `question`.
    pub async fn translate(&self, question: &str, hits: &[SchemaHit]) -> AppResult<SqlGeneration> {
        let context = Self::schema_context(hits);
        let prompt = self.build_prompt(question, &context);
        let reply = self.provider.complete(&prompt).await?;
        let generation = Self::parse_response(&reply);
        info!(
            model = self.provider.model_name(),
            generated = !generation.is_empty(),
            "Translated question to SQL"
        );
        Ok(generation)
    }
}

fn render_schema(name: &str, schema: &TableSchema) -> String {
    let mut out = format!("TABLE: {}\nCOLUMNS:\n", name);
    for column in &schema.columns {
        let nullable = if column.nullable { "NULL" } else { "NOT NULL" };
        let _ = write!(out, "  - {}: {} {}", column.name, column.data_type, nullable);
        if schema.is_primary_key(&column.name) {
            out.push_str(" PRIMARY KEY");
        }
        out.push('\n');
    }
    if !schema.foreign_keys.is_empty() {
        out.push_str("FOREIGN KEYS:\n");
        for fk in &schema.foreign_keys {
            let _ = writeln!(
                out,
                "  - ({}) REFERENCES {}({})",
                fk.columns.join(", "),
                fk.references_table,
                fk.references_columns.join(", ")
            );
        }
    }
    out.push('\n');
    out
}

/// Remove a surrounding ```` ``` ```` / ```` ```json ```` fence.
fn strip_code_fence(text: &str) -> String {
    let text = text.trim();
    if text.starts_with("```") {
        let start = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
        let end = text.rfind("```").filter(|&e| e >= start).unwrap_or(text.len());
        return text[start..end].trim().to_string();
    }
    text.to_string()
}

fn extract_sql_block(text: &str) -> Option<String> {
    let (_, rest) = text.split_once("```sql")?;
    let sql = rest.split("```").next()?.trim();
    (!sql.is_empty()).then(|| sql.to_string())
}
