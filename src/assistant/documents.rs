//! Schema documents gathered from a database or a dump.

use crate::db::dump::latest_dump;
use crate::db::{DatabaseConnector, DumpParser};
use crate::embeddings::describe;
use crate::error::{AppError, AppResult};
use crate::models::{Row, TableSchema};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where the schema is read from when indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    /// The connected database
    Database,
    /// A SQL dump file
    Dump(PathBuf),
}

impl IndexSource {
    /// Dump source from an explicit file, or the newest dump under `dir`.
    pub fn dump(file: Option<&Path>, dir: &Path) -> AppResult<Self> {
        match file {
            Some(file) => Ok(IndexSource::Dump(file.to_path_buf())),
            None => latest_dump(dir).map(IndexSource::Dump),
        }
    }
}

/// Everything rendered for one table.
#[derive(Debug, Clone)]
pub struct TableDocument {
    pub schema: TableSchema,
    pub samples: Vec<Row>,
    /// Long-form description
    pub description: String,
    /// Compact schema-plus-sample chunk; dump sources only
    pub chunk: Option<String>,
}

impl TableDocument {
    fn new(schema: TableSchema, samples: Vec<Row>, with_chunk: bool) -> Self {
        let description = describe::table_description(&schema, &samples);
        let chunk = with_chunk.then(|| describe::table_chunk(&schema, samples.first()));
        Self {
            schema,
            samples,
            description,
            chunk,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.schema.table_name
    }

    /// One description per column.
    pub fn column_descriptions(&self) -> Vec<(String, String)> {
        self.schema
            .columns
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    describe::column_description(&self.schema.table_name, c),
                )
            })
            .collect()
    }
}

/// Read every table from `source` and render its documents.
pub async fn collect_documents(
    database: Option<&DatabaseConnector>,
    source: &IndexSource,
    sample_rows: usize,
) -> AppResult<Vec<TableDocument>> {
    match source {
        IndexSource::Database => {
            let database = database.ok_or_else(|| {
                AppError::config("No database connection; pass --sql-file to index from a dump")
            })?;
            info!("Extracting database schema");
            let schema = database.get_full_database_schema().await?;
            let mut documents = Vec::with_capacity(schema.len());
            for (table, table_schema) in schema {
                let samples = match database.get_sample_data(&table, sample_rows).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(table = %table, error = %e, "Failed to read sample rows");
                        Vec::new()
                    }
                };
                documents.push(TableDocument::new(table_schema, samples, false));
            }
            Ok(documents)
        }
        IndexSource::Dump(path) => {
            info!(path = %path.display(), "Extracting schema from SQL dump");
            let parser = DumpParser::open(path)?;
            Ok(documents_from_dump(&parser, sample_rows))
        }
    }
}

/// Documents for every table in a parsed dump, in file order.
pub fn documents_from_dump(parser: &DumpParser, sample_rows: usize) -> Vec<TableDocument> {
    parser
        .table_names()
        .into_iter()
        .filter_map(|table| {
            let schema = parser.table_schema(&table).ok()?;
            let samples = parser.sample_rows(&table, sample_rows);
            if samples.is_empty() {
                info!(table = %table, "No sample data found");
            }
            Some(TableDocument::new(schema, samples, true))
        })
        .collect()
}
