//! Orchestration of one question: embed, retrieve, translate, execute.
//!
//! [`Assistant`] owns the collaborators and is shared (behind an `Arc`) by
//! the interactive session and the web front end. Query processing never
//! fails outright: every problem is folded into the returned
//! [`QueryOutcome`].

mod documents;

pub use documents::{IndexSource, TableDocument, collect_documents, documents_from_dump};

use crate::config::AppSettings;
use crate::db::DatabaseConnector;
use crate::embeddings::EmbeddingProvider;
use crate::error::{AppError, AppResult};
use crate::llm::{CompletionProvider, SqlTranslator};
use crate::models::{DatabaseType, QueryResult, Row};
use crate::sql_validator::validate_readonly;
use crate::vector_store::{
    ColumnEmbedding, EmbeddingItem, SchemaHit, SchemaPayload, TableEmbedding, VectorStore,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const NO_SQL_ERROR: &str = "Failed to generate valid SQL";
pub const ALREADY_INDEXED: &str =
    "Vector database already has embeddings. Use --force-init to reinitialize.";

/// Result of processing one question.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    pub sql: String,
    pub explanation: String,
    pub results: Vec<Row>,
    pub columns: Vec<String>,
    pub success: bool,
    pub error: Option<String>,
    pub offline_mode: bool,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryOutcome {
    fn failed(query: &str, error: impl Into<String>) -> Self {
        Self {
            query: query.to_string(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Rows and columns as a [`QueryResult`] for rendering.
    pub fn query_result(&self) -> QueryResult {
        QueryResult {
            columns: self.columns.clone(),
            rows: self.results.clone(),
            truncated: self.truncated,
            execution_time_ms: self.execution_time_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Re-index even when embeddings exist
    pub force: bool,
    /// Add to the collection instead of clearing it first
    pub keep_existing: bool,
    pub include_columns: bool,
    pub sample_rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Embeddings already existed and `force` was off
    pub skipped: bool,
    pub tables: usize,
    pub chunks: usize,
    pub columns: usize,
}

/// Short view of a retrieved document.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaPreview {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub score: f32,
    pub preview: String,
}

pub struct Assistant {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<VectorStore>,
    translator: SqlTranslator,
    database: Option<DatabaseConnector>,
    settings: AppSettings,
    allow_writes: bool,
    dump_file: Option<PathBuf>,
}

#[derive(Default)]
pub struct AssistantBuilder {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<VectorStore>>,
    completion: Option<Arc<dyn CompletionProvider>>,
    database: Option<DatabaseConnector>,
    settings: AppSettings,
    allow_writes: bool,
    dump_file: Option<PathBuf>,
}

impl AssistantBuilder {
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn vector_store(mut self, store: Arc<VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn completion(mut self, completion: Arc<dyn CompletionProvider>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Database to execute against. Without one the assistant runs offline.
    pub fn database(mut self, database: Option<DatabaseConnector>) -> Self {
        self.database = database;
        self
    }

    pub fn settings(mut self, settings: AppSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn allow_writes(mut self, allow: bool) -> Self {
        self.allow_writes = allow;
        self
    }

    /// Dump used when re-indexing without a database.
    pub fn dump_file(mut self, path: Option<PathBuf>) -> Self {
        self.dump_file = path;
        self
    }

    pub fn build(self) -> AppResult<Assistant> {
        let embedder = self
            .embedder
            .ok_or_else(|| AppError::internal("Assistant requires an embedding provider"))?;
        let store = self
            .store
            .ok_or_else(|| AppError::internal("Assistant requires a vector store"))?;
        let completion = self
            .completion
            .ok_or_else(|| AppError::internal("Assistant requires a completion provider"))?;

        // Dumps are MySQL; offline mode generates MySQL SQL.
        let dialect = self
            .database
            .as_ref()
            .map(DatabaseConnector::db_type)
            .unwrap_or(DatabaseType::MySQL);

        Ok(Assistant {
            embedder,
            store,
            translator: SqlTranslator::new(completion, dialect),
            database: self.database,
            settings: self.settings,
            allow_writes: self.allow_writes,
            dump_file: self.dump_file,
        })
    }
}

impl Assistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::default()
    }

    pub fn is_offline(&self) -> bool {
        self.database.is_none()
    }

    pub fn vector_store(&self) -> &VectorStore {
        &self.store
    }

    pub fn database(&self) -> Option<&DatabaseConnector> {
        self.database.as_ref()
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Source used by `init` in the interactive session.
    pub fn default_index_source(&self) -> AppResult<IndexSource> {
        if self.database.is_some() {
            return Ok(IndexSource::Database);
        }
        IndexSource::dump(
            self.dump_file.as_deref(),
            std::path::Path::new(crate::config::DEFAULT_DUMP_DIR),
        )
    }

    pub async fn process_query(&self, question: &str) -> QueryOutcome {
        self.process_query_with_context(question).await.0
    }

    /// Answer `question`, also returning the documents retrieved for it.
    pub async fn process_query_with_context(
        &self,
        question: &str,
    ) -> (QueryOutcome, Vec<SchemaHit>) {
        info!(query = %question, "Processing query");

        let hits = match self.retrieve(question).await {
            Ok(hits) => hits,
            Err(e) => {
                error!(error = %e, "Schema retrieval failed");
                return (QueryOutcome::failed(question, e.user_message()), Vec::new());
            }
        };

        let generation = match self.translator.translate(question, &hits).await {
            Ok(generation) => generation,
            Err(e) => {
                error!(error = %e, "SQL generation failed");
                return (QueryOutcome::failed(question, e.user_message()), hits);
            }
        };

        let mut outcome = QueryOutcome {
            query: question.to_string(),
            sql: generation.sql.clone(),
            explanation: generation.explanation.clone(),
            ..QueryOutcome::default()
        };

        if generation.is_empty() {
            warn!("{}", NO_SQL_ERROR);
            outcome.sql.clear();
            outcome.error = Some(NO_SQL_ERROR.to_string());
            return (outcome, hits);
        }

        let Some(database) = &self.database else {
            info!(sql = %outcome.sql, "Offline mode, SQL not executed");
            outcome.success = true;
            outcome.offline_mode = true;
            return (outcome, hits);
        };

        if !self.allow_writes {
            if let Err(e) = validate_readonly(&outcome.sql, database.db_type()) {
                warn!(error = %e, sql = %outcome.sql, "Generated SQL rejected");
                outcome.error = Some(e.user_message());
                return (outcome, hits);
            }
        }

        info!(sql = %outcome.sql, "Executing SQL query");
        match database.execute_query(&outcome.sql).await {
            Ok(result) => {
                outcome.success = true;
                outcome.columns = result.columns;
                outcome.results = result.rows;
                outcome.truncated = result.truncated;
                outcome.execution_time_ms = result.execution_time_ms;
            }
            Err(e) => {
                error!(error = %e, "SQL execution failed");
                outcome.error = Some(e.user_message());
            }
        }
        (outcome, hits)
    }

    async fn retrieve(&self, question: &str) -> AppResult<Vec<SchemaHit>> {
        let vector = self.embedder.embed(question).await?;
        let hits = self
            .store
            .search_schema(&vector, self.settings.vector_store.search_limit)
            .await?;

        info!(count = hits.len(), "Vector store returned schema documents");
        for (rank, hit) in hits.iter().enumerate() {
            info!(
                rank = rank + 1,
                id = hit.id,
                score = hit.score,
                kind = hit.payload.kind(),
                table = hit.payload.table_name(),
                "Schema hit"
            );
        }
        Ok(hits)
    }

    /// Populate the vector store from `source`.
    pub async fn initialize_vector_db(
        &self,
        source: &IndexSource,
        options: IndexOptions,
    ) -> AppResult<IndexReport> {
        if !options.force && self.store.has_embeddings().await? {
            info!("Vector database already has embeddings, skipping initialization");
            return Ok(IndexReport {
                skipped: true,
                ..IndexReport::default()
            });
        }

        let documents =
            collect_documents(self.database.as_ref(), source, options.sample_rows).await?;
        info!(tables = documents.len(), "Generating embeddings for schema");

        let descriptions: Vec<String> = documents.iter().map(|d| d.description.clone()).collect();
        let description_vectors = self.embed_all(&descriptions).await?;

        let chunks: Vec<(usize, String)> = documents
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.chunk.clone().map(|c| (i, c)))
            .collect();
        let chunk_texts: Vec<String> = chunks.iter().map(|(_, c)| c.clone()).collect();
        let chunk_vectors = self.embed_all(&chunk_texts).await?;

        let mut column_embeddings = Vec::new();
        if options.include_columns {
            let columns: Vec<(String, String, String)> = documents
                .iter()
                .flat_map(|d| {
                    d.column_descriptions()
                        .into_iter()
                        .map(|(column, text)| (d.table_name().to_string(), column, text))
                })
                .collect();
            let texts: Vec<String> = columns.iter().map(|(_, _, t)| t.clone()).collect();
            let vectors = self.embed_all(&texts).await?;
            column_embeddings = columns
                .into_iter()
                .zip(vectors)
                .map(|((table, column, description), vector)| ColumnEmbedding {
                    table,
                    column,
                    description,
                    vector,
                })
                .collect();
        }

        let chunk_items: Vec<EmbeddingItem> = chunks
            .into_iter()
            .zip(chunk_vectors)
            .map(|((i, content), vector)| {
                let doc = &documents[i];
                EmbeddingItem {
                    vector,
                    payload: SchemaPayload::chunk(
                        doc.table_name(),
                        content,
                        usize::from(!doc.samples.is_empty()),
                    ),
                }
            })
            .collect();

        let tables: Vec<TableEmbedding> = documents
            .into_iter()
            .zip(description_vectors)
            .map(|(doc, vector)| TableEmbedding {
                schema: doc.schema,
                description: doc.description,
                vector,
            })
            .collect();

        if !options.keep_existing {
            self.store.clear_collection().await?;
        }

        info!("Storing embeddings in vector database");
        let report = IndexReport {
            skipped: false,
            tables: self.store.store_table_embeddings(tables).await?,
            chunks: self.store.store_embeddings(chunk_items).await?,
            columns: self.store.store_column_embeddings(column_embeddings).await?,
        };
        info!(
            tables = report.tables,
            chunks = report.chunks,
            columns = report.columns,
            "Vector database initialization complete"
        );
        Ok(report)
    }

    /// Embed in request-sized batches.
    async fn embed_all(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.settings.vector_store.batch_size.max(1)) {
            vectors.extend(self.embedder.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    /// Indexed table names, deduplicated, in id order.
    pub async fn indexed_tables(&self) -> AppResult<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for payload in self.store.get_all_tables().await? {
            let name = payload.table_name().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// First paragraph of each of the top `n` hits.
pub fn schema_previews(hits: &[SchemaHit], n: usize) -> Vec<SchemaPreview> {
    hits.iter()
        .take(n)
        .map(|hit| SchemaPreview {
            table: hit.payload.table_name().to_string(),
            kind: hit.payload.kind().to_string(),
            score: hit.score,
            preview: hit.payload.preview(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableSchema;

    #[test]
    fn test_failed_outcome() {
        let outcome = QueryOutcome::failed("q", "boom");
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
        assert!(outcome.sql.is_empty());
    }

    #[test]
    fn test_outcome_serializes_expected_keys() {
        let value = serde_json::to_value(QueryOutcome::default()).unwrap();
        for key in [
            "query",
            "sql",
            "explanation",
            "results",
            "columns",
            "success",
            "error",
            "offline_mode",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_schema_previews_limit() {
        let hits: Vec<SchemaHit> = (0..5)
            .map(|i| SchemaHit {
                id: i,
                score: 1.0 - i as f32 * 0.1,
                payload: SchemaPayload::table(
                    TableSchema::new(format!("t{i}")),
                    format!("TABLE: t{i}\n\nCOLUMNS:\n  - id: int NOT NULL\n"),
                ),
            })
            .collect();
        let previews = schema_previews(&hits, 3);
        assert_eq!(previews.len(), 3);
        assert_eq!(previews[0].table, "t0");
        assert_eq!(previews[0].kind, "table");
        assert_eq!(previews[2].preview, "COLUMNS:\n  - id: int NOT NULL");
    }

    #[test]
    fn test_builder_requires_collaborators() {
        assert!(Assistant::builder().build().is_err());
    }
}
