//! Persistent schema-embedding store.
//!
//! Points live in a SQLite file (`vectors.db`) under the configured
//! directory, one row per `(collection, id)`. Search is a brute-force cosine
//! scan, which is plenty for the few hundred documents a schema produces.
//!
//! Ids are partitioned by kind: table documents count up from 1, column
//! documents from 10000 and everything else from `next_table_id + 1000`.

mod payload;

pub use payload::{ChunkMetadata, SchemaPayload};

use crate::embeddings::cosine_similarity;
use crate::error::{AppError, AppResult};
use crate::models::TableSchema;
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const VECTOR_DB_FILE: &str = "vectors.db";
pub const FIRST_TABLE_ID: i64 = 1;
pub const FIRST_COLUMN_ID: i64 = 10_000;
pub const GENERIC_ID_OFFSET: i64 = 1_000;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS points (
    collection TEXT NOT NULL,
    id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    vector TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (collection, id)
)
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO points (collection, id, kind, vector, payload)
VALUES (?, ?, ?, ?, ?)
ON CONFLICT (collection, id) DO UPDATE SET
    kind = excluded.kind,
    vector = excluded.vector,
    payload = excluded.payload
"#;

/// Embedded table description ready to store.
#[derive(Debug, Clone)]
pub struct TableEmbedding {
    pub schema: TableSchema,
    pub description: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ColumnEmbedding {
    pub table: String,
    pub column: String,
    pub description: String,
    pub vector: Vec<f32>,
}

/// Any other document (chunks, sample data).
#[derive(Debug, Clone)]
pub struct EmbeddingItem {
    pub vector: Vec<f32>,
    pub payload: SchemaPayload,
}

/// A search result.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaHit {
    pub id: i64,
    pub score: f32,
    pub payload: SchemaPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdCounters {
    next_table: i64,
    next_column: i64,
    /// Highest generic id stored so far, if any
    last_generic: Option<i64>,
}

impl IdCounters {
    fn fresh() -> Self {
        Self {
            next_table: FIRST_TABLE_ID,
            next_column: FIRST_COLUMN_ID,
            last_generic: None,
        }
    }

    fn next_generic(&self) -> i64 {
        let floor = self.next_table + GENERIC_ID_OFFSET;
        match self.last_generic {
            Some(last) => floor.max(last + 1),
            None => floor,
        }
    }
}

struct Point {
    id: i64,
    kind: &'static str,
    vector: String,
    payload: String,
}

pub struct VectorStore {
    pool: SqlitePool,
    path: PathBuf,
    collection: String,
    dimensions: usize,
    batch_size: usize,
    counters: Mutex<IdCounters>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.path)
            .field("collection", &self.collection)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

fn store_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::vector_store(format!("{context}: {e}"))
}

impl VectorStore {
    /// Open (creating if needed) the store under `dir`.
    pub async fn open(
        dir: impl AsRef<Path>,
        collection: impl Into<String>,
        dimensions: usize,
        batch_size: usize,
    ) -> AppResult<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| store_error("Failed to create vector store directory", e))?;
        let path = dir.join(VECTOR_DB_FILE);

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| store_error("Failed to open vector store", e))?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .map_err(|e| store_error("Failed to create vector store table", e))?;

        let store = Self {
            pool,
            path,
            collection: collection.into(),
            dimensions,
            batch_size: batch_size.max(1),
            counters: Mutex::new(IdCounters::fresh()),
        };
        let counters = store.load_counters().await?;
        *store.counters.lock().await = counters;

        info!(
            path = %store.path.display(),
            collection = %store.collection,
            next_table_id = counters.next_table,
            next_column_id = counters.next_column,
            "Opened vector store"
        );
        Ok(store)
    }

    async fn load_counters(&self) -> AppResult<IdCounters> {
        let row: (Option<i64>, Option<i64>, Option<i64>) = sqlx::query_as(
            r#"
            SELECT
                MAX(CASE WHEN kind = 'table' THEN id END),
                MAX(CASE WHEN kind = 'column' THEN id END),
                MAX(CASE WHEN kind NOT IN ('table', 'column') THEN id END)
            FROM points WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("Failed to read stored ids", e))?;

        let mut counters = IdCounters::fresh();
        if let Some(max) = row.0 {
            counters.next_table = max + 1;
        }
        if let Some(max) = row.1 {
            counters.next_column = max + 1;
        }
        counters.last_generic = row.2;
        Ok(counters)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn count(&self) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM points WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("Failed to count points", e))?;
        Ok(count.max(0) as u64)
    }

    pub async fn has_embeddings(&self) -> AppResult<bool> {
        let count = self.count().await?;
        if count > 0 {
            info!(collection = %self.collection, count, "Collection already has embeddings");
        } else {
            debug!(collection = %self.collection, "Collection is empty");
        }
        Ok(count > 0)
    }

    pub async fn store_table_embeddings(&self, tables: Vec<TableEmbedding>) -> AppResult<usize> {
        let mut counters = self.counters.lock().await;
        let mut points = Vec::with_capacity(tables.len());
        let mut next = counters.next_table;
        for table in tables {
            let payload = SchemaPayload::table(table.schema, table.description);
            if let Some(point) = self.point(next, &table.vector, &payload)? {
                points.push(point);
                next += 1;
            }
        }
        let stored = self.upsert(&points).await?;
        counters.next_table = next;
        info!(count = stored, "Stored table embeddings");
        Ok(stored)
    }

    pub async fn store_column_embeddings(&self, columns: Vec<ColumnEmbedding>) -> AppResult<usize> {
        let mut counters = self.counters.lock().await;
        let mut points = Vec::with_capacity(columns.len());
        let mut next = counters.next_column;
        for column in columns {
            let payload = SchemaPayload::Column {
                name: column.column,
                table: column.table,
                description: column.description,
            };
            if let Some(point) = self.point(next, &column.vector, &payload)? {
                points.push(point);
                next += 1;
            }
        }
        let stored = self.upsert(&points).await?;
        counters.next_column = next;
        info!(count = stored, "Stored column embeddings");
        Ok(stored)
    }

    /// Store chunk and sample documents.
    pub async fn store_embeddings(&self, items: Vec<EmbeddingItem>) -> AppResult<usize> {
        if items.is_empty() {
            warn!("No embeddings provided to store");
            return Ok(0);
        }
        let mut counters = self.counters.lock().await;
        let first = counters.next_generic();
        let mut next = first;
        let mut points = Vec::with_capacity(items.len());
        for item in items {
            if let Some(point) = self.point(next, &item.vector, &item.payload)? {
                points.push(point);
                next += 1;
            }
        }
        let stored = self.upsert(&points).await?;
        if next > first {
            counters.last_generic = Some(next - 1);
        }
        info!(count = stored, "Stored embeddings");
        Ok(stored)
    }

    /// Build a point, skipping empty vectors and rejecting wrong sizes.
    fn point(&self, id: i64, vector: &[f32], payload: &SchemaPayload) -> AppResult<Option<Point>> {
        if vector.is_empty() {
            warn!(
                kind = payload.kind(),
                table = payload.table_name(),
                "Skipping embedding with no vector"
            );
            return Ok(None);
        }
        self.check_dimensions(vector)?;
        Ok(Some(Point {
            id,
            kind: payload.kind(),
            vector: serde_json::to_string(vector)?,
            payload: serde_json::to_string(payload)?,
        }))
    }

    fn check_dimensions(&self, vector: &[f32]) -> AppResult<()> {
        if vector.len() != self.dimensions {
            return Err(AppError::vector_store(format!(
                "Vector has {} dimensions, collection '{}' expects {}",
                vector.len(),
                self.collection,
                self.dimensions
            )));
        }
        Ok(())
    }

    async fn upsert(&self, points: &[Point]) -> AppResult<usize> {
        for batch in points.chunks(self.batch_size) {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| store_error("Failed to start transaction", e))?;
            for point in batch {
                sqlx::query(UPSERT_SQL)
                    .bind(&self.collection)
                    .bind(point.id)
                    .bind(point.kind)
                    .bind(&point.vector)
                    .bind(&point.payload)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| store_error("Failed to store point", e))?;
            }
            tx.commit()
                .await
                .map_err(|e| store_error("Failed to commit points", e))?;
            debug!(batch = batch.len(), "Stored batch of embeddings");
        }
        Ok(points.len())
    }

    /// Top `limit` documents by cosine similarity to `query`.
    pub async fn search_schema(&self, query: &[f32], limit: usize) -> AppResult<Vec<SchemaHit>> {
        self.check_dimensions(query)?;

        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, vector, payload FROM points WHERE collection = ?")
                .bind(&self.collection)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| store_error("Search failed", e))?;

        let mut hits: Vec<SchemaHit> = rows
            .into_iter()
            .filter_map(|(id, vector, payload)| {
                let vector: Vec<f32> = serde_json::from_str(&vector).ok()?;
                let payload: SchemaPayload = match serde_json::from_str(&payload) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(id, error = %e, "Skipping point with unreadable payload");
                        return None;
                    }
                };
                Some(SchemaHit {
                    id,
                    score: cosine_similarity(query, &vector),
                    payload,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Payloads of every table-level document.
    pub async fn get_all_tables(&self) -> AppResult<Vec<SchemaPayload>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT payload FROM points WHERE collection = ? \
             AND kind IN ('table', 'table_with_samples') ORDER BY id",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to list tables", e))?;

        Ok(rows
            .into_iter()
            .filter_map(|(payload,)| serde_json::from_str(&payload).ok())
            .collect())
    }

    /// Delete every point in the collection and reset the id counters.
    pub async fn clear_collection(&self) -> AppResult<()> {
        let mut counters = self.counters.lock().await;
        sqlx::query("DELETE FROM points WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("Failed to clear collection", e))?;
        *counters = IdCounters::fresh();
        info!(collection = %self.collection, "Cleared collection");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
