//! Database access.
//!
//! - Connection pools per backend (`pool`)
//! - Query execution with row limits and timeouts (`executor`)
//! - Schema introspection (`schema`)
//! - Row decoding (`types`)
//! - Offline schema extraction from SQL dumps (`dump`)
//!
//! [`DatabaseConnector`] ties the first four together for the assistant.

pub mod dump;
pub mod executor;
pub mod pool;
pub mod schema;
pub mod types;

pub use dump::DumpParser;
pub use executor::QueryExecutor;
pub use pool::{DbPool, PoolSettings};
pub use schema::SchemaInspector;

use crate::error::AppResult;
use crate::models::{DatabaseSchema, DatabaseType, QueryResult, Row, TableSchema};
use std::time::Duration;
use tracing::info;

/// Connection to the target database.
#[derive(Debug, Clone)]
pub struct DatabaseConnector {
    pool: DbPool,
    executor: QueryExecutor,
}

impl DatabaseConnector {
    /// Open a pool for `url` and verify it with a test query.
    pub async fn connect(
        url: &str,
        settings: &PoolSettings,
        query_timeout: Duration,
        max_rows: usize,
    ) -> AppResult<Self> {
        let pool = DbPool::connect(url, settings).await?;
        pool.ping().await?;
        let version = pool.server_version().await;
        info!(
            db_type = %pool.db_type(),
            server_version = ?version,
            "Connected to database"
        );
        Ok(Self::from_pool(
            pool,
            QueryExecutor::with_limits(query_timeout, max_rows),
        ))
    }

    pub fn from_pool(pool: DbPool, executor: QueryExecutor) -> Self {
        Self { pool, executor }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn get_all_table_names(&self) -> AppResult<Vec<String>> {
        SchemaInspector::list_tables(&self.pool).await
    }

    pub async fn get_table_schema(&self, table: &str) -> AppResult<TableSchema> {
        SchemaInspector::describe_table(&self.pool, table).await
    }

    pub async fn get_full_database_schema(&self) -> AppResult<DatabaseSchema> {
        SchemaInspector::full_schema(&self.pool).await
    }

    /// Run a statement and return its rows and column names.
    pub async fn execute_query(&self, sql: &str) -> AppResult<QueryResult> {
        self.executor.execute_query(&self.pool, sql).await
    }

    /// First `limit` rows of `table`.
    pub async fn get_sample_data(&self, table: &str, limit: usize) -> AppResult<Vec<Row>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            self.db_type().quote_identifier(table),
            limit
        );
        let result = self.executor.fetch(&self.pool, &sql, limit).await?;
        Ok(result.rows)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }
}
