//! Runs generated SQL and turns the rows into JSON.
//!
//! Generated SQL runs without bound parameters, so every backend uses the raw
//! (unprepared) protocol. Results are streamed and only `row_limit + 1` rows
//! are pulled, which tells us whether the result was truncated without
//! fetching it all.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{AppError, AppResult};
use crate::models::QueryResult;
use futures_util::StreamExt;
use sqlx::{Database, Executor};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_ROW_LIMIT: usize = 1000;
pub const MAX_ROW_LIMIT: usize = 100_000;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct QueryExecutor {
    timeout: Duration,
    row_limit: usize,
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_QUERY_TIMEOUT, DEFAULT_ROW_LIMIT)
    }

    /// Executor with a per-statement timeout and a row cap in `1..=MAX_ROW_LIMIT`.
    pub fn with_limits(timeout: Duration, row_limit: usize) -> Self {
        Self {
            timeout,
            row_limit: row_limit.clamp(1, MAX_ROW_LIMIT),
        }
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    pub async fn execute_query(&self, pool: &DbPool, sql: &str) -> AppResult<QueryResult> {
        self.fetch(pool, sql, self.row_limit).await
    }

    /// Run `sql` keeping at most `row_limit` rows.
    pub async fn fetch(&self, pool: &DbPool, sql: &str, row_limit: usize) -> AppResult<QueryResult> {
        let started = Instant::now();
        let limit = row_limit.clamp(1, MAX_ROW_LIMIT);
        debug!(sql = %sql, limit, timeout_secs = self.timeout.as_secs(), "Executing query");

        match pool {
            DbPool::MySql(p) => {
                let rows = stream_rows(p, sql, limit, self.timeout).await?;
                Ok(to_result(&rows, limit, started))
            }
            DbPool::Postgres(p) => {
                let rows = stream_rows(p, sql, limit, self.timeout).await?;
                Ok(to_result(&rows, limit, started))
            }
            DbPool::SQLite(p) => {
                let rows = stream_rows(p, sql, limit, self.timeout).await?;
                Ok(to_result(&rows, limit, started))
            }
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull up to `limit + 1` rows within `wait`.
async fn stream_rows<'p, X>(
    executor: X,
    sql: &'p str,
    limit: usize,
    wait: Duration,
) -> AppResult<Vec<<X::Database as Database>::Row>>
where
    X: Executor<'p>,
{
    let rows = executor.fetch(sql).take(limit + 1).collect::<Vec<_>>();
    match tokio::time::timeout(wait, rows).await {
        Ok(results) => Ok(results.into_iter().collect::<Result<Vec<_>, _>>()?),
        Err(_) => Err(AppError::timeout("query execution", wait.as_secs())),
    }
}

fn to_result<R: RowToJson>(rows: &[R], limit: usize, started: Instant) -> QueryResult {
    let execution_time_ms = started.elapsed().as_millis() as u64;
    let Some(first) = rows.first() else {
        return QueryResult::empty(execution_time_ms);
    };

    let truncated = rows.len() > limit;
    if truncated {
        warn!(limit, "Query result truncated");
    }

    QueryResult {
        columns: first.column_names(),
        rows: rows.iter().take(limit).map(RowToJson::to_json_map).collect(),
        truncated,
        execution_time_ms,
    }
}
