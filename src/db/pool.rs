//! Connection pools.
//!
//! Each backend gets its own sqlx pool type (MySqlPool, PgPool, SqlitePool)
//! rather than `AnyPool`, so rows decode with full type information.

use crate::error::{AppError, AppResult, CHECK_DB_CREDENTIALS};
use crate::models::DatabaseType;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySqlPool, PgPool, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Pool sizing, timeouts and access mode.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: Option<u32>,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// SQLite only: open the file read-only
    pub read_only: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: None,
            acquire_timeout: Duration::from_secs(crate::config::DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            read_only: true,
        }
    }
}

impl PoolSettings {
    fn max_connections_for(&self, db_type: DatabaseType) -> u32 {
        match (self.max_connections, db_type) {
            (Some(n), _) => n,
            (None, DatabaseType::SQLite) => DEFAULT_MAX_CONNECTIONS_SQLITE,
            (None, _) => DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Apply the shared sizing options to any backend's `PoolOptions`.
macro_rules! sized {
    ($options:expr, $settings:expr, $db_type:expr) => {
        $options
            .max_connections($settings.max_connections_for($db_type))
            .acquire_timeout($settings.acquire_timeout)
            .idle_timeout(Some($settings.idle_timeout))
    };
}

/// Run the same expression against whichever pool is inside.
macro_rules! with_pool {
    ($pool:expr, $p:ident => $body:expr) => {
        match $pool {
            DbPool::MySql($p) => $body,
            DbPool::Postgres($p) => $body,
            DbPool::SQLite($p) => $body,
        }
    };
}

#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Open a pool for `url`, picking the backend from its scheme.
    pub async fn connect(url: &str, settings: &PoolSettings) -> AppResult<Self> {
        let db_type = DatabaseType::from_connection_string(url).ok_or_else(|| {
            AppError::connection(
                "Unsupported database URL scheme",
                "Use mysql://, postgres:// or sqlite: URLs",
            )
        })?;
        let invalid_url = |e: sqlx::Error| {
            AppError::connection(
                format!("Invalid {db_type} connection string: {e}"),
                CHECK_DB_CREDENTIALS,
            )
        };
        let failed = |e: sqlx::Error| {
            AppError::connection(
                format!("Failed to connect: {e}"),
                connection_suggestion(db_type, &e),
            )
        };

        let pool = match db_type {
            DatabaseType::MySQL => {
                let options = MySqlConnectOptions::from_str(url)
                    .map_err(invalid_url)?
                    .charset("utf8mb4");
                let pool = sized!(MySqlPoolOptions::new(), settings, db_type)
                    .connect_with(options)
                    .await
                    .map_err(failed)?;
                DbPool::MySql(pool)
            }
            DatabaseType::PostgreSQL => {
                let options = PgConnectOptions::from_str(url).map_err(invalid_url)?;
                let pool = sized!(PgPoolOptions::new(), settings, db_type)
                    .connect_with(options)
                    .await
                    .map_err(failed)?;
                DbPool::Postgres(pool)
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(invalid_url)?
                    .read_only(settings.read_only);
                let pool = sized!(SqlitePoolOptions::new(), settings, db_type)
                    .connect_with(options)
                    .await
                    .map_err(failed)?;
                DbPool::SQLite(pool)
            }
        };
        Ok(pool)
    }

    /// Round-trip `SELECT 1` to prove the connection works.
    pub async fn ping(&self) -> AppResult<()> {
        let outcome = with_pool!(self, p => sqlx::query("SELECT 1").execute(p).await.map(drop));
        outcome.map_err(|e| {
            AppError::connection(
                format!("Connection test failed: {e}"),
                connection_suggestion(self.db_type(), &e),
            )
        })
    }

    pub async fn server_version(&self) -> Option<String> {
        let sql = match self.db_type() {
            DatabaseType::SQLite => "SELECT sqlite_version()",
            _ => "SELECT version()",
        };
        let outcome = with_pool!(self, p => sqlx::query_scalar::<_, String>(sql).fetch_one(p).await);
        match outcome {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Server version unavailable");
                None
            }
        }
    }

    pub async fn close(&self) {
        with_pool!(self, p => p.close().await)
    }

    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// Error text fragments and the hint they map to, checked in order.
const HINTS: &[(&[&str], &str)] = &[
    (
        &["access denied", "authentication", "password"],
        "Verify DB_USER and DB_PASSWORD",
    ),
    (
        &["does not exist", "unknown database"],
        "Check that DB_NAME names an existing database",
    ),
    (&["tls", "ssl"], "Check the server's TLS settings"),
];

fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let text = error.to_string().to_lowercase();

    if text.contains("connection refused") {
        return format!("Check that the {db_type} server is running and reachable at DB_HOST:DB_PORT");
    }
    if let Some((_, hint)) = HINTS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| text.contains(n)))
    {
        return (*hint).to_string();
    }

    match db_type {
        DatabaseType::SQLite => "Check that the SQLite file exists and is readable".to_string(),
        _ => CHECK_DB_CREDENTIALS.to_string(),
    }
}
