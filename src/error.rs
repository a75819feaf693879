//! Error types for the assistant.
//!
//! Every failure the pipeline can hit is an [`AppError`] variant. User-facing
//! variants carry a suggestion so the CLI and the web front end can tell the
//! user what to check next.

use thiserror::Error;

pub const CHECK_DB_CREDENTIALS: &str =
    "Verify database credentials (DB_HOST, DB_PORT, DB_USER, DB_PASSWORD, DB_NAME)";
pub const CHECK_API_KEY: &str = "Verify that OPENAI_API_KEY is valid and has API access";
pub const REINDEX: &str = "Re-run the indexing command (`nl-sql-assistant index`)";

const CHECK_GENERATED_SQL: &str = "Check the generated SQL against the indexed schema";
const CHECK_SERVER: &str = "Check that the database server is reachable";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// Backend error code, e.g. `1146` or `42P01`
        code: Option<String>,
    },

    #[error("Permission denied: {operation} - {reason}")]
    Permission { operation: String, reason: String },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Embedding error: {message}")]
    Embedding { message: String },

    #[error("LLM error: {message}")]
    Llm { message: String },

    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    #[error("Dump parse error: {message} (file: {path})")]
    Dump { message: String, path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn database(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            code,
        }
    }

    /// A statement or action refused by the read-only guard.
    pub fn permission(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permission {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Failure talking to the embeddings endpoint.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Failure talking to the chat completions endpoint.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore {
            message: message.into(),
        }
    }

    pub fn dump(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Dump {
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// What the user should check next, if there is anything useful to say.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { .. } => Some(CHECK_GENERATED_SQL),
            Self::Embedding { .. } | Self::Llm { .. } => Some(CHECK_API_KEY),
            Self::VectorStore { .. } => Some(REINDEX),
            Self::Timeout { .. } => Some("Consider increasing --query-timeout"),
            Self::Dump { .. } => Some("Check that the file is a MySQL dump (.sql or .sql.gz)"),
            _ => None,
        }
    }

    /// Connection drops and timeouts may succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Message plus suggestion, as shown to users.
    pub fn user_message(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{self}. {suggestion}"),
            None => self.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;

        match err {
            E::Database(db_err) => {
                AppError::database(db_err.message(), db_err.code().map(|c| c.into_owned()))
            }
            E::RowNotFound => AppError::database("Query returned no rows", None),
            E::Configuration(source) => {
                AppError::connection(source.to_string(), CHECK_DB_CREDENTIALS)
            }
            E::PoolTimedOut => AppError::connection(
                "Timed out waiting for a database connection",
                "Consider increasing --connect-timeout",
            ),
            E::PoolClosed => {
                AppError::connection("Connection pool is closed", "Restart the assistant")
            }
            E::Io(source) => AppError::connection(source.to_string(), CHECK_SERVER),
            E::Tls(source) => AppError::connection(
                format!("TLS handshake failed: {source}"),
                "Check the server's TLS settings",
            ),
            E::Protocol(message) => AppError::connection(message, CHECK_SERVER),
            E::ColumnNotFound(column) => {
                AppError::schema("Column not found in result", column)
            }
            E::TypeNotFound { type_name } => AppError::schema("Unknown column type", type_name),
            other => AppError::internal(format!("Database driver error: {other}")),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::internal(format!("JSON error: {err}"))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_keeps_suggestion() {
        let err = AppError::connection("refused", CHECK_DB_CREDENTIALS);
        assert_eq!(err.to_string(), "Connection failed: refused");
        assert_eq!(err.suggestion(), Some(CHECK_DB_CREDENTIALS));
    }

    #[test]
    fn test_api_errors_point_at_api_key() {
        assert_eq!(AppError::embedding("401").suggestion(), Some(CHECK_API_KEY));
        assert!(AppError::llm("401").user_message().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_vector_store_error_suggests_reindex() {
        let err = AppError::vector_store("collection is empty");
        assert!(err.user_message().ends_with(REINDEX));
    }

    #[test]
    fn test_user_message_without_suggestion() {
        let err = AppError::invalid_input("empty question");
        assert_eq!(err.user_message(), "Invalid input: empty question");
        assert!(AppError::permission("DELETE", "read-only").suggestion().is_none());
    }

    #[test]
    fn test_retryable() {
        assert!(AppError::timeout("query execution", 5).is_retryable());
        assert!(AppError::connection("refused", CHECK_DB_CREDENTIALS).is_retryable());
        assert!(!AppError::permission("DELETE", "read-only").is_retryable());
        assert!(!AppError::llm("bad request").is_retryable());
    }

    #[test]
    fn test_sqlx_mapping() {
        let closed: AppError = sqlx::Error::PoolClosed.into();
        assert!(matches!(closed, AppError::Connection { .. }));

        let timed_out: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(timed_out, AppError::Connection { .. }));
        assert!(!timed_out.to_string().contains("30"));

        let missing: AppError = sqlx::Error::ColumnNotFound("total".into()).into();
        assert!(matches!(missing, AppError::Schema { ref object, .. } if object == "total"));
    }
}
