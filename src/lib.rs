//! Natural-language database query assistant.
//!
//! Questions are embedded, matched against embedded schema documents, and
//! turned into SQL by a chat-completions model. The SQL is then run against
//! MySQL, PostgreSQL or SQLite, or only shown when working offline from a
//! SQL dump.

pub mod assistant;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod format;
pub mod llm;
pub mod models;
pub mod sql_validator;
pub mod transport;
pub mod vector_store;

pub use assistant::Assistant;
pub use config::Config;
pub use error::{AppError, AppResult};
