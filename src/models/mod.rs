//! Data models shared by the database client, the dump parser and the
//! vector store.

pub mod dialect;
pub mod query;
pub mod schema;

pub use dialect::DatabaseType;
pub use query::{QueryResult, Row, SqlGeneration};
pub use schema::{ColumnDefinition, DatabaseSchema, ForeignKey, IndexInfo, TableSchema};
