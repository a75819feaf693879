//! Integration tests for the database connector against a SQLite file.
//!
//! Tests verify that:
//! - Schema introspection reports columns, keys and indexes
//! - Query results honor the row limit and flag truncation
//! - Sample rows are read per table
//! - The default read-only pool refuses writes

use nl_sql_assistant::db::{DatabaseConnector, PoolSettings};
use nl_sql_assistant::error::AppError;
use nl_sql_assistant::models::DatabaseType;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

const SETUP: [&str; 6] = [
    "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
    "CREATE UNIQUE INDEX idx_customers_email ON customers (email)",
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL REFERENCES customers (id), total REAL)",
    "INSERT INTO customers (id, name, email) VALUES (1, 'Ada', 'ada@example.com'), (2, 'Grace', NULL), (3, 'Linus', 'linus@example.com')",
    "INSERT INTO orders (id, customer_id, total) VALUES (10, 1, 19.99), (11, 2, 5.0)",
    "CREATE INDEX idx_orders_customer ON orders (customer_id)",
];

async fn create_database(path: &Path) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    for statement in SETUP {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

async fn connect(path: &Path, max_rows: usize) -> DatabaseConnector {
    let url = format!("sqlite:{}", path.display());
    DatabaseConnector::connect(
        &url,
        &PoolSettings::default(),
        Duration::from_secs(5),
        max_rows,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_schema_introspection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_database(&path).await;
    let db = connect(&path, 100).await;

    assert_eq!(db.db_type(), DatabaseType::SQLite);
    assert_eq!(
        db.get_all_table_names().await.unwrap(),
        vec!["customers", "orders"]
    );

    let orders = db.get_table_schema("orders").await.unwrap();
    assert_eq!(orders.column_names(), vec!["id", "customer_id", "total"]);
    assert_eq!(orders.primary_key, vec!["id"]);
    assert_eq!(orders.reference_for("customer_id"), Some(("customers", "id")));
    assert!(!orders.column("customer_id").unwrap().nullable);

    let customers = db.get_table_schema("customers").await.unwrap();
    let email_index = customers
        .indexes
        .iter()
        .find(|i| i.name == "idx_customers_email")
        .unwrap();
    assert!(email_index.is_unique);
    assert_eq!(email_index.columns, vec!["email"]);

    let schema = db.get_full_database_schema().await.unwrap();
    assert_eq!(schema.len(), 2);
    db.close().await;
}

#[tokio::test]
async fn test_unknown_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_database(&path).await;
    let db = connect(&path, 100).await;

    assert!(db.get_table_schema("missing").await.is_err());
}

#[tokio::test]
async fn test_execute_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_database(&path).await;
    let db = connect(&path, 100).await;

    let result = db
        .execute_query(
            "SELECT c.name, COUNT(o.id) AS order_count FROM customers c \
             LEFT JOIN orders o ON o.customer_id = c.id GROUP BY c.id ORDER BY c.id",
        )
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["name", "order_count"]);
    assert_eq!(result.row_count(), 3);
    assert!(!result.truncated);
    assert_eq!(result.rows[0]["name"], "Ada");
    assert_eq!(result.rows[0]["order_count"], 1);
    assert_eq!(result.rows[2]["order_count"], 0);
}

#[tokio::test]
async fn test_row_limit_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_database(&path).await;
    let db = connect(&path, 2).await;

    let result = db
        .execute_query("SELECT id FROM customers ORDER BY id")
        .await
        .unwrap();
    assert_eq!(result.row_count(), 2);
    assert!(result.truncated);
}

#[tokio::test]
async fn test_sample_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_database(&path).await;
    let db = connect(&path, 100).await;

    let rows = db.get_sample_data("customers", 2).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains_key("email"));
    assert!(db.get_sample_data("customers", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_sql_is_database_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_database(&path).await;
    let db = connect(&path, 100).await;

    let err = db
        .execute_query("SELECT nope FROM customers")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database { .. }));
    assert!(err.suggestion().is_some());
}

#[tokio::test]
async fn test_read_only_pool_refuses_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_database(&path).await;
    let db = connect(&path, 100).await;

    assert!(
        db.execute_query("DELETE FROM orders")
            .await
            .is_err()
    );
    let result = db.execute_query("SELECT COUNT(*) AS n FROM orders").await.unwrap();
    assert_eq!(result.rows[0]["n"], 2);
}

#[tokio::test]
async fn test_missing_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("absent.db").display());
    let err = DatabaseConnector::connect(
        &url,
        &PoolSettings::default(),
        Duration::from_secs(5),
        100,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Connection { .. }));
}
