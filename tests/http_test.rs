//! Integration tests for the web front end.
//!
//! Tests verify that:
//! - The query form and health endpoint are served
//! - Questions are refused with 503 until the store is indexed
//! - Answers carry the outcome fields and schema previews
//! - Blank questions are rejected with 400

mod common;

use common::{DIMENSIONS, KeywordEmbedder, ScriptedCompletion};
use nl_sql_assistant::assistant::{Assistant, IndexOptions, IndexSource};
use nl_sql_assistant::transport::http::router;
use nl_sql_assistant::vector_store::VectorStore;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

async fn offline_assistant(dir: &Path) -> Arc<Assistant> {
    let store = VectorStore::open(dir.join("vectors"), "shop", DIMENSIONS, 10)
        .await
        .unwrap();
    let assistant = Assistant::builder()
        .embedder(Arc::new(KeywordEmbedder))
        .vector_store(Arc::new(store))
        .completion(Arc::new(ScriptedCompletion::sql(
            "SELECT * FROM `customers`",
            "Lists every customer.",
        )))
        .build()
        .unwrap();
    Arc::new(assistant)
}

async fn index(assistant: &Assistant, dir: &Path) {
    let dump = common::write_dump(dir);
    let options = IndexOptions {
        sample_rows: 2,
        ..IndexOptions::default()
    };
    assistant
        .initialize_vector_db(&IndexSource::Dump(dump), options)
        .await
        .unwrap();
}

/// Serve the router on an ephemeral port and return its base URL.
async fn spawn(assistant: Arc<Assistant>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(assistant)).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_index_page_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn(offline_assistant(dir.path()).await).await;
    let client = reqwest::Client::new();

    let page = client.get(&base).send().await.unwrap();
    assert_eq!(page.status(), 200);
    assert!(page.text().await.unwrap().contains("Natural Language to SQL Converter"));

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["offline_mode"], true);
    assert_eq!(health["indexed"], false);
}

#[tokio::test]
async fn test_unindexed_store_returns_503() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn(offline_assistant(dir.path()).await).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/query"))
        .json(&json!({ "question": "How many customers?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("index"));

    let tables = client
        .get(format!("{base}/api/tables"))
        .send()
        .await
        .unwrap();
    assert_eq!(tables.status(), 503);
}

#[tokio::test]
async fn test_query_after_indexing() {
    let dir = tempfile::tempdir().unwrap();
    let assistant = offline_assistant(dir.path()).await;
    index(&assistant, dir.path()).await;
    let base = spawn(assistant).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/query"))
        .json(&json!({ "question": "List all customers" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["offline_mode"], true);
    assert_eq!(body["sql"], "SELECT * FROM `customers`");
    assert_eq!(body["explanation"], "Lists every customer.");

    let schema = body["schema"].as_array().unwrap();
    assert_eq!(schema.len(), 3);
    assert_eq!(schema[0]["table"], "customers");
    assert!(schema[0]["score"].as_f64().unwrap() > 0.0);

    let tables: Value = client
        .get(format!("{base}/api/tables"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tables["tables"], json!(["customers", "orders"]));
}

#[tokio::test]
async fn test_blank_question_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let assistant = offline_assistant(dir.path()).await;
    index(&assistant, dir.path()).await;
    let base = spawn(assistant).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/query"))
        .json(&json!({ "question": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Please enter a query");
}
