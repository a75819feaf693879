//! Integration tests for the interactive session.
//!
//! Tests verify that:
//! - `help` lists the session commands
//! - `tables` lists indexed tables, or points at `init` before indexing
//! - Questions are answered in offline mode and `exit` ends the session

mod common;

use common::{DIMENSIONS, KeywordEmbedder, ScriptedCompletion};
use nl_sql_assistant::assistant::{Assistant, IndexOptions, IndexSource};
use nl_sql_assistant::format::OutputFormat;
use nl_sql_assistant::transport::ReplTransport;
use nl_sql_assistant::vector_store::VectorStore;
use std::path::Path;
use std::sync::Arc;

async fn offline_assistant(dir: &Path) -> Arc<Assistant> {
    let store = VectorStore::open(dir.join("vectors"), "shop", DIMENSIONS, 10)
        .await
        .unwrap();
    let assistant = Assistant::builder()
        .embedder(Arc::new(KeywordEmbedder))
        .vector_store(Arc::new(store))
        .completion(Arc::new(ScriptedCompletion::sql(
            "SELECT * FROM `orders`",
            "Lists every order.",
        )))
        .build()
        .unwrap();
    Arc::new(assistant)
}

async fn session(assistant: Arc<Assistant>, input: &str) -> String {
    let repl = ReplTransport::new(assistant, OutputFormat::Plain, IndexOptions::default());
    let mut out: Vec<u8> = Vec::new();
    repl.run_session(input.as_bytes(), &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_help_and_tables_commands() {
    let dir = tempfile::tempdir().unwrap();
    let assistant = offline_assistant(dir.path()).await;
    let dump = common::write_dump(dir.path());
    assistant
        .initialize_vector_db(&IndexSource::Dump(dump), IndexOptions::default())
        .await
        .unwrap();

    let text = session(assistant, "help\nTABLES\nexit\nhelp\n").await;
    assert!(text.contains("'help' for commands"));
    assert_eq!(text.matches("Commands:").count(), 1);
    assert!(text.contains("tables  list the indexed tables"));
    assert!(text.contains("\n=== Tables ===\ncustomers\norders\n"));
}

#[tokio::test]
async fn test_tables_before_indexing() {
    let dir = tempfile::tempdir().unwrap();
    let text = session(offline_assistant(dir.path()).await, "tables\n").await;
    assert!(text.contains("No tables indexed yet. Run 'init' first."));
    assert!(!text.contains("=== Tables ==="));
}

#[tokio::test]
async fn test_question_answered_offline() {
    let dir = tempfile::tempdir().unwrap();
    let assistant = offline_assistant(dir.path()).await;
    let dump = common::write_dump(dir.path());
    assistant
        .initialize_vector_db(&IndexSource::Dump(dump), IndexOptions::default())
        .await
        .unwrap();

    let text = session(assistant, "  \nshow all orders\nquit\n").await;
    assert!(text.contains("=== SQL Query ===\nSELECT * FROM `orders`\n"));
    assert!(text.contains("=== OFFLINE MODE ==="));
}
