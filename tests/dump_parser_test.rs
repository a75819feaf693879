//! Integration tests for reading schema and samples from dump files on disk.
//!
//! Tests verify that:
//! - A MySQL dump yields every table with its keys and sample rows
//! - The newest dump in a directory is picked as the offline source
//! - The JSON export carries schema and samples per table
//! - Gzip dumps are decompressed; corrupt and missing files fail with a dump error

mod common;

use nl_sql_assistant::assistant::{IndexSource, documents_from_dump};
use nl_sql_assistant::db::DumpParser;
use nl_sql_assistant::db::dump::latest_dump;
use nl_sql_assistant::error::AppError;
use std::path::Path;
use std::time::Duration;

#[test]
fn test_open_dump_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_dump(dir.path());

    let parser = DumpParser::open(&path).unwrap();
    assert_eq!(parser.path(), path.as_path());
    assert_eq!(parser.table_names(), vec!["customers", "orders"]);

    let orders = parser.table_schema("orders").unwrap();
    assert_eq!(orders.primary_key, vec!["id"]);
    assert_eq!(orders.reference_for("customer_id"), Some(("customers", "id")));
    assert_eq!(orders.indexes.len(), 1);
    assert_eq!(orders.indexes[0].name, "idx_customer");

    let schema = parser.full_schema();
    assert_eq!(schema.len(), 2);
    assert!(schema.contains_key("customers"));
}

#[test]
fn test_sample_rows_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let parser = DumpParser::open(common::write_dump(dir.path())).unwrap();

    let customers = parser.sample_rows("customers", 3);
    assert_eq!(customers.len(), 2);
    assert_eq!(customers[0]["name"], "Ada");
    assert!(customers[1].get("email").is_none());

    assert_eq!(parser.sample_rows("orders", 2).len(), 2);
}

#[test]
fn test_documents_from_dump_file() {
    let dir = tempfile::tempdir().unwrap();
    let parser = DumpParser::open(common::write_dump(dir.path())).unwrap();

    let documents = documents_from_dump(&parser, 2);
    assert_eq!(documents.len(), 2);

    let orders = &documents[1];
    assert_eq!(orders.table_name(), "orders");
    assert!(orders.description.starts_with("TABLE: orders"));
    assert!(orders.description.contains("customers"));
    let chunk = orders.chunk.as_deref().unwrap();
    assert!(chunk.contains("customer_id"));
}

#[test]
fn test_export_json() {
    let dir = tempfile::tempdir().unwrap();
    let parser = DumpParser::open(common::write_dump(dir.path())).unwrap();

    let export = parser.export(1);
    let tables = export["tables"].as_object().unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables["orders"]["sample_data"].as_array().unwrap().len(), 1);
    assert_eq!(tables["customers"]["schema"]["table_name"], "customers");
    assert!(export["source"].as_str().unwrap().ends_with("shop.sql"));
}

#[test]
fn test_latest_dump_prefers_newest() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("old.sql"), "CREATE TABLE a (id INT);").unwrap();
    std::thread::sleep(Duration::from_millis(50));
    std::fs::write(dir.path().join("new.sql"), "CREATE TABLE b (id INT);").unwrap();

    let latest = latest_dump(dir.path()).unwrap();
    assert_eq!(latest.file_name().unwrap(), "new.sql");

    let source = IndexSource::dump(None, dir.path()).unwrap();
    assert_eq!(source, IndexSource::Dump(latest));
}

#[test]
fn test_gzip_dump_is_offline_source() {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.sql.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(common::SHOP_DUMP.as_bytes()).unwrap();
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();

    assert_eq!(
        IndexSource::dump(None, dir.path()).unwrap(),
        IndexSource::Dump(path.clone())
    );
    let parser = DumpParser::open(&path).unwrap();
    assert_eq!(parser.table_names(), vec!["customers", "orders"]);
    assert_eq!(parser.sample_rows("orders", 10).len(), 3);
}

#[test]
fn test_corrupt_gzip_dump_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.sql.gz");
    std::fs::write(&path, [0x1f, 0x8b, 0x08, 0x00, 0x00]).unwrap();

    let err = DumpParser::open(&path).unwrap_err();
    assert!(matches!(err, AppError::Dump { .. }));
}

#[test]
fn test_missing_dump_file() {
    let err = DumpParser::open(Path::new("/nonexistent/dump.sql")).unwrap_err();
    assert!(matches!(err, AppError::Dump { .. } | AppError::Io(_)));
}
