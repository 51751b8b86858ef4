//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::path::PathBuf;

use tempfile::TempDir;
use tillroll_core::test_utils::fixtures;
use tillroll_core::Database;

use crate::commands::{self, truncate, GlobalOpts};

fn setup_opts(dir: &TempDir) -> GlobalOpts {
    GlobalOpts {
        db: dir.path().join("tillroll.db"),
        config: None,
        no_store: false,
    }
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn write_bundle(dir: &TempDir) -> PathBuf {
    let json = serde_json::to_string(&fixtures::warehouse_bundle()).unwrap();
    write_file(dir, "bundle.json", &json)
}

// ========== Input Tests ==========

#[test]
fn test_read_bundle() {
    let dir = TempDir::new().unwrap();
    let bundle = commands::read_bundle(&write_bundle(&dir)).unwrap();
    assert_eq!(bundle.merchant, "Costco Wholesale #481");
    assert_eq!(bundle.items.len(), 2);
    assert_eq!(bundle.raw_text.len(), fixtures::WAREHOUSE_RECEIPT_LINES.len());
}

#[test]
fn test_read_bundle_minimal_json() {
    let dir = TempDir::new().unwrap();
    let json = r#"{"merchant": "SAFEWAY", "items": [{"name": "MILK", "total_price": 4.29}]}"#;
    let path = write_file(&dir, "min.json", json);
    let bundle = commands::read_bundle(&path).unwrap();
    assert_eq!(bundle.items[0].total_price.as_raw(), "4.29");
    assert!(bundle.raw_text.is_empty());
}

#[test]
fn test_read_bundle_invalid_json() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "bad.json", "not json");
    assert!(commands::read_bundle(&path).is_err());
}

#[test]
fn test_read_lines_skips_blanks() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "lines.txt", "555107 BLK FRST HAM\n\n  143.91  \n");
    let lines = commands::read_lines(&path).unwrap();
    assert_eq!(lines, vec!["555107 BLK FRST HAM", "143.91"]);
}

// ========== Receipt Command Tests ==========

#[tokio::test]
async fn test_cmd_process_learns_into_db() {
    let dir = TempDir::new().unwrap();
    let opts = setup_opts(&dir);
    let bundle = write_bundle(&dir);

    commands::cmd_process(&opts, &bundle, false).await.unwrap();
    commands::cmd_process(&opts, &bundle, true).await.unwrap();

    let db = Database::new(opts.db.to_str().unwrap()).unwrap();
    let ham = db
        .get_normalization("BLK FRST HAM", "COSTCO WHOLESALE #481")
        .unwrap()
        .unwrap();
    assert_eq!(ham.match_count, 2);
}

#[tokio::test]
async fn test_cmd_process_no_store_leaves_no_db() {
    let dir = TempDir::new().unwrap();
    let opts = GlobalOpts {
        no_store: true,
        ..setup_opts(&dir)
    };
    commands::cmd_process(&opts, &write_bundle(&dir), false).await.unwrap();
    assert!(!opts.db.exists());
}

#[tokio::test]
async fn test_cmd_process_missing_file() {
    let dir = TempDir::new().unwrap();
    let opts = setup_opts(&dir);
    let result = commands::cmd_process(&opts, &dir.path().join("missing.json"), false).await;
    assert!(result.is_err());
}

#[test]
fn test_cmd_parse_lines() {
    let dir = TempDir::new().unwrap();
    let opts = GlobalOpts {
        no_store: true,
        ..setup_opts(&dir)
    };
    let path = write_file(&dir, "lines.txt", &fixtures::HAM_WITH_FEE_LINES.join("\n"));
    assert!(commands::cmd_parse_lines(&opts, &path, "COSTCO").is_ok());
}

#[tokio::test]
async fn test_cmd_normalize_discount() {
    let dir = TempDir::new().unwrap();
    let opts = setup_opts(&dir);
    commands::cmd_normalize(&opts, "TPD/1858985", "COSTCO").await.unwrap();

    let db = Database::new(opts.db.to_str().unwrap()).unwrap();
    let record = db.get_normalization("TPD/1858985", "COSTCO").unwrap().unwrap();
    assert!(record.is_discount);
    assert_eq!(record.confidence, 1.0);
}

// ========== Store Command Tests ==========

#[tokio::test]
async fn test_cmd_store_list_after_process() {
    let dir = TempDir::new().unwrap();
    let opts = setup_opts(&dir);
    commands::cmd_process(&opts, &write_bundle(&dir), false).await.unwrap();

    assert!(commands::cmd_store_list(&opts, None, 20).is_ok());
    assert!(commands::cmd_store_list(&opts, Some("Costco Wholesale #481"), 5).is_ok());

    // Merchants are stored uppercased; the filter matches whatever case was typed
    let db = Database::new(opts.db.to_str().unwrap()).unwrap();
    let records = db.list_normalizations(Some("Costco Wholesale #481"), 50).unwrap();
    assert!(records.iter().any(|r| r.raw_name == "KS WATER"));
    assert!(records.iter().all(|r| r.merchant == "COSTCO WHOLESALE #481"));
}

#[test]
fn test_cmd_store_list_empty() {
    let dir = TempDir::new().unwrap();
    assert!(commands::cmd_store_list(&setup_opts(&dir), None, 20).is_ok());
}

// ========== Config Command Tests ==========

#[tokio::test]
async fn test_cmd_config_explicit_file() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "pipeline.toml", "[normalizer]\nsimilarity_threshold = 0.9\n");
    let opts = GlobalOpts {
        config: Some(path),
        ..setup_opts(&dir)
    };
    assert!(commands::cmd_config(&opts).await.is_ok());

    let (config, _) = commands::load_config(&opts).unwrap();
    assert_eq!(config.normalizer.similarity_threshold, 0.9);
}

#[tokio::test]
async fn test_cmd_config_missing_explicit_file() {
    let dir = TempDir::new().unwrap();
    let opts = GlobalOpts {
        config: Some(dir.path().join("nope.toml")),
        ..setup_opts(&dir)
    };
    assert!(commands::cmd_config(&opts).await.is_err());
    assert!(commands::build_pipeline(&opts).is_err());
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("BLACK FOREST HAM SLICED", 10), "BLACK F...");
    assert_eq!(truncate("CRÈME BRÛLÉE", 8), "CRÈME...");
}
