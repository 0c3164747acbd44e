//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use snapcart_core::db::Database;
use snapcart_core::models::{NewReceipt, ReceiptItem};

use crate::commands::{self, truncate};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn seed_receipt(db: &Database, store: &str, total: f64, date: &str) -> i64 {
    db.create_receipt(&NewReceipt {
        filename: "seed.txt".to_string(),
        items: vec![ReceiptItem::new("Milk", 2.0)],
        total_amount: Some(total),
        store: store.to_string(),
        category: Some("Groceries".to_string()),
        created_date: Some(date.to_string()),
        ..Default::default()
    })
    .unwrap()
}

fn write_receipt_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents).unwrap();
    path
}

// ========== Receipt Command Tests ==========

#[test]
fn test_cmd_receipts_add_text_file() {
    let db = setup_test_db();
    let dir = tempfile::tempdir().unwrap();
    let path = write_receipt_file(
        &dir,
        "fresh_mart.txt",
        b"FRESH MART\nMilk 3.49\nPeanut Butter 4.99\nTOTAL 8.48\n",
    );

    let id = commands::cmd_receipts_add(&db, &path, "Groceries").unwrap();

    let receipt = db.get_receipt(id).unwrap().unwrap();
    assert_eq!(receipt.filename, "fresh_mart.txt");
    assert_eq!(receipt.store, "FRESH MART");
    assert_eq!(receipt.category, "Groceries");
    assert_eq!(receipt.total_amount, 8.48);
    assert_eq!(receipt.items.len(), 2);
    assert!(receipt.content_hash.is_some());
}

#[test]
fn test_cmd_receipts_add_duplicate_returns_existing() {
    let db = setup_test_db();
    let dir = tempfile::tempdir().unwrap();
    let path = write_receipt_file(&dir, "r.txt", b"SHOP\nBread 2.50\n");

    let first = commands::cmd_receipts_add(&db, &path, "General").unwrap();
    let second = commands::cmd_receipts_add(&db, &path, "General").unwrap();

    assert_eq!(first, second);
    assert_eq!(db.count_receipts().unwrap(), 1);
}

#[test]
fn test_cmd_receipts_add_rejects_image_and_missing_file() {
    let db = setup_test_db();
    let dir = tempfile::tempdir().unwrap();
    let image = write_receipt_file(&dir, "photo.jpg", &[0xff, 0xd8, 0xff, 0xe0]);

    assert!(commands::cmd_receipts_add(&db, &image, "General").is_err());
    assert!(commands::cmd_receipts_add(&db, &dir.path().join("nope.txt"), "General").is_err());
    assert_eq!(db.count_receipts().unwrap(), 0);
}

#[test]
fn test_cmd_receipts_list_and_show() {
    let db = setup_test_db();
    let id = seed_receipt(&db, "Fresh Mart", 12.0, "2025-01-15");

    assert!(commands::cmd_receipts_list(&db, None, None, None, None).is_ok());
    assert!(commands::cmd_receipts_list(
        &db,
        Some("fresh"),
        Some("groceries"),
        Some("2025-01-01"),
        Some("2025-01-31")
    )
    .is_ok());
    assert!(commands::cmd_receipts_show(&db, id).is_ok());
    assert!(commands::cmd_receipts_show(&db, id + 100).is_err());
}

#[test]
fn test_cmd_receipts_list_invalid_date() {
    let db = setup_test_db();
    let result = commands::cmd_receipts_list(&db, None, None, Some("15/01/2025"), None);
    assert!(result.is_err());
}

#[test]
fn test_cmd_receipts_delete() {
    let db = setup_test_db();
    let id = seed_receipt(&db, "Fresh Mart", 12.0, "2025-01-15");

    commands::cmd_receipts_delete(&db, id).unwrap();
    assert!(db.get_receipt(id).unwrap().is_none());
    assert!(commands::cmd_receipts_delete(&db, id).is_err());
}

// ========== Analytics Command Tests ==========

#[test]
fn test_cmd_analytics_on_empty_db() {
    let db = setup_test_db();
    assert!(commands::cmd_analytics_summary(&db, false).is_ok());
    assert!(commands::cmd_analytics_summary(&db, true).is_ok());
    assert!(commands::cmd_analytics_monthly(&db).is_ok());
    assert!(commands::cmd_analytics_top_items(&db, None).is_ok());
    assert!(commands::cmd_analytics_categories(&db).is_ok());
    assert!(commands::cmd_analytics_recent(&db, 5).is_ok());
}

#[test]
fn test_cmd_analytics_with_receipts() {
    let db = setup_test_db();
    seed_receipt(&db, "Fresh Mart", 50.0, "2025-01-15T10:30:00Z");
    seed_receipt(&db, "Corner Cafe", 30.0, "2025-02-02T09:00:00Z");

    assert!(commands::cmd_analytics_summary(&db, false).is_ok());
    assert!(commands::cmd_analytics_summary(&db, true).is_ok());
    assert!(commands::cmd_analytics_monthly(&db).is_ok());
    assert!(commands::cmd_analytics_top_items(&db, Some(1)).is_ok());
    assert!(commands::cmd_analytics_categories(&db).is_ok());
    assert!(commands::cmd_analytics_recent(&db, 1).is_ok());
}

#[test]
fn test_cmd_analytics_with_invalid_receipt() {
    let db = setup_test_db();
    seed_receipt(&db, "Fresh Mart", 50.0, "2025-01-15");
    let bad = seed_receipt(&db, "Fresh Mart", 10.0, "2025-01-16");

    let conn = db.conn().unwrap();
    conn.execute(
        "UPDATE receipts SET total_amount = -10.0 WHERE id = ?1",
        rusqlite::params![bad],
    )
    .unwrap();

    // Invalid receipts are reported, not fatal
    assert!(commands::cmd_analytics_summary(&db, false).is_ok());
    assert!(commands::cmd_analytics_monthly(&db).is_ok());
}

// ========== Core Command Tests ==========

#[test]
fn test_cmd_init_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapcart.db");

    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());

    let db = commands::open_db(&path, true).unwrap();
    assert_eq!(db.count_receipts().unwrap(), 0);
}

#[test]
fn test_load_config_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_receipt_file(&dir, "snapcart.toml", b"[server]\nport = 9191\n");

    let config = commands::load_config(Some(&path)).unwrap();
    assert_eq!(config.server.port, 9191);
    assert!(commands::load_config(Some(&dir.path().join("missing.toml"))).is_err());
}

// ========== Helpers ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("Milk", 10), "Milk");
    assert_eq!(truncate("Organic Peanut Butter", 10), "Organic...");
    assert_eq!(truncate("Crème brûlée", 8), "Crème...");
}
