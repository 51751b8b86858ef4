//! Database tests

use super::*;
use crate::models::*;

fn new_record(raw_name: &str, merchant: &str, confidence: f64) -> NewNormalization {
    NewNormalization {
        raw_name: raw_name.to_string(),
        merchant: merchant.to_string(),
        normalized_name: format!("{} (canonical)", raw_name),
        brand: None,
        category: Some("Meat".to_string()),
        confidence,
        is_discount: false,
        is_adjustment: false,
    }
}

#[test]
fn test_in_memory_db() {
    let db = Database::in_memory().unwrap();
    assert_eq!(db.count_normalizations().unwrap(), 0);
    assert!(db.get_normalization("HAM", "COSTCO").unwrap().is_none());
}

#[test]
fn test_schema_exists() {
    let db = Database::in_memory().unwrap();
    let conn = db.conn().unwrap();

    let result: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('product_normalizations')
             WHERE name IN ('raw_name', 'merchant', 'match_count', 'last_matched_at')",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(result, 4);
}

#[test]
fn test_create_and_get() {
    let db = Database::in_memory().unwrap();

    let record = db.create_normalization(&new_record("BLK FRST HAM", "COSTCO", 0.7)).unwrap();
    assert!(record.id > 0);
    assert_eq!(record.match_count, 1);
    assert_eq!(record.category.as_deref(), Some("Meat"));
    assert!(record.last_matched_at.is_none());

    let found = db.get_normalization("BLK FRST HAM", "COSTCO").unwrap().unwrap();
    assert_eq!(found, record);

    // Scoped by merchant
    assert!(db.get_normalization("BLK FRST HAM", "SAFEWAY").unwrap().is_none());
}

#[test]
fn test_duplicate_create_counts_as_match() {
    let db = Database::in_memory().unwrap();

    let first = db.create_normalization(&new_record("KS WATER", "COSTCO", 0.3)).unwrap();
    let second = db.create_normalization(&new_record("KS WATER", "COSTCO", 0.3)).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.match_count, 2);
    assert_eq!(db.count_normalizations().unwrap(), 1);
}

#[test]
fn test_increment_match() {
    let db = Database::in_memory().unwrap();

    let record = db.create_normalization(&new_record("KS WATER", "COSTCO", 0.7)).unwrap();
    db.increment_normalization_match(record.id).unwrap();
    db.increment_normalization_match(record.id).unwrap();

    let found = db.get_normalization("KS WATER", "COSTCO").unwrap().unwrap();
    assert_eq!(found.match_count, 3);
    assert!(found.last_matched_at.is_some());

    assert!(db.increment_normalization_match(9999).is_err());
}

#[test]
fn test_candidates_ordered_by_confidence_then_matches() {
    let db = Database::in_memory().unwrap();

    let low = db.create_normalization(&new_record("A", "COSTCO", 0.3)).unwrap();
    let high = db.create_normalization(&new_record("B", "COSTCO", 0.7)).unwrap();
    let busy = db.create_normalization(&new_record("C", "COSTCO", 0.7)).unwrap();
    db.increment_normalization_match(busy.id).unwrap();
    db.create_normalization(&new_record("D", "SAFEWAY", 1.0)).unwrap();

    let candidates = db.list_normalization_candidates("COSTCO", 50).unwrap();
    let ids: Vec<i64> = candidates.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![busy.id, high.id, low.id]);

    let limited = db.list_normalization_candidates("COSTCO", 1).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn test_list_normalizations_filter() {
    let db = Database::in_memory().unwrap();
    db.create_normalization(&new_record("A", "COSTCO", 0.3)).unwrap();
    db.create_normalization(&new_record("B", "SAFEWAY", 0.3)).unwrap();

    assert_eq!(db.list_normalizations(None, 10).unwrap().len(), 2);
    let costco = db.list_normalizations(Some("COSTCO"), 10).unwrap();
    assert_eq!(costco.len(), 1);
    assert_eq!(costco[0].raw_name, "A");
}

#[test]
fn test_list_normalizations_merchant_filter_ignores_case() {
    let db = Database::in_memory().unwrap();
    db.create_normalization(&new_record("A", "COSTCO", 0.3)).unwrap();

    let records = db.list_normalizations(Some("  Costco "), 10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].merchant, "COSTCO");
}
