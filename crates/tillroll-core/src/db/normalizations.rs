//! Product normalization records

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewNormalization, NormalizationRecord};
use crate::normalizer::merchant_key;

const COLUMNS: &str = "id, raw_name, merchant, normalized_name, brand, category, confidence, \
                       is_discount, is_adjustment, match_count, created_at, last_matched_at";

fn row_to_normalization(row: &Row) -> rusqlite::Result<NormalizationRecord> {
    let created_at_str: String = row.get(10)?;
    let last_matched_str: Option<String> = row.get(11)?;

    Ok(NormalizationRecord {
        id: row.get(0)?,
        raw_name: row.get(1)?,
        merchant: row.get(2)?,
        normalized_name: row.get(3)?,
        brand: row.get(4)?,
        category: row.get(5)?,
        confidence: row.get(6)?,
        is_discount: row.get(7)?,
        is_adjustment: row.get(8)?,
        match_count: row.get(9)?,
        created_at: parse_datetime(&created_at_str),
        last_matched_at: last_matched_str.as_deref().map(parse_datetime),
    })
}

impl Database {
    /// Exact lookup by cleaned raw name and merchant
    pub fn get_normalization(
        &self,
        raw_name: &str,
        merchant: &str,
    ) -> Result<Option<NormalizationRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM product_normalizations WHERE merchant = ? AND raw_name = ?",
                    COLUMNS
                ),
                params![merchant, raw_name],
                row_to_normalization,
            )
            .optional()?;
        Ok(record)
    }

    /// Best-known records for a merchant: highest confidence first, then most matched
    pub fn list_normalization_candidates(
        &self,
        merchant: &str,
        limit: usize,
    ) -> Result<Vec<NormalizationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM product_normalizations WHERE merchant = ?
             ORDER BY confidence DESC, match_count DESC, id ASC LIMIT ?",
            COLUMNS
        ))?;

        let records = stmt
            .query_map(params![merchant, limit as i64], row_to_normalization)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// List records, most recently used first
    ///
    /// The merchant filter is keyed the way the normalizer stores merchants.
    pub fn list_normalizations(
        &self,
        merchant: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NormalizationRecord>> {
        let merchant = merchant.map(merchant_key);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM product_normalizations
             WHERE (?1 IS NULL OR merchant = ?1)
             ORDER BY COALESCE(last_matched_at, created_at) DESC, id DESC LIMIT ?2",
            COLUMNS
        ))?;

        let records = stmt
            .query_map(params![merchant, limit as i64], row_to_normalization)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Insert a new record; an existing (merchant, raw_name) row counts as a match instead
    pub fn create_normalization(&self, new: &NewNormalization) -> Result<NormalizationRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO product_normalizations
                (raw_name, merchant, normalized_name, brand, category, confidence,
                 is_discount, is_adjustment)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(merchant, raw_name) DO UPDATE SET
                match_count = match_count + 1,
                last_matched_at = CURRENT_TIMESTAMP",
            params![
                new.raw_name,
                new.merchant,
                new.normalized_name,
                new.brand,
                new.category,
                new.confidence,
                new.is_discount,
                new.is_adjustment,
            ],
        )?;
        drop(conn);

        self.get_normalization(&new.raw_name, &new.merchant)?
            .ok_or_else(|| Error::NotFound(format!("normalization for {}", new.raw_name)))
    }

    /// Atomically bump a record's match count
    pub fn increment_normalization_match(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE product_normalizations
             SET match_count = match_count + 1, last_matched_at = CURRENT_TIMESTAMP
             WHERE id = ?",
            params![id],
        )?;

        if updated == 0 {
            return Err(Error::NotFound(format!("normalization {}", id)));
        }
        Ok(())
    }

    pub fn count_normalizations(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM product_normalizations", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}
