//! Collaborator interfaces used by the product normalizer
//!
//! `NormalizationStore` persists learned raw-name mappings; `EmbeddingSearch` is an
//! external vector lookup. Both are async so remote implementations fit behind them.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{EmbeddingMatch, NewNormalization, NormalizationRecord};

#[async_trait]
pub trait NormalizationStore: Send + Sync {
    /// Record for this exact cleaned name at this merchant
    async fn find_exact(&self, raw_name: &str, merchant: &str)
        -> Result<Option<NormalizationRecord>>;

    /// Up to `limit` records for the merchant, by confidence then match count
    async fn find_candidates(&self, merchant: &str, limit: usize)
        -> Result<Vec<NormalizationRecord>>;

    async fn create(&self, record: NewNormalization) -> Result<NormalizationRecord>;

    /// Bump the match count and last-matched timestamp
    async fn increment_match(&self, record: &NormalizationRecord) -> Result<()>;
}

#[async_trait]
pub trait EmbeddingSearch: Send + Sync {
    async fn find_similar(
        &self,
        query: &str,
        merchant: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<EmbeddingMatch>>;
}

#[async_trait]
impl NormalizationStore for Database {
    async fn find_exact(
        &self,
        raw_name: &str,
        merchant: &str,
    ) -> Result<Option<NormalizationRecord>> {
        self.get_normalization(raw_name, merchant)
    }

    async fn find_candidates(
        &self,
        merchant: &str,
        limit: usize,
    ) -> Result<Vec<NormalizationRecord>> {
        self.list_normalization_candidates(merchant, limit)
    }

    async fn create(&self, record: NewNormalization) -> Result<NormalizationRecord> {
        self.create_normalization(&record)
    }

    async fn increment_match(&self, record: &NormalizationRecord) -> Result<()> {
        self.increment_normalization_match(record.id)
    }
}

/// Process-local store for tests and store-less runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<NormalizationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Result<Vec<NormalizationRecord>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<NormalizationRecord>>> {
        self.records
            .lock()
            .map_err(|e| Error::Store(format!("memory store poisoned: {}", e)))
    }
}

#[async_trait]
impl NormalizationStore for MemoryStore {
    async fn find_exact(
        &self,
        raw_name: &str,
        merchant: &str,
    ) -> Result<Option<NormalizationRecord>> {
        Ok(self
            .lock()?
            .iter()
            .find(|r| r.raw_name == raw_name && r.merchant == merchant)
            .cloned())
    }

    async fn find_candidates(
        &self,
        merchant: &str,
        limit: usize,
    ) -> Result<Vec<NormalizationRecord>> {
        let mut candidates: Vec<NormalizationRecord> = self
            .lock()?
            .iter()
            .filter(|r| r.merchant == merchant)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(b.match_count.cmp(&a.match_count))
                .then(a.id.cmp(&b.id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn create(&self, record: NewNormalization) -> Result<NormalizationRecord> {
        let mut records = self.lock()?;
        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.raw_name == record.raw_name && r.merchant == record.merchant)
        {
            existing.match_count += 1;
            existing.last_matched_at = Some(Utc::now());
            return Ok(existing.clone());
        }

        let created = NormalizationRecord {
            id: records.len() as i64 + 1,
            raw_name: record.raw_name,
            merchant: record.merchant,
            normalized_name: record.normalized_name,
            brand: record.brand,
            category: record.category,
            confidence: record.confidence,
            is_discount: record.is_discount,
            is_adjustment: record.is_adjustment,
            match_count: 1,
            created_at: Utc::now(),
            last_matched_at: None,
        };
        records.push(created.clone());
        Ok(created)
    }

    async fn increment_match(&self, record: &NormalizationRecord) -> Result<()> {
        let mut records = self.lock()?;
        let existing = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| Error::NotFound(format!("normalization {}", record.id)))?;
        existing.match_count += 1;
        existing.last_matched_at = Some(Utc::now());
        Ok(())
    }
}
