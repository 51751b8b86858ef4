//! Product name normalization
//!
//! Maps a raw receipt item name to a canonical product, trying tiers in order:
//!
//! 1. Discount patterns (certain)
//! 2. Adjustment patterns (certain)
//! 3. Exact store match on the cleaned name
//! 4. Jaccard token-set similarity against the merchant's best stored records
//! 5. Generative: the AI backend when configured, else brand/category rules
//! 6. Fallback: the cleaned name verbatim
//!
//! Tiers 4-6 may then be overridden by a strong embedding match. Every outcome is
//! written back to the store so the next receipt hits tier 3.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::ai::{title_case, AIBackend, AIClient};
use crate::config::NormalizerConfig;
use crate::models::{
    NewNormalization, NormalizationMethod, NormalizationRecord, NormalizationResult,
};
use crate::patterns::PatternBank;
use crate::store::{EmbeddingSearch, NormalizationStore};

/// Trim, collapse whitespace, drop characters outside `[A-Za-z0-9 -./&]`, uppercase
pub fn clean_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '/' | '&'))
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Store key for a merchant name: trimmed and uppercased
pub fn merchant_key(merchant: &str) -> String {
    merchant.trim().to_uppercase()
}

/// Jaccard index of the two names' whitespace token sets
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let a: BTreeSet<&str> = a.split_whitespace().collect();
    let b: BTreeSet<&str> = b.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

pub struct ProductNormalizer {
    patterns: Arc<PatternBank>,
    store: Arc<dyn NormalizationStore>,
    embedding: Option<Arc<dyn EmbeddingSearch>>,
    ai: Option<AIClient>,
    config: NormalizerConfig,
}

impl ProductNormalizer {
    pub fn new(
        patterns: Arc<PatternBank>,
        store: Arc<dyn NormalizationStore>,
        config: NormalizerConfig,
    ) -> Self {
        Self {
            patterns,
            store,
            embedding: None,
            ai: None,
            config,
        }
    }

    pub fn with_embedding(mut self, search: Arc<dyn EmbeddingSearch>) -> Self {
        self.embedding = Some(search);
        self
    }

    pub fn with_ai(mut self, ai: AIClient) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn ai(&self) -> Option<&AIClient> {
        self.ai.as_ref()
    }

    /// Normalize one raw item name for a merchant
    ///
    /// Never fails: collaborator errors are logged and treated as "no match".
    pub async fn normalize(&self, raw_name: &str, merchant: &str) -> NormalizationResult {
        let cleaned = clean_name(raw_name);
        let merchant = merchant_key(merchant);

        if cleaned.is_empty() {
            return NormalizationResult::new(
                raw_name.trim(),
                self.config.fallback_confidence,
                NormalizationMethod::Fallback,
            );
        }

        if let Some(result) = self.pattern_match(&cleaned) {
            let existing = self.find_exact(&cleaned, &merchant).await;
            self.persist(&cleaned, &merchant, &result, existing.as_ref()).await;
            return result;
        }

        if let Some(record) = self.find_exact(&cleaned, &merchant).await {
            debug!(raw = %cleaned, merchant = %merchant, "Exact normalization match");
            let result = from_record(&record, NormalizationMethod::ExactMatch);
            self.persist(&cleaned, &merchant, &result, Some(&record)).await;
            return result;
        }

        let result = match self.similarity_match(&cleaned, &merchant).await {
            Some(result) => result,
            None => match self.generate(&cleaned, &merchant).await {
                Some(result) => result,
                None => NormalizationResult::new(
                    cleaned.clone(),
                    self.config.fallback_confidence,
                    NormalizationMethod::Fallback,
                ),
            },
        };
        let result = self.apply_embedding(&cleaned, &merchant, result).await;

        debug!(
            raw = %cleaned,
            normalized = %result.normalized_name,
            method = %result.method,
            confidence = result.confidence_score,
            "Normalized item"
        );
        self.persist(&cleaned, &merchant, &result, None).await;
        result
    }

    /// Discount and adjustment banks
    fn pattern_match(&self, cleaned: &str) -> Option<NormalizationResult> {
        if self.patterns.is_discount(cleaned) {
            let mut result =
                NormalizationResult::new(cleaned, 1.0, NormalizationMethod::ExactMatch);
            result.is_discount = true;
            result.item_code = self.patterns.discount_target_code(cleaned);
            return Some(result);
        }
        if self.patterns.is_adjustment(cleaned) {
            let mut result =
                NormalizationResult::new(cleaned, 1.0, NormalizationMethod::ExactMatch);
            result.is_adjustment = true;
            return Some(result);
        }
        None
    }

    async fn find_exact(&self, cleaned: &str, merchant: &str) -> Option<NormalizationRecord> {
        match self.store.find_exact(cleaned, merchant).await {
            Ok(record) => record,
            Err(e) => {
                warn!(raw = %cleaned, merchant = %merchant, "Normalization lookup failed: {}", e);
                None
            }
        }
    }

    async fn similarity_match(&self, cleaned: &str, merchant: &str) -> Option<NormalizationResult> {
        let candidates = match self
            .store
            .find_candidates(merchant, self.config.candidate_limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(merchant = %merchant, "Candidate lookup failed: {}", e);
                return None;
            }
        };

        // First candidate wins ties; candidates arrive best-first
        let mut best: Option<(&NormalizationRecord, f64)> = None;
        for candidate in candidates
            .iter()
            .filter(|c| !c.is_discount && !c.is_adjustment)
        {
            let score = token_similarity(cleaned, &candidate.raw_name);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((candidate, score));
            }
        }

        let (candidate, score) =
            best.filter(|(_, score)| *score >= self.config.similarity_threshold)?;
        debug!(
            raw = %cleaned,
            candidate = %candidate.raw_name,
            score,
            "Similarity normalization match"
        );

        let mut result = from_record(candidate, NormalizationMethod::SimilarityMatch);
        result.confidence_score = candidate.confidence * score;
        result.similarity_score = Some(score);
        Some(result)
    }

    /// AI suggestion when a backend is configured, else brand/category rules
    async fn generate(&self, cleaned: &str, merchant: &str) -> Option<NormalizationResult> {
        if let Some(ai) = &self.ai {
            match ai.suggest_product(cleaned, merchant).await {
                Ok(suggestion) => {
                    let mut result = NormalizationResult::new(
                        suggestion.name,
                        self.config.generative_confidence,
                        NormalizationMethod::AiGenerated,
                    );
                    result.brand = suggestion.brand;
                    result.category = suggestion.category;
                    return Some(result);
                }
                Err(e) => {
                    warn!(raw = %cleaned, model = %ai.model(), "AI suggestion failed: {}", e);
                }
            }
        }

        self.infer_from_rules(cleaned)
    }

    /// Brand prefix and category keyword rules; None when neither applies
    fn infer_from_rules(&self, cleaned: &str) -> Option<NormalizationResult> {
        let brand = self.patterns.brand_for(cleaned);
        let product = brand.as_ref().map_or(cleaned, |b| b.remainder.as_str());
        let category = self
            .patterns
            .category_for(product)
            .or_else(|| self.patterns.category_for(cleaned))
            .map(str::to_string);

        if brand.is_none() && category.is_none() {
            return None;
        }

        let mut result = NormalizationResult::new(
            title_case(product),
            self.config.generative_confidence,
            NormalizationMethod::AiGenerated,
        );
        result.brand = brand.map(|b| b.brand);
        result.category = category;
        Some(result)
    }

    async fn apply_embedding(
        &self,
        cleaned: &str,
        merchant: &str,
        mut result: NormalizationResult,
    ) -> NormalizationResult {
        let Some(search) = &self.embedding else {
            return result;
        };
        let thresholds = &self.config.embedding;

        let best = match search
            .find_similar(cleaned, merchant, thresholds.search_threshold, 1)
            .await
        {
            Ok(matches) => matches.into_iter().next(),
            Err(e) => {
                warn!(raw = %cleaned, merchant = %merchant, "Embedding search failed: {}", e);
                None
            }
        };
        let Some(best) = best else {
            return result;
        };

        let similarity = best.similarity;
        let overrides = similarity >= thresholds.override_similarity
            || (similarity >= thresholds.weak_override_similarity
                && result.confidence_score < thresholds.weak_confidence)
            || (result.method == NormalizationMethod::Fallback
                && similarity >= thresholds.fallback_override_similarity);
        if !overrides {
            return result;
        }

        debug!(
            raw = %cleaned,
            product = %best.normalized_product.name,
            similarity,
            "Embedding override"
        );
        result.normalized_name = best.normalized_product.name;
        result.brand = best.normalized_product.brand;
        result.category = best.normalized_product.category;
        result.similarity_score = Some(similarity);
        result.embedding_override = true;
        result
    }

    /// Bump an existing record or learn a new one; failures are only logged
    async fn persist(
        &self,
        cleaned: &str,
        merchant: &str,
        result: &NormalizationResult,
        existing: Option<&NormalizationRecord>,
    ) {
        let outcome = match existing {
            Some(record) => self.store.increment_match(record).await,
            None => self
                .store
                .create(NewNormalization::from_result(cleaned, merchant, result))
                .await
                .map(|_| ()),
        };
        if let Err(e) = outcome {
            warn!(raw = %cleaned, merchant = %merchant, "Failed to persist normalization: {}", e);
        }
    }
}

fn from_record(record: &NormalizationRecord, method: NormalizationMethod) -> NormalizationResult {
    let mut result =
        NormalizationResult::new(record.normalized_name.clone(), record.confidence, method);
    result.brand = record.brand.clone();
    result.category = record.category.clone();
    result.is_discount = record.is_discount;
    result.is_adjustment = record.is_adjustment;
    result
}
