//! One receipt, end to end
//!
//! OCR bundle → reconcile item source → link fees/discounts → normalize each item →
//! fold modifiers into products → summarize.

use std::sync::Arc;

use tracing::{debug, info};

use crate::ai::AIClient;
use crate::classify::LineClassifier;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::linker::FeeDiscountLinker;
use crate::models::{OcrBundle, ProcessedReceipt, RawLine, TentativeItem};
use crate::normalizer::ProductNormalizer;
use crate::parser::{ParserRegistry, ReceiptLayout};
use crate::reconcile::FallbackReconciler;
use crate::store::{EmbeddingSearch, NormalizationStore};
use crate::summary;

/// Line-parser output for raw text alone
#[derive(Debug, Clone)]
pub struct LineParse {
    pub layout: ReceiptLayout,
    /// Matched merchant profile, if any
    pub profile: Option<String>,
    pub items: Vec<TentativeItem>,
}

pub struct ReceiptPipeline {
    registry: Arc<ParserRegistry>,
    reconciler: FallbackReconciler,
    linker: FeeDiscountLinker,
    normalizer: ProductNormalizer,
}

impl ReceiptPipeline {
    pub fn new(config: &PipelineConfig, store: Arc<dyn NormalizationStore>) -> Result<Self> {
        let patterns = Arc::new(config.pattern_bank()?);
        let classifier = LineClassifier::new(patterns.clone());
        let registry = Arc::new(ParserRegistry::new(
            classifier.clone(),
            &config.parser,
            config.merchants.clone(),
        )?);

        Ok(Self {
            reconciler: FallbackReconciler::new(classifier.clone(), registry.clone()),
            linker: FeeDiscountLinker::new(classifier, &config.parser),
            normalizer: ProductNormalizer::new(patterns, store, config.normalizer.clone()),
            registry,
        })
    }

    pub fn with_ai(mut self, ai: AIClient) -> Self {
        self.normalizer = self.normalizer.with_ai(ai);
        self
    }

    pub fn with_embedding(mut self, search: Arc<dyn EmbeddingSearch>) -> Self {
        self.normalizer = self.normalizer.with_embedding(search);
        self
    }

    pub fn normalizer(&self) -> &ProductNormalizer {
        &self.normalizer
    }

    /// Run the merchant's line parser and the linker over raw text, without normalizing
    pub fn parse_lines<S: AsRef<str>>(&self, merchant: &str, texts: &[S]) -> LineParse {
        let lines = RawLine::from_texts(texts);
        let parser = self.registry.parser_for(merchant);
        let outcome = parser.parse(&lines);

        LineParse {
            layout: parser.layout(),
            profile: self.registry.profile_for(merchant).map(|p| p.name.clone()),
            items: self.linker.link(outcome.items, &lines, &outcome.consumed),
        }
    }

    /// Process one receipt
    ///
    /// Always produces a result; collaborator failures degrade per item.
    pub async fn process(&self, bundle: &OcrBundle) -> ProcessedReceipt {
        let merchant = bundle.merchant.trim();
        let lines = RawLine::from_texts(&bundle.raw_text);

        let reconciliation = self.reconciler.reconcile(merchant, &bundle.items, &lines);
        info!(
            merchant = %merchant,
            source = reconciliation.source.as_str(),
            reason = reconciliation.reason.as_str(),
            items = reconciliation.items.len(),
            "Item source selected"
        );

        let items = self
            .linker
            .link(reconciliation.items, &lines, &reconciliation.consumed);

        let mut normalizations = Vec::with_capacity(items.len());
        for item in &items {
            normalizations.push(self.normalizer.normalize(&item.name, merchant).await);
        }

        let (items, absorbed_lines) = self.linker.fold(items, normalizations);
        let summary = summary::aggregate(&items);
        debug!(
            merchant = %merchant,
            visible = items.len(),
            absorbed = absorbed_lines,
            "Receipt processed"
        );

        ProcessedReceipt {
            merchant: merchant.to_string(),
            source: reconciliation.source,
            items,
            summary,
            absorbed_lines,
        }
    }
}
