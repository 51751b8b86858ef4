//! Choose between the OCR engine's structured items and the raw line parser
//!
//! The structured extraction is trusted unless it is empty or the raw text clearly holds
//! more item lines than it reported.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::LineClassifier;
use crate::models::{ItemKind, ItemSource, RawLine, StructuredItem, TentativeItem};
use crate::parser::ParserRegistry;

/// Why an item source was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum ReconcileReason {
    /// The engine returned no structured items
    StructuredEmpty,
    /// Raw text holds more item lines than the structured list
    ParserRecoveredMore {
        expected_hits: usize,
        structured: usize,
        parsed: usize,
    },
    StructuredTrusted,
}

impl ReconcileReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredEmpty => "structured_empty",
            Self::ParserRecoveredMore { .. } => "parser_recovered_more",
            Self::StructuredTrusted => "structured_trusted",
        }
    }
}

/// The authoritative tentative item list for one receipt
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub items: Vec<TentativeItem>,
    pub source: ItemSource,
    pub reason: ReconcileReason,
    /// Raw line indices the line parser claimed as prices (empty for structured items)
    pub consumed: BTreeSet<usize>,
}

pub struct FallbackReconciler {
    classifier: LineClassifier,
    registry: Arc<ParserRegistry>,
}

impl FallbackReconciler {
    pub fn new(classifier: LineClassifier, registry: Arc<ParserRegistry>) -> Self {
        Self {
            classifier,
            registry,
        }
    }

    /// Convert structured OCR items, splitting names that merge a product and a fee
    pub fn structured_items(&self, structured: &[StructuredItem]) -> Vec<TentativeItem> {
        let mut items = Vec::with_capacity(structured.len());

        for entry in structured {
            let name = entry.name.trim();
            if name.is_empty() {
                debug!("Skipping structured item without a name");
                continue;
            }

            let kind = self.classifier.item_kind(name);
            let mut item = TentativeItem::new(name, entry.total_price.as_raw(), kind);
            item.quantity = entry.quantity.unwrap_or(1).max(1);
            item.unit_price_raw = entry.unit_price.as_ref().map(|p| p.as_raw());
            item.item_code = entry.item_code.clone();

            match self.classifier.split_fee_suffix(name) {
                Some((product, fee)) => {
                    debug!(name, "Splitting merged product/fee structured item");
                    item.name = product.clone();
                    item.kind = ItemKind::Product;
                    let mut fee_item = TentativeItem::placeholder(fee, ItemKind::Fee);
                    fee_item.preceding_product = Some(product);
                    items.push(item);
                    items.push(fee_item);
                }
                None => items.push(item),
            }
        }

        items
    }

    pub fn reconcile(
        &self,
        merchant: &str,
        structured: &[StructuredItem],
        lines: &[RawLine],
    ) -> Reconciliation {
        let parser = self.registry.parser_for(merchant);

        if structured.is_empty() {
            let outcome = parser.parse(lines);
            info!(
                merchant,
                parsed = outcome.items.len(),
                "No structured items, using line parser"
            );
            return Reconciliation {
                items: outcome.items,
                source: ItemSource::LineParser,
                reason: ReconcileReason::StructuredEmpty,
                consumed: outcome.consumed,
            };
        }

        let expected_hits = self.registry.expected_pattern_hits(merchant, lines);
        if expected_hits > structured.len() + 1 {
            let outcome = parser.parse(lines);
            if outcome.items.len() > structured.len() {
                info!(
                    merchant,
                    expected_hits,
                    structured = structured.len(),
                    parsed = outcome.items.len(),
                    "Line parser recovered more items than structured extraction"
                );
                return Reconciliation {
                    reason: ReconcileReason::ParserRecoveredMore {
                        expected_hits,
                        structured: structured.len(),
                        parsed: outcome.items.len(),
                    },
                    items: outcome.items,
                    source: ItemSource::LineParser,
                    consumed: outcome.consumed,
                };
            }
        }

        debug!(merchant, structured = structured.len(), expected_hits, "Keeping structured items");
        Reconciliation {
            items: self.structured_items(structured),
            source: ItemSource::Structured,
            reason: ReconcileReason::StructuredTrusted,
            consumed: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::models::PriceField;
    use crate::patterns::PatternBank;

    fn reconciler() -> FallbackReconciler {
        let config = PipelineConfig::default();
        let classifier = LineClassifier::new(Arc::new(PatternBank::standard().unwrap()));
        let registry =
            ParserRegistry::new(classifier.clone(), &config.parser, config.merchants.clone())
                .unwrap();
        FallbackReconciler::new(classifier, Arc::new(registry))
    }

    fn structured(name: &str, price: &str) -> StructuredItem {
        StructuredItem {
            name: name.to_string(),
            total_price: PriceField::Text(price.to_string()),
            unit_price: None,
            quantity: None,
            item_code: None,
        }
    }

    #[test]
    fn test_empty_structured_uses_parser() {
        let lines = RawLine::from_texts(&["555107 BLK FRST HAM", "143.91"]);
        let result = reconciler().reconcile("COSTCO", &[], &lines);
        assert_eq!(result.source, ItemSource::LineParser);
        assert_eq!(result.reason, ReconcileReason::StructuredEmpty);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.consumed, BTreeSet::from([1]));
    }

    #[test]
    fn test_parser_preferred_when_it_recovers_more() {
        let lines = RawLine::from_texts(&[
            "111111 APPLES",
            "1.00",
            "222222 PEARS",
            "2.00",
            "333333 PLUMS",
            "3.00",
        ]);
        let result = reconciler().reconcile("COSTCO", &[structured("APPLES", "1.00")], &lines);
        assert_eq!(result.source, ItemSource::LineParser);
        assert_eq!(
            result.reason,
            ReconcileReason::ParserRecoveredMore {
                expected_hits: 3,
                structured: 1,
                parsed: 3,
            }
        );
        assert_eq!(result.items.len(), 3);
    }

    #[test]
    fn test_structured_kept_when_close_enough() {
        let lines = RawLine::from_texts(&["111111 APPLES", "1.00", "222222 PEARS", "2.00"]);
        let result = reconciler().reconcile(
            "COSTCO",
            &[structured("APPLES", "1.00"), structured("PEARS", "2.00")],
            &lines,
        );
        assert_eq!(result.source, ItemSource::Structured);
        assert_eq!(result.reason, ReconcileReason::StructuredTrusted);
        assert!(result.consumed.is_empty());
    }

    #[test]
    fn test_unknown_merchant_keeps_structured() {
        let lines = RawLine::from_texts(&[
            "111111 APPLES",
            "1.00",
            "222222 PEARS",
            "2.00",
            "333333 PLUMS",
            "3.00",
        ]);
        let result = reconciler().reconcile("Corner Deli", &[structured("APPLES", "1.00")], &lines);
        assert_eq!(result.source, ItemSource::Structured);
    }

    #[test]
    fn test_structured_conversion() {
        let mut water = structured("KS WATER", "4.99");
        water.quantity = Some(2);
        water.unit_price = Some(PriceField::Number(2.495));
        water.item_code = Some("1858985".to_string());
        let items = reconciler().structured_items(&[
            water,
            structured("TPD/1858985", "1.50-"),
            structured("  ", "1.00"),
        ]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].item_code.as_deref(), Some("1858985"));
        assert_eq!(items[0].source_line, None);
        assert_eq!(items[1].kind, ItemKind::Discount);
        assert_eq!(items[1].price_raw, "1.50-");
    }

    #[test]
    fn test_structured_merged_fee_is_split() {
        let merged = structured("BLK FRST HAM ENVIRO FEE", "143.91");
        let items = reconciler().structured_items(&[merged]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "BLK FRST HAM");
        assert_eq!(items[0].price_raw, "143.91");
        assert_eq!(items[0].kind, ItemKind::Product);
        assert_eq!(items[1].name, "ENVIRO FEE");
        assert!(items[1].needs_price);
        assert_eq!(items[1].preceding_product.as_deref(), Some("BLK FRST HAM"));
    }
}
