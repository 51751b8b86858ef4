//! Fallback layout for merchants without a profile
//!
//! Most supermarket receipts print `NAME 3.49` on one line; when the price wraps it is
//! rarely more than a line or two below.

use tracing::debug;

use super::warehouse::{walk, WalkRules};
use super::{LineParser, ParseOutcome, ReceiptLayout};
use crate::classify::LineClassifier;
use crate::models::RawLine;

#[derive(Debug, Clone)]
pub struct GenericParser {
    classifier: LineClassifier,
    window: usize,
}

impl GenericParser {
    pub fn new(classifier: LineClassifier, window: usize) -> Self {
        Self { classifier, window }
    }
}

impl LineParser for GenericParser {
    fn layout(&self) -> ReceiptLayout {
        ReceiptLayout::Generic
    }

    fn parse(&self, lines: &[RawLine]) -> ParseOutcome {
        let outcome = walk(
            &self.classifier,
            lines,
            WalkRules {
                window: self.window,
                split_merged_fees: false,
                quantity_needs_code: false,
            },
        );
        debug!(items = outcome.items.len(), "Generic parse complete");
        outcome
    }
}
