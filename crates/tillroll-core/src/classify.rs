//! Raw OCR line classification
//!
//! Pattern groups are tried in a fixed order and the first match wins:
//! skip → item-with-code → quantity multiplier → price → fee → discount → adjustment.
//! Anything else is `Unknown`, which parsers may treat as a standalone product name.

use std::sync::Arc;

use crate::models::{ItemKind, LineKind};
use crate::patterns::PatternBank;
use crate::price::{is_price_line, split_inline_price};

/// Merchant-agnostic line classifier over a shared pattern bank
#[derive(Debug, Clone)]
pub struct LineClassifier {
    patterns: Arc<PatternBank>,
}

impl LineClassifier {
    pub fn new(patterns: Arc<PatternBank>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &PatternBank {
        &self.patterns
    }

    pub fn classify(&self, line: &str) -> LineKind {
        let line = line.trim();
        if line.is_empty() || self.patterns.is_skip(line) {
            return LineKind::Skip;
        }
        if self.patterns.item_code_parts(line).is_some() {
            return LineKind::ItemWithCode;
        }
        if self.patterns.quantity_parts(line).is_some() {
            return LineKind::QuantityMultiplier;
        }
        if is_price_line(line) {
            return LineKind::Price;
        }
        // "BLK FRST HAM ENVIRO FEE" is a merged product + fee, not a fee line
        if self.patterns.is_fee(line) && self.split_fee_suffix(line).is_none() {
            return LineKind::Fee;
        }
        if self.patterns.is_discount(line) {
            return LineKind::Discount;
        }
        if self.patterns.is_adjustment(line) {
            return LineKind::Adjustment;
        }
        LineKind::Unknown
    }

    /// Role of an item name, independent of where it came from
    ///
    /// A product name with a fee merged onto its end stays a product, as in `classify`.
    pub fn item_kind(&self, name: &str) -> ItemKind {
        if self.patterns.is_discount(name) {
            ItemKind::Discount
        } else if self.patterns.is_adjustment(name) {
            ItemKind::Adjustment
        } else if self.patterns.is_fee(name) && self.split_fee_suffix(name).is_none() {
            ItemKind::Fee
        } else {
            ItemKind::Product
        }
    }

    /// Whether a line could plausibly be a product name on its own
    pub fn looks_like_product_name(&self, line: &str) -> bool {
        let line = line.trim();
        if line.chars().count() < 3 {
            return false;
        }
        if !line.chars().any(|c| c.is_alphabetic()) {
            return false;
        }
        if self.patterns.is_skip(line) || is_price_line(line) {
            return false;
        }
        if self.patterns.quantity_parts(line).is_some() {
            return false;
        }
        !line
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || ".,:/-#".contains(c))
    }

    /// Split a product name merged with a trailing fee (`KS WATER CRV`)
    pub fn split_fee_suffix(&self, line: &str) -> Option<(String, String)> {
        let line = line.trim();
        let start = self.patterns.fee_start(line)?;
        if start == 0 {
            return None;
        }
        let product = line[..start].trim();
        let fee = line[start..].trim();
        if product.split_whitespace().count() < 2 || !self.looks_like_product_name(product) {
            return None;
        }
        if self.patterns.is_fee(product) || self.patterns.is_discount(product) {
            return None;
        }
        Some((product.to_string(), fee.to_string()))
    }

    /// The product name a raw line contributes, if any
    ///
    /// Item-with-code lines give their name part; unknown lines give their text (a merged
    /// fee suffix removed); inline prices are stripped. Fees, discounts, adjustments,
    /// prices and header noise give nothing.
    pub fn product_name_at(&self, line: &str) -> Option<String> {
        let name = match self.classify(line) {
            LineKind::ItemWithCode => {
                let (_, rest) = self.patterns.item_code_parts(line)?;
                rest
            }
            LineKind::Unknown => match self.split_fee_suffix(line) {
                Some((product, _)) => product,
                None => line.trim().to_string(),
            },
            _ => return None,
        };

        let name = match split_inline_price(&name) {
            Some((stripped, _)) => stripped,
            None => name,
        };
        if self.item_kind(&name) != ItemKind::Product || !self.looks_like_product_name(&name) {
            return None;
        }
        Some(name)
    }
}
