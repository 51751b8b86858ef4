//! Domain models for tillroll

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ========== OCR input ==========

/// One OCR text line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLine {
    pub index: usize,
    pub text: String,
}

impl RawLine {
    /// Number the raw text lines of a receipt in reading order
    pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Vec<RawLine> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| RawLine {
                index,
                text: text.as_ref().trim().to_string(),
            })
            .collect()
    }
}

/// A price as delivered by the OCR vendor: either a string ("2.00-") or a bare number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceField {
    Text(String),
    Number(f64),
}

impl PriceField {
    pub fn as_raw(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => format!("{:.2}", n),
        }
    }
}

/// A line item from the OCR vendor's structured extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredItem {
    pub name: String,
    pub total_price: PriceField,
    #[serde(default)]
    pub unit_price: Option<PriceField>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub item_code: Option<String>,
}

/// The raw-field bundle returned by the OCR engine for one receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrBundle {
    pub merchant: String,
    #[serde(default)]
    pub store_address: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub items: Vec<StructuredItem>,
    /// Raw text in reading order, one entry per line
    #[serde(default)]
    pub raw_text: Vec<String>,
    /// Engine-reported confidence (0.0-1.0)
    #[serde(default)]
    pub confidence: Option<f64>,
}

// ========== Line classification ==========

/// Classification of a single raw OCR line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Header/footer noise (totals, payment, dates)
    Skip,
    /// `<4-7 digit code> <name>`
    ItemWithCode,
    /// `<n> @ <price>`
    QuantityMultiplier,
    /// A bare price
    Price,
    Fee,
    Discount,
    Adjustment,
    Unknown,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::ItemWithCode => "item_with_code",
            Self::QuantityMultiplier => "quantity_multiplier",
            Self::Price => "price",
            Self::Fee => "fee",
            Self::Discount => "discount",
            Self::Adjustment => "adjustment",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role of a recovered receipt line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Product,
    /// Positive addition tied to a product (deposit, environmental fee)
    Fee,
    /// Negative adjustment tied to a product
    Discount,
    /// Receipt-level correction (void, tax adjustment)
    Adjustment,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Fee => "fee",
            Self::Discount => "discount",
            Self::Adjustment => "adjustment",
        }
    }

    /// Fees and discounts modify the product they follow
    pub fn is_modifier(&self) -> bool {
        matches!(self, Self::Fee | Self::Discount)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ========== Recovered items ==========

/// A line recovered by parsing that has not yet been normalized or priced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TentativeItem {
    pub name: String,
    pub price_raw: String,
    pub quantity: u32,
    pub unit_price_raw: Option<String>,
    pub item_code: Option<String>,
    pub kind: ItemKind,
    /// Raw line the name came from
    pub source_line: Option<usize>,
    /// Raw line consumed as this item's price (None for inline/structured prices)
    pub price_line: Option<usize>,
    /// Price is a placeholder awaiting backfill from raw lines
    pub needs_price: bool,
    /// Product this fee/discount was positioned beneath
    pub preceding_product: Option<String>,
}

impl TentativeItem {
    pub fn new(name: impl Into<String>, price_raw: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            name: name.into(),
            price_raw: price_raw.into(),
            quantity: 1,
            unit_price_raw: None,
            item_code: None,
            kind,
            source_line: None,
            price_line: None,
            needs_price: false,
            preceding_product: None,
        }
    }

    /// A fee or product whose price must be found later
    pub fn placeholder(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            needs_price: true,
            ..Self::new(name, "0.00", kind)
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.item_code = Some(code.into());
        self
    }

    pub fn at_line(mut self, index: usize) -> Self {
        self.source_line = Some(index);
        self
    }

    pub fn priced_from(mut self, index: usize) -> Self {
        self.price_line = Some(index);
        self
    }
}

/// A price string resolved into a signed amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPrice {
    /// Magnitude; the sign lives in `is_negative`
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub is_negative: bool,
    pub original_format: String,
}

impl ParsedPrice {
    pub fn signed(&self) -> Decimal {
        if self.is_negative {
            -self.amount
        } else {
            self.amount
        }
    }
}

// ========== Normalization ==========

/// Which tier produced a normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    ExactMatch,
    SimilarityMatch,
    AiGenerated,
    Fallback,
}

impl NormalizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::SimilarityMatch => "similarity_match",
            Self::AiGenerated => "ai_generated",
            Self::Fallback => "fallback",
        }
    }
}

impl std::str::FromStr for NormalizationMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact_match" | "exact" => Ok(Self::ExactMatch),
            "similarity_match" | "similarity" => Ok(Self::SimilarityMatch),
            "ai_generated" | "ai" => Ok(Self::AiGenerated),
            "fallback" => Ok(Self::Fallback),
            _ => Err(format!("Unknown normalization method: {}", s)),
        }
    }
}

impl std::fmt::Display for NormalizationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical product data resolved for one raw item name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub normalized_name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    /// Classification certainty, always within [0, 1]
    pub confidence_score: f64,
    pub is_discount: bool,
    pub is_adjustment: bool,
    pub method: NormalizationMethod,
    pub item_code: Option<String>,
    /// Name closeness reported by the matcher that supplied the name (Jaccard or embedding)
    pub similarity_score: Option<f64>,
    /// Name/brand/category were replaced by an embedding match
    pub embedding_override: bool,
}

impl NormalizationResult {
    pub fn new(
        normalized_name: impl Into<String>,
        confidence: f64,
        method: NormalizationMethod,
    ) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&confidence),
            "confidence out of range: {}",
            confidence
        );
        Self {
            normalized_name: normalized_name.into(),
            brand: None,
            category: None,
            confidence_score: confidence,
            is_discount: false,
            is_adjustment: false,
            method,
            item_code: None,
            similarity_score: None,
            embedding_override: false,
        }
    }
}

// ========== Linking ==========

/// How a discount amount was expressed on the receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
    Unknown,
}

/// Whether a link lowers (discount) or raises (fee) the product price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Discount,
    Fee,
}

/// A discount or fee folded into the product it modifies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountLink {
    pub discount_id: usize,
    pub kind: LinkKind,
    /// Magnitude of the adjustment
    #[serde(with = "rust_decimal::serde::float")]
    pub discount_amount: Decimal,
    pub discount_type: DiscountType,
    pub description: String,
    pub link_confidence: f64,
    pub applied_to_product_id: Option<usize>,
}

/// A tentative item merged with its normalization, links and final price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedItem {
    /// Position of the item in the linked tentative list
    pub id: usize,
    pub name: String,
    pub kind: ItemKind,
    pub item_code: Option<String>,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub unit_price: Option<Decimal>,
    /// Signed price as printed
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub final_price: Decimal,
    pub normalization: NormalizationResult,
    pub discounts: Vec<DiscountLink>,
    pub preceding_product: Option<String>,
}

impl EnhancedItem {
    pub fn discount_total(&self) -> Decimal {
        self.discounts
            .iter()
            .filter(|d| d.kind == LinkKind::Discount)
            .map(|d| d.discount_amount)
            .sum()
    }

    pub fn fee_total(&self) -> Decimal {
        self.discounts
            .iter()
            .filter(|d| d.kind == LinkKind::Fee)
            .map(|d| d.discount_amount)
            .sum()
    }
}

/// Aggregate counts over one receipt's enhanced items
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizationSummary {
    pub total_items: usize,
    pub product_count: usize,
    pub fee_count: usize,
    pub discount_count: usize,
    pub adjustment_count: usize,
    pub linked_discount_count: usize,
    pub linked_fee_count: usize,
    /// Mean confidence over product items only
    pub average_confidence: f64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_discount_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_fee_amount: Decimal,
    pub items_with_discounts: usize,
    pub method_counts: BTreeMap<NormalizationMethod, usize>,
}

/// Where the authoritative item list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    Structured,
    LineParser,
}

impl ItemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::LineParser => "line_parser",
        }
    }
}

/// Output of one receipt-processing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedReceipt {
    pub merchant: String,
    pub source: ItemSource,
    pub items: Vec<EnhancedItem>,
    pub summary: NormalizationSummary,
    /// Fee/discount lines folded into their product
    pub absorbed_lines: usize,
}

// ========== Store records ==========

/// A persisted raw-name → canonical product mapping for one merchant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRecord {
    pub id: i64,
    pub raw_name: String,
    pub merchant: String,
    pub normalized_name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub confidence: f64,
    pub is_discount: bool,
    pub is_adjustment: bool,
    pub match_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_matched_at: Option<DateTime<Utc>>,
}

/// Fields for creating a normalization record
#[derive(Debug, Clone, PartialEq)]
pub struct NewNormalization {
    pub raw_name: String,
    pub merchant: String,
    pub normalized_name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub confidence: f64,
    pub is_discount: bool,
    pub is_adjustment: bool,
}

impl NewNormalization {
    pub fn from_result(raw_name: &str, merchant: &str, result: &NormalizationResult) -> Self {
        Self {
            raw_name: raw_name.to_string(),
            merchant: merchant.to_string(),
            normalized_name: result.normalized_name.clone(),
            brand: result.brand.clone(),
            category: result.category.clone(),
            confidence: result.confidence_score,
            is_discount: result.is_discount,
            is_adjustment: result.is_adjustment,
        }
    }
}

// ========== Embedding search ==========

/// Canonical product returned by an embedding lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatch {
    pub normalized_product: CanonicalProduct,
    pub similarity: f64,
}
