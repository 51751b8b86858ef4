//! Tillroll Core Library
//!
//! Turns the field bundle of a receipt-OCR engine into a clean, confidence-scored
//! list of purchased products:
//! - Price string parsing and raw line classification
//! - Merchant-aware raw line parsers that recover items the structured fields missed
//! - Fee/discount discovery and linking to the product they modify
//! - Tiered product normalization (patterns, store, similarity, AI, fallback)
//! - SQLite normalization store and pluggable local AI backends

pub mod ai;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod linker;
pub mod models;
pub mod normalizer;
pub mod parser;
pub mod patterns;
pub mod pipeline;
pub mod price;
pub mod reconcile;
pub mod store;
pub mod summary;

/// Test utilities including receipt fixtures and mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, MockBackend, OllamaBackend, ProductSuggestion};
pub use classify::LineClassifier;
pub use config::{ConfigSource, NormalizerConfig, ParserConfig, PipelineConfig};
pub use db::Database;
pub use error::{Error, Result};
pub use linker::FeeDiscountLinker;
pub use models::*;
pub use normalizer::{clean_name, merchant_key, ProductNormalizer};
pub use parser::{LineParser, MerchantProfile, ParseOutcome, ParserRegistry, ReceiptLayout};
pub use patterns::{PatternBank, PatternExtras};
pub use pipeline::{LineParse, ReceiptPipeline};
pub use price::parse_price;
pub use reconcile::{FallbackReconciler, ReconcileReason, Reconciliation};
pub use store::{EmbeddingSearch, MemoryStore, NormalizationStore};
