//! Types returned by AI backends

use serde::{Deserialize, Serialize};

/// Canonical product details suggested for a raw receipt item name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSuggestion {
    /// Full product name, expanded from receipt abbreviations
    #[serde(alias = "product", alias = "normalized_name")]
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}
