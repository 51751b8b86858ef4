//! Mock backend for testing
//!
//! Expands a handful of well-known receipt abbreviations and title-cases anything else.

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::ProductSuggestion;
use super::AIBackend;

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true; unhealthy mocks also fail suggestions
    pub healthy: bool,
    model: String,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            model: "mock".to_string(),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }
}

/// Title-case each whitespace-separated word
pub(crate) fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn suggest_product(&self, raw_name: &str, _merchant: &str) -> Result<ProductSuggestion> {
        if !self.healthy {
            return Err(Error::InvalidData("mock backend is unhealthy".into()));
        }

        let upper = raw_name.to_uppercase();
        let (name, brand, category) = match upper.as_str() {
            m if m.contains("BLK FRST HAM") => ("Black Forest Ham", None, Some("Meat")),
            m if m.contains("KS WATER") => (
                "Kirkland Signature Bottled Water",
                Some("Kirkland Signature"),
                Some("Beverages"),
            ),
            m if m.contains("ORG BNNS") || m.contains("ORGANIC BANANAS") => {
                ("Organic Bananas", None, Some("Produce"))
            }
            m if m.contains("RTSSRE CHKN") => ("Rotisserie Chicken", None, Some("Meat")),
            _ => {
                return Ok(ProductSuggestion {
                    name: title_case(raw_name),
                    brand: None,
                    category: None,
                })
            }
        };

        Ok(ProductSuggestion {
            name: name.to_string(),
            brand: brand.map(str::to_string),
            category: category.map(str::to_string),
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
