//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in prose, so the first `{` through the last `}`
//! is extracted before deserializing.

use crate::error::{Error, Result};

use super::types::ProductSuggestion;

fn truncated(text: &str) -> String {
    if text.len() > 200 {
        let cut = (0..=200).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &text[..cut])
    } else {
        text.to_string()
    }
}

/// Parse a product suggestion from an AI response
pub fn parse_product_suggestion(response: &str) -> Result<ProductSuggestion> {
    let response = response.trim();
    let start = response.find('{');
    let end = response.rfind('}');

    let mut suggestion: ProductSuggestion = match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                Error::InvalidData(format!(
                    "Invalid JSON from AI: {} | Raw: {}",
                    e,
                    truncated(json_str)
                ))
            })?
        }
        _ => {
            return Err(Error::InvalidData(format!(
                "No JSON found in AI response | Raw: {}",
                truncated(response)
            )))
        }
    };

    suggestion.name = suggestion.name.trim().to_string();
    if suggestion.name.is_empty() {
        return Err(Error::InvalidData("AI suggested an empty product name".into()));
    }
    // Models spell "no value" in several ways
    let blank = |value: &Option<String>| {
        value.as_deref().map(str::trim).map_or(true, |v| {
            v.is_empty() || v.eq_ignore_ascii_case("null") || v.eq_ignore_ascii_case("unknown")
        })
    };
    if blank(&suggestion.brand) {
        suggestion.brand = None;
    }
    if blank(&suggestion.category) {
        suggestion.category = None;
    }

    Ok(suggestion)
}
