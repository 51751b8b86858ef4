//! Ollama backend implementation
//!
//! HTTP client for the Ollama `/api/generate` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::parsing::parse_product_suggestion;
use super::types::ProductSuggestion;
use super::AIBackend;

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, default_model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        let request = OllamaRequest {
            model: self.default_model.clone(),
            prompt,
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()
            .map_err(Error::Http)?;

        let ollama_response: OllamaResponse = response.json().await?;
        Ok(ollama_response.response)
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

fn product_prompt(raw_name: &str, merchant: &str) -> String {
    format!(
        "You expand abbreviated grocery receipt item names into canonical products.\n\
         Store: {merchant}\n\
         Receipt item: \"{raw_name}\"\n\n\
         Respond with JSON only, no explanation:\n\
         {{\"name\": \"<full product name>\", \"brand\": \"<brand or null>\", \
         \"category\": \"<category or null>\"}}"
    )
}

#[async_trait]
impl AIBackend for OllamaBackend {
    async fn suggest_product(&self, raw_name: &str, merchant: &str) -> Result<ProductSuggestion> {
        let response = self.generate(product_prompt(raw_name, merchant)).await?;
        debug!("Ollama product response: {}", response);
        parse_product_suggestion(&response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.default_model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockOllamaServer;

    #[test]
    fn test_prompt_names_item_and_store() {
        let prompt = product_prompt("BLK FRST HAM", "COSTCO");
        assert!(prompt.contains("Receipt item: \"BLK FRST HAM\""));
        assert!(prompt.contains("Store: COSTCO"));
        assert!(prompt.contains(r#"{"name": "#));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
        assert_eq!(backend.model(), "llama3.2");
    }

    #[tokio::test]
    async fn test_suggest_product_against_mock_server() {
        let server = MockOllamaServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        assert!(backend.health_check().await);
        let suggestion = backend.suggest_product("BLK FRST HAM", "COSTCO").await.unwrap();
        assert_eq!(suggestion.name, "Black Forest Ham");
        assert_eq!(suggestion.category.as_deref(), Some("Meat"));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let backend = OllamaBackend::new("http://127.0.0.1:1", "llama3.2");
        assert!(!backend.health_check().await);
        assert!(backend.suggest_product("HAM", "COSTCO").await.is_err());
    }
}
