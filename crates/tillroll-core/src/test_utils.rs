//! Test utilities for tillroll-core
//!
//! Receipt fixtures, stand-in collaborators and a mock Ollama server for unit and
//! integration tests.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::models::{EmbeddingMatch, NewNormalization, NormalizationRecord};
use crate::store::{EmbeddingSearch, NormalizationStore};

/// OCR bundles and raw line sets
pub mod fixtures {
    use crate::models::{OcrBundle, PriceField, StructuredItem};

    /// Warehouse item, its price, an environmental fee and its price
    pub const HAM_WITH_FEE_LINES: [&str; 4] =
        ["555107 BLK FRST HAM", "143.91", "ENVIRO FEE C", "2.00"];

    /// A fuller warehouse receipt: header, quantity line, coded items, a TPD discount,
    /// a fee and totals
    pub const WAREHOUSE_RECEIPT_LINES: [&str; 19] = [
        "COSTCO WHOLESALE",
        "Member 111222333444",
        "E 555107 BLK FRST HAM",
        "143.91",
        "ENVIRO FEE C",
        "2.00",
        "2 @ 4.99",
        "1858985 KS WATER",
        "9.98",
        "TPD/1858985",
        "3.00-",
        "E 43210 ORG BNNS",
        "1.99",
        "77777 RTSSRE CHKN 4.99",
        "SUBTOTAL",
        "160.87",
        "TAX",
        "0.00",
        "TOTAL 160.87",
    ];

    pub fn structured(name: &str, price: &str) -> StructuredItem {
        StructuredItem {
            name: name.to_string(),
            total_price: PriceField::Text(price.to_string()),
            unit_price: None,
            quantity: None,
            item_code: None,
        }
    }

    pub fn bundle(merchant: &str, items: Vec<StructuredItem>, lines: &[&str]) -> OcrBundle {
        OcrBundle {
            merchant: merchant.to_string(),
            store_address: None,
            date: None,
            time: None,
            items,
            raw_text: lines.iter().map(|l| l.to_string()).collect(),
            confidence: Some(0.92),
        }
    }

    /// No structured items, so the line parser is authoritative
    pub fn ham_with_fee_bundle() -> OcrBundle {
        bundle("COSTCO", Vec::new(), &HAM_WITH_FEE_LINES)
    }

    /// Structured extraction caught only two of the five items
    pub fn warehouse_bundle() -> OcrBundle {
        bundle(
            "Costco Wholesale #481",
            vec![structured("BLK FRST HAM", "143.91"), structured("KS WATER", "9.98")],
            &WAREHOUSE_RECEIPT_LINES,
        )
    }

    /// Structured extraction is trusted; the fee line only exists in raw text
    pub fn supermarket_bundle() -> OcrBundle {
        bundle(
            "SAFEWAY #1234",
            vec![
                structured("ORGANIC BANANAS", "2.49"),
                structured("MILK 2% GAL", "4.29"),
                structured("COUPON MILK", "1.00-"),
            ],
            &[
                "SAFEWAY",
                "ORGANIC BANANAS 2.49",
                "MILK 2% GAL 4.29",
                "CRV FEE",
                "0.10",
                "COUPON MILK 1.00-",
                "BALANCE DUE 5.88",
            ],
        )
    }
}

/// Embedding search that returns canned matches, or always fails
pub struct FixedEmbeddingSearch {
    matches: Vec<EmbeddingMatch>,
    fail: bool,
}

impl FixedEmbeddingSearch {
    pub fn new(matches: Vec<EmbeddingMatch>) -> Self {
        Self {
            matches,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            matches: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl EmbeddingSearch for FixedEmbeddingSearch {
    async fn find_similar(
        &self,
        _query: &str,
        _merchant: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<EmbeddingMatch>> {
        if self.fail {
            return Err(Error::Store("embedding index unavailable".into()));
        }
        Ok(self
            .matches
            .iter()
            .filter(|m| m.similarity >= threshold)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Store whose every call fails
pub struct FailingStore;

#[async_trait]
impl NormalizationStore for FailingStore {
    async fn find_exact(&self, _: &str, _: &str) -> Result<Option<NormalizationRecord>> {
        Err(Error::Store("store offline".into()))
    }

    async fn find_candidates(&self, _: &str, _: usize) -> Result<Vec<NormalizationRecord>> {
        Err(Error::Store("store offline".into()))
    }

    async fn create(&self, _: NewNormalization) -> Result<NormalizationRecord> {
        Err(Error::Store("store offline".into()))
    }

    async fn increment_match(&self, _: &NormalizationRecord) -> Result<()> {
        Err(Error::Store("store offline".into()))
    }
}

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 2_000_000_000,
        }],
    })
}

/// Ollama generate endpoint
async fn handle_generate(Json(request): Json<GenerateRequest>) -> Json<GenerateResponse> {
    let item = extract_item_from_prompt(&request.prompt);
    let upper = item.to_uppercase();

    let suggestion = if upper.contains("BLK FRST HAM") {
        serde_json::json!({"name": "Black Forest Ham", "brand": null, "category": "Meat"})
    } else if upper.contains("KS WATER") {
        serde_json::json!({
            "name": "Kirkland Signature Bottled Water",
            "brand": "Kirkland Signature",
            "category": "Beverages"
        })
    } else if upper.contains("ORG BNNS") {
        serde_json::json!({"name": "Organic Bananas", "brand": "unknown", "category": "Produce"})
    } else if upper.contains("RTSSRE CHKN") {
        serde_json::json!({"name": "Rotisserie Chicken", "brand": null, "category": "Meat"})
    } else {
        serde_json::json!({"name": item, "brand": null, "category": null})
    };

    // Models tend to wrap JSON in prose
    let response = format!("Here is the product:\n{}\n", suggestion);

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
}

/// Pull the quoted item name out of a product prompt
fn extract_item_from_prompt(prompt: &str) -> String {
    const MARKER: &str = "Receipt item: \"";
    prompt
        .find(MARKER)
        .map(|start| {
            let rest = &prompt[start + MARKER.len()..];
            rest.split('"').next().unwrap_or_default().to_string()
        })
        .unwrap_or_default()
}

#[derive(Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[allow(dead_code)]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}
