//! Pipeline configuration
//!
//! Thresholds, parser windows, merchant profiles and extra pattern keywords.
//!
//! ## Configuration Resolution
//!
//! 1. An explicit path (`--config`), which must exist
//! 2. The override in the data dir (~/.local/share/tillroll/config/pipeline.toml)
//! 3. The embedded defaults (compiled into the binary)
//!
//! Keys omitted from a file keep their built-in defaults. A `[[merchants]]` list, when
//! present, replaces the built-in profiles.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::parser::{MerchantProfile, ReceiptLayout};
use crate::patterns::{PatternBank, PatternExtras};

/// Embedded default config (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/pipeline.toml");

const WAREHOUSE_ITEM_LINE: &str = r"^(?:[A-Z]\s+)?\d{4,7}\s+\S";
const PRICED_NAME_LINE: &str = r"^[A-Z][A-Z0-9 &./-]{2,}\s+\$?\d+\.\d{2}\s*[A-Z]?$";

/// When an embedding match replaces a normalization's name
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Minimum similarity requested from the search
    pub search_threshold: f64,
    /// Override regardless of confidence
    pub override_similarity: f64,
    /// Override when the normalizer's confidence is below `weak_confidence`
    pub weak_override_similarity: f64,
    pub weak_confidence: f64,
    /// Override a verbatim fallback
    pub fallback_override_similarity: f64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            search_threshold: 0.8,
            override_similarity: 0.9,
            weak_override_similarity: 0.85,
            weak_confidence: 0.7,
            fallback_override_similarity: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerConfig {
    pub similarity_threshold: f64,
    pub candidate_limit: usize,
    pub generative_confidence: f64,
    pub fallback_confidence: f64,
    pub embedding: EmbeddingConfig,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            candidate_limit: 50,
            generative_confidence: 0.7,
            fallback_confidence: 0.3,
            embedding: EmbeddingConfig::default(),
        }
    }
}

/// Line windows used by the parsers and the linker
#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
    pub price_lookahead: usize,
    pub generic_lookahead: usize,
    pub backfill_window: usize,
    pub fee_backward_window: usize,
    pub fee_forward_window: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            price_lookahead: 4,
            generic_lookahead: 2,
            backfill_window: 3,
            fee_backward_window: 5,
            fee_forward_window: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub normalizer: NormalizerConfig,
    pub parser: ParserConfig,
    pub merchants: Vec<MerchantProfile>,
    pub patterns: PatternExtras,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            parser: ParserConfig::default(),
            merchants: default_merchants(),
            patterns: PatternExtras::default(),
        }
    }
}

fn default_merchants() -> Vec<MerchantProfile> {
    vec![
        MerchantProfile {
            name: "warehouse-chain".to_string(),
            aliases: vec![
                "COSTCO".to_string(),
                "WAREHOUSE CHAIN".to_string(),
                "WHOLESALE".to_string(),
            ],
            layout: ReceiptLayout::Warehouse,
            expected_patterns: vec![WAREHOUSE_ITEM_LINE.to_string()],
        },
        MerchantProfile {
            name: "supermarket".to_string(),
            aliases: vec![
                "SAFEWAY".to_string(),
                "KROGER".to_string(),
                "ALBERTSONS".to_string(),
                "WHOLE FOODS".to_string(),
                "TRADER JOE".to_string(),
            ],
            layout: ReceiptLayout::Generic,
            expected_patterns: vec![PRICED_NAME_LINE.to_string()],
        },
    ]
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Override(PathBuf),
    Embedded,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit(path) => write!(f, "{}", path.display()),
            Self::Override(path) => write!(f, "{} (override)", path.display()),
            Self::Embedded => write!(f, "embedded defaults"),
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tillroll").join("config").join("pipeline.toml"))
}

impl PipelineConfig {
    /// Load configuration (explicit path, then data-dir override, then embedded)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_source(path).map(|(config, _)| config)
    }

    pub fn load_with_source(path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = Self::from_toml(&read_config(path)?)?;
            return Ok((config, ConfigSource::Explicit(path.to_path_buf())));
        }

        if let Some(default_path) = default_config_path() {
            if default_path.exists() {
                debug!(path = %default_path.display(), "Using config override");
                let config = Self::from_toml(&read_config(&default_path)?)?;
                return Ok((config, ConfigSource::Override(default_path)));
            }
        }

        Ok((Self::from_toml(DEFAULT_CONFIG)?, ConfigSource::Embedded))
    }

    /// Parse config from TOML content, merged over the built-in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

        let mut config = Self::default();

        if let Some(normalizer) = raw.normalizer {
            let n = &mut config.normalizer;
            set(&mut n.similarity_threshold, normalizer.similarity_threshold);
            set(&mut n.candidate_limit, normalizer.candidate_limit);
            set(&mut n.generative_confidence, normalizer.generative_confidence);
            set(&mut n.fallback_confidence, normalizer.fallback_confidence);

            if let Some(embedding) = normalizer.embedding {
                let e = &mut n.embedding;
                set(&mut e.search_threshold, embedding.search_threshold);
                set(&mut e.override_similarity, embedding.override_similarity);
                set(&mut e.weak_override_similarity, embedding.weak_override_similarity);
                set(&mut e.weak_confidence, embedding.weak_confidence);
                set(
                    &mut e.fallback_override_similarity,
                    embedding.fallback_override_similarity,
                );
            }
        }

        if let Some(parser) = raw.parser {
            let p = &mut config.parser;
            set(&mut p.price_lookahead, parser.price_lookahead);
            set(&mut p.generic_lookahead, parser.generic_lookahead);
            set(&mut p.backfill_window, parser.backfill_window);
            set(&mut p.fee_backward_window, parser.fee_backward_window);
            set(&mut p.fee_forward_window, parser.fee_forward_window);
        }

        if let Some(merchants) = raw.merchants {
            config.merchants = merchants;
        }

        if let Some(patterns) = raw.patterns {
            config.patterns = PatternExtras {
                skip_patterns: patterns.skip.unwrap_or_default(),
                fee_keywords: patterns.fees.unwrap_or_default(),
                discount_keywords: patterns.discounts.unwrap_or_default(),
                adjustment_keywords: patterns.adjustments.unwrap_or_default(),
                brands: patterns.brands.unwrap_or_default().into_iter().collect(),
                category_keywords: patterns.categories.unwrap_or_default(),
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Compile the pattern banks with this config's extras
    pub fn pattern_bank(&self) -> Result<PatternBank> {
        PatternBank::with_extras(&self.patterns)
    }

    fn validate(&self) -> Result<()> {
        let n = &self.normalizer;
        let e = &n.embedding;
        let unit = [
            ("similarity_threshold", n.similarity_threshold),
            ("generative_confidence", n.generative_confidence),
            ("fallback_confidence", n.fallback_confidence),
            ("embedding.search_threshold", e.search_threshold),
            ("embedding.override_similarity", e.override_similarity),
            ("embedding.weak_override_similarity", e.weak_override_similarity),
            ("embedding.weak_confidence", e.weak_confidence),
            ("embedding.fallback_override_similarity", e.fallback_override_similarity),
        ];
        if let Some((key, value)) = unit.iter().find(|(_, v)| !(0.0..=1.0).contains(v)) {
            return Err(Error::Config(format!(
                "normalizer.{} must be within [0, 1], got {}",
                key, value
            )));
        }

        if n.candidate_limit == 0 {
            return Err(Error::Config("normalizer.candidate_limit must be positive".into()));
        }

        if let Some(profile) = self.merchants.iter().find(|m| m.name.trim().is_empty()) {
            return Err(Error::Config(format!(
                "merchant profile with aliases {:?} has no name",
                profile.aliases
            )));
        }

        Ok(())
    }
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    normalizer: Option<RawNormalizer>,
    parser: Option<RawParser>,
    merchants: Option<Vec<MerchantProfile>>,
    patterns: Option<RawPatterns>,
}

#[derive(Debug, Deserialize)]
struct RawNormalizer {
    similarity_threshold: Option<f64>,
    candidate_limit: Option<usize>,
    generative_confidence: Option<f64>,
    fallback_confidence: Option<f64>,
    embedding: Option<RawEmbedding>,
}

#[derive(Debug, Deserialize)]
struct RawEmbedding {
    search_threshold: Option<f64>,
    override_similarity: Option<f64>,
    weak_override_similarity: Option<f64>,
    weak_confidence: Option<f64>,
    fallback_override_similarity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawParser {
    price_lookahead: Option<usize>,
    generic_lookahead: Option<usize>,
    backfill_window: Option<usize>,
    fee_backward_window: Option<usize>,
    fee_forward_window: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawPatterns {
    skip: Option<Vec<String>>,
    fees: Option<Vec<String>>,
    discounts: Option<Vec<String>>,
    adjustments: Option<Vec<String>>,
    brands: Option<BTreeMap<String, String>>,
    categories: Option<BTreeMap<String, Vec<String>>>,
}
