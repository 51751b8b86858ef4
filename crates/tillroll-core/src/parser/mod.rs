//! Merchant-aware raw line parsers
//!
//! Parsers walk the raw OCR lines of one receipt and recover item/price pairs the
//! structured extraction missed or mis-split. Each merchant profile maps to a layout,
//! and each layout to a parser variant:
//! - `warehouse`: item codes, prices on the following line, merged fee lines
//! - `generic`: short lookahead, inline prices first
//!
//! Consumed price lines are tracked in an explicit set so no price line is ever
//! claimed by two items.

mod generic;
mod warehouse;

pub use generic::GenericParser;
pub use warehouse::WarehouseParser;

use std::collections::BTreeSet;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::LineClassifier;
use crate::config::ParserConfig;
use crate::error::Result;
use crate::models::{LineKind, RawLine, TentativeItem};

/// Receipt layout family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptLayout {
    Warehouse,
    Generic,
}

impl ReceiptLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warehouse => "warehouse",
            Self::Generic => "generic",
        }
    }
}

impl FromStr for ReceiptLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warehouse" => Ok(Self::Warehouse),
            "generic" => Ok(Self::Generic),
            _ => Err(format!("Unknown receipt layout: {}", s)),
        }
    }
}

impl std::fmt::Display for ReceiptLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Items recovered from raw lines plus the raw line indices claimed as prices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub items: Vec<TentativeItem>,
    pub consumed: BTreeSet<usize>,
}

/// A raw-line parser for one receipt layout
pub trait LineParser: Send + Sync {
    fn layout(&self) -> ReceiptLayout;

    /// Recover tentative items from raw lines in reading order
    fn parse(&self, lines: &[RawLine]) -> ParseOutcome;
}

/// A merchant the registry recognizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantProfile {
    pub name: String,
    /// Substrings matched case-insensitively against the merchant name
    pub aliases: Vec<String>,
    pub layout: ReceiptLayout,
    /// Raw line shapes that indicate one purchased item each
    #[serde(default)]
    pub expected_patterns: Vec<String>,
}

impl MerchantProfile {
    pub fn matches(&self, merchant: &str) -> bool {
        let merchant = merchant.to_uppercase();
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|alias| alias.trim())
            .any(|alias| !alias.is_empty() && merchant.contains(&alias.to_uppercase()))
    }
}

struct CompiledProfile {
    profile: MerchantProfile,
    expected: Vec<Regex>,
}

/// Merchant profiles mapped to parser variants
pub struct ParserRegistry {
    profiles: Vec<CompiledProfile>,
    warehouse: WarehouseParser,
    generic: GenericParser,
}

impl ParserRegistry {
    pub fn new(
        classifier: LineClassifier,
        config: &ParserConfig,
        profiles: Vec<MerchantProfile>,
    ) -> Result<Self> {
        let profiles = profiles
            .into_iter()
            .map(|profile| -> Result<CompiledProfile> {
                let expected = profile
                    .expected_patterns
                    .iter()
                    .map(|p| Regex::new(&format!("(?i){}", p)))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(CompiledProfile { profile, expected })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            profiles,
            warehouse: WarehouseParser::new(classifier.clone(), config.price_lookahead),
            generic: GenericParser::new(classifier, config.generic_lookahead),
        })
    }

    pub fn profiles(&self) -> impl Iterator<Item = &MerchantProfile> {
        self.profiles.iter().map(|c| &c.profile)
    }

    /// First profile whose name or alias appears in the merchant name
    pub fn profile_for(&self, merchant: &str) -> Option<&MerchantProfile> {
        self.compiled_for(merchant).map(|c| &c.profile)
    }

    fn compiled_for(&self, merchant: &str) -> Option<&CompiledProfile> {
        self.profiles.iter().find(|c| c.profile.matches(merchant))
    }

    pub fn parser_for(&self, merchant: &str) -> &dyn LineParser {
        let layout = self
            .profile_for(merchant)
            .map(|p| p.layout)
            .unwrap_or(ReceiptLayout::Generic);
        debug!(merchant, layout = layout.as_str(), "Selected line parser");
        match layout {
            ReceiptLayout::Warehouse => &self.warehouse,
            ReceiptLayout::Generic => &self.generic,
        }
    }

    /// Number of raw lines matching the merchant's expected item shapes
    pub fn expected_pattern_hits(&self, merchant: &str, lines: &[RawLine]) -> usize {
        let Some(compiled) = self.compiled_for(merchant) else {
            return 0;
        };
        lines
            .iter()
            .filter(|line| compiled.expected.iter().any(|re| re.is_match(&line.text)))
            .count()
    }
}

/// Whether the lookahead for a price gives up at the next item line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookahead {
    /// Scan the whole window (item-with-code lines; prices often trail in a column)
    Window,
    /// Stop at an intervening item-with-code or quantity line
    UntilNextItem,
}

/// Position of the first unconsumed bare price in `(from, from + window]`
pub(crate) fn find_price(
    classifier: &LineClassifier,
    lines: &[RawLine],
    from: usize,
    window: usize,
    consumed: &BTreeSet<usize>,
    mode: Lookahead,
) -> Option<usize> {
    let end = from.saturating_add(window).min(lines.len().saturating_sub(1));
    for pos in from + 1..=end {
        match classifier.classify(&lines[pos].text) {
            LineKind::Price if !consumed.contains(&lines[pos].index) => return Some(pos),
            LineKind::ItemWithCode | LineKind::QuantityMultiplier
                if mode == Lookahead::UntilNextItem =>
            {
                return None
            }
            _ => {}
        }
    }
    None
}
