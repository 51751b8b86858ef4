//! Fee and discount linking
//!
//! Runs in two phases around normalization:
//! 1. `link` (before): backfill placeholder prices from raw lines, discover fee/discount
//!    lines the item list is missing, position them under their product.
//! 2. `fold` (after): attach each fee/discount to the product it modifies and compute
//!    final prices. Linked modifiers are absorbed; unlinked ones stay visible.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::debug;

use crate::classify::LineClassifier;
use crate::config::ParserConfig;
use crate::models::{
    DiscountLink, DiscountType, EnhancedItem, ItemKind, LineKind, LinkKind, NormalizationResult,
    RawLine, TentativeItem,
};
use crate::price::{parse_price, signed_amount, split_inline_price};

/// A fee/discount raw line with no counterpart in the item list
#[derive(Debug, Clone)]
struct MissingLine {
    pos: usize,
    kind: ItemKind,
    name: String,
    inline_price: Option<String>,
}

pub struct FeeDiscountLinker {
    classifier: LineClassifier,
    price_window: usize,
    backfill_window: usize,
    backward_window: usize,
    forward_window: usize,
}

impl FeeDiscountLinker {
    pub fn new(classifier: LineClassifier, config: &ParserConfig) -> Self {
        Self {
            classifier,
            price_window: config.price_lookahead,
            backfill_window: config.backfill_window,
            backward_window: config.fee_backward_window,
            forward_window: config.fee_forward_window,
        }
    }

    /// Backfill, discover and position fee/discount lines
    pub fn link(
        &self,
        items: Vec<TentativeItem>,
        lines: &[RawLine],
        consumed: &BTreeSet<usize>,
    ) -> Vec<TentativeItem> {
        let mut used = self.used_price_lines(&items, lines, consumed);
        let items = self.backfill_prices(items, lines, &mut used);
        let items = self.discover_modifiers(items, lines, &mut used);
        self.assign_preceding(items, lines)
    }

    fn is_bare_price(&self, text: &str) -> bool {
        self.classifier.classify(text) == LineKind::Price
    }

    /// Price lines already spoken for
    ///
    /// Parser items name their price line directly. Structured items carry no line
    /// reference, so their price is located as the first unused raw price line of the
    /// same amount within the price lookahead of the item's name.
    pub fn used_price_lines(
        &self,
        items: &[TentativeItem],
        lines: &[RawLine],
        consumed: &BTreeSet<usize>,
    ) -> BTreeSet<usize> {
        let mut used = consumed.clone();
        used.extend(items.iter().filter_map(|item| item.price_line));

        let mut cursor = 0;
        for item in items
            .iter()
            .filter(|i| i.source_line.is_none() && i.price_line.is_none() && !i.needs_price)
        {
            let amount = parse_price(&item.price_raw).amount;
            if amount.is_zero() {
                continue;
            }
            let start = match find_name(lines, &item.name, cursor) {
                Some(pos) => {
                    cursor = pos + 1;
                    pos
                }
                None => cursor.min(lines.len()),
            };
            let end = (start + self.price_window + 1).min(lines.len());
            let hit = (start..end).find(|&pos| {
                !used.contains(&lines[pos].index)
                    && self.is_bare_price(&lines[pos].text)
                    && parse_price(&lines[pos].text).amount == amount
            });
            if let Some(pos) = hit {
                used.insert(lines[pos].index);
            }
        }
        used
    }

    /// Fill placeholder prices from the raw lines following the item's name
    pub fn backfill_prices(
        &self,
        mut items: Vec<TentativeItem>,
        lines: &[RawLine],
        used: &mut BTreeSet<usize>,
    ) -> Vec<TentativeItem> {
        let mut cursor = 0;
        for item in items.iter_mut() {
            let located = item.source_line.and_then(|index| position_of(lines, index));
            if let Some(pos) = located {
                cursor = pos;
            }
            if !item.needs_price {
                continue;
            }

            let Some(name_pos) = located.or_else(|| find_name(lines, &item.name, cursor)) else {
                debug!(name = %item.name, "Placeholder name not found in raw text");
                continue;
            };
            cursor = name_pos;

            let end = (name_pos + self.backfill_window).min(lines.len() - 1);
            let found = (name_pos + 1..=end).find(|&pos| {
                !used.contains(&lines[pos].index) && self.is_bare_price(&lines[pos].text)
            });
            match found {
                Some(pos) => {
                    used.insert(lines[pos].index);
                    item.price_raw = lines[pos].text.clone();
                    item.price_line = Some(lines[pos].index);
                    item.needs_price = false;
                    debug!(
                        name = %item.name,
                        line = lines[pos].index,
                        price = %item.price_raw,
                        "Backfilled price"
                    );
                }
                None => debug!(name = %item.name, "No price to backfill, keeping 0.00"),
            }
        }
        items
    }

    /// Add fee/discount raw lines the item list does not account for
    pub fn discover_modifiers(
        &self,
        mut items: Vec<TentativeItem>,
        lines: &[RawLine],
        used: &mut BTreeSet<usize>,
    ) -> Vec<TentativeItem> {
        // Multiset match: each existing modifier accounts for one raw line
        let mut claimed = vec![false; items.len()];
        let mut missing = Vec::new();

        for (pos, line) in lines.iter().enumerate() {
            let kind = match self.classifier.classify(&line.text) {
                LineKind::Fee => ItemKind::Fee,
                LineKind::Discount => ItemKind::Discount,
                _ => continue,
            };
            let (name, inline_price) = match split_inline_price(&line.text) {
                Some((name, price)) => (name, Some(price)),
                None => (line.text.clone(), None),
            };

            let by_line = items.iter().enumerate().position(|(k, item)| {
                !claimed[k] && item.source_line == Some(line.index)
            });
            let by_name = || {
                items.iter().enumerate().position(|(k, item)| {
                    !claimed[k] && item.kind == kind && names_overlap(&item.name, &name)
                })
            };
            match by_line.or_else(by_name) {
                Some(k) => claimed[k] = true,
                None => missing.push(MissingLine {
                    pos,
                    kind,
                    name,
                    inline_price,
                }),
            }
        }

        for line in missing {
            let product = self.preceding_product(lines, line.pos);
            let (price_raw, price_line) = match line.inline_price {
                Some(price) => (price, None),
                None => match self.forward_price(lines, line.pos, used) {
                    Some(pos) => {
                        used.insert(lines[pos].index);
                        (lines[pos].text.clone(), Some(lines[pos].index))
                    }
                    None => ("0.00".to_string(), None),
                },
            };

            let mut item =
                TentativeItem::new(line.name, price_raw, line.kind).at_line(lines[line.pos].index);
            item.price_line = price_line;
            item.preceding_product = product.as_ref().map(|(name, _)| name.clone());

            let anchor = product.as_ref().map(|(name, index)| (name.as_str(), *index));
            let at = insertion_index(&items, anchor);
            debug!(
                name = %item.name,
                kind = item.kind.as_str(),
                preceding = ?item.preceding_product,
                at,
                "Discovered modifier line"
            );
            items.insert(at, item);
        }
        items
    }

    /// Set `preceding_product` on modifiers that lack one
    fn assign_preceding(
        &self,
        mut items: Vec<TentativeItem>,
        lines: &[RawLine],
    ) -> Vec<TentativeItem> {
        let mut last_product: Option<String> = None;
        for item in items.iter_mut() {
            match item.kind {
                ItemKind::Product => last_product = Some(item.name.clone()),
                ItemKind::Fee | ItemKind::Discount if item.preceding_product.is_none() => {
                    item.preceding_product = item
                        .source_line
                        .and_then(|index| position_of(lines, index))
                        .and_then(|pos| self.preceding_product(lines, pos))
                        .map(|(name, _)| name)
                        .or_else(|| last_product.clone());
                }
                _ => {}
            }
        }
        items
    }

    /// Nearest product name within the backward window, with its raw line index
    pub fn preceding_product(&self, lines: &[RawLine], pos: usize) -> Option<(String, usize)> {
        (1..=self.backward_window)
            .take_while(|back| *back <= pos)
            .find_map(|back| {
                let line = &lines[pos - back];
                self.classifier
                    .product_name_at(&line.text)
                    .map(|name| (name, line.index))
            })
    }

    fn forward_price(
        &self,
        lines: &[RawLine],
        pos: usize,
        used: &BTreeSet<usize>,
    ) -> Option<usize> {
        let end = (pos + self.forward_window).min(lines.len().saturating_sub(1));
        (pos + 1..=end)
            .find(|&p| !used.contains(&lines[p].index) && self.is_bare_price(&lines[p].text))
    }

    /// Attach modifiers to their products and compute final prices
    ///
    /// Returns the visible items and the number of absorbed modifier lines.
    pub fn fold(
        &self,
        items: Vec<TentativeItem>,
        normalizations: Vec<NormalizationResult>,
    ) -> (Vec<EnhancedItem>, usize) {
        debug_assert_eq!(items.len(), normalizations.len());

        let mut enhanced: Vec<EnhancedItem> = items
            .into_iter()
            .zip(normalizations)
            .enumerate()
            .map(|(id, (item, normalization))| enhance(id, item, normalization))
            .collect();

        let mut absorbed = vec![false; enhanced.len()];
        for m in 0..enhanced.len() {
            let link_kind = match enhanced[m].kind {
                ItemKind::Discount => LinkKind::Discount,
                ItemKind::Fee => LinkKind::Fee,
                _ => continue,
            };
            let Some((target, confidence)) = self.link_target(&enhanced, m) else {
                debug!(name = %enhanced[m].name, "No product to link, keeping standalone");
                continue;
            };

            let Some(link) = self.build_link(&enhanced[m], &enhanced[target], link_kind, confidence)
            else {
                debug!(
                    name = %enhanced[m].name,
                    "Percentage amount out of range, keeping standalone"
                );
                continue;
            };
            debug!(
                modifier = %enhanced[m].name,
                product = %enhanced[target].name,
                confidence,
                "Linked modifier"
            );
            enhanced[target].discounts.push(link);
            absorbed[m] = true;
        }

        for item in enhanced.iter_mut().filter(|i| i.kind == ItemKind::Product) {
            item.final_price = item
                .price
                .checked_sub(item.discount_total())
                .and_then(|price| price.checked_add(item.fee_total()))
                .unwrap_or(item.price)
                .max(Decimal::ZERO);
        }

        let absorbed_count = absorbed.iter().filter(|a| **a).count();
        let visible = enhanced
            .into_iter()
            .zip(absorbed)
            .filter(|(_, absorbed)| !absorbed)
            .map(|(item, _)| item)
            .collect();
        (visible, absorbed_count)
    }

    /// Product a modifier applies to, with link confidence
    fn link_target(&self, items: &[EnhancedItem], m: usize) -> Option<(usize, f64)> {
        let modifier = &items[m];
        let is_product = |k: &usize| items[*k].kind == ItemKind::Product;

        if modifier.kind == ItemKind::Discount {
            if let Some(code) = self.classifier.patterns().discount_target_code(&modifier.name) {
                let has_code = |k: &usize| {
                    is_product(k) && items[*k].item_code.as_deref() == Some(code.as_str())
                };
                let coded = (0..m)
                    .rev()
                    .find(has_code)
                    .or_else(|| (m + 1..items.len()).find(has_code));
                if let Some(k) = coded {
                    return Some((k, 1.0));
                }
            }
        }

        let nearest = (0..m).rev().find(is_product)?;
        let target = modifier
            .preceding_product
            .as_deref()
            .and_then(|hint| {
                (0..m)
                    .rev()
                    .find(|k| is_product(k) && names_overlap(&items[*k].name, hint))
            })
            .unwrap_or(nearest);
        Some((target, distance_confidence(m - target - 1)))
    }

    fn build_link(
        &self,
        modifier: &EnhancedItem,
        product: &EnhancedItem,
        kind: LinkKind,
        confidence: f64,
    ) -> Option<DiscountLink> {
        let magnitude = modifier.price.abs();
        let percent = match kind {
            LinkKind::Discount => self.classifier.patterns().percent_off(&modifier.name),
            LinkKind::Fee => None,
        };

        let (amount, discount_type) = match percent {
            Some(pct) if magnitude.is_zero() => (
                (product.price.abs().checked_mul(pct)? / Decimal::ONE_HUNDRED).round_dp(2),
                DiscountType::Percentage,
            ),
            Some(_) => (magnitude, DiscountType::Percentage),
            None if magnitude.is_zero() => (Decimal::ZERO, DiscountType::Unknown),
            None => (magnitude, DiscountType::Fixed),
        };

        Some(DiscountLink {
            discount_id: modifier.id,
            kind,
            discount_amount: amount,
            discount_type,
            description: modifier.name.clone(),
            link_confidence: confidence,
            applied_to_product_id: Some(product.id),
        })
    }
}

fn enhance(id: usize, item: TentativeItem, normalization: NormalizationResult) -> EnhancedItem {
    let price = signed_amount(&item.price_raw);
    let kind = if normalization.is_discount {
        ItemKind::Discount
    } else if normalization.is_adjustment {
        ItemKind::Adjustment
    } else {
        item.kind
    };

    EnhancedItem {
        id,
        name: item.name,
        kind,
        item_code: item.item_code.or_else(|| normalization.item_code.clone()),
        quantity: item.quantity,
        unit_price: item.unit_price_raw.as_deref().map(signed_amount),
        price,
        final_price: price,
        normalization,
        discounts: Vec::new(),
        preceding_product: item.preceding_product,
    }
}

/// 0.9 when adjacent, 0.1 less per intervening line, never below 0.5
fn distance_confidence(intervening: usize) -> f64 {
    9usize.saturating_sub(intervening).max(5) as f64 / 10.0
}

fn position_of(lines: &[RawLine], index: usize) -> Option<usize> {
    lines.iter().position(|line| line.index == index)
}

/// First line at or after `from` containing the name, else the first anywhere
fn find_name(lines: &[RawLine], name: &str, from: usize) -> Option<usize> {
    let needle = name.trim().to_uppercase();
    if needle.is_empty() {
        return None;
    }
    let from = from.min(lines.len());
    let contains = |pos: &usize| lines[*pos].text.to_uppercase().contains(&needle);
    (from..lines.len()).find(&contains).or_else(|| (0..from).find(&contains))
}

/// Case-insensitive equality or containment in either direction
fn names_overlap(a: &str, b: &str) -> bool {
    let a = a.trim().to_uppercase();
    let b = b.trim().to_uppercase();
    !a.is_empty() && !b.is_empty() && (a == b || a.contains(&b) || b.contains(&a))
}

/// Where a discovered modifier goes: after its product and the modifier run below it
fn insertion_index(items: &[TentativeItem], product: Option<(&str, usize)>) -> usize {
    let Some((name, line_index)) = product else {
        return items.len();
    };
    let is_product = |item: &TentativeItem| item.kind == ItemKind::Product;

    let anchor = items
        .iter()
        .position(|item| is_product(item) && item.source_line == Some(line_index))
        .or_else(|| {
            items.iter().position(|item| {
                is_product(item) && item.name.trim().eq_ignore_ascii_case(name.trim())
            })
        })
        .or_else(|| {
            items
                .iter()
                .position(|item| is_product(item) && names_overlap(&item.name, name))
        });

    let Some(anchor) = anchor else {
        return items.len();
    };
    let mut at = anchor + 1;
    while at < items.len() && items[at].kind.is_modifier() {
        at += 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizationMethod;
    use crate::patterns::PatternBank;
    use std::sync::Arc;

    fn linker() -> FeeDiscountLinker {
        let classifier = LineClassifier::new(Arc::new(PatternBank::standard().unwrap()));
        FeeDiscountLinker::new(classifier, &ParserConfig::default())
    }

    fn dec(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn product(name: &str, price: &str) -> TentativeItem {
        TentativeItem::new(name, price, ItemKind::Product)
    }

    fn plain(items: &[TentativeItem]) -> Vec<NormalizationResult> {
        items
            .iter()
            .map(|item| {
                let mut result = NormalizationResult::new(
                    item.name.clone(),
                    0.7,
                    NormalizationMethod::AiGenerated,
                );
                result.is_discount = item.kind == ItemKind::Discount;
                if result.is_discount {
                    result.confidence_score = 1.0;
                    result.method = NormalizationMethod::ExactMatch;
                }
                result
            })
            .collect()
    }

    #[test]
    fn test_backfill_from_name_line() {
        let lines = RawLine::from_texts(&["BLK FRST HAM ENVIRO FEE", "143.91", "2.00"]);
        let mut fee = TentativeItem::placeholder("ENVIRO FEE", ItemKind::Fee);
        fee.preceding_product = Some("BLK FRST HAM".to_string());
        let items = vec![product("BLK FRST HAM", "143.91"), fee];

        let linked = linker().link(items, &lines, &BTreeSet::new());
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[1].price_raw, "2.00");
        assert_eq!(linked[1].price_line, Some(2));
        assert!(!linked[1].needs_price);
    }

    #[test]
    fn test_backfill_leaves_zero_when_nothing_found() {
        let lines = RawLine::from_texts(&["555107 BLK FRST HAM", "SUBTOTAL 0.00"]);
        let item = TentativeItem::placeholder("BLK FRST HAM", ItemKind::Product).at_line(0);
        let linked = linker().link(vec![item], &lines, &BTreeSet::new());
        assert_eq!(linked[0].price_raw, "0.00");
        assert!(linked[0].needs_price);
    }

    #[test]
    fn test_backfill_skips_used_price_lines() {
        let lines = RawLine::from_texts(&["111111 APPLES", "222222 PEARS", "1.00", "2.00"]);
        let apples = product("APPLES", "1.00").at_line(0).priced_from(2);
        let pears = TentativeItem::placeholder("PEARS", ItemKind::Product).at_line(1);
        let linked = linker().link(vec![apples, pears], &lines, &BTreeSet::from([2]));
        assert_eq!(linked[1].price_raw, "2.00");
    }

    #[test]
    fn test_structured_price_claim_stays_near_its_name() {
        let lines = RawLine::from_texts(&[
            "BREAD 2.00",
            "THANK YOU",
            "PLEASE COME AGAIN",
            "*****",
            "-----",
            "-----",
            "ENVIRO FEE C",
            "2.00",
        ]);
        let items = vec![product("BREAD", "2.00")];

        let used = linker().used_price_lines(&items, &lines, &BTreeSet::new());
        assert!(used.is_empty());

        let linked = linker().link(items, &lines, &BTreeSet::new());
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[1].name, "ENVIRO FEE C");
        assert_eq!(linked[1].price_raw, "2.00");
        assert_eq!(linked[1].price_line, Some(7));
    }

    #[test]
    fn test_discovers_missing_fee_after_product() {
        let lines = RawLine::from_texts(&[
            "555107 BLK FRST HAM",
            "143.91",
            "ENVIRO FEE C",
            "2.00",
            "1858985 KS WATER",
            "4.99",
        ]);
        let items = vec![product("BLK FRST HAM", "143.91"), product("KS WATER", "4.99")];

        let linked = linker().link(items, &lines, &BTreeSet::new());
        assert_eq!(linked.len(), 3);
        assert_eq!(linked[0].name, "BLK FRST HAM");
        assert_eq!(linked[1].name, "ENVIRO FEE C");
        assert_eq!(linked[1].kind, ItemKind::Fee);
        assert_eq!(linked[1].price_raw, "2.00");
        assert_eq!(linked[1].preceding_product.as_deref(), Some("BLK FRST HAM"));
        assert_eq!(linked[2].name, "KS WATER");
    }

    #[test]
    fn test_existing_modifier_is_not_duplicated() {
        let lines = RawLine::from_texts(&["555107 BLK FRST HAM", "143.91", "ENVIRO FEE C", "2.00"]);
        let items = vec![
            product("BLK FRST HAM", "143.91"),
            TentativeItem::new("ENVIRO FEE", "2.00", ItemKind::Fee),
        ];
        let linked = linker().link(items, &lines, &BTreeSet::new());
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[1].preceding_product.as_deref(), Some("BLK FRST HAM"));
    }

    #[test]
    fn test_two_identical_fee_lines_both_counted() {
        let lines = RawLine::from_texts(&[
            "111111 KS WATER",
            "4.99",
            "CRV 0.10",
            "222222 KS SODA",
            "9.99",
            "CRV 0.10",
        ]);
        let items = vec![
            product("KS WATER", "4.99"),
            TentativeItem::new("CRV", "0.10", ItemKind::Fee),
            product("KS SODA", "9.99"),
        ];
        let linked = linker().link(items, &lines, &BTreeSet::new());
        assert_eq!(linked.len(), 4);
        assert_eq!(linked[3].name, "CRV");
        assert_eq!(linked[3].price_raw, "0.10");
        assert_eq!(linked[3].preceding_product.as_deref(), Some("KS SODA"));
    }

    #[test]
    fn test_discovered_line_without_product_is_appended() {
        let lines = RawLine::from_texts(&["BAG FEE", "0.10"]);
        let items = vec![product("MILK", "3.49")];
        let linked = linker().link(items, &lines, &BTreeSet::new());
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[1].name, "BAG FEE");
        assert_eq!(linked[1].preceding_product.as_deref(), Some("MILK"));
    }

    #[test]
    fn test_insertion_skips_existing_modifier_run() {
        let mut items = vec![
            product("BLK FRST HAM", "143.91").at_line(0),
            TentativeItem::new("TPD/555107", "5.00-", ItemKind::Discount),
            product("KS WATER", "4.99"),
        ];
        let at = insertion_index(&items, Some(("BLK FRST HAM", 0)));
        assert_eq!(at, 2);
        items.insert(at, TentativeItem::new("ENVIRO FEE", "2.00", ItemKind::Fee));
        assert_eq!(items[3].name, "KS WATER");
        assert_eq!(insertion_index(&items, None), 4);
    }

    #[test]
    fn test_preceding_product_uses_name_part() {
        let lines = RawLine::from_texts(&["E 555107 BLK FRST HAM", "143.91", "ENVIRO FEE C"]);
        assert_eq!(
            linker().preceding_product(&lines, 2),
            Some(("BLK FRST HAM".to_string(), 0))
        );
        assert_eq!(linker().preceding_product(&lines, 0), None);
    }

    #[test]
    fn test_fold_links_by_item_code() {
        let items = vec![
            product("KS WATER", "4.99").with_code("1858985"),
            product("BLK FRST HAM", "143.91").with_code("555107"),
            TentativeItem::new("TPD/1858985", "1.50-", ItemKind::Discount),
        ];
        let normalizations = plain(&items);
        let (visible, absorbed) = linker().fold(items, normalizations);

        assert_eq!(absorbed, 1);
        assert_eq!(visible.len(), 2);
        let water = &visible[0];
        assert_eq!(water.discounts.len(), 1);
        let link = &water.discounts[0];
        assert_eq!(link.link_confidence, 1.0);
        assert_eq!(link.discount_amount, dec(150));
        assert_eq!(link.discount_type, DiscountType::Fixed);
        assert_eq!(link.discount_id, 2);
        assert_eq!(link.applied_to_product_id, Some(0));
        assert_eq!(water.final_price, dec(349));
        assert_eq!(visible[1].final_price, dec(14391));
    }

    #[test]
    fn test_fold_confidence_decays_with_distance() {
        let items = vec![
            product("BLK FRST HAM", "143.91"),
            TentativeItem::new("ENVIRO FEE", "2.00", ItemKind::Fee),
            TentativeItem::new("COUPON", "5.00-", ItemKind::Discount),
        ];
        let normalizations = plain(&items);
        let (visible, absorbed) = linker().fold(items, normalizations);

        assert_eq!(absorbed, 2);
        assert_eq!(visible.len(), 1);
        let ham = &visible[0];
        assert_eq!(ham.discounts[0].kind, LinkKind::Fee);
        assert_eq!(ham.discounts[0].link_confidence, 0.9);
        assert_eq!(ham.discounts[1].kind, LinkKind::Discount);
        assert_eq!(ham.discounts[1].link_confidence, 0.8);
        assert_eq!(ham.final_price, dec(14091));
        assert_eq!(ham.discount_total(), dec(500));
        assert_eq!(ham.fee_total(), dec(200));
    }

    #[test]
    fn test_fold_confidence_floor() {
        assert_eq!(distance_confidence(0), 0.9);
        assert_eq!(distance_confidence(3), 0.6);
        assert_eq!(distance_confidence(4), 0.5);
        assert_eq!(distance_confidence(12), 0.5);
    }

    #[test]
    fn test_fold_percentage_discount_from_product_price() {
        let items = vec![
            product("KS COFFEE", "19.99"),
            TentativeItem::new("20% OFF", "0.00", ItemKind::Discount),
        ];
        let normalizations = plain(&items);
        let (visible, _) = linker().fold(items, normalizations);
        let link = &visible[0].discounts[0];
        assert_eq!(link.discount_type, DiscountType::Percentage);
        assert_eq!(link.discount_amount, dec(400));
        assert_eq!(visible[0].final_price, dec(1599));
    }

    #[test]
    fn test_fold_percentage_overflow_keeps_discount_standalone() {
        let items = vec![
            product("GOLD BAR", "50000000000000000000000000000"),
            TentativeItem::new("50% OFF", "0.00", ItemKind::Discount),
        ];
        let normalizations = plain(&items);
        let (visible, absorbed) = linker().fold(items, normalizations);
        assert_eq!(absorbed, 0);
        assert_eq!(visible.len(), 2);
        assert!(visible[0].discounts.is_empty());
        assert_eq!(visible[1].kind, ItemKind::Discount);
    }

    #[test]
    fn test_fold_floors_product_price_at_zero() {
        let items = vec![
            product("SAMPLE", "1.00"),
            TentativeItem::new("COUPON", "3.00-", ItemKind::Discount),
        ];
        let normalizations = plain(&items);
        let (visible, _) = linker().fold(items, normalizations);
        assert_eq!(visible[0].final_price, Decimal::ZERO);
    }

    #[test]
    fn test_fold_keeps_unlinked_and_adjustments_visible() {
        let items = vec![
            TentativeItem::new("COUPON", "1.00-", ItemKind::Discount),
            product("MILK", "3.49"),
            TentativeItem::new("TAX ADJ", "0.05-", ItemKind::Adjustment),
        ];
        let mut normalizations = plain(&items);
        normalizations[2].is_adjustment = true;
        let (visible, absorbed) = linker().fold(items, normalizations);

        assert_eq!(absorbed, 0);
        assert_eq!(visible.len(), 3);
        assert_eq!(visible[0].final_price, dec(-100));
        assert_eq!(visible[2].kind, ItemKind::Adjustment);
        assert!(visible[1].discounts.is_empty());
    }

    #[test]
    fn test_fold_prefers_named_preceding_product() {
        let mut fee = TentativeItem::new("CRV", "0.10", ItemKind::Fee);
        fee.preceding_product = Some("KS WATER".to_string());
        let items = vec![product("KS WATER", "4.99"), product("BANANAS", "1.49"), fee];
        let normalizations = plain(&items);
        let (visible, _) = linker().fold(items, normalizations);
        assert_eq!(visible[0].discounts.len(), 1);
        assert_eq!(visible[0].discounts[0].link_confidence, 0.8);
        assert!(visible[1].discounts.is_empty());
    }
}
