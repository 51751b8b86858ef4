//! Warehouse-club receipt layout
//!
//! Lines look like `E 555107 BLK FRST HAM` with the price on its own line below, often
//! after a run of further item lines when the OCR split the price column. Fees such as
//! `ENVIRO FEE` may be merged onto the product line.

use tracing::debug;

use super::{find_price, LineParser, Lookahead, ParseOutcome, ReceiptLayout};
use crate::classify::LineClassifier;
use crate::models::{ItemKind, LineKind, RawLine, TentativeItem};
use crate::price::split_inline_price;

/// Knobs that distinguish the layout variants sharing one line walker
#[derive(Debug, Clone, Copy)]
pub(super) struct WalkRules {
    pub window: usize,
    pub split_merged_fees: bool,
    /// Quantity lines only combine with a following item-with-code line
    pub quantity_needs_code: bool,
}

/// Parser for warehouse-club receipts
#[derive(Debug, Clone)]
pub struct WarehouseParser {
    classifier: LineClassifier,
    window: usize,
}

impl WarehouseParser {
    pub fn new(classifier: LineClassifier, window: usize) -> Self {
        Self { classifier, window }
    }
}

impl LineParser for WarehouseParser {
    fn layout(&self) -> ReceiptLayout {
        ReceiptLayout::Warehouse
    }

    fn parse(&self, lines: &[RawLine]) -> ParseOutcome {
        let outcome = walk(
            &self.classifier,
            lines,
            WalkRules {
                window: self.window,
                split_merged_fees: true,
                quantity_needs_code: true,
            },
        );
        debug!(
            items = outcome.items.len(),
            consumed = outcome.consumed.len(),
            "Warehouse parse complete"
        );
        outcome
    }
}

/// Walk raw lines once, front to back
pub(super) fn walk(
    classifier: &LineClassifier,
    lines: &[RawLine],
    rules: WalkRules,
) -> ParseOutcome {
    let mut walker = Walker {
        classifier,
        lines,
        rules,
        outcome: ParseOutcome::default(),
    };

    let mut pos = 0;
    while pos < lines.len() {
        pos = walker.step(pos);
    }
    walker.outcome
}

struct Walker<'a> {
    classifier: &'a LineClassifier,
    lines: &'a [RawLine],
    rules: WalkRules,
    outcome: ParseOutcome,
}

impl<'a> Walker<'a> {
    /// Handle the line at `pos` and return the next cursor position
    fn step(&mut self, pos: usize) -> usize {
        match self.classifier.classify(&self.lines[pos].text) {
            LineKind::QuantityMultiplier => {
                if let Some(next) = self.quantity_item(pos) {
                    return next;
                }
            }
            LineKind::ItemWithCode => self.coded_item(pos),
            LineKind::Fee => self.modifier(pos, ItemKind::Fee),
            LineKind::Discount => self.modifier(pos, ItemKind::Discount),
            LineKind::Adjustment => self.modifier(pos, ItemKind::Adjustment),
            LineKind::Unknown => self.named_item(pos),
            LineKind::Skip | LineKind::Price => {}
        }
        pos + 1
    }

    /// Claim the first unconsumed price after `pos`
    fn claim(&mut self, pos: usize, mode: Lookahead) -> Option<(String, usize)> {
        let lines = self.lines;
        let found = find_price(
            self.classifier,
            lines,
            pos,
            self.rules.window,
            &self.outcome.consumed,
            mode,
        )?;
        self.outcome.consumed.insert(lines[found].index);
        Some((lines[found].text.clone(), lines[found].index))
    }

    /// Inline price if present, else a claimed price line
    fn price_for(
        &mut self,
        pos: usize,
        inline: Option<String>,
        mode: Lookahead,
    ) -> Option<(String, Option<usize>)> {
        if let Some(price) = inline {
            return Some((price, None));
        }
        self.claim(pos, mode).map(|(price, index)| (price, Some(index)))
    }

    fn quantity_item(&mut self, pos: usize) -> Option<usize> {
        let lines = self.lines;
        let patterns = self.classifier.patterns();
        let (quantity, unit_price) = patterns.quantity_parts(&lines[pos].text)?;

        let name_pos = pos + 1;
        let name_line = lines.get(name_pos)?;
        let (code, rest, mode) = match self.classifier.classify(&name_line.text) {
            LineKind::ItemWithCode => {
                let (code, rest) = patterns.item_code_parts(&name_line.text)?;
                (Some(code), rest, Lookahead::Window)
            }
            LineKind::Unknown
                if !self.rules.quantity_needs_code
                    && self.classifier.looks_like_product_name(&name_line.text) =>
            {
                (None, name_line.text.clone(), Lookahead::UntilNextItem)
            }
            _ => return None,
        };

        let (name, inline) = split_name(rest);
        let (price, price_line) = self.price_for(name_pos, inline, mode)?;

        let mut item = TentativeItem::new(name.clone(), price, self.classifier.item_kind(&name))
            .at_line(name_line.index);
        item.quantity = quantity;
        item.unit_price_raw = Some(unit_price);
        item.item_code = code;
        item.price_line = price_line;

        debug!(line = lines[pos].index, quantity, name = %item.name, "Quantity item");
        self.outcome.items.push(item);
        Some(name_pos + 1)
    }

    fn coded_item(&mut self, pos: usize) {
        let lines = self.lines;
        let line = &lines[pos];
        let Some((code, rest)) = self.classifier.patterns().item_code_parts(&line.text) else {
            return;
        };
        let (name, inline) = split_name(rest);

        if self.rules.split_merged_fees {
            if let Some((product, fee)) = self.classifier.split_fee_suffix(&name) {
                self.merged(pos, product, fee, Some(code), inline, Lookahead::Window);
                return;
            }
        }

        let kind = self.classifier.item_kind(&name);
        let item = TentativeItem::new(name, "0.00", kind)
            .with_code(code)
            .at_line(line.index);
        let item = match self.price_for(pos, inline, Lookahead::Window) {
            Some((price, price_line)) => TentativeItem {
                price_raw: price,
                price_line,
                ..item
            },
            None => {
                debug!(line = line.index, name = %item.name, "No price found, awaiting backfill");
                TentativeItem {
                    needs_price: true,
                    ..item
                }
            }
        };
        self.outcome.items.push(item);
    }

    fn modifier(&mut self, pos: usize, kind: ItemKind) {
        let lines = self.lines;
        let line = &lines[pos];
        let (name, inline) = split_name(line.text.clone());

        match self.price_for(pos, inline, Lookahead::UntilNextItem) {
            Some((price, price_line)) => {
                let mut item = TentativeItem::new(name, price, kind).at_line(line.index);
                item.price_line = price_line;
                self.outcome.items.push(item);
            }
            None if kind == ItemKind::Fee => {
                self.outcome
                    .items
                    .push(TentativeItem::placeholder(name, kind).at_line(line.index));
            }
            None => {
                debug!(
                    line = line.index,
                    kind = kind.as_str(),
                    "Modifier without price left for discovery"
                );
            }
        }
    }

    fn named_item(&mut self, pos: usize) {
        let lines = self.lines;
        let line = &lines[pos];
        if !self.classifier.looks_like_product_name(&line.text) {
            return;
        }
        let (name, inline) = split_name(line.text.clone());

        if self.rules.split_merged_fees {
            if let Some((product, fee)) = self.classifier.split_fee_suffix(&name) {
                self.merged(pos, product, fee, None, inline, Lookahead::UntilNextItem);
                return;
            }
        }

        match self.price_for(pos, inline, Lookahead::UntilNextItem) {
            Some((price, price_line)) => {
                let kind = self.classifier.item_kind(&name);
                let mut item = TentativeItem::new(name, price, kind).at_line(line.index);
                item.price_line = price_line;
                self.outcome.items.push(item);
            }
            None => debug!(line = line.index, "Name line without price skipped"),
        }
    }

    /// A product and its fee on one line: the product claims the first price, the fee the next
    fn merged(
        &mut self,
        pos: usize,
        product: String,
        fee: String,
        code: Option<String>,
        inline: Option<String>,
        mode: Lookahead,
    ) {
        let index = self.lines[pos].index;
        let product_price = self.price_for(pos, inline, mode);
        if product_price.is_none() && code.is_none() {
            debug!(line = index, "Merged product/fee line without price skipped");
            return;
        }

        let mut product_item =
            TentativeItem::new(product.clone(), "0.00", ItemKind::Product).at_line(index);
        product_item.item_code = code;
        match product_price {
            Some((price, price_line)) => {
                product_item.price_raw = price;
                product_item.price_line = price_line;
            }
            None => product_item.needs_price = true,
        }

        let mut fee_item = match self.claim(pos, mode) {
            Some((price, price_line)) => TentativeItem::new(fee, price, ItemKind::Fee)
                .at_line(index)
                .priced_from(price_line),
            None => TentativeItem::placeholder(fee, ItemKind::Fee).at_line(index),
        };
        fee_item.preceding_product = Some(product);

        debug!(
            line = index,
            product = %product_item.name,
            fee = %fee_item.name,
            "Split merged fee line"
        );
        self.outcome.items.push(product_item);
        self.outcome.items.push(fee_item);
    }
}

fn split_name(text: String) -> (String, Option<String>) {
    match split_inline_price(&text) {
        Some((name, price)) => (name, Some(price)),
        None => (text, None),
    }
}
