//! Receipt-level roll-up of enhanced items

use crate::models::{EnhancedItem, ItemKind, LinkKind, NormalizationSummary};

/// Summarize one receipt's visible items
///
/// Linked modifiers live inside their product's `discounts`; standalone ones are
/// visible items of their own. Both count toward the amount totals.
pub fn aggregate(items: &[EnhancedItem]) -> NormalizationSummary {
    let mut summary = NormalizationSummary {
        total_items: items.len(),
        ..Default::default()
    };

    let mut confidence_sum = 0.0;
    for item in items {
        *summary
            .method_counts
            .entry(item.normalization.method)
            .or_insert(0) += 1;

        match item.kind {
            ItemKind::Product => {
                summary.product_count += 1;
                confidence_sum += item.normalization.confidence_score;

                let mut has_discount = false;
                for link in &item.discounts {
                    match link.kind {
                        LinkKind::Discount => {
                            summary.linked_discount_count += 1;
                            summary.total_discount_amount += link.discount_amount;
                            has_discount = true;
                        }
                        LinkKind::Fee => {
                            summary.linked_fee_count += 1;
                            summary.total_fee_amount += link.discount_amount;
                        }
                    }
                }
                if has_discount {
                    summary.items_with_discounts += 1;
                }
            }
            ItemKind::Discount => {
                summary.discount_count += 1;
                summary.total_discount_amount += item.price.abs();
            }
            ItemKind::Fee => {
                summary.fee_count += 1;
                summary.total_fee_amount += item.price.abs();
            }
            ItemKind::Adjustment => summary.adjustment_count += 1,
        }
    }

    if summary.product_count > 0 {
        summary.average_confidence = confidence_sum / summary.product_count as f64;
    }
    summary.total_discount_amount = summary.total_discount_amount.round_dp(2);
    summary.total_fee_amount = summary.total_fee_amount.round_dp(2);
    summary
}
