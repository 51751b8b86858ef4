//! Receipt commands: full pipeline, line parsing and single-name normalization

use std::path::Path;

use anyhow::{Context, Result};
use tillroll_core::{
    EnhancedItem, ItemKind, LinkKind, NormalizationResult, OcrBundle, ProcessedReceipt,
    TentativeItem,
};

use super::core::{build_pipeline, GlobalOpts};
use super::truncate;

/// Read an OCR bundle from a JSON file
pub fn read_bundle(path: &Path) -> Result<OcrBundle> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bundle: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid OCR bundle JSON: {}", path.display()))
}

/// Read raw OCR text, one line per line, dropping blank lines
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lines: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

pub async fn cmd_process(opts: &GlobalOpts, file: &Path, json: bool) -> Result<()> {
    let bundle = read_bundle(file)?;
    let pipeline = build_pipeline(opts)?;
    let receipt = pipeline.process(&bundle).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        print_receipt(&receipt);
    }

    Ok(())
}

pub fn cmd_parse_lines(opts: &GlobalOpts, file: &Path, merchant: &str) -> Result<()> {
    let lines = read_lines(file)?;
    let pipeline = build_pipeline(opts)?;
    let parse = pipeline.parse_lines(merchant, &lines);

    println!(
        "🧾 {} lines → {} items ({} layout{})",
        lines.len(),
        parse.items.len(),
        parse.layout,
        parse
            .profile
            .as_deref()
            .map(|p| format!(", profile {}", p))
            .unwrap_or_default()
    );
    println!();

    for item in &parse.items {
        println!("{}", format_tentative(item));
    }

    Ok(())
}

pub async fn cmd_normalize(opts: &GlobalOpts, name: &str, merchant: &str) -> Result<()> {
    let pipeline = build_pipeline(opts)?;
    let result = pipeline.normalizer().normalize(name, merchant).await;

    println!("🔍 {} @ {}", name, merchant);
    print_normalization(&result);

    Ok(())
}

fn print_receipt(receipt: &ProcessedReceipt) {
    println!(
        "🧾 {} ({} source, {} lines absorbed)",
        receipt.merchant,
        receipt.source.as_str(),
        receipt.absorbed_lines
    );
    println!();

    for item in &receipt.items {
        println!("{}", format_item(item));
        for link in &item.discounts {
            let sign = match link.kind {
                LinkKind::Discount => "-",
                LinkKind::Fee => "+",
            };
            println!(
                "      {} {:>8} {} ({:.0}%)",
                sign,
                link.discount_amount,
                truncate(&link.description, 28),
                link.link_confidence * 100.0
            );
        }
    }

    let s = &receipt.summary;
    println!();
    println!(
        "Items: {} ({} products, {} discounts, {} fees, {} adjustments)",
        s.total_items, s.product_count, s.discount_count, s.fee_count, s.adjustment_count
    );
    println!(
        "Linked: {} discounts, {} fees across {} items",
        s.linked_discount_count, s.linked_fee_count, s.items_with_discounts
    );
    println!(
        "Discounts: ${}   Fees: ${}   Avg confidence: {:.0}%",
        s.total_discount_amount,
        s.total_fee_amount,
        s.average_confidence * 100.0
    );
    let methods: Vec<String> = s
        .method_counts
        .iter()
        .map(|(method, count)| format!("{} {}", method, count))
        .collect();
    println!("Methods: {}", methods.join(", "));
}

/// One visible receipt line: raw name, canonical name, final price, method
pub fn format_item(item: &EnhancedItem) -> String {
    let marker = match item.kind {
        ItemKind::Product => "  ",
        ItemKind::Discount => "💸",
        ItemKind::Fee => "🧾",
        ItemKind::Adjustment => "↩️",
    };
    let quantity = if item.quantity > 1 {
        format!(" x{}", item.quantity)
    } else {
        String::new()
    };
    format!(
        "{} {:<24} {:<28} {:>9} [{}]",
        marker,
        truncate(&format!("{}{}", item.name, quantity), 24),
        truncate(&item.normalization.normalized_name, 28),
        item.final_price,
        item.normalization.method
    )
}

fn format_tentative(item: &TentativeItem) -> String {
    let code = item.item_code.as_deref().unwrap_or("-");
    let under = item
        .preceding_product
        .as_deref()
        .map(|p| format!("  ↳ {}", p))
        .unwrap_or_default();
    format!(
        "  {:<10} {:<8} {:<28} {:>9}{}",
        item.kind.as_str(),
        code,
        truncate(&item.name, 28),
        item.price_raw,
        under
    )
}

fn print_normalization(result: &NormalizationResult) {
    println!("   Name:       {}", result.normalized_name);
    if let Some(brand) = &result.brand {
        println!("   Brand:      {}", brand);
    }
    if let Some(category) = &result.category {
        println!("   Category:   {}", category);
    }
    println!(
        "   Method:     {} ({:.0}% confidence)",
        result.method,
        result.confidence_score * 100.0
    );
    if let Some(similarity) = result.similarity_score {
        println!("   Similarity: {:.2}", similarity);
    }
    if result.is_discount {
        println!("   💸 Discount line");
    }
    if result.is_adjustment {
        println!("   ↩️  Adjustment line");
    }
    if result.embedding_override {
        println!("   Replaced by embedding match");
    }
}
