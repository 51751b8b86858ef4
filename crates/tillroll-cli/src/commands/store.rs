//! Normalization store commands

use anyhow::Result;

use super::core::{open_db, GlobalOpts};
use super::truncate;

pub fn cmd_store_list(opts: &GlobalOpts, merchant: Option<&str>, limit: usize) -> Result<()> {
    if opts.no_store {
        println!("💡 --no-store keeps nothing between runs; nothing to list");
        return Ok(());
    }

    let db = open_db(&opts.db)?;
    let records = db.list_normalizations(merchant, limit)?;
    let total = db.count_normalizations()?;

    if records.is_empty() {
        println!("No learned normalizations yet.");
        println!("Run `tillroll process --file bundle.json` to start learning.");
        return Ok(());
    }

    println!(
        "📚 Learned normalizations in {} ({} of {})",
        db.path(),
        records.len(),
        total
    );
    println!();
    println!(
        "{:<24} {:<20} {:<28} {:>5} {:>6}",
        "RAW NAME", "MERCHANT", "NORMALIZED", "CONF", "SEEN"
    );
    println!("{}", "-".repeat(87));

    for record in &records {
        let flag = if record.is_discount {
            " 💸"
        } else if record.is_adjustment {
            " ↩️"
        } else {
            ""
        };
        println!(
            "{:<24} {:<20} {:<28} {:>4.0}% {:>6}{}",
            truncate(&record.raw_name, 24),
            truncate(&record.merchant, 20),
            truncate(&record.normalized_name, 28),
            record.confidence * 100.0,
            record.match_count,
            flag
        );
    }

    Ok(())
}
