//! Tillroll CLI - Receipt line recovery and product normalization
//!
//! Usage:
//!   tillroll process --file bundle.json               Run the full pipeline on an OCR bundle
//!   tillroll parse-lines --file lines.txt --merchant M Run only the line parser and linker
//!   tillroll normalize "BLK FRST HAM" --merchant M    Normalize one item name
//!   tillroll store list                               Show learned normalizations
//!   tillroll config                                   Show the active configuration

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let opts = commands::GlobalOpts {
        db: cli.db,
        config: cli.config,
        no_store: cli.no_store,
    };

    match cli.command {
        Commands::Process { file, json } => commands::cmd_process(&opts, &file, json).await,
        Commands::ParseLines { file, merchant } => {
            commands::cmd_parse_lines(&opts, &file, &merchant)
        }
        Commands::Normalize { name, merchant } => {
            commands::cmd_normalize(&opts, &name, &merchant).await
        }
        Commands::Store { action } => match action {
            None => commands::cmd_store_list(&opts, None, 20),
            Some(StoreAction::List { merchant, limit }) => {
                commands::cmd_store_list(&opts, merchant.as_deref(), limit)
            }
        },
        Commands::Config => commands::cmd_config(&opts).await,
    }
}
