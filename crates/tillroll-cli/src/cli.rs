//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tillroll - Turn receipt OCR output into clean, linked product lines
#[derive(Parser)]
#[command(name = "tillroll")]
#[command(about = "Receipt line recovery, discount linking and product normalization")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// Normalization store path
    #[arg(long, default_value = "tillroll.db", global = true)]
    pub db: PathBuf,

    /// Pipeline config file (defaults to the data-dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Keep learned normalizations in memory only
    #[arg(long, global = true)]
    pub no_store: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline over an OCR bundle (JSON)
    Process {
        /// OCR bundle file
        #[arg(short, long)]
        file: PathBuf,

        /// Print the processed receipt as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the merchant line parser and fee/discount linker over raw text
    ParseLines {
        /// Text file with one OCR line per line
        #[arg(short, long)]
        file: PathBuf,

        /// Merchant name used to select the parser
        #[arg(short, long)]
        merchant: String,
    },

    /// Normalize a single raw item name
    Normalize {
        /// Raw item name as printed on the receipt
        name: String,

        /// Merchant the item was bought at
        #[arg(short, long, default_value = "UNKNOWN")]
        merchant: String,
    },

    /// Inspect the normalization store
    Store {
        #[command(subcommand)]
        action: Option<StoreAction>,
    },

    /// Show the active pipeline configuration
    Config,
}

#[derive(Subcommand)]
pub enum StoreAction {
    /// List learned normalizations, most recently used first
    List {
        /// Only this merchant
        #[arg(short, long)]
        merchant: Option<String>,

        /// Maximum number to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}
