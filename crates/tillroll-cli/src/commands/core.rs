//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` / `open_store` - Open the normalization store
//! - `load_config` - Resolve the pipeline configuration
//! - `build_pipeline` - Wire config, store and AI backend together
//! - `cmd_config` - Show the active configuration and AI backend health

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tillroll_core::{
    AIBackend, AIClient, ConfigSource, Database, MemoryStore, NormalizationStore, PipelineConfig,
    ReceiptPipeline,
};

/// Options shared by every subcommand
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    pub db: PathBuf,
    pub config: Option<PathBuf>,
    pub no_store: bool,
}

/// Open (or create) the SQLite normalization store
pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    Database::new(path_str).context("Failed to open database")
}

/// The SQLite store, or an in-memory one with --no-store
pub fn open_store(opts: &GlobalOpts) -> Result<Arc<dyn NormalizationStore>> {
    if opts.no_store {
        tracing::debug!("Using in-memory normalization store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(open_db(&opts.db)?))
}

pub fn load_config(opts: &GlobalOpts) -> Result<(PipelineConfig, ConfigSource)> {
    PipelineConfig::load_with_source(opts.config.as_deref()).context("Failed to load config")
}

/// Build a pipeline with the configured store and, if available, an AI backend
pub fn build_pipeline(opts: &GlobalOpts) -> Result<ReceiptPipeline> {
    let (config, source) = load_config(opts)?;
    tracing::debug!(source = %source, "Pipeline config loaded");

    let store = open_store(opts)?;
    let pipeline = ReceiptPipeline::new(&config, store).context("Failed to build pipeline")?;

    Ok(match AIClient::from_env() {
        Some(ai) => {
            tracing::debug!(host = ai.host(), model = ai.model(), "AI backend enabled");
            pipeline.with_ai(ai)
        }
        None => pipeline,
    })
}

pub async fn cmd_config(opts: &GlobalOpts) -> Result<()> {
    let (config, source) = load_config(opts)?;

    println!("⚙️  Pipeline configuration");
    println!("   Source: {}", source);
    println!();

    let n = &config.normalizer;
    println!("Normalizer:");
    println!("   Similarity threshold:   {:.2}", n.similarity_threshold);
    println!("   Candidate limit:        {}", n.candidate_limit);
    println!("   Generative confidence:  {:.2}", n.generative_confidence);
    println!("   Fallback confidence:    {:.2}", n.fallback_confidence);
    println!(
        "   Embedding override:     ≥{:.2} (search ≥{:.2})",
        n.embedding.override_similarity, n.embedding.search_threshold
    );
    println!();

    let p = &config.parser;
    println!("Parser:");
    println!("   Price lookahead:        {}", p.price_lookahead);
    println!("   Generic lookahead:      {}", p.generic_lookahead);
    println!("   Backfill window:        {}", p.backfill_window);
    println!(
        "   Fee window:             {} back / {} forward",
        p.fee_backward_window, p.fee_forward_window
    );
    println!();

    println!("Merchants:");
    for profile in &config.merchants {
        println!(
            "   {:<18} {:<10} {}",
            profile.name,
            profile.layout.as_str(),
            profile.aliases.join(", ")
        );
    }
    println!();

    match AIClient::from_env() {
        Some(ai) => {
            let status = if ai.health_check().await {
                "✅ reachable"
            } else {
                "❌ unreachable"
            };
            println!("🤖 AI backend: {} ({}) {}", ai.host(), ai.model(), status);
        }
        None => println!("💡 Tip: Set OLLAMA_HOST for AI-assisted normalization"),
    }

    Ok(())
}
