// src/bin/search.rs
//
// Runs one query against the current golden record snapshot and prints the ranked
// results with their component scores.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use catalog_lib::consolidation::GoldenRecordStore;
use catalog_lib::indexing::{HashedNgramEncoder, SentenceEncoder};
use catalog_lib::pipeline::load_generation;
use catalog_lib::search::HybridQueryEngine;
use catalog_lib::utils::config::PipelineConfig;
use catalog_lib::utils::env::load_env;

#[derive(Parser)]
#[command(author, version, about = "Query the catalog", long_about = None)]
struct SearchArgs {
    /// Free-text query: a title, a keyword, or a description of the plot
    #[arg(short, long)]
    query: String,

    /// Number of results (clamped to MIN_LIMIT..=MAX_LIMIT)
    #[arg(short, long, default_value_t = 10)]
    limit: usize,

    /// Golden record snapshot path (overrides GOLDEN_STORE_PATH)
    #[arg(long)]
    store: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    env_logger::init();
    let args = SearchArgs::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(path) = args.store {
        config.store_path = path;
    }

    let encoder: Arc<dyn SentenceEncoder> = Arc::new(HashedNgramEncoder::new(config.index.embedding_dimension));
    let engine = HybridQueryEngine::new(encoder.clone(), config.query.clone())?;
    let store = GoldenRecordStore::new(config.store_path.clone());
    let generation = load_generation(&store, encoder, &config.index)
        .await
        .with_context(|| format!("Failed to load index from {}", store.path().display()))?;
    info!("Serving {} golden records", generation.len());
    engine.install(generation).await;

    let results = engine.search(&args.query, args.limit).await?;
    if results.is_empty() {
        println!("No results for '{}'", args.query);
        return Ok(());
    }

    println!(
        "{:>3}  {:<40} {:>7} {:>7} {:>7} {:>7} {:>10}  {}",
        "#", "title", "score", "dense", "sparse", "boost", "popularity", "reason"
    );
    for (rank, result) in results.iter().enumerate() {
        let title: String = result.title.chars().take(40).collect();
        println!(
            "{:>3}  {:<40} {:>7.3} {:>7.3} {:>7.3} {:>7.3} {:>10}  {}",
            rank + 1,
            title,
            result.score,
            result.dense_score,
            result.sparse_score,
            result.title_boost,
            result.popularity,
            result.reason.label()
        );
    }
    Ok(())
}
