// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use catalog_lib::consolidation::GoldenRecordStore;
use catalog_lib::indexing::{HashedNgramEncoder, SentenceEncoder};
use catalog_lib::pipeline::{load_raw_records, Rebuilder};
use catalog_lib::search::HybridQueryEngine;
use catalog_lib::utils::config::PipelineConfig;
use catalog_lib::utils::env::load_env;
use catalog_lib::utils::get_memory_usage;
use catalog_lib::utils::progress_config::ProgressConfig;

#[derive(Parser)]
#[command(author, version, about = "Rebuild the golden record store and its search index", long_about = None)]
struct RebuildArgs {
    /// Directory of raw record JSON files (overrides RAW_RECORDS_DIR)
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Golden record snapshot path (overrides GOLDEN_STORE_PATH)
    #[arg(long)]
    store: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting catalog rebuild");
    load_env();
    let args = RebuildArgs::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(dir) = args.raw_dir {
        config.raw_records_dir = dir;
    }
    if let Some(path) = args.store {
        config.store_path = path;
    }
    config.log_config();
    config.query.validate().context("Query configuration is invalid")?;

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );
    let multi_progress = progress_config.create_multi_progress();
    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(2));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("Loading raw records...");
        pb
    });

    let load_start = Instant::now();
    let raw_records = load_raw_records(&config.raw_records_dir)?;
    info!("Loaded {} raw records in {:.2?}", raw_records.len(), load_start.elapsed());
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Rebuilding golden records and index...");
    }

    let encoder: Arc<dyn SentenceEncoder> = Arc::new(HashedNgramEncoder::new(config.index.embedding_dimension));
    let engine = Arc::new(HybridQueryEngine::new(encoder.clone(), config.query.clone())?);
    let store = GoldenRecordStore::new(config.store_path.clone());
    let rebuilder = Rebuilder::new(config, store, encoder, engine)
        .with_progress(progress_config.clone(), multi_progress.clone());

    let report = rebuilder.rebuild(raw_records).await?;

    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.finish_with_message(format!("Rebuild complete: {} golden records", report.stats.golden_records));
    }

    let stats = &report.stats;
    info!("=== Rebuild Summary ===");
    info!("Run ID: {} (started {})", report.run_id, report.started_at.to_rfc3339());
    info!(
        "Raw records: {} ({} superseded, {} rejected, {} normalized)",
        stats.normalization.raw_records,
        stats.normalization.superseded,
        stats.normalization.rejected,
        stats.normalization.normalized
    );
    info!(
        "Blocks: {} (largest {}, catch-all {}), {} pairs compared",
        stats.resolution.blocks,
        stats.resolution.largest_block,
        stats.resolution.catch_all_size,
        stats.resolution.pairs_compared
    );
    info!(
        "Links: {} fuzzy, {} alias; {} equivalence classes (largest {})",
        stats.resolution.fuzzy_links,
        stats.resolution.alias_links,
        stats.resolution.equivalence_classes,
        stats.resolution.largest_class
    );
    info!(
        "Golden records: {} -> {} (generation {}, {} bytes)",
        stats.golden_records,
        report.snapshot.path.display(),
        report.snapshot.generation,
        report.snapshot.bytes
    );
    info!(
        "Index: {} indexed, {} encoding failures, vocabulary {}, {} mode",
        stats.index.indexed,
        stats.index.encoding_failures,
        stats.index.vocabulary_size,
        if stats.index.ann_mode { "ANN" } else { "exact" }
    );
    info!("=== Timing Breakdown ===");
    for (phase, duration) in &report.phase_times {
        info!("{}: {:.2?}", phase, duration);
    }
    info!("Total execution time: {:.2?}", report.total_time());

    if progress_config.should_show_memory() {
        info!("Final memory usage: {} MB", get_memory_usage().await);
    }
    info!("Rebuild completed successfully!");
    Ok(())
}
