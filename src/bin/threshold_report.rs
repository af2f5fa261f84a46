// src/bin/threshold_report.rs
//
// Sweeps the title similarity threshold over the raw records and reports how the
// equivalence classes shrink as it rises. Useful when tuning SIMILARITY_THRESHOLD.

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use catalog_lib::candidate_generation::BlockIndex;
use catalog_lib::clustering::resolve;
use catalog_lib::matching::normalize_batch;
use catalog_lib::pipeline::load_raw_records;
use catalog_lib::utils::config::{PipelineConfig, ResolutionConfig};
use catalog_lib::utils::env::load_env;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct ReportArgs {
    /// Directory of raw record JSON files (overrides RAW_RECORDS_DIR)
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Lowest threshold in the sweep
    #[arg(long, default_value_t = 0.70)]
    from: f64,

    /// Highest threshold in the sweep
    #[arg(long, default_value_t = 0.98)]
    to: f64,

    #[arg(long, default_value_t = 0.02)]
    step: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    env_logger::init();
    let args = ReportArgs::parse();
    if args.step <= 0.0 || args.from > args.to {
        anyhow::bail!("Invalid sweep: from {} to {} step {}", args.from, args.to, args.step);
    }

    let config = PipelineConfig::from_env();
    let raw_dir = args.raw_dir.unwrap_or(config.raw_records_dir);
    let normalized = normalize_batch(load_raw_records(&raw_dir)?);
    let index = BlockIndex::build(Arc::new(normalized.records), config.resolution.blocking);
    info!(
        "{} records in {} blocks ({} comparisons per threshold)",
        index.records().len(),
        index.blocks().len(),
        index.comparison_cost()
    );

    println!(
        "{:>9} {:>8} {:>8} {:>8} {:>9} {:>8}",
        "threshold", "classes", "largest", "fuzzy", "alias", "merged"
    );
    let steps = ((args.to - args.from) / args.step).round() as usize;
    for i in 0..=steps {
        let threshold = args.from + args.step * i as f64;
        let sweep_config = ResolutionConfig {
            similarity_threshold: threshold,
            ..config.resolution.clone()
        };
        let resolution = resolve(&index, &sweep_config, None).await;
        let merged = resolution.classes.iter().filter(|c| c.len() > 1).count();
        println!(
            "{:>9.2} {:>8} {:>8} {:>8} {:>9} {:>8}",
            threshold,
            resolution.stats.equivalence_classes,
            resolution.stats.largest_class,
            resolution.stats.fuzzy_links,
            resolution.stats.alias_links,
            merged
        );
    }
    Ok(())
}
