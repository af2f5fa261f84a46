// src/pipeline.rs
// The rebuild entry point: raw records -> golden record store -> installed index generation.

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{MultiProgress, ProgressBar};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::candidate_generation::BlockIndex;
use crate::clustering::resolve;
use crate::consolidation::{build_golden_records, GoldenRecordStore, GoldenSnapshot};
use crate::error::{CoreError, CoreResult};
use crate::indexing::{build_index, IndexBuildOutcome, IndexGeneration, SentenceEncoder};
use crate::matching::normalize_batch;
use crate::models::stats_models::{RebuildReport, RebuildStats};
use crate::models::RawRecord;
use crate::search::HybridQueryEngine;
use crate::utils::config::{IndexConfig, PipelineConfig};
use crate::utils::get_memory_usage;
use crate::utils::progress_config::ProgressConfig;

/// Owns everything a rebuild touches. The index is built before the store is written, the store
/// is written exactly once per rebuild, and the engine's generation is swapped only after that
/// write succeeded.
pub struct Rebuilder {
    config: PipelineConfig,
    store: GoldenRecordStore,
    encoder: Arc<dyn SentenceEncoder>,
    engine: Arc<HybridQueryEngine>,
    progress: ProgressConfig,
    multi_progress: Option<MultiProgress>,
}

impl Rebuilder {
    pub fn new(
        config: PipelineConfig,
        store: GoldenRecordStore,
        encoder: Arc<dyn SentenceEncoder>,
        engine: Arc<HybridQueryEngine>,
    ) -> Self {
        Self {
            config,
            store,
            encoder,
            engine,
            progress: ProgressConfig {
                enabled: false,
                detailed: false,
                show_memory: false,
            },
            multi_progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressConfig, multi_progress: Option<MultiProgress>) -> Self {
        self.progress = progress;
        self.multi_progress = multi_progress;
        self
    }

    pub fn store(&self) -> &GoldenRecordStore {
        &self.store
    }

    pub fn engine(&self) -> &Arc<HybridQueryEngine> {
        &self.engine
    }

    /// Runs the full batch pipeline over `raw_records`. Any batch-level failure aborts the
    /// rebuild with the previously published snapshot and index generation still in place.
    pub async fn rebuild(&self, raw_records: Vec<RawRecord>) -> CoreResult<RebuildReport> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("Rebuild {} starting with {} raw records", run_id, raw_records.len());

        let mut phase_times: BTreeMap<String, Duration> = BTreeMap::new();
        let mut stats = RebuildStats::default();

        // Phase 1: normalization
        let phase_start = Instant::now();
        let normalized = normalize_batch(raw_records);
        stats.normalization = normalized.stats.clone();
        phase_times.insert("1_normalization".to_string(), phase_start.elapsed());
        self.log_memory("normalization").await;

        // Phase 2: blocking
        let phase_start = Instant::now();
        let blocks = BlockIndex::build(Arc::new(normalized.records), self.config.resolution.blocking);
        phase_times.insert("2_blocking".to_string(), phase_start.elapsed());

        // Phase 3: entity resolution
        let phase_start = Instant::now();
        let bar = self.phase_bar(blocks.blocks().len() as u64, "Resolving blocks");
        let resolution = resolve(&blocks, &self.config.resolution, bar.clone()).await;
        finish(bar, "Resolution complete");
        stats.resolution = resolution.stats.clone();
        phase_times.insert("3_resolution".to_string(), phase_start.elapsed());
        self.log_memory("resolution").await;

        // Phase 4: golden records
        let phase_start = Instant::now();
        let golden = build_golden_records(&resolution, &self.config.resolution.preferred_languages);
        stats.golden_records = golden.len();
        phase_times.insert("4_consolidation".to_string(), phase_start.elapsed());

        // Phase 5: index generation, built from the snapshot before anything is published
        let phase_start = Instant::now();
        let snapshot = GoldenSnapshot::from_records(golden).map_err(|e| CoreError::StoreWriteFailed {
            path: self.store.path().to_path_buf(),
            source: e.into(),
        })?;
        let bar = self.phase_bar(snapshot.records.len() as u64, "Encoding golden records");
        let outcome = build_index_blocking(
            snapshot.clone(),
            self.encoder.clone(),
            self.config.index.clone(),
            bar.clone(),
        )
        .await;
        finish(bar, "Index build complete");
        let outcome = outcome.map_err(|e| {
            error!("Rebuild {} index build failed: {}. Previous snapshot and index kept.", run_id, e);
            e
        })?;
        stats.index = outcome.generation.stats.clone();
        phase_times.insert("5_indexing".to_string(), phase_start.elapsed());
        self.log_memory("indexing").await;

        // Phase 6: store swap. A failure here keeps both the old snapshot and the old index.
        let phase_start = Instant::now();
        let snapshot_info = self.store.replace_snapshot(&snapshot).map_err(|e| {
            error!("Rebuild {} aborted: {}. Previous snapshot remains authoritative.", run_id, e);
            e
        })?;
        phase_times.insert("6_store".to_string(), phase_start.elapsed());

        // Phase 7: publish
        self.engine.install(outcome.generation).await;

        let report = RebuildReport {
            run_id,
            started_at,
            snapshot: snapshot_info,
            stats,
            phase_times,
        };
        info!(
            "Rebuild {} finished in {:.2?}: {} golden records, {} indexed",
            report.run_id,
            report.total_time(),
            report.stats.golden_records,
            report.stats.index.indexed
        );
        Ok(report)
    }

    fn phase_bar(&self, len: u64, message: &str) -> Option<ProgressBar> {
        self.progress.phase_bar(self.multi_progress.as_ref(), len, message)
    }

    async fn log_memory(&self, phase: &str) {
        if self.progress.should_show_memory() {
            info!("Memory after {}: {} MB", phase, get_memory_usage().await);
        }
    }
}

fn finish(bar: Option<ProgressBar>, message: &'static str) {
    if let Some(pb) = bar {
        pb.finish_with_message(message);
    }
}

/// Builds an index generation off the async runtime's worker threads.
pub async fn build_index_blocking(
    snapshot: GoldenSnapshot,
    encoder: Arc<dyn SentenceEncoder>,
    config: IndexConfig,
    progress: Option<ProgressBar>,
) -> CoreResult<IndexBuildOutcome> {
    tokio::task::spawn_blocking(move || build_index(&snapshot, encoder.as_ref(), &config, progress))
        .await
        .map_err(|e| CoreError::IndexBuildFailed(format!("index build task failed: {}", e)))?
}

/// Index generation for whatever the store currently holds. Used by query-only processes.
pub async fn load_generation(
    store: &GoldenRecordStore,
    encoder: Arc<dyn SentenceEncoder>,
    config: &IndexConfig,
) -> CoreResult<IndexGeneration> {
    let snapshot = store.read()?;
    info!(
        "Loaded snapshot {} with {} golden records",
        snapshot.generation, snapshot.record_count
    );
    let outcome = build_index_blocking(snapshot, encoder, config.clone(), None).await?;
    Ok(outcome.generation)
}

/// Reads every `*.json` file in `dir` (a JSON array of raw records each), in file-name order.
pub fn load_raw_records(dir: &Path) -> Result<Vec<RawRecord>> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read raw records directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == "json"))
        .collect();
    paths.sort();

    let mut records = Vec::new();
    for path in &paths {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let batch: Vec<RawRecord> =
            serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))?;
        info!("Loaded {} raw records from {}", batch.len(), path.display());
        records.extend(batch);
    }
    if paths.is_empty() {
        warn!("No *.json files found in {}", dir.display());
    }
    Ok(records)
}
