// src/models/stats_models.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::consolidation::store::SnapshotInfo;

/// Normalizer outcome counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizationStats {
    pub raw_records: usize,
    pub superseded: usize,
    pub rejected: usize,
    pub normalized: usize,
}

/// Blocking and resolution counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionStats {
    pub blocks: usize,
    pub largest_block: usize,
    pub catch_all_size: usize,
    pub pairs_compared: usize,
    pub fuzzy_links: usize,
    pub alias_links: usize,
    pub equivalence_classes: usize,
    pub largest_class: usize,
}

impl ResolutionStats {
    /// Folds per-block counters into a running total.
    pub fn absorb_block(&mut self, block: &BlockResolutionStats) {
        self.pairs_compared += block.pairs_compared;
        self.fuzzy_links += block.fuzzy_links;
    }
}

/// Counters from resolving a single block.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlockResolutionStats {
    pub records: usize,
    pub pairs_compared: usize,
    pub fuzzy_links: usize,
}

/// Embedding index build counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexBuildStats {
    pub records: usize,
    pub indexed: usize,
    pub encoding_failures: usize,
    pub vocabulary_size: usize,
    pub ann_mode: bool,
    pub build_time: Duration,
}

/// Everything a rebuild produced, for logs and callers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildStats {
    pub normalization: NormalizationStats,
    pub resolution: ResolutionStats,
    pub golden_records: usize,
    pub index: IndexBuildStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub snapshot: SnapshotInfo,
    pub stats: RebuildStats,
    pub phase_times: BTreeMap<String, Duration>,
}

impl RebuildReport {
    pub fn total_time(&self) -> Duration {
        self.phase_times.values().sum()
    }
}
