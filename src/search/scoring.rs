// src/search/scoring.rs
// Hybrid score fusion: dense + sparse + title boost as an explicit weighted sum, with
// a documented ranking order.

use std::cmp::Ordering;

use crate::matching::title::best_title_similarity;
use crate::models::{GoldenRecord, MatchReason, SearchResult};
use crate::utils::config::QueryConfig;

/// Sparse similarity above which a non-title hit is explained as a keyword match.
pub const STRONG_KEYWORD_THRESHOLD: f64 = 0.4;

/// Title boost signal for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitleBoost {
    pub value: f64,
    /// The query key equals the canonical or an alternate title key.
    pub exact: bool,
}

/// 1.0 for an exact key match; `similarity * partial_boost_cap` when the best fuzzy
/// similarity clears `title_fuzzy_threshold`; otherwise 0.
pub fn title_boost(query_key: &str, record: &GoldenRecord, config: &QueryConfig) -> TitleBoost {
    if query_key.is_empty() {
        return TitleBoost { value: 0.0, exact: false };
    }
    if record.all_title_keys().any(|k| k == query_key) {
        return TitleBoost { value: 1.0, exact: true };
    }
    let similarity = best_title_similarity(std::iter::once(query_key), record.all_title_keys());
    if similarity >= config.title_fuzzy_threshold {
        TitleBoost {
            value: similarity * config.partial_boost_cap,
            exact: false,
        }
    } else {
        TitleBoost { value: 0.0, exact: false }
    }
}

pub fn fuse(dense: f64, sparse: f64, boost: f64, config: &QueryConfig) -> f64 {
    config.weight_dense * dense + config.weight_sparse * sparse + config.weight_boost * boost
}

/// Explanation derived from the component scores alone.
pub fn match_reason(sparse: f64, boost: f64) -> MatchReason {
    if boost >= 1.0 {
        MatchReason::DirectTitle
    } else if boost > 0.0 {
        MatchReason::NearTitle
    } else if sparse > STRONG_KEYWORD_THRESHOLD {
        MatchReason::StrongKeyword
    } else {
        MatchReason::PlotVibe
    }
}

/// A candidate with every score that decides its rank.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub position: usize,
    pub record_id: String,
    pub title: String,
    pub popularity: u64,
    pub dense: f64,
    pub sparse: f64,
    pub boost: TitleBoost,
    pub score: f64,
}

impl ScoredCandidate {
    pub fn new(position: usize, record: &GoldenRecord, dense: f64, sparse: f64, boost: TitleBoost, config: &QueryConfig) -> Self {
        Self {
            position,
            record_id: record.id.clone(),
            title: record.canonical_title.clone(),
            popularity: record.popularity,
            dense,
            sparse,
            boost,
            score: fuse(dense, sparse, boost.value, config),
        }
    }

    pub fn into_result(self) -> SearchResult {
        SearchResult {
            reason: match_reason(self.sparse, self.boost.value),
            record_id: self.record_id,
            title: self.title,
            popularity: self.popularity,
            score: self.score,
            dense_score: self.dense,
            sparse_score: self.sparse,
            title_boost: self.boost.value,
        }
    }
}

/// Ranking order: exact title matches first, among themselves by popularity (descending);
/// everything else by fused score (descending). Remaining ties go to fused score, then
/// ascending record id.
pub fn compare_candidates(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.boost
        .exact
        .cmp(&a.boost.exact)
        .then_with(|| {
            if a.boost.exact && b.boost.exact {
                b.popularity.cmp(&a.popularity)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
        .then_with(|| a.record_id.cmp(&b.record_id))
}

pub fn rank(mut candidates: Vec<ScoredCandidate>, limit: usize) -> Vec<SearchResult> {
    candidates.sort_by(compare_candidates);
    candidates.truncate(limit);
    candidates.into_iter().map(ScoredCandidate::into_result).collect()
}
