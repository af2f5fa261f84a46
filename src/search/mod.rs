pub mod engine;
pub mod scoring;

pub use engine::HybridQueryEngine;
pub use scoring::{compare_candidates, fuse, match_reason, title_boost, ScoredCandidate, TitleBoost};
