pub mod records;
pub mod stats_models;

pub use records::{
    GoldenRecord, MatchReason, NormalizedRecord, RawRecord, SearchResult, SourceRef,
};
