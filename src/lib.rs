// src/lib.rs
pub mod candidate_generation;
pub mod clustering;
pub mod consolidation;
pub mod error;
pub mod indexing;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod utils;

pub use error::{CoreError, CoreResult, Severity};
pub use pipeline::{load_generation, load_raw_records, Rebuilder};
pub use search::HybridQueryEngine;
