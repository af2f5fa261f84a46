pub mod normalizer;
pub mod title;

pub use normalizer::{normalize_batch, normalize_record, NormalizationOutcome};
pub use title::{best_title_similarity, normalize_title_key, title_similarity};
