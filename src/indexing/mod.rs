pub mod builder;
pub mod encoder;
pub mod tfidf;
pub mod vector_index;

pub use builder::{build_index, EmbeddingEntry, IndexBuildOutcome, IndexGeneration};
pub use encoder::{HashedNgramEncoder, SentenceEncoder};
pub use tfidf::{SparseVector, TfidfModel};
pub use vector_index::VectorIndex;
