// src/indexing/builder.rs
// Embedding Index Builder: dense vectors, vector index and TF-IDF model, built together
// from one golden record snapshot into an immutable generation.

use indicatif::ProgressBar;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Instant;

use crate::consolidation::store::{GoldenSnapshot, EMPTY_GENERATION};
use crate::error::{CoreError, CoreResult};
use crate::indexing::encoder::{normalize_in_place, SentenceEncoder};
use crate::indexing::tfidf::{SparseVector, TfidfModel};
use crate::indexing::vector_index::VectorIndex;
use crate::models::stats_models::IndexBuildStats;
use crate::models::GoldenRecord;
use crate::utils::config::IndexConfig;

/// Per-record derived vectors.
#[derive(Debug, Clone)]
pub struct EmbeddingEntry {
    pub record_id: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

/// Everything the query engine reads, derived from exactly one store generation.
/// `records[i]`, `entries[i]` and vector-index item `i` describe the same golden record.
#[derive(Debug)]
pub struct IndexGeneration {
    pub store_generation: String,
    pub encoder_name: String,
    pub dimension: usize,
    pub records: Vec<GoldenRecord>,
    pub entries: Vec<EmbeddingEntry>,
    pub tfidf: TfidfModel,
    pub vectors: VectorIndex,
    /// Title key (canonical or alternate) to record positions.
    pub title_index: HashMap<String, Vec<usize>>,
    pub stats: IndexBuildStats,
}

impl IndexGeneration {
    pub fn empty(dimension: usize) -> Self {
        Self {
            store_generation: EMPTY_GENERATION.to_string(),
            encoder_name: String::new(),
            dimension,
            records: Vec::new(),
            entries: Vec::new(),
            tfidf: TfidfModel::default(),
            vectors: VectorIndex::Empty,
            title_index: HashMap::new(),
            stats: IndexBuildStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Positions of records carrying `key` as a canonical or alternate title key.
    pub fn exact_title_matches(&self, key: &str) -> &[usize] {
        self.title_index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Outcome of a build: the generation and the records that could not be encoded.
#[derive(Debug)]
pub struct IndexBuildOutcome {
    pub generation: IndexGeneration,
    pub encoding_failures: Vec<CoreError>,
}

/// Encodes every record of `snapshot` and builds both retrieval artifacts. A record that
/// fails to encode is left out of this generation only.
pub fn build_index(
    snapshot: &GoldenSnapshot,
    encoder: &dyn SentenceEncoder,
    config: &IndexConfig,
    progress: Option<ProgressBar>,
) -> CoreResult<IndexBuildOutcome> {
    let start = Instant::now();
    let dimension = encoder.dimension();
    if dimension != config.embedding_dimension {
        warn!(
            "Encoder '{}' produces {} dimensions, configured {}; using the encoder's",
            encoder.name(),
            dimension,
            config.embedding_dimension
        );
    }

    let mut records = Vec::with_capacity(snapshot.records.len());
    let mut dense_vectors = Vec::with_capacity(snapshot.records.len());
    let mut encoding_failures = Vec::new();

    for record in &snapshot.records {
        match encode_record(encoder, record, dimension) {
            Ok(vector) => {
                records.push(record.clone());
                dense_vectors.push(vector);
            }
            Err(e) => {
                warn!("Excluding golden record {} from this index generation: {}", record.id, e);
                encoding_failures.push(e);
            }
        }
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    let corpus: Vec<&str> = records.iter().map(|r| r.combined_text.as_str()).collect();
    let tfidf = TfidfModel::fit(corpus.as_slice());
    let entries: Vec<EmbeddingEntry> = records
        .iter()
        .zip(dense_vectors.iter())
        .map(|(record, dense)| EmbeddingEntry {
            record_id: record.id.clone(),
            dense: dense.clone(),
            sparse: tfidf.transform(&record.combined_text),
        })
        .collect();

    let vectors = VectorIndex::build(&dense_vectors, dimension, config)
        .map_err(|e| CoreError::IndexBuildFailed(format!("{:#}", e)))?;

    let mut title_index: HashMap<String, Vec<usize>> = HashMap::new();
    for (pos, record) in records.iter().enumerate() {
        for key in record.all_title_keys().filter(|k| !k.is_empty()) {
            let holders = title_index.entry(key.to_string()).or_default();
            if holders.last() != Some(&pos) {
                holders.push(pos);
            }
        }
    }

    let stats = IndexBuildStats {
        records: snapshot.records.len(),
        indexed: records.len(),
        encoding_failures: encoding_failures.len(),
        vocabulary_size: tfidf.vocabulary_size(),
        ann_mode: vectors.is_ann(),
        build_time: start.elapsed(),
    };
    info!(
        "Index generation {} built: {} of {} records indexed, vocabulary {}, {} mode, {:.2?}",
        &snapshot.generation[..12.min(snapshot.generation.len())],
        stats.indexed,
        stats.records,
        stats.vocabulary_size,
        if stats.ann_mode { "ANN" } else { "exact" },
        stats.build_time
    );
    debug!("Title index holds {} distinct keys", title_index.len());

    Ok(IndexBuildOutcome {
        generation: IndexGeneration {
            store_generation: snapshot.generation.clone(),
            encoder_name: encoder.name().to_string(),
            dimension,
            records,
            entries,
            tfidf,
            vectors,
            title_index,
            stats,
        },
        encoding_failures,
    })
}

fn encode_record(encoder: &dyn SentenceEncoder, record: &GoldenRecord, dimension: usize) -> CoreResult<Vec<f32>> {
    let encoding_failed = |reason: String| CoreError::EncodingFailed {
        subject: format!("golden record {}", record.id),
        reason,
    };
    let mut vector = encoder.encode(&record.combined_text).map_err(|e| match e {
        CoreError::EncodingFailed { reason, .. } => encoding_failed(reason),
        other => encoding_failed(other.to_string()),
    })?;
    if vector.len() != dimension {
        return Err(encoding_failed(format!(
            "expected {} dimensions, got {}",
            dimension,
            vector.len()
        )));
    }
    if !normalize_in_place(&mut vector) {
        return Err(encoding_failed("zero vector".to_string()));
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidation::store::SNAPSHOT_FORMAT_VERSION;
    use crate::indexing::encoder::HashedNgramEncoder;
    use crate::models::SourceRef;

    fn golden(id: &str, title: &str, text: &str) -> GoldenRecord {
        GoldenRecord {
            id: id.to_string(),
            canonical_title: title.to_string(),
            canonical_key: crate::matching::title::normalize_title_key(title),
            alt_titles: vec![],
            alt_title_keys: vec![],
            tags: vec![],
            description: String::new(),
            synopses: vec![],
            combined_text: text.to_string(),
            popularity: 0,
            origin_language: None,
            year: None,
            rating: None,
            cover_art: None,
            official_link: None,
            sources: vec![SourceRef {
                source: "test".to_string(),
                source_id: id.to_string(),
            }],
        }
    }

    fn snapshot(records: Vec<GoldenRecord>) -> GoldenSnapshot {
        GoldenSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            generation: "gen-1".to_string(),
            record_count: records.len(),
            records,
        }
    }

    #[test]
    fn test_build_aligns_records_entries_and_vectors() {
        let encoder = HashedNgramEncoder::new(64);
        let config = IndexConfig {
            embedding_dimension: 64,
            ..IndexConfig::default()
        };
        let snap = snapshot(vec![
            golden("a", "Solo Leveling", "Solo Leveling hunter dungeon"),
            golden("b", "Tower of God", "Tower of God tower climbing"),
        ]);
        let outcome = build_index(&snap, &encoder, &config, None).unwrap();
        let generation = outcome.generation;
        assert_eq!(generation.store_generation, "gen-1");
        assert_eq!(generation.len(), 2);
        assert_eq!(generation.entries[1].record_id, "b");
        assert_eq!(generation.exact_title_matches("tower of god"), &[1]);
        assert!(generation.exact_title_matches("missing").is_empty());
        assert!(generation.tfidf.vocabulary_size() > 0);
        assert!(!generation.stats.ann_mode);
    }

    #[test]
    fn test_unencodable_record_is_excluded_not_fatal() {
        let encoder = HashedNgramEncoder::new(64);
        let config = IndexConfig {
            embedding_dimension: 64,
            ..IndexConfig::default()
        };
        let snap = snapshot(vec![
            golden("a", "Solo Leveling", "Solo Leveling hunter"),
            golden("b", "???", "???"),
        ]);
        let outcome = build_index(&snap, &encoder, &config, None).unwrap();
        assert_eq!(outcome.generation.len(), 1);
        assert_eq!(outcome.generation.stats.encoding_failures, 1);
        assert_eq!(outcome.encoding_failures.len(), 1);
        assert!(matches!(
            &outcome.encoding_failures[0],
            CoreError::EncodingFailed { subject, .. } if subject.contains(" b")
        ));
    }

    #[test]
    fn test_empty_snapshot_builds_empty_generation() {
        let encoder = HashedNgramEncoder::new(32);
        let outcome = build_index(&GoldenSnapshot::empty(), &encoder, &IndexConfig::default(), None).unwrap();
        assert!(outcome.generation.is_empty());
        assert_eq!(outcome.generation.store_generation, EMPTY_GENERATION);
    }
}
