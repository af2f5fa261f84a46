// src/search/engine.rs
// Hybrid Query Engine: serves queries against the currently installed index generation.

use lru::LruCache;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

use crate::error::{CoreError, CoreResult};
use crate::indexing::{IndexGeneration, SentenceEncoder};
use crate::matching::title::normalize_title_key;
use crate::models::SearchResult;
use crate::search::scoring::{rank, title_boost, ScoredCandidate};
use crate::utils::config::QueryConfig;

pub struct HybridQueryEngine {
    encoder: Arc<dyn SentenceEncoder>,
    config: QueryConfig,
    generation: RwLock<Arc<IndexGeneration>>,
    // trimmed query text -> dense query vector, scoped to the installed generation
    query_cache: Option<Mutex<LruCache<String, Arc<Vec<f32>>>>>,
}

impl HybridQueryEngine {
    /// Starts with an empty generation; every query returns no results until one is installed.
    pub fn new(encoder: Arc<dyn SentenceEncoder>, config: QueryConfig) -> CoreResult<Self> {
        config.validate()?;
        let query_cache = NonZeroUsize::new(config.query_cache_size).map(|size| Mutex::new(LruCache::new(size)));
        let generation = RwLock::new(Arc::new(IndexGeneration::empty(encoder.dimension())));
        Ok(Self {
            encoder,
            config,
            generation,
            query_cache,
        })
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Publishes `generation` for all subsequent queries and returns the one it replaced.
    /// Queries already running keep the generation they started with.
    pub async fn install(&self, generation: IndexGeneration) -> Arc<IndexGeneration> {
        if !generation.encoder_name.is_empty() && generation.encoder_name != self.encoder.name() {
            warn!(
                "Index generation {} was encoded with '{}' but queries use '{}'",
                generation.store_generation,
                generation.encoder_name,
                self.encoder.name()
            );
        }
        let incoming = Arc::new(generation);
        let mut current = self.generation.write().await;
        let previous = std::mem::replace(&mut *current, incoming);
        if let Some(cache) = &self.query_cache {
            cache.lock().await.clear();
        }
        info!(
            "Installed index generation {} ({} records, encoder '{}'), replacing {} ({} records)",
            current.store_generation,
            current.len(),
            current.encoder_name,
            previous.store_generation,
            previous.len()
        );
        previous
    }

    pub async fn current(&self) -> Arc<IndexGeneration> {
        self.generation.read().await.clone()
    }

    /// Ranked results for `query`. `limit` is clamped into the configured bounds.
    pub async fn search(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchResult>> {
        let start = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(CoreError::InvalidQuery("query is empty".to_string()));
        }
        let limit = self.config.clamp_limit(limit);

        let generation = self.current().await;
        if generation.is_empty() {
            debug!("Query '{}' against an empty catalog", query);
            return Ok(Vec::new());
        }

        let query_vector = self.encode_query(query).await?;
        if query_vector.len() != generation.dimension {
            return Err(CoreError::SearchFailed(format!(
                "query vector has {} dimensions, index generation has {}",
                query_vector.len(),
                generation.dimension
            )));
        }
        let query_key = normalize_title_key(query);

        let hits = generation
            .vectors
            .search(&query_vector, self.config.candidate_pool)
            .map_err(|e| CoreError::SearchFailed(format!("{:#}", e)))?;
        let mut candidates: BTreeMap<usize, f64> = hits
            .into_iter()
            .map(|(position, score)| (position, score as f64))
            .collect();
        // exact title holders always compete, even when the dense retrieval missed them
        for &position in generation.exact_title_matches(&query_key) {
            if let Some(entry) = generation.entries.get(position) {
                candidates
                    .entry(position)
                    .or_insert_with(|| inner_product(&entry.dense, &query_vector));
            }
        }

        let query_sparse = generation.tfidf.transform(query);
        let scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter_map(|(position, dense)| {
                let record = generation.records.get(position)?;
                let entry = generation.entries.get(position)?;
                let sparse = query_sparse.dot(&entry.sparse).clamp(0.0, 1.0);
                let boost = title_boost(&query_key, record, &self.config);
                Some(ScoredCandidate::new(
                    position,
                    record,
                    dense.clamp(0.0, 1.0),
                    sparse,
                    boost,
                    &self.config,
                ))
            })
            .collect();
        let pool = scored.len();

        let results = rank(scored, limit);
        debug!(
            "Query '{}': {} candidates, {} results in {:.2?}",
            query,
            pool,
            results.len(),
            start.elapsed()
        );
        Ok(results)
    }

    async fn encode_query(&self, query: &str) -> CoreResult<Arc<Vec<f32>>> {
        if let Some(cache) = &self.query_cache {
            if let Some(hit) = cache.lock().await.get(query) {
                return Ok(hit.clone());
            }
        }
        let vector = Arc::new(
            self.encoder
                .encode(query)
                .map_err(|e| CoreError::InvalidQuery(e.to_string()))?,
        );
        if let Some(cache) = &self.query_cache {
            cache.lock().await.put(query.to_string(), vector.clone());
        }
        Ok(vector)
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidation::store::{GoldenSnapshot, SNAPSHOT_FORMAT_VERSION};
    use crate::indexing::{build_index, HashedNgramEncoder};
    use crate::matching::normalizer::combine_text;
    use crate::models::{GoldenRecord, MatchReason, SourceRef};
    use crate::utils::config::IndexConfig;

    const DIM: usize = 128;

    fn golden(id: &str, title: &str, alts: &[&str], tags: &[&str], synopsis: &str, popularity: u64) -> GoldenRecord {
        let alt_titles: Vec<String> = alts.iter().map(|a| a.to_string()).collect();
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let synopses = vec![synopsis.to_string()];
        GoldenRecord {
            id: id.to_string(),
            canonical_title: title.to_string(),
            canonical_key: normalize_title_key(title),
            alt_title_keys: alt_titles.iter().map(|a| normalize_title_key(a)).collect(),
            combined_text: combine_text(title, &alt_titles, &tags, synopses.iter().map(String::as_str)),
            alt_titles,
            tags,
            description: synopsis.to_string(),
            synopses,
            popularity,
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

    fn generation(records: Vec<GoldenRecord>) -> IndexGeneration {
        generation_with(
            records,
            IndexConfig {
                embedding_dimension: DIM,
                ..IndexConfig::default()
            },
        )
    }

    fn generation_with(records: Vec<GoldenRecord>, config: IndexConfig) -> IndexGeneration {
        let snapshot = GoldenSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            generation: "test".to_string(),
            record_count: records.len(),
            records,
        };
        build_index(&snapshot, &HashedNgramEncoder::new(DIM), &config, None)
            .unwrap()
            .generation
    }

    fn solo_leveling_catalog() -> Vec<GoldenRecord> {
        let mut records: Vec<GoldenRecord> = (0..12)
            .map(|i| {
                golden(
                    &format!("side-{:02}", i),
                    &format!("Solo Leveling Side Story {}", i),
                    &[],
                    &["action"],
                    "Solo leveling, solo leveling: the solo leveling story continues.",
                    50_000 + i,
                )
            })
            .collect();
        records.push(golden(
            "exact",
            "Only I Level Up",
            &["Solo Leveling"],
            &["cooking", "slice of life"],
            "A baker opens a tiny shop in a seaside village and bakes bread every morning \
             for the fishermen, their families, and the lighthouse keeper on the cliff.",
            10,
        ));
        records
    }

    fn engine() -> HybridQueryEngine {
        HybridQueryEngine::new(Arc::new(HashedNgramEncoder::new(DIM)), QueryConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_exact_title_ranks_first_with_popularity_tie_break() {
        let engine = engine();
        engine
            .install(generation(vec![
                golden("a", "Solo Leveling", &[], &["action"], "A weak hunter levels up alone.", 100),
                golden("b", "Only I Level Up", &["Solo Leveling"], &["action"], "Hunters fight in dungeons.", 5000),
                golden(
                    "c",
                    "Solo Leveling: Ragnarok",
                    &[],
                    &["action"],
                    "Solo Leveling solo leveling sequel about the son of the hunter.",
                    90000,
                ),
                golden("d", "Cafe Romance", &[], &["romance"], "A quiet love story by the sea.", 700),
            ]))
            .await;

        let results = engine.search("  Solo Leveling ", 10).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(&ids[..2], &["b", "a"]);
        assert_eq!(results[0].title_boost, 1.0);
        assert_eq!(results[0].reason, MatchReason::DirectTitle);
        let sequel = results.iter().find(|r| r.record_id == "c").unwrap();
        assert!(sequel.title_boost < 1.0);
        assert!(sequel.score < results[1].score);
    }

    #[tokio::test]
    async fn test_exact_title_outside_dense_pool_still_ranks_first() {
        let config = QueryConfig {
            candidate_pool: 2,
            min_limit: 1,
            max_limit: 2,
            ..QueryConfig::default()
        };
        let engine = HybridQueryEngine::new(Arc::new(HashedNgramEncoder::new(DIM)), config).unwrap();
        let generation = generation(solo_leveling_catalog());

        // the dense pool alone would miss the exact alternate-title holder
        let exact_position = generation.records.iter().position(|r| r.id == "exact").unwrap();
        let query_vector = HashedNgramEncoder::new(DIM).encode("Solo Leveling").unwrap();
        let hits = generation.vectors.search(&query_vector, 2).unwrap();
        assert!(hits.iter().all(|(position, _)| *position != exact_position));

        engine.install(generation).await;
        let results = engine.search("Solo Leveling", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record_id, "exact");
        assert_eq!(results[0].title_boost, 1.0);
        assert_eq!(results[0].reason, MatchReason::DirectTitle);
        assert!(results[1].title_boost < 1.0);
    }

    #[tokio::test]
    async fn test_ann_generation_serves_exact_title_first() {
        let engine = engine();
        let generation = generation_with(
            solo_leveling_catalog(),
            IndexConfig {
                embedding_dimension: DIM,
                ann_threshold: 0,
                ann_trees: 4,
                ..IndexConfig::default()
            },
        );
        assert!(generation.vectors.is_ann());
        engine.install(generation).await;

        let results = engine.search("Solo Leveling", 10).await.unwrap();
        assert!(results.len() > 1);
        assert_eq!(results[0].record_id, "exact");
        assert_eq!(results[0].title_boost, 1.0);
        for pair in results.windows(2).skip(1) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let engine = engine();
        let records = (0..150)
            .map(|i| {
                golden(
                    &format!("r{:03}", i),
                    &format!("Dungeon Story {}", i),
                    &[],
                    &["fantasy"],
                    "A hunter explores a dungeon.",
                    i,
                )
            })
            .collect();
        engine.install(generation(records)).await;

        assert_eq!(engine.search("dungeon hunter", 500).await.unwrap().len(), 100);
        assert_eq!(engine.search("dungeon hunter", 1).await.unwrap().len(), 10);
        assert_eq!(engine.search("dungeon hunter", 0).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_empty_catalog_and_invalid_queries() {
        let engine = engine();
        assert!(engine.search("anything", 10).await.unwrap().is_empty());

        let err = engine.search("   ", 10).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuery(_)));

        engine
            .install(generation(vec![golden("a", "Solo Leveling", &[], &[], "hunter", 1)]))
            .await;
        let err = engine.search("?!", 10).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuery(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_results_explain_their_scores() {
        let engine = engine();
        engine
            .install(generation(vec![
                golden("a", "Tower of God", &[], &["fantasy"], "A boy climbs a mysterious tower.", 10),
                golden("b", "Cooking Master", &[], &["cooking"], "A chef competes in tournaments.", 10),
            ]))
            .await;
        let results = engine.search("mysterious tower climbing boy", 10).await.unwrap();
        assert_eq!(results[0].record_id, "a");
        for r in &results {
            let expected = 0.5 * r.dense_score + 0.3 * r.sparse_score + r.title_boost;
            assert!((r.score - expected).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&r.dense_score));
            assert!((0.0..=1.0).contains(&r.sparse_score));
        }
        assert!(matches!(results[0].reason, MatchReason::StrongKeyword | MatchReason::PlotVibe));
    }

    #[tokio::test]
    async fn test_install_swaps_generations() {
        let engine = engine();
        let first = engine
            .install(generation(vec![golden("a", "Solo Leveling", &[], &[], "hunter", 1)]))
            .await;
        assert!(first.is_empty());
        let held = engine.current().await;
        assert_eq!(held.encoder_name, "hashed-ngram");
        let previous = engine.install(IndexGeneration::empty(DIM)).await;
        assert_eq!(previous.len(), 1);
        assert_eq!(held.len(), 1);
        assert!(engine.search("Solo Leveling", 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = QueryConfig {
            weight_boost: 0.1,
            ..QueryConfig::default()
        };
        assert!(HybridQueryEngine::new(Arc::new(HashedNgramEncoder::new(DIM)), config).is_err());
    }
}
