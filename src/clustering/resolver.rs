// src/clustering/resolver.rs
// Entity Resolver: fuzzy title matching inside each block, exact alias linking across
// blocks, and union-find over record indices to form equivalence classes.

use futures::future::join_all;
use indicatif::ProgressBar;
use log::{debug, error, info};
use petgraph::unionfind::UnionFind;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use crate::candidate_generation::{Block, BlockIndex};
use crate::matching::title::best_title_similarity;
use crate::models::stats_models::{BlockResolutionStats, ResolutionStats};
use crate::models::NormalizedRecord;
use crate::utils::config::ResolutionConfig;

/// Records judged to denote the same title, as ascending indices into the record list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EquivalenceClass {
    pub members: Vec<usize>,
}

impl EquivalenceClass {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A partition of the full record set.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub records: Arc<Vec<NormalizedRecord>>,
    /// Ordered by smallest member index.
    pub classes: Vec<EquivalenceClass>,
    pub stats: ResolutionStats,
}

/// Fuzzy-matched groups found inside one block, in global record indices.
#[derive(Debug, Clone, Default)]
pub struct BlockResolution {
    pub groups: Vec<Vec<usize>>,
    pub stats: BlockResolutionStats,
}

/// Compares every pair in `block`, taking the best similarity across all title fields,
/// and unions pairs at or above `threshold`.
pub fn resolve_block(records: &[NormalizedRecord], block: &Block, threshold: f64) -> BlockResolution {
    let n = block.len();
    let mut stats = BlockResolutionStats {
        records: n,
        ..Default::default()
    };
    let mut uf: UnionFind<usize> = UnionFind::new(n);

    for i in 0..n {
        let a = &records[block.members[i]];
        for j in (i + 1)..n {
            let b = &records[block.members[j]];
            stats.pairs_compared += 1;
            let similarity = best_title_similarity(a.all_title_keys(), b.all_title_keys());
            if similarity >= threshold {
                stats.fuzzy_links += 1;
                uf.union(i, j);
                debug!(
                    "Linked '{}' ({}) and '{}' ({}) at {:.3}",
                    a.title, a.source_ref, b.title, b.source_ref, similarity
                );
            }
        }
    }

    let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (local, root) in uf.into_labeling().into_iter().enumerate() {
        grouped.entry(root).or_default().push(block.members[local]);
    }
    let groups = grouped.into_values().filter(|g| g.len() > 1).collect();

    BlockResolution { groups, stats }
}

/// Pairs of records sharing an identical title key of at least `min_key_len` characters,
/// on any title field. Linear in the number of keys.
pub fn alias_links(records: &[NormalizedRecord], min_key_len: usize) -> Vec<(usize, usize)> {
    let mut first_holder: HashMap<&str, usize> = HashMap::new();
    let mut links = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        for key in record.all_title_keys() {
            if key.chars().count() < min_key_len {
                continue;
            }
            match first_holder.get(key) {
                Some(&holder) if holder != idx => links.push((holder, idx)),
                Some(_) => {}
                None => {
                    first_holder.insert(key, idx);
                }
            }
        }
    }
    links
}

/// Resolves every block of `index` concurrently and merges the results into one partition.
pub async fn resolve(
    index: &BlockIndex,
    config: &ResolutionConfig,
    progress: Option<ProgressBar>,
) -> Resolution {
    let start = Instant::now();
    let records = index.records().clone();
    let threshold = config.similarity_threshold;
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_blocks.max(1)));

    let mut handles = Vec::with_capacity(index.blocks().len());
    for block in index.blocks() {
        let records = records.clone();
        let block = block.clone();
        let semaphore = semaphore.clone();
        let progress = progress.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = tokio::task::spawn_blocking(move || resolve_block(&records, &block, threshold)).await;
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            result
        }));
    }

    // join_all keeps handle order (signature order), so completion order never leaks into the output.
    let block_results: Vec<BlockResolution> = join_all(handles)
        .await
        .into_iter()
        .zip(index.blocks())
        .map(|(joined, block)| block_result_or_unmerged(block, joined.and_then(|inner| inner)))
        .collect();

    let resolution = merge(index, block_results, config);
    info!(
        "Resolved {} records into {} classes in {:.2?} ({} pairs, {} fuzzy links, {} alias links, largest class {})",
        records.len(),
        resolution.stats.equivalence_classes,
        start.elapsed(),
        resolution.stats.pairs_compared,
        resolution.stats.fuzzy_links,
        resolution.stats.alias_links,
        resolution.stats.largest_class
    );
    resolution
}

/// A block whose task failed contributes no links, leaving its members in their own classes.
fn block_result_or_unmerged(block: &Block, joined: Result<BlockResolution, JoinError>) -> BlockResolution {
    match joined {
        Ok(result) => result,
        Err(e) => {
            error!(
                "Resolution task for block '{}' failed: {}. Its {} records stay unmerged.",
                block.signature,
                e,
                block.len()
            );
            BlockResolution {
                groups: Vec::new(),
                stats: BlockResolutionStats {
                    records: block.len(),
                    ..Default::default()
                },
            }
        }
    }
}

/// Synchronous equivalent of [`resolve`], used where no runtime is available.
pub fn resolve_sequential(index: &BlockIndex, config: &ResolutionConfig) -> Resolution {
    let records = index.records();
    let block_results = index
        .blocks()
        .iter()
        .map(|block| resolve_block(records, block, config.similarity_threshold))
        .collect();
    merge(index, block_results, config)
}

fn merge(index: &BlockIndex, block_results: Vec<BlockResolution>, config: &ResolutionConfig) -> Resolution {
    let records = index.records().clone();
    let mut stats = ResolutionStats {
        blocks: index.blocks().len(),
        largest_block: index.largest_block(),
        catch_all_size: index.catch_all_size(),
        ..Default::default()
    };

    let mut uf: UnionFind<usize> = UnionFind::new(records.len());
    for result in &block_results {
        stats.absorb_block(&result.stats);
        for group in &result.groups {
            for pair in group.windows(2) {
                uf.union(pair[0], pair[1]);
            }
        }
    }

    if config.alias_linking {
        for (a, b) in alias_links(&records, config.alias_min_key_len) {
            if uf.union(a, b) {
                stats.alias_links += 1;
                debug!(
                    "Alias-linked '{}' ({}) and '{}' ({})",
                    records[a].title, records[a].source_ref, records[b].title, records[b].source_ref
                );
            }
        }
    }

    let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, root) in uf.into_labeling().into_iter().enumerate() {
        grouped.entry(root).or_default().push(idx);
    }
    let mut classes: Vec<EquivalenceClass> = grouped
        .into_values()
        .map(|members| EquivalenceClass { members })
        .collect();
    classes.sort();

    stats.equivalence_classes = classes.len();
    stats.largest_class = classes.iter().map(EquivalenceClass::len).max().unwrap_or(0);

    Resolution {
        records,
        classes,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::normalizer::normalize_record;
    use crate::models::{RawRecord, SourceRef};
    use crate::utils::config::BlockingStrategy;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn record(id: &str, title: &str, alts: &[&str]) -> NormalizedRecord {
        normalize_record(RawRecord {
            source: "test".to_string(),
            source_id: id.to_string(),
            title: Some(title.to_string()),
            alt_titles: alts.iter().map(|a| a.to_string()).collect(),
            tags: vec![],
            synopsis: None,
            popularity: 0,
            origin_language: None,
            year: None,
            rating: None,
            cover_art: None,
            official_link: None,
        })
        .unwrap()
    }

    fn config(threshold: f64) -> ResolutionConfig {
        ResolutionConfig {
            similarity_threshold: threshold,
            max_concurrent_blocks: 2,
            ..ResolutionConfig::default()
        }
    }

    /// Partition as sets of source refs, independent of record order.
    fn partition(resolution: &Resolution) -> BTreeSet<BTreeSet<SourceRef>> {
        resolution
            .classes
            .iter()
            .map(|c| {
                c.members
                    .iter()
                    .map(|&m| resolution.records[m].source_ref.clone())
                    .collect()
            })
            .collect()
    }

    fn corpus() -> Vec<NormalizedRecord> {
        vec![
            record("1", "Solo Leveling", &[]),
            record("2", "Only I Level Up", &["Solo Leveling"]),
            record("3", "Solo Leveling: Ragnarok", &[]),
            record("4", "Tower of God", &[]),
            record("5", "Tower of Gods", &[]),
            record("6", "The Beginning After the End", &[]),
            record("7", "The Beginning After The End!", &[]),
            record("8", "Omniscient Reader", &["Omniscient Reader's Viewpoint"]),
            record("9", "Omniscient Readers Viewpoint", &[]),
            record("10", "???", &[]),
            record("11", "Eleceed", &[]),
        ]
    }

    #[tokio::test]
    async fn test_end_to_end_titles_partition() {
        let index = BlockIndex::build(Arc::new(corpus()), BlockingStrategy::FirstChar);
        let resolution = resolve(&index, &config(0.85), None).await;
        let ids: BTreeSet<BTreeSet<String>> = partition(&resolution)
            .into_iter()
            .map(|c| c.into_iter().map(|r| r.source_id).collect())
            .collect();

        let expected: BTreeSet<BTreeSet<String>> = [
            vec!["1", "2"],
            vec!["3"],
            vec!["4", "5"],
            vec!["6", "7"],
            vec!["8", "9"],
            vec!["10"],
            vec!["11"],
        ]
        .into_iter()
        .map(|c| c.into_iter().map(str::to_string).collect())
        .collect();
        assert_eq!(ids, expected);
        // the other shared keys were already fuzzy-linked inside their block
        assert_eq!(resolution.stats.alias_links, 1);
    }

    #[tokio::test]
    async fn test_resolution_is_order_independent() {
        let base = corpus();
        let index = BlockIndex::build(Arc::new(base.clone()), BlockingStrategy::FirstChar);
        let expected = partition(&resolve(&index, &config(0.85), None).await);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let mut shuffled = base.clone();
            shuffled.shuffle(&mut rng);
            let index = BlockIndex::build(Arc::new(shuffled), BlockingStrategy::FirstChar);
            assert_eq!(partition(&resolve(&index, &config(0.85), None).await), expected);
        }
    }

    #[test]
    fn test_chaining_stops_at_threshold_and_block_boundary() {
        // a~b and b~c at 0.9, a~c at 0.8; d differs from a by one edit but starts with 'b'
        let records = vec![
            record("a", "aaaaaaaaaa", &[]),
            record("b", "aaaaaaaaab", &[]),
            record("c", "aaaaaaaabb", &[]),
            record("d", "baaaaaaaaa", &[]),
        ];
        let index = BlockIndex::build(Arc::new(records), BlockingStrategy::FirstChar);

        let chained = resolve_sequential(&index, &config(0.85));
        assert_eq!(chained.classes.len(), 2);
        assert_eq!(chained.classes[0].members, vec![0, 1, 2]);
        assert_eq!(chained.classes[1].members, vec![3]);

        let strict = resolve_sequential(&index, &config(0.95));
        assert_eq!(strict.classes.len(), 4);
        assert_eq!(strict.stats.fuzzy_links, 0);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let index = BlockIndex::build(Arc::new(corpus()), BlockingStrategy::FirstChar);
        let thresholds = [0.5, 0.6, 0.7, 0.8, 0.85, 0.9, 0.95, 1.0];
        let partitions: Vec<_> = thresholds
            .iter()
            .map(|&t| resolve_sequential(&index, &config(t)))
            .collect();

        for pair in partitions.windows(2) {
            let (lower, higher) = (&pair[0], &pair[1]);
            for class in &higher.classes {
                let container = lower
                    .classes
                    .iter()
                    .find(|c| c.members.contains(&class.members[0]));
                let container = container.unwrap();
                assert!(class.members.iter().all(|m| container.members.contains(m)));
                assert!(class.len() <= container.len());
            }
        }
    }

    #[test]
    fn test_alias_links_respect_min_key_len() {
        let records = vec![
            record("1", "Eve", &[]),
            record("2", "Zeta", &["Eve"]),
            record("3", "Solo Leveling", &[]),
            record("4", "Only I Level Up", &["Solo Leveling"]),
        ];
        assert_eq!(alias_links(&records, 4), vec![(2, 3)]);
        assert_eq!(alias_links(&records, 3), vec![(0, 1), (2, 3)]);
    }

    #[test]
    fn test_alias_linking_can_be_disabled() {
        let records = vec![
            record("1", "Solo Leveling", &[]),
            record("2", "Only I Level Up", &["Solo Leveling"]),
        ];
        let index = BlockIndex::build(Arc::new(records), BlockingStrategy::FirstChar);
        let cfg = ResolutionConfig {
            alias_linking: false,
            ..config(0.85)
        };
        assert_eq!(resolve_sequential(&index, &cfg).classes.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_block_task_leaves_members_unmerged() {
        let block = Block {
            signature: "s".to_string(),
            members: vec![0, 1],
        };
        let joined = tokio::task::spawn_blocking(|| -> BlockResolution { panic!("comparison crashed") }).await;
        let result = block_result_or_unmerged(&block, joined);
        assert!(result.groups.is_empty());
        assert_eq!(result.stats.records, 2);
        assert_eq!(result.stats.fuzzy_links, 0);

        let records = vec![record("1", "Solo Leveling", &[]), record("2", "Solo Leveling", &[])];
        let index = BlockIndex::build(Arc::new(records), BlockingStrategy::FirstChar);
        let cfg = ResolutionConfig {
            alias_linking: false,
            ..config(0.85)
        };
        let merged = merge(&index, vec![result], &cfg);
        assert_eq!(merged.classes.len(), 2);

        let ok = BlockResolution {
            groups: vec![vec![0, 1]],
            ..Default::default()
        };
        assert_eq!(block_result_or_unmerged(&block, Ok(ok)).groups, vec![vec![0, 1]]);
    }
}
