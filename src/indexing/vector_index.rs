// src/indexing/vector_index.rs
// Dense retrieval over unit vectors: an exact candle scan for small catalogs, an arroy
// forest in a private LMDB environment above the configured size.

use anyhow::{Context, Result};
use arroy::distances::Euclidean;
use arroy::{Database as ArroyDatabase, Reader, Writer};
use candle_core::Tensor;
use heed::{Env, EnvOpenOptions};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::time::Instant;
use tempfile::TempDir;

use crate::utils::candle::{inner_products, selected_inner_products, stack_rows};
use crate::utils::config::IndexConfig;

const ARROY_DB_MAP_SIZE_MIB: usize = 2048; // 2 GiB for the LMDB map size

/// Arroy forest plus the matrix used to rescore its neighbors exactly.
pub struct AnnIndex {
    // field order matters: the environment must close before its directory is removed
    env: Env,
    db: ArroyDatabase<Euclidean>,
    matrix: Tensor,
    n_trees: usize,
    search_multiplier: usize,
    _dir: TempDir,
}

pub enum VectorIndex {
    Empty,
    Flat { matrix: Tensor },
    Ann(AnnIndex),
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorIndex::Empty => write!(f, "VectorIndex::Empty"),
            VectorIndex::Flat { matrix } => write!(f, "VectorIndex::Flat({:?})", matrix.shape()),
            VectorIndex::Ann(ann) => write!(f, "VectorIndex::Ann({:?}, {} trees)", ann.matrix.shape(), ann.n_trees),
        }
    }
}

impl VectorIndex {
    /// Builds over `vectors`, which must all be unit length with `dimension` entries.
    /// Row `i` is item `i`.
    pub fn build(vectors: &[Vec<f32>], dimension: usize, config: &IndexConfig) -> Result<Self> {
        if vectors.is_empty() {
            return Ok(VectorIndex::Empty);
        }
        let matrix = stack_rows(vectors, dimension)?;
        if vectors.len() <= config.ann_threshold {
            debug!("Exact flat index over {} vectors", vectors.len());
            return Ok(VectorIndex::Flat { matrix });
        }
        build_ann(vectors, dimension, matrix, config).map(VectorIndex::Ann)
    }

    pub fn is_ann(&self) -> bool {
        matches!(self, VectorIndex::Ann(_))
    }

    /// Up to `k` items most similar to `query` as `(item, inner product)`, best first,
    /// ties broken by ascending item.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(usize, f32)> = match self {
            VectorIndex::Empty => return Ok(Vec::new()),
            VectorIndex::Flat { matrix } => inner_products(matrix, query)?.into_iter().enumerate().collect(),
            VectorIndex::Ann(ann) => {
                let neighbors = ann.neighbors(query, k)?;
                let rows: Vec<u32> = neighbors.iter().map(|&n| n as u32).collect();
                let scores = selected_inner_products(&ann.matrix, &rows, query)?;
                neighbors.into_iter().zip(scores).collect()
            }
        };
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

impl AnnIndex {
    fn neighbors(&self, query: &[f32], k: usize) -> Result<Vec<usize>> {
        let rtxn = self
            .env
            .read_txn()
            .context("Failed to start read transaction for arroy query")?;
        let reader = Reader::<Euclidean>::open(&rtxn, 0, self.db).context("Failed to open arroy reader")?;
        let mut query_builder = reader.nns(k);
        if let Some(search_k) = NonZeroUsize::new(k * self.n_trees * self.search_multiplier) {
            query_builder.search_k(search_k);
        }
        let neighbors = query_builder
            .by_vector(&rtxn, query)
            .context("Failed to query arroy")?;
        Ok(neighbors.into_iter().map(|(item, _distance)| item as usize).collect())
    }
}

fn build_ann(vectors: &[Vec<f32>], dimension: usize, matrix: Tensor, config: &IndexConfig) -> Result<AnnIndex> {
    let build_start = Instant::now();
    let dir = TempDir::new().context("Failed to create temporary directory for arroy")?;
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(ARROY_DB_MAP_SIZE_MIB * 1024 * 1024)
            .open(dir.path())
    }
    .context("Failed to open heed environment for arroy")?;

    let mut wtxn = env.write_txn().context("Failed to start write transaction for arroy")?;
    let db: ArroyDatabase<Euclidean> = env
        .create_database(&mut wtxn, None)
        .context("Failed to create arroy database")?;
    let writer = Writer::<Euclidean>::new(db, 0, dimension);
    for (idx, vector) in vectors.iter().enumerate() {
        writer
            .add_item(&mut wtxn, idx as u32, vector)
            .with_context(|| format!("Failed to add item {} to arroy index", idx))?;
    }

    let mut rng = StdRng::seed_from_u64(config.ann_seed);
    writer
        .builder(&mut rng)
        .n_trees(config.ann_trees)
        .build(&mut wtxn)
        .context("Failed to build arroy index")?;
    wtxn.commit().context("Failed to commit arroy index transaction")?;

    info!(
        "Arroy index built with {} items in {:.2?}",
        vectors.len(),
        build_start.elapsed()
    );
    Ok(AnnIndex {
        env,
        db,
        matrix,
        n_trees: config.ann_trees,
        search_multiplier: config.ann_search_multiplier,
        _dir: dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::encoder::normalize_in_place;
    use rand::Rng;

    fn random_unit_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let mut v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
                normalize_in_place(&mut v);
                v
            })
            .collect()
    }

    #[test]
    fn test_empty_index() {
        let index = VectorIndex::build(&[], 8, &IndexConfig::default()).unwrap();
        assert!(index.search(&[0.0; 8], 10).unwrap().is_empty());
    }

    #[test]
    fn test_flat_search_orders_by_score_then_item() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![0.6, 0.8]];
        let index = VectorIndex::build(&vectors, 2, &IndexConfig::default()).unwrap();
        assert!(!index.is_ann());
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let items: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(items, vec![0, 2, 3]);
        assert!((hits[2].1 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_ann_finds_exact_vector_and_is_deterministic() {
        let vectors = random_unit_vectors(300, 16, 3);
        let config = IndexConfig {
            ann_threshold: 0,
            ..IndexConfig::default()
        };
        let index = VectorIndex::build(&vectors, 16, &config).unwrap();
        assert!(index.is_ann());

        let hits = index.search(&vectors[42], 10).unwrap();
        assert_eq!(hits[0].0, 42);
        assert!((hits[0].1 - 1.0).abs() < 1e-4);
        assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));

        let again = index.search(&vectors[42], 10).unwrap();
        assert_eq!(hits, again);
    }
}
