// src/utils/config.rs
use log::{info, warn};
use std::path::PathBuf;

use crate::error::{CoreError, CoreResult};
use crate::utils::env::{env_list, env_or};

/// How records are assigned to blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingStrategy {
    /// First character of the comparison key.
    FirstChar,
    /// First whitespace-delimited token of the comparison key.
    FirstToken,
}

impl std::str::FromStr for BlockingStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first_char" | "char" => Ok(BlockingStrategy::FirstChar),
            "first_token" | "token" => Ok(BlockingStrategy::FirstToken),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown blocking strategy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    pub similarity_threshold: f64,
    pub blocking: BlockingStrategy,
    pub alias_linking: bool,
    pub alias_min_key_len: usize,
    pub preferred_languages: Vec<String>,
    pub max_concurrent_blocks: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            blocking: BlockingStrategy::FirstChar,
            alias_linking: true,
            alias_min_key_len: 4,
            preferred_languages: vec!["zh".to_string(), "zh-hk".to_string(), "ko".to_string()],
            max_concurrent_blocks: num_cpus::get().min(8),
        }
    }
}

impl ResolutionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let blocking = std::env::var("BLOCKING_STRATEGY")
            .ok()
            .and_then(|raw| match raw.parse::<BlockingStrategy>() {
                Ok(strategy) => Some(strategy),
                Err(e) => {
                    warn!("{}. Falling back to first_char.", e);
                    None
                }
            })
            .unwrap_or(defaults.blocking);

        Self {
            similarity_threshold: env_or("SIMILARITY_THRESHOLD", defaults.similarity_threshold),
            blocking,
            alias_linking: env_or("ALIAS_LINKING_ENABLED", defaults.alias_linking),
            alias_min_key_len: env_or("ALIAS_MIN_KEY_LEN", defaults.alias_min_key_len),
            preferred_languages: env_list("PREFERRED_LANGUAGES", &["zh", "zh-hk", "ko"])
                .into_iter()
                .map(|l| l.to_lowercase())
                .collect(),
            max_concurrent_blocks: env_or("MAX_CONCURRENT_BLOCKS", defaults.max_concurrent_blocks)
                .max(1),
        }
    }

    pub fn log_config(&self) {
        info!("Resolution: threshold={:.2}, blocking={:?}, alias linking={} (min key len {}), preferred languages={:?}, concurrency={}",
            self.similarity_threshold,
            self.blocking,
            self.alias_linking,
            self.alias_min_key_len,
            self.preferred_languages,
            self.max_concurrent_blocks,
        );
    }
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub embedding_dimension: usize,
    /// Catalog sizes above this use the ANN forest instead of an exact scan.
    pub ann_threshold: usize,
    pub ann_trees: usize,
    pub ann_search_multiplier: usize,
    pub ann_seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 384,
            ann_threshold: 2000,
            ann_trees: 10,
            ann_search_multiplier: 15,
            ann_seed: 42,
        }
    }
}

impl IndexConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            embedding_dimension: env_or("EMBEDDING_DIMENSION", d.embedding_dimension).max(1),
            ann_threshold: env_or("ANN_THRESHOLD", d.ann_threshold),
            ann_trees: env_or("ANN_TREES", d.ann_trees).max(1),
            ann_search_multiplier: env_or("ANN_SEARCH_MULTIPLIER", d.ann_search_multiplier).max(1),
            ann_seed: env_or("ANN_SEED", d.ann_seed),
        }
    }

    pub fn log_config(&self) {
        info!(
            "Index: dimension={}, ANN above {} records ({} trees, search multiplier {}, seed {})",
            self.embedding_dimension,
            self.ann_threshold,
            self.ann_trees,
            self.ann_search_multiplier,
            self.ann_seed
        );
    }
}

// absorbs float rounding when the weights sum exactly to the boost
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Fusion weights and result bounds for the hybrid query engine.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub candidate_pool: usize,
    pub min_limit: usize,
    pub max_limit: usize,
    pub weight_dense: f64,
    pub weight_sparse: f64,
    pub weight_boost: f64,
    /// Fuzzy title similarity needed before any partial title credit is given.
    pub title_fuzzy_threshold: f64,
    /// Upper bound of the partial title credit.
    pub partial_boost_cap: f64,
    pub query_cache_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            candidate_pool: 200,
            min_limit: 10,
            max_limit: 100,
            weight_dense: 0.5,
            weight_sparse: 0.3,
            weight_boost: 1.0,
            title_fuzzy_threshold: 0.90,
            partial_boost_cap: 0.2,
            query_cache_size: 256,
        }
    }
}

impl QueryConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            candidate_pool: env_or("CANDIDATE_POOL", d.candidate_pool),
            min_limit: env_or("MIN_LIMIT", d.min_limit),
            max_limit: env_or("MAX_LIMIT", d.max_limit),
            weight_dense: env_or("WEIGHT_DENSE", d.weight_dense),
            weight_sparse: env_or("WEIGHT_SPARSE", d.weight_sparse),
            weight_boost: env_or("WEIGHT_BOOST", d.weight_boost),
            title_fuzzy_threshold: env_or("TITLE_FUZZY_THRESHOLD", d.title_fuzzy_threshold),
            partial_boost_cap: env_or("PARTIAL_BOOST_CAP", d.partial_boost_cap),
            query_cache_size: env_or("QUERY_CACHE_SIZE", d.query_cache_size),
        }
    }

    /// Rejects bounds and weights under which an exact title match could lose to a non-exact one.
    pub fn validate(&self) -> CoreResult<()> {
        if self.weight_dense < 0.0 || self.weight_sparse < 0.0 || self.weight_boost < 0.0 {
            return Err(CoreError::InvalidConfig("fusion weights must be non-negative".to_string()));
        }
        if !(0.0..1.0).contains(&self.partial_boost_cap) {
            return Err(CoreError::InvalidConfig(format!(
                "partial boost cap {} must be in [0, 1)",
                self.partial_boost_cap
            )));
        }
        // An exact match scores at least `weight_boost`. A tie with the best non-exact score
        // is settled by the exact-first ranking tier, so only a strictly lower boost is rejected.
        let best_non_exact =
            self.weight_dense + self.weight_sparse + self.weight_boost * self.partial_boost_cap;
        if self.weight_boost + WEIGHT_TOLERANCE < best_non_exact {
            return Err(CoreError::InvalidConfig(format!(
                "boost weight {:.3} is below the best non-exact score {:.3}",
                self.weight_boost, best_non_exact
            )));
        }
        if self.min_limit == 0 || self.min_limit > self.max_limit {
            return Err(CoreError::InvalidConfig(format!(
                "limit bounds [{}, {}] are invalid",
                self.min_limit, self.max_limit
            )));
        }
        if self.candidate_pool < self.max_limit {
            return Err(CoreError::InvalidConfig(format!(
                "candidate pool {} is smaller than max limit {}",
                self.candidate_pool, self.max_limit
            )));
        }
        Ok(())
    }

    pub fn clamp_limit(&self, limit: usize) -> usize {
        limit.clamp(self.min_limit, self.max_limit)
    }

    pub fn log_config(&self) {
        info!(
            "Query: K={}, limit in [{}, {}], weights dense={:.2} sparse={:.2} boost={:.2}, fuzzy title >= {:.2} (cap {:.2})",
            self.candidate_pool,
            self.min_limit,
            self.max_limit,
            self.weight_dense,
            self.weight_sparse,
            self.weight_boost,
            self.title_fuzzy_threshold,
            self.partial_boost_cap
        );
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub raw_records_dir: PathBuf,
    pub store_path: PathBuf,
    pub resolution: ResolutionConfig,
    pub index: IndexConfig,
    pub query: QueryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_records_dir: PathBuf::from("data/raw"),
            store_path: PathBuf::from("data/processed/golden_records.json"),
            resolution: ResolutionConfig::default(),
            index: IndexConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            raw_records_dir: std::env::var("RAW_RECORDS_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.raw_records_dir),
            store_path: std::env::var("GOLDEN_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.store_path),
            resolution: ResolutionConfig::from_env(),
            index: IndexConfig::from_env(),
            query: QueryConfig::from_env(),
        }
    }

    pub fn log_config(&self) {
        info!("Raw records dir: {}", self.raw_records_dir.display());
        info!("Golden record store: {}", self.store_path.display());
        self.resolution.log_config();
        self.index.log_config();
        self.query.log_config();
    }
}
