// src/candidate_generation/blocking.rs
// Blocking Index: partitions normalized records by a cheap title-key signature so
// pairwise comparison only happens inside a block.

use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::NormalizedRecord;
use crate::utils::config::BlockingStrategy;

/// Signature of the block holding records whose key yields no usable signature.
pub const CATCH_ALL_SIGNATURE: &str = "#";

/// Records sharing one signature, referenced by index into the shared record list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub signature: String,
    /// Ascending record indices.
    pub members: Vec<usize>,
}

impl Block {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn pair_count(&self) -> usize {
        let n = self.members.len();
        n * n.saturating_sub(1) / 2
    }

    pub fn is_catch_all(&self) -> bool {
        self.signature == CATCH_ALL_SIGNATURE
    }
}

/// Every record in exactly one block, blocks ordered by signature.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    records: Arc<Vec<NormalizedRecord>>,
    blocks: Vec<Block>,
}

impl BlockIndex {
    pub fn build(records: Arc<Vec<NormalizedRecord>>, strategy: BlockingStrategy) -> Self {
        let mut by_signature: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, record) in records.iter().enumerate() {
            by_signature
                .entry(signature(&record.title_key, strategy))
                .or_default()
                .push(idx);
        }

        let blocks: Vec<Block> = by_signature
            .into_iter()
            .map(|(signature, members)| Block { signature, members })
            .collect();

        let index = Self { records, blocks };
        info!(
            "Blocked {} records into {} blocks (largest {}, catch-all {}, {} candidate pairs)",
            index.records.len(),
            index.blocks.len(),
            index.largest_block(),
            index.catch_all_size(),
            index.comparison_cost()
        );
        for block in &index.blocks {
            debug!("Block '{}': {} records", block.signature, block.len());
        }
        index
    }

    pub fn records(&self) -> &Arc<Vec<NormalizedRecord>> {
        &self.records
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Sum over blocks of the number of unordered pairs.
    pub fn comparison_cost(&self) -> usize {
        self.blocks.iter().map(Block::pair_count).sum()
    }

    pub fn largest_block(&self) -> usize {
        self.blocks.iter().map(Block::len).max().unwrap_or(0)
    }

    pub fn catch_all_size(&self) -> usize {
        self.blocks
            .iter()
            .find(|b| b.is_catch_all())
            .map(Block::len)
            .unwrap_or(0)
    }
}

/// Deterministic and total: every key maps to some signature.
pub fn signature(title_key: &str, strategy: BlockingStrategy) -> String {
    let sig = match strategy {
        BlockingStrategy::FirstChar => title_key
            .chars()
            .next()
            .filter(|c| c.is_alphanumeric())
            .map(|c| c.to_string()),
        BlockingStrategy::FirstToken => title_key
            .split_whitespace()
            .next()
            .filter(|t| t.chars().any(char::is_alphanumeric))
            .map(str::to_string),
    };
    sig.unwrap_or_else(|| CATCH_ALL_SIGNATURE.to_string())
}
