//! Batch planner: partitions the item backlog into chunks and groups chunks
//! into concurrency rounds.
//!
//! A pure function of (items, chunk size, concurrency), so progress
//! accounting is derived from the plan instead of reconstructed offset
//! arithmetic.

use crate::types::ClassificationItem;

/// Chunks dispatched concurrently before the next wait/check point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub chunks: Vec<Vec<ClassificationItem>>,
}

impl Round {
    pub fn item_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

/// Partition `items` in original order into rounds of up to `concurrency`
/// chunks of up to `chunk_size` items each. No item appears twice.
pub fn plan(items: &[ClassificationItem], chunk_size: usize, concurrency: usize) -> Vec<Round> {
    let chunk_size = chunk_size.max(1);
    let concurrency = concurrency.max(1);

    let chunks: Vec<Vec<ClassificationItem>> = items
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect();

    chunks
        .chunks(concurrency)
        .map(|round| Round {
            chunks: round.to_vec(),
        })
        .collect()
}
