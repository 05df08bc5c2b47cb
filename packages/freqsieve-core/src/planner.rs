//! Partition Planner
//!
//! Deterministically divides the index space `[0, limit]` of one target into
//! `total_partitions` contiguous, disjoint partitions and each partition into
//! fixed-size blocks.
//!
//! ```text
//! partition_work = limit / total_partitions
//! partition i    = [i * work, (i + 1) * work)      for i < total - 1
//! last partition = [(total - 1) * work, limit]     (absorbs the remainder)
//! total_blocks   = ceil(partition_len / block_size)
//! ```
//!
//! Bounds and block numbers are arbitrary precision: the index space grows
//! with `sqrt(X)` and is not limited by any machine word.

use crate::errors::{CoreError, CoreResult};
use crate::predicate::CandidateIndex;
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};

/// Block number within a partition
pub type BlockNumber = BigUint;

/// Layout of all partitions for one `(limit, total_partitions, block_size)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    limit: CandidateIndex,
    total_partitions: u32,
    block_size: u64,
    partition_work: CandidateIndex,
}

impl PartitionPlan {
    pub fn new(
        limit: impl Into<CandidateIndex>,
        total_partitions: u32,
        block_size: u64,
    ) -> CoreResult<Self> {
        if total_partitions == 0 {
            return Err(CoreError::partitioning("partition count must be positive"));
        }
        if block_size == 0 {
            return Err(CoreError::partitioning("block size must be positive"));
        }

        let limit = limit.into();
        let partition_work = &limit / total_partitions;
        Ok(Self {
            limit,
            total_partitions,
            block_size,
            partition_work,
        })
    }

    pub fn limit(&self) -> &CandidateIndex {
        &self.limit
    }

    pub fn total_partitions(&self) -> u32 {
        self.total_partitions
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn partition_work(&self) -> &CandidateIndex {
        &self.partition_work
    }

    /// Range of partition `id`
    pub fn partition(&self, id: u32) -> CoreResult<PartitionRange> {
        if id >= self.total_partitions {
            return Err(CoreError::partitioning(format!(
                "partition id {} out of range 0..{}",
                id, self.total_partitions
            )));
        }

        let start = &self.partition_work * id;
        let end = if id == self.total_partitions - 1 {
            &self.limit + 1u32
        } else {
            &start + &self.partition_work
        };

        Ok(PartitionRange {
            id,
            start,
            end,
            block_size: self.block_size,
        })
    }

    /// All partitions in id order
    pub fn partitions(&self) -> impl Iterator<Item = PartitionRange> + '_ {
        (0..self.total_partitions).filter_map(move |id| self.partition(id).ok())
    }
}

/// Half-open index range `[start, end)` owned by one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRange {
    pub id: u32,
    pub start: CandidateIndex,
    pub end: CandidateIndex,
    pub block_size: u64,
}

impl PartitionRange {
    pub fn len(&self) -> CandidateIndex {
        &self.end - &self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn total_blocks(&self) -> BlockNumber {
        self.len().div_ceil(&BigUint::from(self.block_size))
    }

    /// Number of the final block, `None` for an empty partition
    pub fn last_block(&self) -> Option<BlockNumber> {
        let total = self.total_blocks();
        (!total.is_zero()).then(|| total - 1u32)
    }

    /// Inclusive bounds of block `n`, or `None` past the last block
    pub fn block(&self, n: &BlockNumber) -> Option<BlockRange> {
        if n >= &self.total_blocks() {
            return None;
        }
        let start = &self.start + n * self.block_size;
        let end = (&start + self.block_size).min(self.end.clone()) - 1u32;
        Some(BlockRange {
            number: n.clone(),
            start,
            end,
        })
    }

    /// Blocks `from..total_blocks` in increasing order
    pub fn blocks_from(&self, from: BlockNumber) -> Blocks<'_> {
        Blocks {
            total: self.total_blocks(),
            range: self,
            next: from,
        }
    }
}

/// Iterator over the blocks of one partition
#[derive(Debug)]
pub struct Blocks<'a> {
    range: &'a PartitionRange,
    next: BlockNumber,
    total: BlockNumber,
}

impl Iterator for Blocks<'_> {
    type Item = BlockRange;

    fn next(&mut self) -> Option<BlockRange> {
        if self.next >= self.total {
            return None;
        }
        let block = self.range.block(&self.next)?;
        self.next += BigUint::one();
        Some(block)
    }
}

/// Inclusive index range of one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRange {
    pub number: BlockNumber,
    pub start: CandidateIndex,
    pub end: CandidateIndex,
}
