//! Interval sieve on a fixed-size worker pool
//!
//! The "scan many small numbers" workload: `[start, end]` is cut into
//! blocks, each block is an independent stateless task, and a rayon pool of
//! fixed size pulls blocks one at a time. Results are merged and sorted at
//! the end, so the output never depends on worker completion order.
//!
//! ```text
//! [start ............................................ end]
//!  └ block 0 ┘└ block 1 ┘└ block 2 ┘ ...   -> worker pool -> merge -> sort
//! ```

use crate::errors::{CoreError, CoreResult};
use crate::prefilter::Prefilter;
use crate::scanner::is_prime_frequency;
use crate::target::Target;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::debug;

/// Fixed-size pool scanning a range of numbers
#[derive(Debug, Clone)]
pub struct IntervalSieve {
    workers: usize,
    block_size: u64,
    prefilter: Prefilter,
}

impl IntervalSieve {
    /// `workers == 0` selects one worker per CPU core
    pub fn new(workers: usize, block_size: u64, prefilter: Prefilter) -> CoreResult<Self> {
        if block_size == 0 {
            return Err(CoreError::partitioning("block size must be positive"));
        }
        let workers = if workers == 0 { num_cpus::get() } else { workers };
        Ok(Self {
            workers,
            block_size,
            prefilter,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Inclusive `(block_start, block_end)` tasks covering `[start, end]`
    pub fn tasks(&self, start: u64, end: u64) -> Vec<(u64, u64)> {
        let mut tasks = Vec::new();
        if start > end {
            return tasks;
        }
        let mut block_start = start;
        loop {
            let block_end = block_start.saturating_add(self.block_size - 1).min(end);
            tasks.push((block_start, block_end));
            if block_end == end {
                break;
            }
            block_start = block_end + 1;
        }
        tasks
    }

    /// All numbers in `[start, end]` the frequency test classifies as prime, ascending
    pub fn primes_in(&self, start: u64, end: u64) -> CoreResult<Vec<u64>> {
        let tasks = self.tasks(start, end);
        debug!(
            "Interval sieve: {} blocks over [{}, {}] on {} workers",
            tasks.len(),
            start,
            end,
            self.workers
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("freqsieve-worker-{}", i))
            .build()
            .map_err(|e| CoreError::WorkerPool(e.to_string()))?;

        let per_block: Vec<CoreResult<Vec<u64>>> = pool.install(|| {
            tasks
                .par_iter()
                .with_max_len(1)
                .map(|&(block_start, block_end)| self.process_block(block_start, block_end))
                .collect()
        });

        let mut primes = Vec::new();
        for block in per_block {
            primes.extend(block?);
        }
        primes.sort_unstable();
        Ok(primes)
    }

    fn process_block(&self, block_start: u64, block_end: u64) -> CoreResult<Vec<u64>> {
        let mut primes = Vec::new();
        for n in block_start..=block_end {
            if n < 2 {
                continue;
            }
            let target = Target::from_u64(n)?;
            if is_prime_frequency(&target, &self.prefilter)? {
                primes.push(n);
            }
        }
        Ok(primes)
    }
}
