/*
 * freqsieve core - frequency collision engine
 *
 * Layout:
 * - target     : arbitrary-precision target + expression parser
 * - prefilter  : small-prime trial division ahead of the search
 * - predicate  : collision predicate over 6k±1 candidate indices
 * - scanner    : block scanner (first hit short-circuits)
 * - planner    : partition / block tiling of [0, sqrt(X)]
 * - decimal    : serde helpers for arbitrary-precision counters
 * - pool       : interval sieve on a fixed-size rayon pool
 * - config     : versioned YAML configuration
 */

#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::module_inception)] // Module naming intentional

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports
// ═══════════════════════════════════════════════════════════════════════════

pub mod config;
pub mod decimal;
pub mod errors;
pub mod planner;
pub mod pool;
pub mod predicate;
pub mod prefilter;
pub mod scanner;
pub mod target;

pub use config::{ConfigError, ConfigResult, SieveConfig};
pub use errors::{CoreError, CoreResult};
pub use planner::{BlockNumber, BlockRange, Blocks, PartitionPlan, PartitionRange};
pub use pool::IntervalSieve;
pub use predicate::{
    anchor, explore, CandidateIndex, Collision, CollisionContext, ExploredCollision, Lane,
    LaneValues, SMALL_INDEX_MAX,
};
pub use prefilter::{Prefilter, PrefilterOutcome};
pub use scanner::{is_prime_frequency, scan_block, ScanVerdict};
pub use target::Target;
