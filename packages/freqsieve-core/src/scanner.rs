//! Block Scanner
//!
//! Scans a contiguous, inclusive sub-range of candidate indices with the
//! collision predicate. Side-effect free and safe to re-run on the same range.

use std::ops::ControlFlow;

use crate::errors::CoreResult;
use crate::predicate::{CandidateIndex, Collision, CollisionContext};
use crate::prefilter::{Prefilter, PrefilterOutcome};
use crate::target::Target;
use num_bigint::BigUint;
use num_traits::Zero;

/// Result of scanning one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    /// No collision in the block (or the block lies past the valid index space)
    StillCandidate,
    /// First collision in the block; nothing after it was examined
    Composite(Collision),
}

impl ScanVerdict {
    pub fn is_composite(&self) -> bool {
        matches!(self, ScanVerdict::Composite(_))
    }
}

/// Scan `start..=end`, stopping at the first collision.
///
/// Iteration also stops once `a(c)` exceeds `sqrt(X)`: every later index,
/// in this block or any other, is vacuously a candidate.
pub fn scan_block(
    ctx: &CollisionContext,
    start: &CandidateIndex,
    end: &CandidateIndex,
) -> ScanVerdict {
    let mut verdict = ScanVerdict::StillCandidate;
    ctx.walk(start, end, |collision| {
        verdict = ScanVerdict::Composite(collision);
        ControlFlow::Break(())
    });
    verdict
}

/// Full single-process check: prefilter, then one scan over `[0, limit]`.
pub fn is_prime_frequency(target: &Target, prefilter: &Prefilter) -> CoreResult<bool> {
    match prefilter.classify(target) {
        PrefilterOutcome::Prime => Ok(true),
        PrefilterOutcome::Composite { .. } => Ok(false),
        PrefilterOutcome::NeedsScan => {
            let ctx = CollisionContext::new(target)?;
            Ok(!scan_block(&ctx, &BigUint::zero(), ctx.limit()).is_composite())
        }
    }
}
