//! Collision Predicate
//!
//! Pure arithmetic test deciding whether a candidate index `c` exposes a
//! factorization of the target `X`.
//!
//! # Lanes
//! ```text
//! f2(c)    = 2c + 3
//! f1(c)    = 4c + 7   (c even)
//!          = 4c + 5   (c odd)
//! total(c) = f1 + f2
//! a(c)     = 3c + 5   (c even)
//!          = 3c + 4   (c odd)      -- the 6k±1 number sitting at index c
//!
//! valA = cX - c - f1
//! valB = cX - c - total
//! collision <=> (valA >= 0 && valA % total == 0) || (valB >= 0 && valB % total == 0)
//! ```
//!
//! `cX` is the index of `X` itself in the `6k±1` sequence and is skipped.
//! A collision at `c` means `a(c)` divides `X`: the predicate is trial
//! division over the `6k±1` residue classes, re-expressed as index
//! arithmetic. It reproduces that arithmetic exactly and proves nothing
//! beyond what trial division up to `sqrt(X)` proves.
//!
//! Indices are arbitrary precision. Indices up to [`SMALL_INDEX_MAX`] are
//! evaluated in `u128`, which covers every index a scan from 0 can reach.

use std::cmp;
use std::ops::ControlFlow;

use crate::errors::{CoreError, CoreResult};
use crate::target::Target;
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{CheckedSub, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

/// Candidate index type
pub type CandidateIndex = BigUint;

/// Largest index evaluated on the `u128` path.
/// Keeps `a(c)`, `f1`, `f2`, `total` and `c + total` inside `u128`.
pub const SMALL_INDEX_MAX: u128 = u128::MAX >> 4;

/// Which of the two residue tests fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lane {
    A,
    B,
}

/// Lane values for one index on the `u128` path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneValues {
    pub f1: u128,
    pub f2: u128,
    pub total: u128,
}

impl LaneValues {
    pub fn at(c: u128) -> Self {
        let f2 = 2 * c + 3;
        let f1 = if c % 2 == 0 { 4 * c + 7 } else { 4 * c + 5 };
        Self {
            f1,
            f2,
            total: f1 + f2,
        }
    }
}

/// `(f1, total)` for an arbitrary index
fn big_lanes(c: &BigUint) -> (BigUint, BigUint) {
    let f2 = c * 2u32 + 3u32;
    let f1 = if c.is_even() {
        c * 4u32 + 7u32
    } else {
        c * 4u32 + 5u32
    };
    let total = &f1 + &f2;
    (f1, total)
}

/// `a(c)`: the `6k±1` number at index `c`
pub fn anchor(c: &BigUint) -> BigUint {
    if c.is_even() {
        c * 3u32 + 5u32
    } else {
        c * 3u32 + 4u32
    }
}

/// A collision found at some index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collision {
    pub index: CandidateIndex,
    pub lane: Lane,
    /// `a(index)`, a nontrivial divisor of the target
    pub factor: BigUint,
}

/// Collision with its multiplier `k = val / total` (explorer output)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploredCollision {
    pub collision: Collision,
    pub multiplier: BigUint,
}

/// Precomputed per-target state for the predicate
#[derive(Debug, Clone)]
pub struct CollisionContext {
    limit: BigUint,
    /// First index with `a(c) > limit`
    scan_end: BigUint,
    skip_index: BigUint,
    /// `cX` when it fits `u128` (the only case where it can equal a small index)
    skip_small: Option<u128>,
}

impl CollisionContext {
    /// Build the context. The target must be `>= 5` and coprime to 6.
    pub fn new(target: &Target) -> CoreResult<Self> {
        let x = target.value();
        if x < &BigUint::from(5u32) {
            return Err(CoreError::PreconditionViolated(format!(
                "target {} is below 5",
                x
            )));
        }

        let skip_index = match target.rem_u32(6) {
            1 => (x - 4u32) / 3u32,
            5 => (x - 5u32) / 3u32,
            r => {
                return Err(CoreError::PreconditionViolated(format!(
                    "target {} is not of the form 6k±1 (residue {})",
                    x, r
                )))
            }
        };

        let limit = target.isqrt();
        let scan_end = scan_end_for(&limit);
        let skip_small = skip_index.to_u128();

        Ok(Self {
            limit,
            scan_end,
            skip_index,
            skip_small,
        })
    }

    /// `floor(sqrt(X))`
    pub fn limit(&self) -> &BigUint {
        &self.limit
    }

    /// Every index at or past this one has `a(c) > sqrt(X)`
    pub fn scan_end(&self) -> &BigUint {
        &self.scan_end
    }

    /// `cX`
    pub fn skip_index(&self) -> &BigUint {
        &self.skip_index
    }

    pub fn is_skipped(&self, c: &BigUint) -> bool {
        c == &self.skip_index
    }

    /// Whether `a(c)` is still within `sqrt(X)`; past this point every index is vacuous
    pub fn in_range(&self, c: &BigUint) -> bool {
        c < &self.scan_end
    }

    /// Evaluate the predicate at `c`. Returns `None` for the skip index.
    pub fn evaluate(&self, c: &BigUint) -> Option<Collision> {
        let lane = match c.to_u128().filter(|&small| small <= SMALL_INDEX_MAX) {
            Some(small) => self.lane_small(small),
            None => self.lane_big(c),
        }?;
        Some(collision_at(c.clone(), lane))
    }

    /// True iff `c` exposes a factorization of the target
    pub fn exposes_factorization(&self, c: &BigUint) -> bool {
        self.evaluate(c).is_some()
    }

    /// Visit collisions in `start..=end` in index order, clamped to the valid
    /// index space, until `visit` breaks.
    pub fn walk<F>(&self, start: &BigUint, end: &BigUint, mut visit: F)
    where
        F: FnMut(Collision) -> ControlFlow<()>,
    {
        if self.scan_end.is_zero() {
            return;
        }
        let last_valid = &self.scan_end - 1u32;
        let end = cmp::min(end, &last_valid);
        if start > end {
            return;
        }

        let mut c = start.clone();
        if let Some(first) = start.to_u128().filter(|&s| s <= SMALL_INDEX_MAX) {
            let last_small = end
                .to_u128()
                .map_or(SMALL_INDEX_MAX, |e| e.min(SMALL_INDEX_MAX));
            for i in first..=last_small {
                if let Some(lane) = self.lane_small(i) {
                    if visit(collision_at(BigUint::from(i), lane)).is_break() {
                        return;
                    }
                }
            }
            c = BigUint::from(last_small) + 1u32;
        }

        while &c <= end {
            if let Some(lane) = self.lane_big(&c) {
                if visit(collision_at(c.clone(), lane)).is_break() {
                    return;
                }
            }
            c += 1u32;
        }
    }

    /// `k` such that `cX = c + f1 + k * total` (lane A) or `c + total + k * total` (lane B)
    pub fn multiplier(&self, collision: &Collision) -> BigUint {
        let (f1, total) = big_lanes(&collision.index);
        let offset = match collision.lane {
            Lane::A => &collision.index + &f1,
            Lane::B => &collision.index + &total,
        };
        (&self.skip_index - offset) / total
    }

    fn lane_small(&self, c: u128) -> Option<Lane> {
        let lanes = LaneValues::at(c);
        match self.skip_small {
            Some(cx) if cx == c => None,
            Some(cx) => {
                let val_a = cx.checked_sub(c + lanes.f1);
                let val_b = cx.checked_sub(c + lanes.total);
                if val_a.is_some_and(|v| v % lanes.total == 0) {
                    Some(Lane::A)
                } else if val_b.is_some_and(|v| v % lanes.total == 0) {
                    Some(Lane::B)
                } else {
                    None
                }
            }
            None => {
                // cX > u128::MAX > c + total, so both differences are non-negative.
                // Compare residues instead of materialising the differences.
                let residue = (&self.skip_index % lanes.total)
                    .to_u128()
                    .unwrap_or(u128::MAX);
                if residue == (c + lanes.f1) % lanes.total {
                    Some(Lane::A)
                } else if residue == c % lanes.total {
                    Some(Lane::B)
                } else {
                    None
                }
            }
        }
    }

    fn lane_big(&self, c: &BigUint) -> Option<Lane> {
        if self.is_skipped(c) {
            return None;
        }
        let (f1, total) = big_lanes(c);
        let divides = |offset: BigUint| {
            self.skip_index
                .checked_sub(&offset)
                .is_some_and(|val| (val % &total).is_zero())
        };
        if divides(c + &f1) {
            Some(Lane::A)
        } else if divides(c + &total) {
            Some(Lane::B)
        } else {
            None
        }
    }
}

fn collision_at(index: BigUint, lane: Lane) -> Collision {
    Collision {
        factor: anchor(&index),
        index,
        lane,
    }
}

/// Number of indices with `a(c) <= limit` (`a` is strictly increasing)
fn scan_end_for(limit: &BigUint) -> BigUint {
    if limit < &BigUint::from(5u32) {
        return BigUint::zero();
    }
    // a(c) >= 3c + 4, so no valid index exceeds (limit - 4) / 3
    let last = (limit - 4u32) / 3u32;
    if &anchor(&last) <= limit {
        last + 1u32
    } else {
        last
    }
}

/// Enumerate every collision over the valid index range (both lanes).
///
/// Unlike the block scanner this does not stop at the first hit.
/// `max_results` bounds the output for targets with many small factors.
pub fn explore(ctx: &CollisionContext, max_results: usize) -> Vec<ExploredCollision> {
    let mut found = Vec::new();
    if max_results == 0 {
        return found;
    }
    ctx.walk(&BigUint::zero(), ctx.limit(), |collision| {
        let multiplier = ctx.multiplier(&collision);
        found.push(ExploredCollision {
            collision,
            multiplier,
        });
        if found.len() >= max_results {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    found
}
