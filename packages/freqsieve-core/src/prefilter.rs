//! Small-prime prefilter
//!
//! The collision predicate is only defined for targets coprime to 6. Which
//! further small primes are excluded up front differs between deployments
//! (the "hardened" variant also strips 5 and 7), so the list is an explicit
//! parameter instead of a baked-in constant.

use crate::errors::{CoreError, CoreResult};
use crate::target::Target;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Outcome of the up-front trial division
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefilterOutcome {
    /// Target equals one of the excluded primes
    Prime,
    /// Target is a proper multiple of an excluded prime
    Composite { divisor: u32 },
    /// Preconditions hold; the partitioned search decides
    NeedsScan,
}

/// Explicit list of pre-excluded small primes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefilter {
    excluded_primes: Vec<u32>,
}

impl Prefilter {
    /// Excludes 2 and 3 only (minimum required by the predicate)
    pub fn standard() -> Self {
        Self {
            excluded_primes: vec![2, 3],
        }
    }

    /// Also excludes 5 and 7
    pub fn hardened() -> Self {
        Self {
            excluded_primes: vec![2, 3, 5, 7],
        }
    }

    /// Custom exclusion list; must contain 2 and 3 and only primes
    pub fn with_primes(mut primes: Vec<u32>) -> CoreResult<Self> {
        primes.sort_unstable();
        primes.dedup();
        if !primes.contains(&2) || !primes.contains(&3) {
            return Err(CoreError::PreconditionViolated(
                "prefilter must exclude 2 and 3".to_string(),
            ));
        }
        if let Some(p) = primes.iter().find(|p| !is_small_prime(**p)) {
            return Err(CoreError::PreconditionViolated(format!(
                "prefilter entry {} is not prime",
                p
            )));
        }
        Ok(Self {
            excluded_primes: primes,
        })
    }

    pub fn excluded_primes(&self) -> &[u32] {
        &self.excluded_primes
    }

    /// Classify a target by trial division over the excluded primes
    pub fn classify(&self, target: &Target) -> PrefilterOutcome {
        for &p in &self.excluded_primes {
            if target.value() == &BigUint::from(p) {
                return PrefilterOutcome::Prime;
            }
            if target.is_divisible_by(p) {
                return PrefilterOutcome::Composite { divisor: p };
            }
        }
        PrefilterOutcome::NeedsScan
    }
}

impl Default for Prefilter {
    fn default() -> Self {
        Self::standard()
    }
}

fn is_small_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2u32;
    while (d as u64) * (d as u64) <= n as u64 {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}
