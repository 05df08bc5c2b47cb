//! Target number
//!
//! The integer under investigation. Immutable for the lifetime of a job and
//! always carried in arbitrary precision.
//!
//! Accepted input forms:
//! - decimal literal: `1022117`
//! - power: `2**127` or `2^127`
//! - sums/differences of the above: `2**127 - 1`, `10^1000 + 7`
//!
//! Underscores and whitespace are ignored inside the expression.

use crate::errors::{CoreError, CoreResult};
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use std::fmt;
use std::str::FromStr;

/// Largest exponent accepted in `a**b` (keeps `10**b` parsing bounded)
const MAX_EXPONENT: u32 = 1 << 20;

/// Target integer (`>= 2`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target(BigUint);

impl Target {
    /// Wrap an integer, rejecting 0 and 1
    pub fn new(value: BigUint) -> CoreResult<Self> {
        if value < BigUint::from(2u32) {
            return Err(CoreError::invalid_target(
                value.to_string(),
                "target must be at least 2",
            ));
        }
        Ok(Self(value))
    }

    pub fn from_u64(value: u64) -> CoreResult<Self> {
        Self::new(BigUint::from(value))
    }

    pub fn value(&self) -> &BigUint {
        &self.0
    }

    pub fn into_inner(self) -> BigUint {
        self.0
    }

    /// `floor(sqrt(target))`
    pub fn isqrt(&self) -> BigUint {
        self.0.sqrt()
    }

    /// Residue modulo a small divisor
    pub fn rem_u32(&self, divisor: u32) -> u32 {
        let rem = &self.0 % divisor;
        rem.iter_u32_digits().next().unwrap_or(0)
    }

    pub fn is_divisible_by(&self, divisor: u32) -> bool {
        self.0.is_multiple_of(&BigUint::from(divisor))
    }

    /// Decimal form, used as the canonical identity of a job
    pub fn to_decimal(&self) -> String {
        self.0.to_str_radix(10)
    }

    pub fn bits(&self) -> u64 {
        self.0.bits()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Target {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let value = parse_expression(s)?;
        Self::new(value)
    }
}

fn parse_expression(input: &str) -> CoreResult<BigUint> {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect();
    if compact.is_empty() {
        return Err(CoreError::invalid_target(input, "empty expression"));
    }

    // Split into signed terms; a leading sign is not allowed (targets are positive)
    let mut positive = BigUint::zero();
    let mut negative = BigUint::zero();
    let mut sign_is_plus = true;
    let mut term_start = 0;
    let bytes = compact.as_bytes();

    for i in 0..=bytes.len() {
        let at_end = i == bytes.len();
        if at_end || bytes[i] == b'+' || bytes[i] == b'-' {
            let term = &compact[term_start..i];
            let value = parse_term(term, input)?;
            if sign_is_plus {
                positive += value;
            } else {
                negative += value;
            }
            if !at_end {
                sign_is_plus = bytes[i] == b'+';
                term_start = i + 1;
            }
        }
    }

    if negative > positive {
        return Err(CoreError::invalid_target(input, "expression is negative"));
    }
    Ok(positive - negative)
}

fn parse_term(term: &str, input: &str) -> CoreResult<BigUint> {
    if term.is_empty() {
        return Err(CoreError::invalid_target(input, "missing operand"));
    }

    let (base, exponent) = if let Some((b, e)) = term.split_once("**") {
        (b, Some(e))
    } else if let Some((b, e)) = term.split_once('^') {
        (b, Some(e))
    } else {
        (term, None)
    };

    let base = parse_decimal(base, input)?;
    match exponent {
        None => Ok(base),
        Some(e) => {
            let exp: u32 = e
                .parse()
                .map_err(|_| CoreError::invalid_target(input, format!("bad exponent '{}'", e)))?;
            if exp > MAX_EXPONENT {
                return Err(CoreError::invalid_target(
                    input,
                    format!("exponent {} exceeds {}", exp, MAX_EXPONENT),
                ));
            }
            if exp == 0 {
                return Ok(BigUint::one());
            }
            Ok(base.pow(exp))
        }
    }
}

fn parse_decimal(digits: &str, input: &str) -> CoreResult<BigUint> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::invalid_target(
            input,
            format!("'{}' is not a decimal integer", digits),
        ));
    }
    BigUint::parse_bytes(digits.as_bytes(), 10)
        .ok_or_else(|| CoreError::invalid_target(input, "not a decimal integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        let t: Target = "1022117".parse().unwrap();
        assert_eq!(t.value(), &BigUint::from(1_022_117u32));
    }

    #[test]
    fn test_parse_mersenne_expression() {
        let t: Target = "2**127 - 1".parse().unwrap();
        let expected = (BigUint::one() << 127u32) - BigUint::one();
        assert_eq!(t.value(), &expected);

        let caret: Target = "2^127-1".parse().unwrap();
        assert_eq!(caret, t);
    }

    #[test]
    fn test_parse_sum() {
        let t: Target = "10**3 + 9".parse().unwrap();
        assert_eq!(t.to_decimal(), "1009");
    }

    #[test]
    fn test_underscores_ignored() {
        let t: Target = "1_000_003".parse().unwrap();
        assert_eq!(t.to_decimal(), "1000003");
    }

    #[test]
    fn test_rejects_small_values() {
        assert!("1".parse::<Target>().is_err());
        assert!("0".parse::<Target>().is_err());
        assert!("3 - 2".parse::<Target>().is_err());
        assert!("2".parse::<Target>().is_ok());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<Target>().is_err());
        assert!("abc".parse::<Target>().is_err());
        assert!("2**".parse::<Target>().is_err());
        assert!("5 -".parse::<Target>().is_err());
        assert!("-5".parse::<Target>().is_err());
        assert!("1 - 5".parse::<Target>().is_err());
    }

    #[test]
    fn test_isqrt_and_residues() {
        let t = Target::from_u64(35).unwrap();
        assert_eq!(t.isqrt(), BigUint::from(5u32));
        assert_eq!(t.rem_u32(6), 5);
        assert!(t.is_divisible_by(7));
        assert!(!t.is_divisible_by(3));
    }
}
