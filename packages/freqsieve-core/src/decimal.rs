//! Serde helpers for `BigUint` fields
//!
//! Values that fit `u64` are written as plain integers, larger ones as
//! decimal strings, so small checkpoints and logs keep their usual shape.
//! Both forms are accepted on read.
//!
//! ```ignore
//! #[serde(
//!     serialize_with = "serialize_biguint",
//!     deserialize_with = "deserialize_biguint"
//! )]
//! pub last_completed_block: BigUint,
//! ```

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Int(u64),
    Text(String),
}

impl Repr {
    fn into_biguint<E: serde::de::Error>(self) -> Result<BigUint, E> {
        match self {
            Repr::Int(value) => Ok(BigUint::from(value)),
            Repr::Text(text) => text
                .parse::<BigUint>()
                .map_err(|_| E::custom(format!("invalid decimal integer '{}'", text))),
        }
    }
}

/// Borrowed `BigUint` with the decimal serde form
pub struct Decimal<'a>(pub &'a BigUint);

impl Serialize for Decimal<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_biguint(self.0, serializer)
    }
}

/// Serialize BigUint
pub fn serialize_biguint<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value.to_u64() {
        Some(small) => serializer.serialize_u64(small),
        None => serializer.serialize_str(&value.to_str_radix(10)),
    }
}

/// Deserialize BigUint from an integer or a decimal string
pub fn deserialize_biguint<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
where
    D: Deserializer<'de>,
{
    Repr::deserialize(deserializer)?.into_biguint()
}

/// Serialize Option<BigUint>
pub fn serialize_option_biguint<S>(
    value: &Option<BigUint>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => serializer.serialize_some(&Decimal(value)),
        None => serializer.serialize_none(),
    }
}

/// Deserialize Option<BigUint>
pub fn deserialize_option_biguint<'de, D>(deserializer: D) -> Result<Option<BigUint>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Repr>::deserialize(deserializer)?
        .map(Repr::into_biguint::<D::Error>)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        #[serde(
            serialize_with = "serialize_biguint",
            deserialize_with = "deserialize_biguint"
        )]
        value: BigUint,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            serialize_with = "serialize_option_biguint",
            deserialize_with = "deserialize_option_biguint"
        )]
        block: Option<BigUint>,
    }

    #[test]
    fn test_small_values_stay_numbers() {
        let counter = Counter {
            value: BigUint::from(42u32),
            block: Some(BigUint::from(3u32)),
        };
        let json = serde_json::to_string(&counter).unwrap();
        assert_eq!(json, r#"{"value":42,"block":3}"#);
        assert_eq!(serde_json::from_str::<Counter>(&json).unwrap(), counter);
    }

    #[test]
    fn test_large_values_use_decimal_strings() {
        let huge: BigUint = "123456789012345678901234567890".parse().unwrap();
        let counter = Counter {
            value: huge.clone(),
            block: None,
        };
        let json = serde_json::to_string(&counter).unwrap();
        assert_eq!(json, r#"{"value":"123456789012345678901234567890"}"#);

        let yaml = serde_yaml::to_string(&counter).unwrap();
        let parsed: Counter = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.value, huge);
        assert_eq!(parsed.block, None);
    }

    #[test]
    fn test_rejects_non_numeric_text() {
        assert!(serde_json::from_str::<Counter>(r#"{"value":"12x"}"#).is_err());
        assert!(serde_json::from_str::<Counter>(r#"{"value":-1}"#).is_err());
    }
}
