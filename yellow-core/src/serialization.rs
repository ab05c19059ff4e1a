//! JSON-safe serialization.
//!
//! Every public result leaves the workspace through [`to_json_safe`], which
//! turns any integer a JSON consumer could not hold exactly (above 2^53 − 1)
//! into a decimal string. Big unsigned values (`U256`) never appear natively:
//! they are carried as decimal strings, either by construction or through the
//! [`decimal_u256`] serde adapter (ethers serializes `U256` as hex by default).

use ethers::types::U256;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::constants::MAX_SAFE_INTEGER;
use crate::error::{Result, YellowError};

/// Formats a `U256` as a decimal string.
pub fn u256_to_decimal(value: U256) -> String {
    value.to_string()
}

/// Parses a decimal amount string into a `U256`.
///
/// Accepts only ASCII digits (surrounding whitespace is trimmed); signs,
/// decimals points, and hex are rejected.
pub fn parse_amount(amount: &str) -> Result<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(YellowError::ValidationError(format!(
            "amount must be a non-negative integer, got '{amount}'"
        )));
    }
    U256::from_dec_str(trimmed)
        .map_err(|e| YellowError::ValidationError(format!("amount '{amount}' out of range: {e}")))
}

/// Rewrites every integer beyond the safe range into a decimal string.
///
/// Walks arrays and objects recursively; all other values are untouched.
pub fn stringify_big_integers(value: Value) -> Value {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                if u > MAX_SAFE_INTEGER {
                    return Value::String(u.to_string());
                }
            } else if let Some(i) = n.as_i64() {
                if i.unsigned_abs() > MAX_SAFE_INTEGER {
                    return Value::String(i.to_string());
                }
            }
            Value::Number(n)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(stringify_big_integers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, stringify_big_integers(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Serializes `value` into a JSON-safe tree.
pub fn to_json_safe<T: Serialize>(value: &T) -> Result<Value> {
    Ok(stringify_big_integers(serde_json::to_value(value)?))
}

/// Encodes `value` as a JSON-safe string.
pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(&to_json_safe(value)?)?)
}

/// Decodes a JSON string.
pub fn decode<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

/// Serde adapter carrying a `U256` as a decimal string.
///
/// ```rust
/// use ethers::types::U256;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Balance {
///     #[serde(with = "yellow_core::serialization::decimal_u256")]
///     amount: U256,
/// }
///
/// let json = serde_json::to_string(&Balance { amount: U256::from(10u64) }).unwrap();
/// assert_eq!(json, r#"{"amount":"10"}"#);
/// ```
pub mod decimal_u256 {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes as a decimal string.
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    /// Deserializes from a decimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_amount(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter reading a `u64` from a JSON number or a decimal string.
///
/// Serializes as a plain number; [`to_json_safe`] turns values above
/// 2^53 − 1 into strings on the way out and this reads them back.
pub mod lenient_u64 {
    use std::fmt;

    use serde::de::{self, Unexpected, Visitor};
    use serde::{Deserializer, Serializer};

    /// Serializes as a JSON number.
    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    /// Deserializes from a non-negative number or a decimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_any(LenientU64)
    }

    struct LenientU64;

    impl<'de> Visitor<'de> for LenientU64 {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            value
                .trim()
                .parse()
                .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
        }
    }
}

/// [`lenient_u64`] for optional fields.
pub mod lenient_u64_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Lenient(#[serde(with = "crate::serialization::lenient_u64")] u64);

    /// Serializes `Some` as a JSON number, `None` as null.
    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(Lenient).serialize(serializer)
    }

    /// Deserializes null, a number, or a decimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Ok(Option::<Lenient>::deserialize(deserializer)?.map(|Lenient(v)| v))
    }
}
