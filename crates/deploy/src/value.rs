//! Concrete values flowing between actions.

use std::{fmt, str::FromStr};

use alloy_core::primitives::{Address, B256, Bytes, U256};
use derive_more::From;
use serde::{Deserialize, Serialize};

/// A concrete argument or result value.
///
/// Values are ABI-agnostic: they are coerced to the parameter type of the function or
/// constructor they are passed to when the call is encoded. Strings are the escape
/// hatch for anything else (`"-1"` for an `int256`, `"0x1234"` for a `bytes2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, From)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Value {
    Address(Address),
    Bool(bool),
    Uint(U256),
    Bytes(Bytes),
    Hash(B256),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    /// Interpret the value as an address, parsing strings and 20-byte payloads.
    pub fn to_address(&self) -> Option<Address> {
        match self {
            Value::Address(address) => Some(*address),
            Value::String(s) => Address::from_str(s).ok(),
            Value::Bytes(b) if b.len() == 20 => Some(Address::from_slice(b)),
            _ => None,
        }
    }

    /// Convert a plain JSON value (parameter files, manifest literals) into a [`Value`].
    ///
    /// Non-negative integers become [`Value::Uint`]; everything that cannot be represented
    /// natively (negative numbers, big numbers) has to be passed as a string.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, String> {
        match json {
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|n| Value::Uint(U256::from(n)))
                .ok_or_else(|| format!("unsupported number `{n}`, pass it as a string")),
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            serde_json::Value::Null => Err("null is not a valid value".to_string()),
            serde_json::Value::Object(_) => Err("objects are not valid values".to_string()),
        }
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Uint(U256::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Address(address) => write!(f, "{address}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Uint(n) => write!(f, "{n}"),
            Value::Bytes(b) => write!(f, "{b}"),
            Value::Hash(h) => write!(f, "{h}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_literals() {
        let json = serde_json::json!([true, 42, "0xabc", [1, 2]]);
        let value = Value::from_json(&json).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Bool(true),
                Value::from(42u64),
                Value::from("0xabc"),
                Value::Array(vec![Value::from(1u64), Value::from(2u64)]),
            ])
        );
    }

    #[test]
    fn test_from_json_rejects_negative_and_null() {
        assert!(Value::from_json(&serde_json::json!(-1)).is_err());
        assert!(Value::from_json(&serde_json::json!(null)).is_err());
        assert!(Value::from_json(&serde_json::json!({ "a": 1 })).is_err());
    }

    #[test]
    fn test_to_address() {
        let address = Address::repeat_byte(0x11);
        assert_eq!(Value::Address(address).to_address(), Some(address));
        assert_eq!(Value::String(address.to_string()).to_address(), Some(address));
        assert_eq!(Value::Bytes(Bytes::copy_from_slice(address.as_slice())).to_address(), Some(address));
        assert_eq!(Value::Bool(true).to_address(), None);
    }

    #[test]
    fn test_serde_snapshot_is_tagged() {
        let json = serde_json::to_value(Value::from(7u64)).unwrap();
        assert_eq!(json["type"], "uint");
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::from(7u64));
    }
}
