//! Runtime values bound to contract call arguments

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::fmt;

use crate::error::{AbiError, Result};

/// A structured argument value.
///
/// Integers that fit an `i64` use `Int`; anything larger round-trips as
/// an arbitrary-precision decimal string. Struct members keep their
/// declaration order, which is semantically significant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    BigInt(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Struct(IndexMap<String, Value>),
}

impl Value {
    /// Short description used in type-mismatch messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "a bool",
            Value::Int(_) | Value::BigInt(_) => "an int",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "an array",
            Value::Struct(_) => "a struct",
        }
    }

    /// Numeric view of `Int` and `BigInt` values.
    pub fn to_bigint(&self) -> Result<BigInt> {
        match self {
            Value::Int(n) => Ok(BigInt::from(*n)),
            Value::BigInt(s) => s
                .parse::<BigInt>()
                .map_err(|_| AbiError::Encoding(format!("invalid integer literal '{s}'"))),
            other => Err(AbiError::Encoding(format!(
                "expected an integer value, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Canonical integer value: `Int` when the number fits an `i64`.
    pub fn from_bigint(n: BigInt) -> Self {
        match n.to_i64() {
            Some(small) => Value::Int(small),
            None => Value::BigInt(n.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::BigInt(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "b'{}'", covenant_script::hexutil::encode_hex(b)),
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
            Value::Struct(members) => {
                write!(f, "{{")?;
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

/// A named, typed value. `Arguments` are order-significant.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub ty: String,
    pub value: Value,
}

impl Argument {
    pub fn new(name: impl Into<String>, ty: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            value,
        }
    }
}

pub type Arguments = Vec<Argument>;

/// Build a struct value from name/value pairs, keeping order.
pub fn struct_value<const N: usize>(members: [(&str, Value); N]) -> Value {
    Value::Struct(
        members
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_canonicalization() {
        assert_eq!(Value::from_bigint(BigInt::from(42)), Value::Int(42));
        let huge = BigInt::from(u64::MAX) * BigInt::from(4);
        assert_eq!(
            Value::from_bigint(huge.clone()),
            Value::BigInt(huge.to_string())
        );
    }

    #[test]
    fn invalid_decimal_literal() {
        let err = Value::BigInt("12x3".into()).to_bigint().unwrap_err();
        assert!(matches!(err, AbiError::Encoding(_)));
    }
}
