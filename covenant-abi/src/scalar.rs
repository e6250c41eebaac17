//! Scalar codec: leaf values to and from script chunks
//!
//! Every flattened leaf ends up as exactly one chunk. Integers use the
//! virtual machine's sign-magnitude representation with the single-byte
//! opcode shortcuts, booleans are OP_TRUE/OP_FALSE, and all the
//! bytes-like scalar types push their raw bytes.

use covenant_script::num::{chunk_to_bignum, push_bignum};
use covenant_script::opcodes::{OP_FALSE, OP_TRUE};
use covenant_script::ScriptChunk;
use num_traits::Zero;

use crate::error::{AbiError, Result};
use crate::value::Value;

/// How a scalar type is represented on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Bool,
    Bytes,
}

/// Scalar type names the virtual machine understands natively. All of
/// the crypto-flavored types are raw bytes under the hood; `PrivKey` is
/// a number.
pub fn scalar_kind(ty: &str) -> Option<ScalarKind> {
    match ty {
        "int" | "PrivKey" => Some(ScalarKind::Int),
        "bool" => Some(ScalarKind::Bool),
        "bytes" | "PubKey" | "PubKeyHash" | "Sig" | "Ripemd160" | "Sha1" | "Sha256"
        | "SigHashType" | "SigHashPreimage" | "OpCodeType" => Some(ScalarKind::Bytes),
        _ => None,
    }
}

/// Encode one leaf value as a script chunk.
pub fn to_chunk(value: &Value, ty: &str) -> Result<ScriptChunk> {
    let kind = scalar_kind(ty).ok_or_else(|| AbiError::Encoding(format!(
        "'{ty}' is not a scalar type"
    )))?;
    match (kind, value) {
        (ScalarKind::Int, _) => Ok(push_bignum(&value.to_bigint()?)?),
        (ScalarKind::Bool, Value::Bool(b)) => {
            Ok(ScriptChunk::op(if *b { OP_TRUE } else { OP_FALSE }))
        }
        (ScalarKind::Bytes, Value::Bytes(bytes)) => Ok(ScriptChunk::push_data(bytes.clone())?),
        (_, other) => Err(AbiError::Encoding(format!(
            "cannot encode {} as '{ty}'",
            other.kind_name()
        ))),
    }
}

/// Decode one captured chunk back into a leaf value.
pub fn from_chunk(chunk: &ScriptChunk, ty: &str) -> Result<Value> {
    let kind = scalar_kind(ty).ok_or_else(|| AbiError::Encoding(format!(
        "'{ty}' is not a scalar type"
    )))?;
    match kind {
        ScalarKind::Int => Ok(Value::from_bigint(chunk_to_bignum(chunk)?)),
        ScalarKind::Bool => Ok(Value::Bool(!chunk_to_bignum(chunk)?.is_zero())),
        ScalarKind::Bytes => Ok(Value::Bytes(chunk.data().unwrap_or_default().to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_script::opcodes::OP_0;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("int", Some(ScalarKind::Int))]
    #[case("PrivKey", Some(ScalarKind::Int))]
    #[case("bool", Some(ScalarKind::Bool))]
    #[case("bytes", Some(ScalarKind::Bytes))]
    #[case("Sig", Some(ScalarKind::Bytes))]
    #[case("SigHashPreimage", Some(ScalarKind::Bytes))]
    #[case("Point", None)]
    #[case("int[3]", None)]
    fn kind_table(#[case] ty: &str, #[case] expected: Option<ScalarKind>) {
        assert_eq!(scalar_kind(ty), expected);
    }

    #[test]
    fn bool_encoding() {
        assert_eq!(to_chunk(&Value::Bool(true), "bool").unwrap().opcode(), OP_TRUE);
        assert_eq!(to_chunk(&Value::Bool(false), "bool").unwrap().opcode(), OP_FALSE);
        assert_eq!(
            from_chunk(&ScriptChunk::op(OP_TRUE), "bool").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            from_chunk(&ScriptChunk::op(OP_0), "bool").unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn empty_bytes_is_op_0() {
        let chunk = to_chunk(&Value::Bytes(vec![]), "bytes").unwrap();
        assert_eq!(chunk.opcode(), OP_0);
        assert_eq!(from_chunk(&chunk, "bytes").unwrap(), Value::Bytes(vec![]));
    }

    #[test]
    fn pubkey_is_bytes_like() {
        let key = vec![0x02; 33];
        let chunk = to_chunk(&Value::Bytes(key.clone()), "PubKey").unwrap();
        assert_eq!(from_chunk(&chunk, "PubKey").unwrap(), Value::Bytes(key));
    }

    #[test]
    fn int_round_trip_is_canonical() {
        let chunk = to_chunk(&Value::BigInt("16".into()), "int").unwrap();
        // re-encoded canonically: decodes to Int, not BigInt
        assert_eq!(from_chunk(&chunk, "int").unwrap(), Value::Int(16));
    }

    #[test]
    fn kind_mismatch_fails() {
        assert!(to_chunk(&Value::Bool(true), "bytes").is_err());
        assert!(to_chunk(&Value::Bytes(vec![1]), "Oddball").is_err());
    }
}
