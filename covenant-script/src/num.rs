//! Script number codec
//!
//! The virtual machine represents integers as minimal sign-magnitude
//! little-endian byte strings: the magnitude in little-endian order with
//! the sign carried in the top bit of the final byte, and an extra zero
//! byte appended only when the magnitude itself uses that bit. Zero is
//! the empty string. On top of the raw codec sit the single-byte opcode
//! shortcuts for -1 and 0..16.

use num_bigint::{BigInt, Sign};
use num_traits::Zero;

use crate::chunk::ScriptChunk;
use crate::error::{Result, ScriptError};
use crate::opcodes::{is_data_push, small_int_opcode, small_int_value, OP_0};

/// Minimal sign-magnitude little-endian encoding.
pub fn encode_bignum(n: &BigInt) -> Vec<u8> {
    if n.is_zero() {
        return Vec::new();
    }
    let (sign, mut mag) = n.to_bytes_le();
    let negative = sign == Sign::Minus;
    // to_bytes_le is already minimal for a non-zero magnitude
    if mag.last().is_some_and(|b| b & 0x80 != 0) {
        mag.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        if let Some(last) = mag.last_mut() {
            *last |= 0x80;
        }
    }
    mag
}

/// Exact inverse of [`encode_bignum`].
pub fn decode_bignum(bytes: &[u8]) -> BigInt {
    let Some((&last, rest)) = bytes.split_last() else {
        return BigInt::zero();
    };
    let negative = last & 0x80 != 0;
    let mut mag = rest.to_vec();
    mag.push(last & 0x7f);
    let n = BigInt::from_bytes_le(Sign::Plus, &mag);
    if negative {
        -n
    } else {
        n
    }
}

/// Chunk pushing `n`: a single-byte opcode for -1 and 0..16, otherwise a
/// data push of the sign-magnitude encoding.
pub fn push_bignum(n: &BigInt) -> Result<ScriptChunk> {
    if let Some(small) = as_small_int(n) {
        if let Some(opcode) = small_int_opcode(small) {
            return Ok(ScriptChunk::op(opcode));
        }
    }
    ScriptChunk::push_data(encode_bignum(n))
}

/// Chunk pushing an `i64`.
pub fn push_int(n: i64) -> Result<ScriptChunk> {
    push_bignum(&BigInt::from(n))
}

/// Read the integer a chunk pushes. Fails for opcodes outside the
/// numeric families.
pub fn chunk_to_bignum(chunk: &ScriptChunk) -> Result<BigInt> {
    let opcode = chunk.opcode();
    if opcode == OP_0 {
        return Ok(BigInt::zero());
    }
    if let Some(v) = small_int_value(opcode) {
        return Ok(BigInt::from(v));
    }
    if is_data_push(opcode) {
        return Ok(decode_bignum(chunk.data().unwrap_or_default()));
    }
    Err(ScriptError::NonNumericChunk { opcode })
}

fn as_small_int(n: &BigInt) -> Option<i64> {
    let (sign, digits) = n.to_u64_digits();
    match (sign, digits.as_slice()) {
        (Sign::NoSign, _) => Some(0),
        (Sign::Plus, [d]) if *d <= 16 => Some(*d as i64),
        (Sign::Minus, [1]) => Some(-1),
        _ => None,
    }
}
