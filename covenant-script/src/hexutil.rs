//! Validated hex string helpers

use crate::error::{Result, ScriptError};

/// Decode a hex string, rejecting odd lengths and non-hex digits.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ScriptError::InvalidHex(s.to_string()));
    }
    hex::decode(s).map_err(|_| ScriptError::InvalidHex(s.to_string()))
}

/// Lowercase hex encoding.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
