//! Error types for script parsing and number encoding

use thiserror::Error;

/// Main error type for script-level operations
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("invalid hex string '{0}'")]
    InvalidHex(String),

    #[error("truncated push at byte offset {offset}: need {needed} more bytes, {remaining} left")]
    TruncatedPush {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("push length {len} exceeds the OP_PUSHDATA4 range")]
    OversizedPush { len: usize },

    #[error("opcode {opcode:#04x} does not encode a number")]
    NonNumericChunk { opcode: u8 },
}

/// Convenient Result type
pub type Result<T> = std::result::Result<T, ScriptError>;
