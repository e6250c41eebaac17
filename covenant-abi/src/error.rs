//! Error taxonomy for ABI encoding and decoding
//!
//! Every failure aborts the current encode/decode call; nothing here is
//! retried or partially recovered.

use covenant_script::ScriptError;
use thiserror::Error;

/// Main error type for ABI operations
#[derive(Error, Debug)]
pub enum AbiError {
    /// Malformed call binding, e.g. a `FunctionCall` with neither script.
    #[error("invalid call binding: {0}")]
    Config(String),

    /// Unknown function name, placeholder or type.
    #[error("{kind} '{name}' not found in contract '{contract}'")]
    Lookup {
        contract: String,
        kind: &'static str,
        name: String,
    },

    /// Item count disagreement between a script and the declared shape.
    #[error("contract '{contract}': {context} expects {expected} items, got {actual}")]
    ArityMismatch {
        contract: String,
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Literal byte mismatch while walking a script against its template.
    #[error("script does not match the template of contract '{contract}' at hex offset {offset}")]
    TemplateMismatch { contract: String, offset: usize },

    /// Flatten/unflatten leaf-count disagreement.
    #[error("flattened leaves do not match type '{ty}': {detail}")]
    ShapeMismatch { ty: String, detail: String },

    /// Invalid hex or integer literal.
    #[error("encoding: {0}")]
    Encoding(String),

    #[error(transparent)]
    Script(#[from] ScriptError),

    /// A type alias chain that revisits a name.
    #[error("cyclic type alias chain: {chain}")]
    CyclicType { chain: String },

    /// Wrongly shaped value, or ambiguous generic inference.
    #[error("type mismatch for '{name}': expected {expected} but {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Unknown version tag in a stateful contract's trailing data part.
    #[error("unsupported state data version {version}")]
    UnsupportedVersion { version: u8 },
}

/// Convenient Result type
pub type Result<T> = std::result::Result<T, AbiError>;
