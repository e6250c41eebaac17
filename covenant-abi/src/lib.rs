//! ABI layer for compiled covenant contracts.
//!
//! The compiler emits a JSON artifact per contract: a hex code template
//! with `<placeholder>` slots, the ABI signatures, and the struct,
//! library and alias declarations its types reference. This crate binds
//! runtime values to that artifact in both directions. Constructor
//! arguments are flattened to scalar leaves and substituted into the
//! template (stateful contracts additionally serialize their properties
//! behind an `OP_RETURN`); deployed scripts are walked back against the
//! template to recover the arguments. Public function calls become
//! unlocking scripts the same way.
//!
//! Script execution is out of scope; plug an interpreter in through
//! [`ScriptVerifier`] to run calls end to end.

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod coder;
pub mod contract;
pub mod entities;
pub mod error;
pub mod flatten;
pub mod resolver;
pub mod scalar;
pub mod state;
pub mod template;
pub mod typeexpr;
pub mod value;

pub use crate::coder::{AbiCoder, FunctionCall};
pub use crate::contract::{Contract, ScriptVerifier, VerifyOptions, VerifyResult};
pub use crate::entities::{
    AbiEntity, AbiEntityKind, AliasEntity, ContractDescriptor, LibraryEntity, ParamEntity,
    StructEntity,
};
pub use crate::error::{AbiError, Result};
pub use crate::resolver::{SymbolKind, TypeDescriptor, TypeResolver};
pub use crate::value::{struct_value, Argument, Arguments, Value};
