//! Script value layer for compiled covenant contracts.
//!
//! A script is a flat sequence of opcode chunks. Push opcodes carry data
//! (directly, or behind a 1/2/4-byte little-endian length prefix), the
//! small-integer opcodes encode -1 and 0..16 in a single byte, and every
//! other opcode stands alone. This crate owns the bit-exact chunk codec
//! and the minimal sign-magnitude number representation the virtual
//! machine uses; everything ABI-shaped lives one crate up.

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod chunk;
pub mod error;
pub mod hexutil;
pub mod num;
pub mod opcodes;
pub mod script;

pub use crate::chunk::ScriptChunk;
pub use crate::error::{Result, ScriptError};
pub use crate::script::{ChunkReader, Script};
