//! Declarations produced by the external contract compiler
//!
//! These are consumed read-only: the compiler emits one JSON artifact per
//! contract and everything here deserializes straight from it.

use serde::Deserialize;

/// A named, typed parameter. The type is an unresolved expression and may
/// be an alias, an array, a generic instantiation or a struct name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParamEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl ParamEntity {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbiEntityKind {
    Constructor,
    Function,
}

/// One constructor or public-function signature.
#[derive(Debug, Clone, Deserialize)]
pub struct AbiEntity {
    #[serde(rename = "type")]
    pub kind: AbiEntityKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamEntity>,
    /// Public-function selector, assigned by the compiler only when more
    /// than two public functions exist.
    #[serde(default)]
    pub index: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StructEntity {
    pub name: String,
    pub params: Vec<ParamEntity>,
    #[serde(default, rename = "genericTypes")]
    pub generic_types: Vec<String>,
}

/// A library is a struct whose call arguments (`params`, the constructor
/// parameters) differ from its stored `properties`.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntity {
    pub name: String,
    pub params: Vec<ParamEntity>,
    #[serde(default)]
    pub properties: Vec<ParamEntity>,
    #[serde(default, rename = "genericTypes")]
    pub generic_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// The per-contract artifact slice this crate consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractDescriptor {
    pub contract: String,
    /// Code template: lowercase hex with `<placeholder>` slots for
    /// constructor arguments and inline assembly variables.
    #[serde(default)]
    pub hex: String,
    pub abi: Vec<AbiEntity>,
    #[serde(default)]
    pub structs: Vec<StructEntity>,
    #[serde(default, rename = "library")]
    pub libraries: Vec<LibraryEntity>,
    #[serde(default, rename = "alias")]
    pub aliases: Vec<AliasEntity>,
    #[serde(default, rename = "stateProps")]
    pub state_props: Vec<ParamEntity>,
}

impl ContractDescriptor {
    pub fn constructor(&self) -> Option<&AbiEntity> {
        self.abi
            .iter()
            .find(|e| e.kind == AbiEntityKind::Constructor)
    }

    pub fn public_functions(&self) -> impl Iterator<Item = &AbiEntity> {
        self.abi.iter().filter(|e| e.kind == AbiEntityKind::Function)
    }
}
