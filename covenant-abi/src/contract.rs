//! Contract instances: bound arguments, state and the verification seam
//!
//! A `Contract` is one deployable instance of a compiled artifact. The
//! coder binds its constructor arguments (fresh or recovered from a
//! deployed script); the instance then owns the captured template
//! chunks, the current state and the optional data part, and can render
//! its locking script at any time. Script execution itself is pluggable
//! through `ScriptVerifier`.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::debug;

use covenant_script::hexutil::decode_hex;
use covenant_script::opcodes::OP_RETURN;
use covenant_script::Script;

use crate::entities::{AbiEntity, AbiEntityKind, ContractDescriptor, ParamEntity};
use crate::error::{AbiError, Result};
use crate::resolver::{SymbolKind, TypeResolver};
use crate::scalar::{self, ScalarKind};
use crate::state;
use crate::typeexpr;
use crate::value::{Argument, Arguments, Value};

/// Resource limits handed to the pluggable script verifier.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub max_ops: u64,
    pub max_stack_depth: usize,
    pub max_element_bytes: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            max_ops: 100_000,
            max_stack_depth: 1_000,
            max_element_bytes: 520,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResult {
    pub success: bool,
    pub error: Option<String>,
}

impl VerifyResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Executes an unlocking script against a locking script. The locking
/// side is raw hex because its data part need not be chunk-shaped.
pub trait ScriptVerifier {
    fn verify(&self, locking_hex: &str, unlocking: &Script, options: &VerifyOptions)
        -> VerifyResult;
}

pub struct Contract {
    name: String,
    abi: Vec<AbiEntity>,
    state_props: Vec<ParamEntity>,
    code_template: String,
    resolver: Arc<TypeResolver>,
    pub(crate) template_args: RwLock<IndexMap<String, String>>,
    pub(crate) inline_asm_args: RwLock<IndexMap<String, String>>,
    pub(crate) state_args: RwLock<Arguments>,
    pub(crate) is_genesis: RwLock<bool>,
    pub(crate) data_part: RwLock<Option<String>>,
    pub(crate) has_inline_asm_vars: AtomicBool,
    pub(crate) code_part: RwLock<Option<Script>>,
    verifier: RwLock<Option<Box<dyn ScriptVerifier + Send + Sync>>>,
}

impl Contract {
    pub fn new(descriptor: &ContractDescriptor) -> Self {
        Self {
            name: descriptor.contract.clone(),
            abi: descriptor.abi.clone(),
            state_props: descriptor.state_props.clone(),
            code_template: descriptor.hex.clone(),
            resolver: Arc::new(TypeResolver::from_descriptor(descriptor)),
            template_args: RwLock::new(IndexMap::new()),
            inline_asm_args: RwLock::new(IndexMap::new()),
            state_args: RwLock::new(Vec::new()),
            is_genesis: RwLock::new(true),
            data_part: RwLock::new(None),
            has_inline_asm_vars: AtomicBool::new(false),
            code_part: RwLock::new(None),
            verifier: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code_template(&self) -> &str {
        &self.code_template
    }

    pub fn resolver(&self) -> &Arc<TypeResolver> {
        &self.resolver
    }

    pub fn state_props(&self) -> &[ParamEntity] {
        &self.state_props
    }

    pub fn is_stateful(&self) -> bool {
        !self.state_props.is_empty()
    }

    pub fn abi(&self) -> &[AbiEntity] {
        &self.abi
    }

    pub fn constructor(&self) -> Option<&AbiEntity> {
        self.abi
            .iter()
            .find(|e| e.kind == AbiEntityKind::Constructor)
    }

    pub fn public_functions(&self) -> impl Iterator<Item = &AbiEntity> {
        self.abi.iter().filter(|e| e.kind == AbiEntityKind::Function)
    }

    pub fn public_function_count(&self) -> usize {
        self.public_functions().count()
    }

    pub fn function(&self, name: &str) -> Result<&AbiEntity> {
        self.public_functions()
            .find(|e| e.name.as_deref() == Some(name))
            .ok_or_else(|| AbiError::Lookup {
                contract: self.name.clone(),
                kind: "function",
                name: name.to_string(),
            })
    }

    /// Check call values against declared parameters, producing the bound
    /// arguments. Arity first, then a full structural type check.
    pub fn check_args(
        &self,
        context: &str,
        params: &[ParamEntity],
        values: &[Value],
    ) -> Result<Arguments> {
        if params.len() != values.len() {
            return Err(AbiError::ArityMismatch {
                contract: self.name.clone(),
                context: context.to_string(),
                expected: params.len(),
                actual: values.len(),
            });
        }
        params
            .iter()
            .zip(values)
            .map(|(param, value)| {
                self.check_value(&param.name, &param.ty, value)?;
                Ok(Argument::new(
                    param.name.clone(),
                    param.ty.clone(),
                    value.clone(),
                ))
            })
            .collect()
    }

    fn check_value(&self, name: &str, ty: &str, value: &Value) -> Result<()> {
        let descriptor = self.resolver.resolve(ty)?;
        let mismatch = |actual: String| AbiError::TypeMismatch {
            name: name.to_string(),
            expected: descriptor.final_type.clone(),
            actual,
        };
        match descriptor.symbol_kind {
            SymbolKind::Scalar => {
                let kind = scalar::scalar_kind(&descriptor.final_type).ok_or_else(|| {
                    AbiError::Encoding(format!(
                        "'{}' is not a scalar type",
                        descriptor.final_type
                    ))
                })?;
                let ok = matches!(
                    (kind, value),
                    (ScalarKind::Int, Value::Int(_) | Value::BigInt(_))
                        | (ScalarKind::Bool, Value::Bool(_))
                        | (ScalarKind::Bytes, Value::Bytes(_))
                );
                if !ok {
                    return Err(mismatch(format!("got {}", value.kind_name())));
                }
            }
            SymbolKind::Array => {
                let (elem, dims) = typeexpr::split_array(&descriptor.final_type)?
                    .ok_or_else(|| AbiError::ShapeMismatch {
                        ty: descriptor.final_type.clone(),
                        detail: "array type without dimensions".into(),
                    })?;
                let Value::Array(items) = value else {
                    return Err(mismatch(format!("got {}", value.kind_name())));
                };
                if items.len() != dims[0] {
                    return Err(mismatch(format!("got an array of {} elements", items.len())));
                }
                let elem_ty = format!("{elem}{}", typeexpr::dims_suffix(&dims[1..]));
                for (i, item) in items.iter().enumerate() {
                    self.check_value(&format!("{name}[{i}]"), &elem_ty, item)?;
                }
            }
            SymbolKind::Struct | SymbolKind::Library => {
                let declaration =
                    descriptor
                        .declaration
                        .as_ref()
                        .ok_or_else(|| AbiError::ShapeMismatch {
                            ty: descriptor.final_type.clone(),
                            detail: "missing declaration".into(),
                        })?;
                let Value::Struct(members) = value else {
                    return Err(mismatch(format!("got {}", value.kind_name())));
                };
                let bindings: Vec<(String, String)> =
                    if let Some((_, args)) = typeexpr::parse_generic(&descriptor.final_type) {
                        declaration
                            .generic_params
                            .iter()
                            .cloned()
                            .zip(args.iter().map(|a| a.to_string()))
                            .collect()
                    } else if descriptor.is_generic {
                        let concrete = self.resolver.deduce_generic(value, declaration)?;
                        declaration
                            .generic_params
                            .iter()
                            .cloned()
                            .zip(concrete)
                            .collect()
                    } else {
                        Vec::new()
                    };
                for extra in members.keys() {
                    if !declaration.params.iter().any(|p| &p.name == extra) {
                        return Err(mismatch(format!("has an unexpected member [{extra}]")));
                    }
                }
                for param in &declaration.params {
                    let member = members.get(&param.name).ok_or_else(|| {
                        mismatch(format!("is missing member [{}]", param.name))
                    })?;
                    let member_ty = typeexpr::substitute(&param.ty, &bindings);
                    self.check_value(&format!("{name}.{}", param.name), &member_ty, member)?;
                }
            }
        }
        Ok(())
    }

    /// Bind one inline assembly variable of `function` by name. The
    /// chunk hex replaces every occurrence of the placeholder when the
    /// code part is next built.
    pub fn set_inline_asm_var(&self, function: &str, variable: &str, chunk_hex: &str) {
        let key = format!("<{}.{function}.{variable}>", self.name);
        debug!(%key, "binding inline assembly variable");
        self.inline_asm_args.write().insert(key, chunk_hex.to_string());
    }

    pub fn has_inline_asm_vars(&self) -> bool {
        self.has_inline_asm_vars
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn is_genesis(&self) -> bool {
        *self.is_genesis.read()
    }

    pub fn state_args(&self) -> Arguments {
        self.state_args.read().clone()
    }

    /// Overwrite one state property for the next instance of the
    /// contract. Clears the genesis flag.
    pub fn set_state_arg(&self, name: &str, value: Value) -> Result<()> {
        let mut args = self.state_args.write();
        let arg = args
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| AbiError::Lookup {
                contract: self.name.clone(),
                kind: "state property",
                name: name.to_string(),
            })?;
        self.check_value(&arg.name.clone(), &arg.ty.clone(), &value)?;
        arg.value = value;
        *self.is_genesis.write() = false;
        Ok(())
    }

    pub fn data_part_hex(&self) -> Option<String> {
        self.data_part.read().clone()
    }

    /// Attach an opaque data part. Stateful contracts own their data
    /// part, so this is only valid for stateless ones.
    pub fn set_data_part(&self, hex: &str) -> Result<()> {
        if self.is_stateful() {
            return Err(AbiError::Config(format!(
                "contract '{}' is stateful, its data part is derived from state",
                self.name
            )));
        }
        decode_hex(hex)?;
        *self.data_part.write() = Some(hex.to_string());
        Ok(())
    }

    /// Render the current locking script: the bound code part, then for
    /// stateful contracts `OP_RETURN` plus the serialized state, or the
    /// opaque data part if one is attached. `None` until the constructor
    /// has been encoded.
    pub fn locking_script_hex(&self) -> Result<Option<String>> {
        let Some(code) = self.code_part.read().clone() else {
            return Ok(None);
        };
        let mut hex = code.to_hex();
        if self.is_stateful() {
            hex.push_str(&format!("{OP_RETURN:02x}"));
            hex.push_str(&state::build_state_hex(
                &self.state_args.read(),
                *self.is_genesis.read(),
                &self.resolver,
            )?);
        } else if let Some(data) = self.data_part.read().as_ref() {
            hex.push_str(&format!("{OP_RETURN:02x}"));
            hex.push_str(data);
        }
        Ok(Some(hex))
    }

    pub fn set_verifier(&self, verifier: Box<dyn ScriptVerifier + Send + Sync>) {
        *self.verifier.write() = Some(verifier);
    }

    pub(crate) fn run_verify(
        &self,
        unlocking: &Script,
        options: &VerifyOptions,
    ) -> Result<VerifyResult> {
        let locking = self.locking_script_hex()?.ok_or_else(|| {
            AbiError::Config(format!(
                "contract '{}' has no locking script bound",
                self.name
            ))
        })?;
        self.verify_scripts(&locking, unlocking, options)
    }

    pub(crate) fn verify_scripts(
        &self,
        locking_hex: &str,
        unlocking: &Script,
        options: &VerifyOptions,
    ) -> Result<VerifyResult> {
        let verifier = self.verifier.read();
        let verifier = verifier.as_ref().ok_or_else(|| {
            AbiError::Config(format!(
                "no script verifier configured for contract '{}'",
                self.name
            ))
        })?;
        Ok(verifier.verify(locking_hex, unlocking, options))
    }
}
