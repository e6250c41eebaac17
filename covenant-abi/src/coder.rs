//! Constructor and public function call encoding
//!
//! The coder is the crate's front door. Encoding a constructor call
//! substitutes argument chunks into the code template and binds the
//! result (plus state, for stateful contracts) to the `Contract`
//! instance; decoding recovers arguments from a deployed locking script
//! by walking it against the template. Public function calls become
//! unlocking scripts: the flattened argument chunks in declaration
//! order, with a trailing selector push when the contract has more than
//! two public functions.

use indexmap::IndexMap;
use num_traits::ToPrimitive;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

use covenant_script::hexutil::decode_hex;
use covenant_script::num::{chunk_to_bignum, push_int};
use covenant_script::Script;

use crate::contract::{Contract, VerifyOptions, VerifyResult};
use crate::entities::{AbiEntity, ParamEntity};
use crate::error::{AbiError, Result};
use crate::flatten::{self, FlattenOptions};
use crate::scalar;
use crate::state;
use crate::template;
use crate::value::{Argument, Arguments, Value};

/// Placeholder stateful templates use for the spot where the script's
/// own code part hash is later committed.
const CODE_PART_SLOT: &str = "<__codePart__>";

/// One encoded call, holding exactly one of the two script sides: a
/// constructor call carries the locking script, a public function call
/// the unlocking script. The missing side can be bound once, later.
pub struct FunctionCall {
    method_name: String,
    contract: Arc<Contract>,
    args: Arguments,
    unlocking_script: Option<Script>,
    locking_script: RwLock<Option<String>>,
}

impl FunctionCall {
    fn new(
        method_name: impl Into<String>,
        contract: Arc<Contract>,
        args: Arguments,
        unlocking_script: Option<Script>,
        locking_hex: Option<String>,
    ) -> Result<Self> {
        let method_name = method_name.into();
        match (&unlocking_script, &locking_hex) {
            (None, None) => {
                return Err(AbiError::Config(format!(
                    "call to '{method_name}' carries neither script side"
                )))
            }
            (Some(_), Some(_)) => {
                return Err(AbiError::Config(format!(
                    "call to '{method_name}' carries both script sides"
                )))
            }
            _ => {}
        }
        Ok(Self {
            method_name,
            contract,
            args,
            unlocking_script,
            locking_script: RwLock::new(locking_hex),
        })
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn args(&self) -> &Arguments {
        &self.args
    }

    pub fn unlocking_script(&self) -> Option<&Script> {
        self.unlocking_script.as_ref()
    }

    pub fn locking_script_hex(&self) -> Option<String> {
        self.locking_script.read().clone()
    }

    /// The hex of whichever script side this call carries.
    pub fn to_hex(&self) -> String {
        match self.unlocking_script.as_ref() {
            Some(script) => script.to_hex(),
            None => self.locking_script.read().clone().unwrap_or_default(),
        }
    }

    /// Attach the locking script a public function call spends. One-shot;
    /// rebinding is a config error, as is binding on a constructor call.
    pub fn bind_locking_script(&self, locking_hex: &str) -> Result<()> {
        let mut slot = self.locking_script.write();
        if slot.is_some() {
            return Err(AbiError::Config(format!(
                "call to '{}' already has a locking script",
                self.method_name
            )));
        }
        decode_hex(locking_hex)?;
        *slot = Some(locking_hex.to_lowercase());
        Ok(())
    }

    /// Run the contract's verifier over this call.
    pub fn verify(&self, options: &VerifyOptions) -> Result<VerifyResult> {
        let unlocking = self.unlocking_script.as_ref().ok_or_else(|| {
            AbiError::Config(format!(
                "constructor call to '{}' cannot be verified",
                self.method_name
            ))
        })?;
        match self.locking_script.read().clone() {
            Some(locking) => self.contract.verify_scripts(&locking, unlocking, options),
            None => self.contract.run_verify(unlocking, options),
        }
    }
}

impl fmt::Debug for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCall")
            .field("method_name", &self.method_name)
            .field("contract", &self.contract.name())
            .field("args", &self.args)
            .field("unlocking_script", &self.unlocking_script)
            .field("locking_script", &*self.locking_script.read())
            .finish()
    }
}

/// Encoder/decoder for one contract instance.
pub struct AbiCoder {
    contract: Arc<Contract>,
}

impl AbiCoder {
    pub fn new(contract: Arc<Contract>) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    fn constructor_params(&self) -> Vec<ParamEntity> {
        self.contract
            .constructor()
            .map(|e| e.params.clone())
            .unwrap_or_default()
    }

    /// Encode a constructor call and bind the resulting code part (and
    /// initial state) to the contract instance.
    ///
    /// Templates with inline assembly variables need them bound through
    /// `Contract::set_inline_asm_var` first; an unbound variable fails
    /// the build.
    pub fn encode_constructor_call(&self, values: &[Value]) -> Result<FunctionCall> {
        let contract = &self.contract;
        debug!(contract = contract.name(), "encoding constructor call");
        let params = self.constructor_params();
        let args = contract.check_args("constructor", &params, values)?;
        let template = contract.code_template().to_string();

        let mut template_args: IndexMap<String, String> = IndexMap::new();
        for arg in &args {
            for leaf in flatten::flatten(arg, contract.resolver(), FlattenOptions::default())? {
                let key = format!("<{}>", leaf.name);
                if !template.contains(&key) {
                    return Err(AbiError::Lookup {
                        contract: contract.name().to_string(),
                        kind: "placeholder",
                        name: key,
                    });
                }
                template_args.insert(key, scalar::to_chunk(&leaf.value, &leaf.ty)?.to_hex());
            }
        }
        if template.contains(CODE_PART_SLOT) {
            // stand-in until the real code part commitment exists
            template_args.insert(CODE_PART_SLOT.to_string(), "00".to_string());
        }

        let placeholders = template.matches('<').count();
        contract
            .has_inline_asm_vars
            .store(placeholders > template_args.len(), Ordering::Relaxed);

        let code = template::build_contract_code(
            &template_args,
            &contract.inline_asm_args.read(),
            &template,
        )?;
        *contract.template_args.write() = template_args;
        *contract.code_part.write() = Some(code);

        if contract.is_stateful() {
            let mut state_args =
                state::default_state_args(contract.state_props(), contract.resolver())?;
            for state_arg in &mut state_args {
                if let Some(bound) = args.iter().find(|a| a.name == state_arg.name) {
                    state_arg.value = bound.value.clone();
                }
            }
            *contract.state_args.write() = state_args;
            *contract.is_genesis.write() = true;
        }

        let locking = contract.locking_script_hex()?.ok_or_else(|| {
            AbiError::Config(format!(
                "contract '{}' failed to bind its code part",
                contract.name()
            ))
        })?;
        FunctionCall::new("constructor", contract.clone(), args, None, Some(locking))
    }

    /// Recover a constructor call from a deployed locking script,
    /// binding captured chunks, state and data part to the contract
    /// instance.
    pub fn decode_constructor_call(&self, script_hex: &str) -> Result<FunctionCall> {
        let contract = &self.contract;
        debug!(contract = contract.name(), "decoding constructor call");
        let bytes = decode_hex(script_hex)?;
        let matched = template::match_script(contract.name(), contract.code_template(), &bytes)?;

        contract
            .has_inline_asm_vars
            .store(!matched.inline_asm.is_empty(), Ordering::Relaxed);
        *contract.code_part.write() = Some(Script::from_bytes(&bytes[..matched.code_len])?);

        let mut args = Vec::with_capacity(self.constructor_params().len());
        for param in self.constructor_params() {
            args.push(self.decode_param(&param, &matched.args)?);
        }
        *contract.template_args.write() = matched.args;
        *contract.inline_asm_args.write() = matched.inline_asm;

        if contract.is_stateful() {
            let data_hex = matched
                .data_part
                .as_deref()
                .map(covenant_script::hexutil::encode_hex)
                .ok_or_else(|| {
                    AbiError::Encoding(format!(
                        "stateful contract '{}' script has no data part",
                        contract.name()
                    ))
                })?;
            let (is_genesis, state_args) =
                state::parse_state_hex(contract.state_props(), contract.resolver(), &data_hex)?;
            *contract.is_genesis.write() = is_genesis;
            *contract.state_args.write() = state_args;
        } else {
            *contract.data_part.write() = matched
                .data_part
                .as_deref()
                .map(covenant_script::hexutil::encode_hex);
        }

        FunctionCall::new(
            "constructor",
            contract.clone(),
            args,
            None,
            Some(script_hex.to_lowercase()),
        )
    }

    fn decode_param(
        &self,
        param: &ParamEntity,
        captured: &IndexMap<String, String>,
    ) -> Result<Argument> {
        let resolver = self.contract.resolver();
        let shape = flatten::shape_of(&param.name, &param.ty, resolver, false)?;
        let mut leaves = Vec::with_capacity(shape.len());
        for slot in &shape {
            let key = format!("<{}>", slot.name);
            let chunk_hex = captured.get(&key).ok_or_else(|| AbiError::Lookup {
                contract: self.contract.name().to_string(),
                kind: "placeholder",
                name: key,
            })?;
            let script = Script::from_hex(chunk_hex)?;
            let chunk = script.chunks().first().ok_or_else(|| {
                AbiError::Encoding(format!("captured chunk for '{}' is empty", slot.name))
            })?;
            leaves.push(Argument::new(
                slot.name.clone(),
                slot.ty.clone(),
                scalar::from_chunk(chunk, &slot.ty)?,
            ));
        }
        flatten::unflatten(&leaves, &param.name, &param.ty, resolver, false)
    }

    /// Encode a public function call into its unlocking script.
    pub fn encode_function_call(&self, name: &str, values: &[Value]) -> Result<FunctionCall> {
        let contract = &self.contract;
        debug!(contract = contract.name(), function = name, "encoding function call");
        let entity = contract.function(name)?.clone();
        let args = contract.check_args(&format!("function '{name}'"), &entity.params, values)?;

        let mut chunks = Vec::new();
        for arg in &args {
            for leaf in flatten::flatten(arg, contract.resolver(), FlattenOptions::default())? {
                chunks.push(scalar::to_chunk(&leaf.value, &leaf.ty)?);
            }
        }
        if contract.public_function_count() > 2 {
            let index = entity.index.ok_or_else(|| {
                AbiError::Config(format!("function '{name}' has no selector index"))
            })?;
            chunks.push(push_int(i64::from(index))?);
        }
        FunctionCall::new(
            name,
            contract.clone(),
            args,
            Some(Script::from_chunks(chunks)),
            None,
        )
    }

    /// Recover a public function call from an unlocking script.
    ///
    /// With one public function the call is implicit. With exactly two
    /// there is no selector, so the functions are told apart by their
    /// flattened argument count; a tie is unresolvable. With three or
    /// more the last chunk is the selector.
    pub fn decode_function_call(&self, unlocking_hex: &str) -> Result<FunctionCall> {
        let contract = &self.contract;
        debug!(contract = contract.name(), "decoding function call");
        let script = Script::from_hex(unlocking_hex)?;
        let chunks = script.chunks();
        let functions: Vec<AbiEntity> = contract.public_functions().cloned().collect();

        let (entity, arg_chunks) = match functions.len() {
            0 => {
                return Err(AbiError::Config(format!(
                    "contract '{}' has no public functions",
                    contract.name()
                )))
            }
            1 => (functions[0].clone(), chunks),
            2 => {
                let mut matching = Vec::new();
                for f in &functions {
                    if self.leaf_count(f)? == chunks.len() {
                        matching.push(f.clone());
                    }
                }
                match matching.len() {
                    1 => (matching.remove(0), chunks),
                    0 => {
                        return Err(AbiError::Lookup {
                            contract: contract.name().to_string(),
                            kind: "function",
                            name: format!("taking {} argument chunks", chunks.len()),
                        })
                    }
                    _ => {
                        return Err(AbiError::Config(format!(
                            "contract '{}': two public functions take {} argument chunks, \
                             the call is ambiguous",
                            contract.name(),
                            chunks.len()
                        )))
                    }
                }
            }
            _ => {
                let selector_chunk = chunks.last().ok_or_else(|| {
                    AbiError::Encoding("unlocking script is empty".to_string())
                })?;
                let selector = chunk_to_bignum(selector_chunk)?
                    .to_u32()
                    .ok_or_else(|| AbiError::Encoding("selector out of range".to_string()))?;
                let entity = functions
                    .iter()
                    .find(|f| f.index == Some(selector))
                    .cloned()
                    .ok_or_else(|| AbiError::Lookup {
                        contract: contract.name().to_string(),
                        kind: "function",
                        name: format!("selector {selector}"),
                    })?;
                (entity, &chunks[..chunks.len() - 1])
            }
        };

        let name = entity.name.clone().unwrap_or_default();
        let mut args = Vec::with_capacity(entity.params.len());
        let mut cursor = 0usize;
        for param in &entity.params {
            let shape = flatten::shape_of(&param.name, &param.ty, contract.resolver(), false)?;
            if cursor + shape.len() > arg_chunks.len() {
                return Err(AbiError::ArityMismatch {
                    contract: contract.name().to_string(),
                    context: format!("unlocking script of '{name}'"),
                    expected: cursor + shape.len(),
                    actual: arg_chunks.len(),
                });
            }
            let mut leaves = Vec::with_capacity(shape.len());
            for (slot, chunk) in shape.iter().zip(&arg_chunks[cursor..cursor + shape.len()]) {
                leaves.push(Argument::new(
                    slot.name.clone(),
                    slot.ty.clone(),
                    scalar::from_chunk(chunk, &slot.ty)?,
                ));
            }
            cursor += shape.len();
            args.push(flatten::unflatten(
                &leaves,
                &param.name,
                &param.ty,
                contract.resolver(),
                false,
            )?);
        }
        if cursor != arg_chunks.len() {
            return Err(AbiError::ArityMismatch {
                contract: contract.name().to_string(),
                context: format!("unlocking script of '{name}'"),
                expected: cursor,
                actual: arg_chunks.len(),
            });
        }

        FunctionCall::new(name, contract.clone(), args, Some(script.clone()), None)
    }

    fn leaf_count(&self, entity: &AbiEntity) -> Result<usize> {
        let mut count = 0usize;
        for param in &entity.params {
            count +=
                flatten::shape_of(&param.name, &param.ty, self.contract.resolver(), false)?.len();
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ContractDescriptor;
    use crate::value::struct_value;
    use pretty_assertions::assert_eq;

    fn coder(json: &str) -> AbiCoder {
        let descriptor: ContractDescriptor = serde_json::from_str(json).unwrap();
        AbiCoder::new(Arc::new(Contract::new(&descriptor)))
    }

    fn demo_coder() -> AbiCoder {
        coder(
            r#"{
            "contract": "Demo",
            "hex": "76<p.x><p.y>8791",
            "abi": [
                {"type": "constructor", "params": [{"name": "p", "type": "Point"}]},
                {"type": "function", "name": "unlock", "index": 0,
                 "params": [{"name": "x", "type": "int"}]}
            ],
            "structs": [
                {"name": "Point", "params": [
                    {"name": "x", "type": "int"},
                    {"name": "y", "type": "int"}
                ]}
            ]
        }"#,
        )
    }

    fn point(x: i64, y: i64) -> Value {
        struct_value([("x", Value::Int(x)), ("y", Value::Int(y))])
    }

    #[test]
    fn constructor_encode_then_decode() {
        let coder = demo_coder();
        let call = coder.encode_constructor_call(&[point(5, -7)]).unwrap();
        // 5 is the OP_5 shortcut, -7 a sign-magnitude push
        assert_eq!(call.to_hex(), "765501878791");

        let other = demo_coder();
        let decoded = other.decode_constructor_call(&call.to_hex()).unwrap();
        assert_eq!(decoded.args()[0].value, point(5, -7));
        assert_eq!(
            other.contract().locking_script_hex().unwrap().as_deref(),
            Some("765501878791")
        );
    }

    #[test]
    fn unknown_placeholder_is_a_lookup_error() {
        let coder = coder(
            r#"{
            "contract": "Demo",
            "hex": "76<y>87",
            "abi": [
                {"type": "constructor", "params": [{"name": "x", "type": "int"}]}
            ]
        }"#,
        );
        assert!(matches!(
            coder.encode_constructor_call(&[Value::Int(1)]),
            Err(AbiError::Lookup {
                kind: "placeholder",
                ..
            })
        ));
    }

    #[test]
    fn single_function_call_round_trip() {
        let coder = demo_coder();
        coder.encode_constructor_call(&[point(1, 2)]).unwrap();
        let call = coder.encode_function_call("unlock", &[Value::Int(300)]).unwrap();
        // no selector with a single public function
        assert_eq!(call.to_hex(), "022c01");

        let decoded = coder.decode_function_call(&call.to_hex()).unwrap();
        assert_eq!(decoded.method_name(), "unlock");
        assert_eq!(decoded.args()[0].value, Value::Int(300));
    }

    #[test]
    fn surplus_chunks_are_an_arity_mismatch() {
        let coder = demo_coder();
        assert!(matches!(
            coder.decode_function_call("01050106"),
            Err(AbiError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn selector_appended_with_three_functions() {
        let coder = coder(
            r#"{
            "contract": "Multi",
            "hex": "51",
            "abi": [
                {"type": "constructor", "params": []},
                {"type": "function", "name": "a", "index": 0,
                 "params": [{"name": "x", "type": "int"}]},
                {"type": "function", "name": "b", "index": 1,
                 "params": [{"name": "x", "type": "int"}]},
                {"type": "function", "name": "c", "index": 2,
                 "params": [{"name": "x", "type": "bool"}]}
            ]
        }"#,
        );
        let call = coder.encode_function_call("b", &[Value::Int(9)]).unwrap();
        // OP_9 argument, then OP_1 selector
        assert_eq!(call.to_hex(), "5951");

        let decoded = coder.decode_function_call("5951").unwrap();
        assert_eq!(decoded.method_name(), "b");
        assert_eq!(decoded.args()[0].value, Value::Int(9));

        assert!(matches!(
            coder.decode_function_call("010960"),
            Err(AbiError::Lookup {
                kind: "function",
                ..
            })
        ));
    }

    #[test]
    fn two_functions_disambiguate_by_arity() {
        let coder = coder(
            r#"{
            "contract": "Duo",
            "hex": "51",
            "abi": [
                {"type": "constructor", "params": []},
                {"type": "function", "name": "one", "index": 0,
                 "params": [{"name": "x", "type": "int"}]},
                {"type": "function", "name": "two", "index": 1,
                 "params": [{"name": "x", "type": "int"}, {"name": "y", "type": "int"}]}
            ]
        }"#,
        );
        // no trailing selector either way
        let call = coder
            .encode_function_call("two", &[Value::Int(1), Value::Int(2)])
            .unwrap();
        assert_eq!(call.to_hex(), "5152");

        assert_eq!(coder.decode_function_call("0105").unwrap().method_name(), "one");
        assert_eq!(
            coder.decode_function_call("01050106").unwrap().method_name(),
            "two"
        );
    }

    #[test]
    fn ambiguous_two_function_decode_fails() {
        let coder = coder(
            r#"{
            "contract": "Duo",
            "hex": "51",
            "abi": [
                {"type": "constructor", "params": []},
                {"type": "function", "name": "one", "index": 0,
                 "params": [{"name": "x", "type": "int"}]},
                {"type": "function", "name": "uno", "index": 1,
                 "params": [{"name": "y", "type": "bool"}]}
            ]
        }"#,
        );
        assert!(matches!(
            coder.decode_function_call("0105"),
            Err(AbiError::Config(_))
        ));
    }

    #[test]
    fn function_call_script_sides_are_exclusive() {
        let coder = demo_coder();
        let ctor = coder.encode_constructor_call(&[point(1, 2)]).unwrap();
        assert!(ctor.unlocking_script().is_none());
        assert!(ctor.locking_script_hex().is_some());
        assert!(matches!(
            ctor.bind_locking_script("00"),
            Err(AbiError::Config(_))
        ));
        assert!(matches!(
            ctor.verify(&VerifyOptions::default()),
            Err(AbiError::Config(_))
        ));

        let call = coder.encode_function_call("unlock", &[Value::Int(1)]).unwrap();
        assert!(call.locking_script_hex().is_none());
        call.bind_locking_script("76AA").unwrap();
        assert_eq!(call.locking_script_hex().as_deref(), Some("76aa"));
        assert!(matches!(
            call.bind_locking_script("76aa"),
            Err(AbiError::Config(_))
        ));
    }

    #[test]
    fn calls_render_debug_output() {
        let call = demo_coder().encode_constructor_call(&[point(1, 2)]).unwrap();
        let rendered = format!("{call:?}");
        assert!(rendered.contains("constructor"));
        assert!(rendered.contains("Demo"));
    }

    #[test]
    fn code_part_slot_does_not_flag_inline_asm() {
        let coder = coder(
            r#"{
            "contract": "Demo",
            "hex": "<x><__codePart__>",
            "abi": [
                {"type": "constructor", "params": [{"name": "x", "type": "int"}]}
            ]
        }"#,
        );
        let call = coder.encode_constructor_call(&[Value::Int(1)]).unwrap();
        // the slot resolves to a single zero byte
        assert_eq!(call.to_hex(), "5100");
        assert!(!coder.contract().has_inline_asm_vars());
    }

    #[test]
    fn state_props_not_set_by_the_constructor_keep_defaults() {
        let coder = coder(
            r#"{
            "contract": "Vault",
            "hex": "<owner>ac",
            "abi": [
                {"type": "constructor", "params": [{"name": "owner", "type": "PubKey"}]},
                {"type": "function", "name": "spend", "index": 0, "params": []}
            ],
            "stateProps": [{"name": "spent", "type": "bool"}]
        }"#,
        );
        let call = coder
            .encode_constructor_call(&[Value::Bytes(vec![0x02; 33])])
            .unwrap();
        assert_eq!(coder.contract().state_args()[0].value, Value::Bool(false));
        // spent=false, genesis, payload length 3, version 0
        assert!(call.to_hex().ends_with("6a0100010300000000"));
    }

    #[test]
    fn stateful_locking_script_and_recovery() {
        let json = r#"{
            "contract": "Counter",
            "hex": "<counter>75",
            "abi": [
                {"type": "constructor", "params": [{"name": "counter", "type": "int"}]},
                {"type": "function", "name": "increment", "index": 0, "params": []}
            ],
            "stateProps": [{"name": "counter", "type": "int"}]
        }"#;
        let coder = coder(json);
        let call = coder.encode_constructor_call(&[Value::Int(3)]).unwrap();
        // code OP_3 OP_DROP, then OP_RETURN, then counter=3, genesis,
        // payload length 3, version 0
        assert_eq!(call.to_hex(), "53756a0103010300000000");

        let fresh = {
            let descriptor: ContractDescriptor = serde_json::from_str(json).unwrap();
            AbiCoder::new(Arc::new(Contract::new(&descriptor)))
        };
        let decoded = fresh.decode_constructor_call(&call.to_hex()).unwrap();
        assert_eq!(decoded.args()[0].value, Value::Int(3));
        assert!(fresh.contract().is_genesis());
        assert_eq!(fresh.contract().state_args()[0].value, Value::Int(3));

        // advancing state drops the genesis flag and re-renders
        fresh.contract().set_state_arg("counter", Value::Int(4)).unwrap();
        assert!(!fresh.contract().is_genesis());
        assert_eq!(
            fresh.contract().locking_script_hex().unwrap().as_deref(),
            Some("53756a0104010300000000")
        );
    }
}
