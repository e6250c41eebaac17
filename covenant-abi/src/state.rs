//! Versioned state data part of stateful contracts
//!
//! A stateful contract's locking script carries its mutable properties
//! behind the code-terminating `OP_RETURN`:
//!
//! ```text
//! [prop push chunks] [genesis flag byte] [payload length u32 LE] [version byte]
//! ```
//!
//! The payload length covers the prop chunks plus the genesis flag, so a
//! reader can locate the state part from the end of the script without
//! parsing the code. Only version 0 exists; anything else is rejected.

use byteorder::{ByteOrder, LittleEndian};

use covenant_script::hexutil::{decode_hex, encode_hex};
use covenant_script::num::encode_bignum;
use covenant_script::{Script, ScriptChunk};

use crate::entities::ParamEntity;
use crate::error::{AbiError, Result};
use crate::flatten::{self, FlattenOptions};
use crate::resolver::{SymbolKind, TypeResolver};
use crate::scalar::{self, ScalarKind};
use crate::typeexpr;
use crate::value::{Argument, Arguments, Value};
use indexmap::IndexMap;

pub const STATE_VERSION: u8 = 0;

/// Serialize state arguments into the data-part hex.
///
/// State leaves are always data pushes, never the single-byte integer
/// opcodes, so on-chain code can read them back as raw bytes.
pub fn build_state_hex(
    args: &Arguments,
    is_genesis: bool,
    resolver: &TypeResolver,
) -> Result<String> {
    let mut payload = Vec::new();
    for arg in args {
        for leaf in flatten::flatten(arg, resolver, FlattenOptions::state(true))? {
            state_leaf_chunk(&leaf)?.write_to(&mut payload);
        }
    }
    payload.push(u8::from(is_genesis));
    let mut tail = [0u8; 5];
    LittleEndian::write_u32(&mut tail[..4], payload.len() as u32);
    tail[4] = STATE_VERSION;
    payload.extend_from_slice(&tail);
    Ok(encode_hex(&payload))
}

fn state_leaf_chunk(leaf: &Argument) -> Result<ScriptChunk> {
    let kind = scalar::scalar_kind(&leaf.ty).ok_or_else(|| {
        AbiError::Encoding(format!("'{}' is not a scalar type", leaf.ty))
    })?;
    let bytes = match (kind, &leaf.value) {
        (ScalarKind::Int, _) => encode_bignum(&leaf.value.to_bigint()?),
        (ScalarKind::Bool, Value::Bool(b)) => vec![u8::from(*b)],
        (ScalarKind::Bytes, Value::Bytes(data)) => data.clone(),
        (_, other) => {
            return Err(AbiError::Encoding(format!(
                "cannot encode {} as state '{}'",
                other.kind_name(),
                leaf.ty
            )))
        }
    };
    Ok(ScriptChunk::push_data(bytes)?)
}

/// Parse a data-part hex back into the genesis flag and the structured
/// state arguments.
pub fn parse_state_hex(
    state_props: &[ParamEntity],
    resolver: &TypeResolver,
    data_part_hex: &str,
) -> Result<(bool, Arguments)> {
    let bytes = decode_hex(data_part_hex)?;
    if bytes.len() < 6 {
        return Err(AbiError::Encoding(format!(
            "state data part of {} bytes is too short",
            bytes.len()
        )));
    }
    let version = bytes[bytes.len() - 1];
    if version != STATE_VERSION {
        return Err(AbiError::UnsupportedVersion { version });
    }
    let declared = LittleEndian::read_u32(&bytes[bytes.len() - 5..bytes.len() - 1]) as usize;
    let payload = &bytes[..bytes.len() - 5];
    if declared != payload.len() {
        return Err(AbiError::Encoding(format!(
            "state payload length {} disagrees with declared {declared}",
            payload.len()
        )));
    }
    let is_genesis = match payload[payload.len() - 1] {
        0 => false,
        1 => true,
        other => {
            return Err(AbiError::Encoding(format!(
                "invalid genesis flag byte {other:#04x}"
            )))
        }
    };
    let props_script = Script::from_bytes(&payload[..payload.len() - 1])?;
    let chunks = props_script.chunks();

    let mut args = Vec::with_capacity(state_props.len());
    let mut cursor = 0usize;
    for prop in state_props {
        let shape = flatten::shape_of(&prop.name, &prop.ty, resolver, true)?;
        if cursor + shape.len() > chunks.len() {
            return Err(AbiError::ArityMismatch {
                contract: resolver.contract_name().to_string(),
                context: "state data part".into(),
                expected: cursor + shape.len(),
                actual: chunks.len(),
            });
        }
        let mut leaves = Vec::with_capacity(shape.len());
        for (slot, chunk) in shape.iter().zip(&chunks[cursor..cursor + shape.len()]) {
            leaves.push(Argument::new(
                slot.name.clone(),
                slot.ty.clone(),
                scalar::from_chunk(chunk, &slot.ty)?,
            ));
        }
        cursor += shape.len();
        args.push(flatten::unflatten(&leaves, &prop.name, &prop.ty, resolver, true)?);
    }
    if cursor != chunks.len() {
        return Err(AbiError::ArityMismatch {
            contract: resolver.contract_name().to_string(),
            context: "state data part".into(),
            expected: cursor,
            actual: chunks.len(),
        });
    }
    Ok((is_genesis, args))
}

/// The all-zero value of a type: 0, false, empty bytes, recursively.
pub fn default_value(resolver: &TypeResolver, ty: &str) -> Result<Value> {
    let descriptor = resolver.resolve(ty)?;
    match descriptor.symbol_kind {
        SymbolKind::Scalar => {
            let kind = scalar::scalar_kind(&descriptor.final_type).ok_or_else(|| {
                AbiError::Encoding(format!("'{}' is not a scalar type", descriptor.final_type))
            })?;
            Ok(match kind {
                ScalarKind::Int => Value::Int(0),
                ScalarKind::Bool => Value::Bool(false),
                ScalarKind::Bytes => Value::Bytes(Vec::new()),
            })
        }
        SymbolKind::Array => {
            let (elem, dims) = typeexpr::split_array(&descriptor.final_type)?
                .ok_or_else(|| AbiError::ShapeMismatch {
                    ty: descriptor.final_type.clone(),
                    detail: "array type without dimensions".into(),
                })?;
            let elem_ty = format!("{elem}{}", typeexpr::dims_suffix(&dims[1..]));
            let item = default_value(resolver, &elem_ty)?;
            Ok(Value::Array(vec![item; dims[0]]))
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
            if descriptor.is_generic && typeexpr::parse_generic(&descriptor.final_type).is_none() {
                return Err(AbiError::TypeMismatch {
                    name: declaration.name.clone(),
                    expected: "an instantiated generic type".into(),
                    actual: "a bare generic name has no default".into(),
                });
            }
            let bindings: Vec<(String, String)> =
                match typeexpr::parse_generic(&descriptor.final_type) {
                    Some((_, args)) => declaration
                        .generic_params
                        .iter()
                        .cloned()
                        .zip(args.iter().map(|a| a.to_string()))
                        .collect(),
                    None => Vec::new(),
                };
            let members = if descriptor.symbol_kind == SymbolKind::Library {
                &declaration.properties
            } else {
                &declaration.params
            };
            let mut map = IndexMap::new();
            for member in members {
                let member_ty = typeexpr::substitute(&member.ty, &bindings);
                map.insert(member.name.clone(), default_value(resolver, &member_ty)?);
            }
            Ok(Value::Struct(map))
        }
    }
}

/// Default arguments for every declared state property, used before the
/// constructor overwrites the ones it initializes.
pub fn default_state_args(
    state_props: &[ParamEntity],
    resolver: &TypeResolver,
) -> Result<Arguments> {
    state_props
        .iter()
        .map(|prop| {
            default_value(resolver, &prop.ty)
                .map(|value| Argument::new(prop.name.clone(), prop.ty.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::StructEntity;
    use crate::value::struct_value;
    use pretty_assertions::assert_eq;

    fn resolver() -> TypeResolver {
        TypeResolver::new(
            "Counter",
            &[StructEntity {
                name: "Point".into(),
                params: vec![
                    ParamEntity::new("x", "int"),
                    ParamEntity::new("y", "int"),
                ],
                generic_types: vec![],
            }],
            &[],
            &[],
        )
    }

    fn props() -> Vec<ParamEntity> {
        vec![
            ParamEntity::new("counter", "int"),
            ParamEntity::new("flag", "bool"),
            ParamEntity::new("tag", "bytes"),
        ]
    }

    fn args() -> Arguments {
        vec![
            Argument::new("counter", "int", Value::Int(11)),
            Argument::new("flag", "bool", Value::Bool(true)),
            Argument::new("tag", "bytes", Value::Bytes(vec![0xde, 0xad])),
        ]
    }

    #[test]
    fn layout_of_the_data_part() {
        let hex = build_state_hex(&args(), true, &resolver()).unwrap();
        // 010b | 0101 | 02dead | 01 genesis | 08000000 len | 00 version
        assert_eq!(hex, "010b010102dead010800000000");
    }

    #[test]
    fn round_trip() {
        let r = resolver();
        let hex = build_state_hex(&args(), false, &r).unwrap();
        let (genesis, parsed) = parse_state_hex(&props(), &r, &hex).unwrap();
        assert!(!genesis);
        assert_eq!(parsed, args());
    }

    #[test]
    fn structured_state_round_trip() {
        let r = resolver();
        let props = vec![ParamEntity::new("p", "Point")];
        let args = vec![Argument::new(
            "p",
            "Point",
            struct_value([("x", Value::Int(3)), ("y", Value::Int(-4))]),
        )];
        let hex = build_state_hex(&args, true, &r).unwrap();
        let (genesis, parsed) = parse_state_hex(&props, &r, &hex).unwrap();
        assert!(genesis);
        assert_eq!(parsed[0].value, args[0].value);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let r = resolver();
        let mut hex = build_state_hex(&args(), true, &r).unwrap();
        hex.replace_range(hex.len() - 2.., "07");
        assert!(matches!(
            parse_state_hex(&props(), &r, &hex),
            Err(AbiError::UnsupportedVersion { version: 7 })
        ));
    }

    #[test]
    fn wrong_prop_count_is_an_arity_error() {
        let r = resolver();
        let hex = build_state_hex(&args(), true, &r).unwrap();
        let mut fewer = props();
        fewer.pop();
        assert!(matches!(
            parse_state_hex(&fewer, &r, &hex),
            Err(AbiError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn corrupt_length_is_rejected() {
        let r = resolver();
        let hex = build_state_hex(&args(), true, &r).unwrap();
        let mut bytes = decode_hex(&hex).unwrap();
        let at = bytes.len() - 5;
        bytes[at] ^= 0x01;
        assert!(matches!(
            parse_state_hex(&props(), &r, &encode_hex(&bytes)),
            Err(AbiError::Encoding(_))
        ));
    }

    #[test]
    fn defaults_are_all_zero() {
        let r = resolver();
        let defaults = default_state_args(&props(), &r).unwrap();
        assert_eq!(defaults[0].value, Value::Int(0));
        assert_eq!(defaults[1].value, Value::Bool(false));
        assert_eq!(defaults[2].value, Value::Bytes(vec![]));
        assert_eq!(
            default_value(&r, "Point").unwrap(),
            struct_value([("x", Value::Int(0)), ("y", Value::Int(0))])
        );
    }
}
