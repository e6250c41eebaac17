//! Flattening structured arguments into ordered scalar leaves
//!
//! Encoding walks a value depth-first and emits one leaf per scalar, in
//! declaration order, with dotted/bracketed path names (`p.coords[1].x`).
//! Decoding rebuilds the structured value from the same ordered leaf
//! sequence.

use crate::error::{AbiError, Result};
use crate::resolver::{SymbolKind, TypeResolver};
use crate::typeexpr;
use crate::value::{Argument, Arguments, Value};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenOptions {
    /// Use library `properties` instead of constructor `params` as the
    /// member shape. State storage persists properties, calls pass params.
    pub as_state: bool,
    /// Walk only the type structure, emitting placeholder values. Used to
    /// enumerate leaf names and count leaves before any value exists.
    pub ignore_value: bool,
}

impl FlattenOptions {
    pub fn state(as_state: bool) -> Self {
        Self {
            as_state,
            ignore_value: false,
        }
    }

    pub fn shape_only(as_state: bool) -> Self {
        Self {
            as_state,
            ignore_value: true,
        }
    }
}

/// Flatten one argument into its ordered scalar leaves.
pub fn flatten(
    arg: &Argument,
    resolver: &TypeResolver,
    options: FlattenOptions,
) -> Result<Arguments> {
    let mut leaves = Vec::new();
    flatten_into(&arg.name, &arg.ty, &arg.value, resolver, options, &mut leaves)?;
    Ok(leaves)
}

fn flatten_into(
    name: &str,
    ty: &str,
    value: &Value,
    resolver: &TypeResolver,
    options: FlattenOptions,
    out: &mut Arguments,
) -> Result<()> {
    let descriptor = resolver.resolve(ty)?;
    match descriptor.symbol_kind {
        SymbolKind::Array => {
            let (elem, dims) = typeexpr::split_array(&descriptor.final_type)?
                .ok_or_else(|| AbiError::ShapeMismatch {
                    ty: descriptor.final_type.clone(),
                    detail: "array type without dimensions".into(),
                })?;
            let elem_ty = format!("{elem}{}", typeexpr::dims_suffix(&dims[1..]));
            if options.ignore_value {
                for i in 0..dims[0] {
                    flatten_into(
                        &format!("{name}[{i}]"),
                        &elem_ty,
                        value,
                        resolver,
                        options,
                        out,
                    )?;
                }
            } else {
                let Value::Array(items) = value else {
                    return Err(AbiError::ShapeMismatch {
                        ty: descriptor.final_type.clone(),
                        detail: format!("expected an array, got {}", value.kind_name()),
                    });
                };
                if items.len() != dims[0] {
                    return Err(AbiError::ShapeMismatch {
                        ty: descriptor.final_type.clone(),
                        detail: format!("expected {} elements, got {}", dims[0], items.len()),
                    });
                }
                for (i, item) in items.iter().enumerate() {
                    flatten_into(
                        &format!("{name}[{i}]"),
                        &elem_ty,
                        item,
                        resolver,
                        options,
                        out,
                    )?;
                }
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
            let bindings: Vec<(String, String)> =
                if let Some((_, args)) = typeexpr::parse_generic(&descriptor.final_type) {
                    declaration
                        .generic_params
                        .iter()
                        .cloned()
                        .zip(args.iter().map(|a| a.to_string()))
                        .collect()
                } else if descriptor.is_generic {
                    // bare generic name, the concrete arguments must come
                    // from the value itself
                    if options.ignore_value {
                        return Err(AbiError::TypeMismatch {
                            name: declaration.name.clone(),
                            expected: "an instantiated generic type".into(),
                            actual: "a bare generic name without a value".into(),
                        });
                    }
                    let concrete = resolver.deduce_generic(value, declaration)?;
                    declaration
                        .generic_params
                        .iter()
                        .cloned()
                        .zip(concrete)
                        .collect()
                } else {
                    Vec::new()
                };
            let members = if descriptor.symbol_kind == SymbolKind::Library && options.as_state {
                &declaration.properties
            } else {
                &declaration.params
            };
            for member in members {
                let member_ty = typeexpr::substitute(&member.ty, &bindings);
                let member_value = if options.ignore_value {
                    value.clone()
                } else {
                    let Value::Struct(map) = value else {
                        return Err(AbiError::ShapeMismatch {
                            ty: descriptor.final_type.clone(),
                            detail: format!("expected a struct, got {}", value.kind_name()),
                        });
                    };
                    map.get(&member.name)
                        .cloned()
                        .ok_or_else(|| AbiError::ShapeMismatch {
                            ty: descriptor.final_type.clone(),
                            detail: format!("missing member [{}]", member.name),
                        })?
                };
                flatten_into(
                    &format!("{name}.{}", member.name),
                    &member_ty,
                    &member_value,
                    resolver,
                    options,
                    out,
                )?;
            }
        }
        SymbolKind::Scalar => {
            out.push(Argument::new(name, descriptor.final_type, value.clone()));
        }
    }
    Ok(())
}

/// Enumerate the leaf names and resolved types of a parameter without a
/// value. The placeholder leaf values are meaningless.
pub fn shape_of(
    name: &str,
    ty: &str,
    resolver: &TypeResolver,
    as_state: bool,
) -> Result<Arguments> {
    flatten(
        &Argument::new(name, ty, Value::Bool(false)),
        resolver,
        FlattenOptions::shape_only(as_state),
    )
}

/// Rebuild a structured argument from its ordered scalar leaves. The
/// leaves must cover the parameter exactly.
pub fn unflatten(
    leaves: &[Argument],
    name: &str,
    ty: &str,
    resolver: &TypeResolver,
    as_state: bool,
) -> Result<Argument> {
    let mut pos = 0usize;
    let arg = unflatten_at(leaves, &mut pos, name, ty, resolver, as_state)?;
    if pos != leaves.len() {
        return Err(AbiError::ShapeMismatch {
            ty: ty.to_string(),
            detail: format!("{} leaves left over after rebuilding", leaves.len() - pos),
        });
    }
    Ok(arg)
}

fn unflatten_at(
    leaves: &[Argument],
    pos: &mut usize,
    name: &str,
    ty: &str,
    resolver: &TypeResolver,
    as_state: bool,
) -> Result<Argument> {
    let descriptor = resolver.resolve(ty)?;
    match descriptor.symbol_kind {
        SymbolKind::Array => {
            let (elem, dims) = typeexpr::split_array(&descriptor.final_type)?
                .ok_or_else(|| AbiError::ShapeMismatch {
                    ty: descriptor.final_type.clone(),
                    detail: "array type without dimensions".into(),
                })?;
            let elem_ty = format!("{elem}{}", typeexpr::dims_suffix(&dims[1..]));
            let mut items = Vec::with_capacity(dims[0]);
            for i in 0..dims[0] {
                items.push(
                    unflatten_at(
                        leaves,
                        pos,
                        &format!("{name}[{i}]"),
                        &elem_ty,
                        resolver,
                        as_state,
                    )?
                    .value,
                );
            }
            Ok(Argument::new(
                name,
                descriptor.final_type,
                Value::Array(items),
            ))
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
                    actual: "a bare generic name cannot be rebuilt".into(),
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
            let members = if descriptor.symbol_kind == SymbolKind::Library && as_state {
                &declaration.properties
            } else {
                &declaration.params
            };
            let mut map = IndexMap::new();
            for member in members {
                let member_ty = typeexpr::substitute(&member.ty, &bindings);
                let rebuilt = unflatten_at(
                    leaves,
                    pos,
                    &format!("{name}.{}", member.name),
                    &member_ty,
                    resolver,
                    as_state,
                )?;
                map.insert(member.name.clone(), rebuilt.value);
            }
            Ok(Argument::new(
                name,
                descriptor.final_type,
                Value::Struct(map),
            ))
        }
        SymbolKind::Scalar => {
            let leaf = leaves.get(*pos).ok_or_else(|| AbiError::ShapeMismatch {
                ty: descriptor.final_type.clone(),
                detail: format!("ran out of leaves at '{name}'"),
            })?;
            *pos += 1;
            Ok(Argument::new(
                name,
                descriptor.final_type,
                leaf.value.clone(),
            ))
        }
    }
}
