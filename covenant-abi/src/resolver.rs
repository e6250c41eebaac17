//! Type resolution for contract type expressions
//!
//! Resolves any type expression the compiler can emit (aliases, arrays,
//! generic instantiations, structs, libraries) into a canonical
//! descriptor. Resolution is memoized by the exact expression string, so
//! distinct instantiations of one generic never collide. Alias chains
//! carry a visited set and fail with `CyclicType` instead of recursing
//! forever.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::{AliasEntity, ContractDescriptor, LibraryEntity, ParamEntity, StructEntity};
use crate::error::{AbiError, Result};
use crate::scalar::{self, ScalarKind};
use crate::typeexpr;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Scalar,
    Struct,
    Library,
    Array,
}

/// A struct or library declaration. For libraries, `params` are the
/// constructor parameters (the call-argument shape) and `properties` the
/// stored member shape; for structs the two coincide and `properties` is
/// empty.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub params: Vec<ParamEntity>,
    pub properties: Vec<ParamEntity>,
    pub generic_params: Vec<String>,
}

/// Canonical resolution of one type expression.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// The expression with every alias expanded, e.g. `ST0<int>[3]`.
    pub final_type: String,
    pub is_generic: bool,
    pub symbol_kind: SymbolKind,
    pub declaration: Option<Arc<TypeInfo>>,
}

pub struct TypeResolver {
    contract_name: String,
    symbols: HashMap<String, (SymbolKind, Arc<TypeInfo>)>,
    aliases: HashMap<String, String>,
    cache: RwLock<HashMap<String, TypeDescriptor>>,
}

impl TypeResolver {
    pub fn new(
        contract_name: impl Into<String>,
        structs: &[StructEntity],
        libraries: &[LibraryEntity],
        aliases: &[AliasEntity],
    ) -> Self {
        let mut symbols = HashMap::new();
        for s in structs {
            symbols.insert(
                s.name.clone(),
                (
                    SymbolKind::Struct,
                    Arc::new(TypeInfo {
                        name: s.name.clone(),
                        params: s.params.clone(),
                        properties: Vec::new(),
                        generic_params: s.generic_types.clone(),
                    }),
                ),
            );
        }
        for l in libraries {
            symbols.insert(
                l.name.clone(),
                (
                    SymbolKind::Library,
                    Arc::new(TypeInfo {
                        name: l.name.clone(),
                        params: l.params.clone(),
                        properties: l.properties.clone(),
                        generic_params: l.generic_types.clone(),
                    }),
                ),
            );
        }
        Self {
            contract_name: contract_name.into(),
            symbols,
            aliases: aliases
                .iter()
                .map(|a| (a.name.clone(), a.ty.clone()))
                .collect(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_descriptor(descriptor: &ContractDescriptor) -> Self {
        Self::new(
            descriptor.contract.clone(),
            &descriptor.structs,
            &descriptor.libraries,
            &descriptor.aliases,
        )
    }

    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    /// Resolve a type expression to its canonical descriptor.
    pub fn resolve(&self, expr: &str) -> Result<TypeDescriptor> {
        self.resolve_with(expr, &mut Vec::new())
    }

    fn resolve_with(&self, expr: &str, visited: &mut Vec<String>) -> Result<TypeDescriptor> {
        let expr = expr.trim();
        if let Some(hit) = self.cache.read().get(expr) {
            return Ok(hit.clone());
        }
        let descriptor = self.resolve_uncached(expr, visited)?;
        self.cache
            .write()
            .insert(expr.to_string(), descriptor.clone());
        Ok(descriptor)
    }

    fn resolve_uncached(&self, expr: &str, visited: &mut Vec<String>) -> Result<TypeDescriptor> {
        if let Some((elem, dims)) = typeexpr::split_array(expr)? {
            let inner = self.resolve_with(elem, &mut visited.clone())?;
            return Ok(TypeDescriptor {
                final_type: format!("{}{}", inner.final_type, typeexpr::dims_suffix(&dims)),
                is_generic: inner.is_generic,
                symbol_kind: SymbolKind::Array,
                declaration: inner.declaration,
            });
        }

        if let Some((name, args)) = typeexpr::parse_generic(expr) {
            let base = self.resolve_with(name, &mut visited.clone())?;
            let declaration = base.declaration.clone().ok_or_else(|| AbiError::TypeMismatch {
                name: name.to_string(),
                expected: "a struct or library".into(),
                actual: format!("'{}' takes no type arguments", base.final_type),
            })?;
            if args.len() != declaration.generic_params.len() {
                return Err(AbiError::ArityMismatch {
                    contract: self.contract_name.clone(),
                    context: format!("type arguments of '{expr}'"),
                    expected: declaration.generic_params.len(),
                    actual: args.len(),
                });
            }
            let finals = args
                .iter()
                .map(|a| {
                    self.resolve_with(a, &mut visited.clone())
                        .map(|d| d.final_type)
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(TypeDescriptor {
                final_type: typeexpr::to_generic(&declaration.name, &finals),
                is_generic: true,
                symbol_kind: base.symbol_kind,
                declaration: Some(declaration),
            });
        }

        if scalar::scalar_kind(expr).is_some() {
            return Ok(TypeDescriptor {
                final_type: expr.to_string(),
                is_generic: false,
                symbol_kind: SymbolKind::Scalar,
                declaration: None,
            });
        }

        if let Some(target) = self.aliases.get(expr) {
            if visited.iter().any(|seen| seen == expr) {
                visited.push(expr.to_string());
                return Err(AbiError::CyclicType {
                    chain: visited.join(" -> "),
                });
            }
            visited.push(expr.to_string());
            return self.resolve_with(target, visited);
        }

        if let Some((kind, info)) = self.symbols.get(expr) {
            return Ok(TypeDescriptor {
                final_type: expr.to_string(),
                is_generic: !info.generic_params.is_empty(),
                symbol_kind: *kind,
                declaration: Some(info.clone()),
            });
        }

        Err(AbiError::Lookup {
            contract: self.contract_name.clone(),
            kind: "type",
            name: expr.to_string(),
        })
    }

    /// Infer the concrete type arguments of a still-generic declaration
    /// from a runtime value. Fails with `TypeMismatch` when inference is
    /// ambiguous or two occurrences of one parameter disagree.
    pub fn deduce_generic(&self, value: &Value, declaration: &TypeInfo) -> Result<Vec<String>> {
        let Value::Struct(members) = value else {
            return Err(AbiError::TypeMismatch {
                name: declaration.name.clone(),
                expected: declaration.name.clone(),
                actual: format!("got {}", value.kind_name()),
            });
        };
        let mut bindings: Vec<(String, String)> = Vec::new();
        for param in &declaration.params {
            let member = members.get(&param.name).ok_or_else(|| AbiError::TypeMismatch {
                name: declaration.name.clone(),
                expected: declaration.name.clone(),
                actual: format!("missing member [{}]", param.name),
            })?;
            self.unify(&param.ty, member, declaration, &mut bindings)?;
        }
        declaration
            .generic_params
            .iter()
            .map(|p| {
                bindings
                    .iter()
                    .find(|(from, _)| from == p)
                    .map(|(_, to)| to.clone())
                    .ok_or_else(|| AbiError::TypeMismatch {
                        name: declaration.name.clone(),
                        expected: format!("a binding for type parameter '{p}'"),
                        actual: "no member constrains it".into(),
                    })
            })
            .collect()
    }

    fn unify(
        &self,
        declared_ty: &str,
        value: &Value,
        declaration: &TypeInfo,
        bindings: &mut Vec<(String, String)>,
    ) -> Result<()> {
        if let Some((elem, dims)) = typeexpr::split_array(declared_ty)? {
            let Value::Array(items) = value else {
                return Err(AbiError::TypeMismatch {
                    name: declaration.name.clone(),
                    expected: declared_ty.to_string(),
                    actual: format!("got {}", value.kind_name()),
                });
            };
            if items.len() != dims[0] {
                return Err(AbiError::TypeMismatch {
                    name: declaration.name.clone(),
                    expected: declared_ty.to_string(),
                    actual: format!("got an array of {} elements", items.len()),
                });
            }
            let elem_ty = format!("{elem}{}", typeexpr::dims_suffix(&dims[1..]));
            for item in items {
                self.unify(&elem_ty, item, declaration, bindings)?;
            }
            return Ok(());
        }

        if declaration.generic_params.iter().any(|p| p == declared_ty) {
            let inferred = self.infer_value_type(value, &declaration.name)?;
            return bind(bindings, declared_ty, &inferred, &declaration.name);
        }

        if let Some((name, args)) = typeexpr::parse_generic(declared_ty) {
            let inner = self.declaration_of(name)?;
            let concrete = self.deduce_generic(value, &inner)?;
            for (arg_expr, concrete_ty) in args.iter().zip(concrete) {
                self.unify_exprs(arg_expr, &concrete_ty, declaration, bindings)?;
            }
            return Ok(());
        }

        // plain concrete name: only the representation class is checked
        // here, full checking happens in Contract::check_args
        match scalar::scalar_kind(declared_ty) {
            Some(kind) => {
                let ok = matches!(
                    (kind, value),
                    (ScalarKind::Int, Value::Int(_) | Value::BigInt(_))
                        | (ScalarKind::Bool, Value::Bool(_))
                        | (ScalarKind::Bytes, Value::Bytes(_))
                );
                if !ok {
                    return Err(AbiError::TypeMismatch {
                        name: declaration.name.clone(),
                        expected: declared_ty.to_string(),
                        actual: format!("got {}", value.kind_name()),
                    });
                }
            }
            None => {
                if !matches!(value, Value::Struct(_)) {
                    return Err(AbiError::TypeMismatch {
                        name: declaration.name.clone(),
                        expected: declared_ty.to_string(),
                        actual: format!("got {}", value.kind_name()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Structural unification of a declared argument expression against an
    /// already-inferred concrete type.
    fn unify_exprs(
        &self,
        declared: &str,
        concrete: &str,
        declaration: &TypeInfo,
        bindings: &mut Vec<(String, String)>,
    ) -> Result<()> {
        if declaration.generic_params.iter().any(|p| p == declared) {
            return bind(bindings, declared, concrete, &declaration.name);
        }
        if declared == concrete {
            return Ok(());
        }
        if let (Some((d_elem, d_dims)), Some((c_elem, c_dims))) = (
            typeexpr::split_array(declared)?,
            typeexpr::split_array(concrete)?,
        ) {
            if d_dims == c_dims {
                return self.unify_exprs(d_elem, c_elem, declaration, bindings);
            }
        }
        if let (Some((d_name, d_args)), Some((c_name, c_args))) =
            (typeexpr::parse_generic(declared), typeexpr::parse_generic(concrete))
        {
            if d_name == c_name && d_args.len() == c_args.len() {
                for (d, c) in d_args.iter().zip(c_args) {
                    self.unify_exprs(d, c, declaration, bindings)?;
                }
                return Ok(());
            }
        }
        Err(AbiError::TypeMismatch {
            name: declaration.name.clone(),
            expected: declared.to_string(),
            actual: format!("inferred '{concrete}'"),
        })
    }

    fn infer_value_type(&self, value: &Value, context: &str) -> Result<String> {
        match value {
            Value::Int(_) | Value::BigInt(_) => Ok("int".into()),
            Value::Bool(_) => Ok("bool".into()),
            Value::Bytes(_) => Ok("bytes".into()),
            Value::Array(items) => {
                let first = items.first().ok_or_else(|| AbiError::TypeMismatch {
                    name: context.to_string(),
                    expected: "a non-empty array".into(),
                    actual: "an empty array is ambiguous".into(),
                })?;
                let elem = self.infer_value_type(first, context)?;
                match typeexpr::split_array(&elem)? {
                    Some((base, dims)) => Ok(format!(
                        "{base}[{}]{}",
                        items.len(),
                        typeexpr::dims_suffix(&dims)
                    )),
                    None => Ok(format!("{elem}[{}]", items.len())),
                }
            }
            Value::Struct(_) => Err(AbiError::TypeMismatch {
                name: context.to_string(),
                expected: "a scalar or array".into(),
                actual: "a bare struct value is ambiguous".into(),
            }),
        }
    }

    fn declaration_of(&self, name: &str) -> Result<Arc<TypeInfo>> {
        let descriptor = self.resolve(name)?;
        descriptor.declaration.ok_or_else(|| AbiError::TypeMismatch {
            name: name.to_string(),
            expected: "a struct or library".into(),
            actual: format!("'{}' has no declaration", descriptor.final_type),
        })
    }
}

fn bind(
    bindings: &mut Vec<(String, String)>,
    param: &str,
    ty: &str,
    context: &str,
) -> Result<()> {
    if let Some((_, existing)) = bindings.iter().find(|(from, _)| from == param) {
        if existing != ty {
            return Err(AbiError::TypeMismatch {
                name: context.to_string(),
                expected: format!("'{param}' already bound to '{existing}'"),
                actual: format!("inferred '{ty}'"),
            });
        }
        return Ok(());
    }
    bindings.push((param.to_string(), ty.to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::struct_value;
    use pretty_assertions::assert_eq;

    fn resolver() -> TypeResolver {
        TypeResolver::new(
            "Demo",
            &[
                StructEntity {
                    name: "ST0".into(),
                    params: vec![
                        ParamEntity::new("x", "int"),
                        ParamEntity::new("y", "T"),
                    ],
                    generic_types: vec!["T".into()],
                },
                StructEntity {
                    name: "ST1".into(),
                    params: vec![ParamEntity::new("x", "T")],
                    generic_types: vec!["T".into()],
                },
                StructEntity {
                    name: "ST2".into(),
                    params: vec![ParamEntity::new("x", "int")],
                    generic_types: vec![],
                },
                StructEntity {
                    name: "ST3".into(),
                    params: vec![
                        ParamEntity::new("x", "T"),
                        ParamEntity::new("y", "K"),
                    ],
                    generic_types: vec!["T".into(), "K".into()],
                },
            ],
            &[],
            &[
                AliasEntity {
                    name: "ST0A".into(),
                    ty: "ST0<int>".into(),
                },
                AliasEntity {
                    name: "ST0AA".into(),
                    ty: "ST0<ST0A>".into(),
                },
                AliasEntity {
                    name: "INTA".into(),
                    ty: "int[3]".into(),
                },
                AliasEntity {
                    name: "ST1A".into(),
                    ty: "ST1<INTA>".into(),
                },
                AliasEntity {
                    name: "ST3A".into(),
                    ty: "ST3<ST1A,ST0AA>".into(),
                },
            ],
        )
    }

    #[test]
    fn bare_generic_struct() {
        let d = resolver().resolve("ST0").unwrap();
        assert_eq!(d.final_type, "ST0");
        assert!(d.is_generic);
        assert_eq!(d.symbol_kind, SymbolKind::Struct);
        assert_eq!(d.declaration.unwrap().generic_params, vec!["T"]);
    }

    #[test]
    fn concrete_struct() {
        let d = resolver().resolve("ST2").unwrap();
        assert_eq!(d.final_type, "ST2");
        assert!(!d.is_generic);
    }

    #[test]
    fn nested_instantiations() {
        let r = resolver();
        assert_eq!(r.resolve("ST1<ST2[2]>").unwrap().final_type, "ST1<ST2[2]>");
        assert_eq!(
            r.resolve("ST1<ST0<int>>").unwrap().final_type,
            "ST1<ST0<int>>"
        );
        assert_eq!(
            r.resolve("ST1<ST0<int[3]>[3][1]>").unwrap().final_type,
            "ST1<ST0<int[3]>[3][1]>"
        );
    }

    #[test]
    fn alias_chains_expand() {
        let r = resolver();
        assert_eq!(r.resolve("ST0A").unwrap().final_type, "ST0<int>");
        assert_eq!(r.resolve("ST0AA").unwrap().final_type, "ST0<ST0<int>>");
        let inta = r.resolve("INTA").unwrap();
        assert_eq!(inta.final_type, "int[3]");
        assert_eq!(inta.symbol_kind, SymbolKind::Array);
        assert_eq!(r.resolve("ST1A").unwrap().final_type, "ST1<int[3]>");
        assert_eq!(
            r.resolve("ST3A").unwrap().final_type,
            "ST3<ST1<int[3]>,ST0<ST0<int>>>"
        );
    }

    #[test]
    fn memoization_keeps_instantiations_apart() {
        let r = resolver();
        let a = r.resolve("ST1<int>").unwrap();
        let b = r.resolve("ST1<bytes>").unwrap();
        assert_eq!(a.final_type, "ST1<int>");
        assert_eq!(b.final_type, "ST1<bytes>");
        // cached result is stable
        assert_eq!(r.resolve("ST1<int>").unwrap().final_type, "ST1<int>");
    }

    #[test]
    fn cyclic_alias_fails() {
        let r = TypeResolver::new(
            "Demo",
            &[],
            &[],
            &[
                AliasEntity {
                    name: "A".into(),
                    ty: "B".into(),
                },
                AliasEntity {
                    name: "B".into(),
                    ty: "A".into(),
                },
            ],
        );
        assert!(matches!(r.resolve("A"), Err(AbiError::CyclicType { .. })));
    }

    #[test]
    fn unknown_type_fails() {
        assert!(matches!(
            resolver().resolve("Nope"),
            Err(AbiError::Lookup { kind: "type", .. })
        ));
    }

    #[test]
    fn deduction_from_value() {
        let r = resolver();
        let decl = r.resolve("ST0").unwrap().declaration.unwrap();
        let value = struct_value([("x", Value::Int(5)), ("y", Value::Int(7))]);
        assert_eq!(r.deduce_generic(&value, &decl).unwrap(), vec!["int"]);

        let value = struct_value([
            ("x", Value::Int(5)),
            ("y", Value::Array(vec![Value::Bool(true), Value::Bool(false)])),
        ]);
        assert_eq!(r.deduce_generic(&value, &decl).unwrap(), vec!["bool[2]"]);
    }

    #[test]
    fn contradictory_deduction_fails() {
        let r = TypeResolver::new(
            "Demo",
            &[StructEntity {
                name: "Pair".into(),
                params: vec![
                    ParamEntity::new("a", "T"),
                    ParamEntity::new("b", "T"),
                ],
                generic_types: vec!["T".into()],
            }],
            &[],
            &[],
        );
        let decl = r.resolve("Pair").unwrap().declaration.unwrap();
        let value = struct_value([("a", Value::Int(1)), ("b", Value::Bool(true))]);
        assert!(matches!(
            r.deduce_generic(&value, &decl),
            Err(AbiError::TypeMismatch { .. })
        ));
    }
}
