//! Type-expression string utilities
//!
//! Type expressions arrive as strings from the compiler artifact:
//! `int`, `int[3][2]`, `Pair<int,bytes>`, `Pair<ST0<int>[2],bool>`.
//! Array dimensions always trail the whole expression; generic arguments
//! nest arbitrarily.

use crate::error::{AbiError, Result};

/// Strip trailing array dimensions: `"ST0<int>[3][2]"` becomes
/// `("ST0<int>", [3, 2])`. Returns `None` when there are none.
pub fn split_array(expr: &str) -> Result<Option<(&str, Vec<usize>)>> {
    let mut end = expr.len();
    let mut dims_rev: Vec<usize> = Vec::new();
    let bytes = expr.as_bytes();
    while end > 0 && bytes[end - 1] == b']' {
        let Some(open) = expr[..end - 1].rfind('[') else {
            break;
        };
        let dim = &expr[open + 1..end - 1];
        let size: usize = dim.parse().map_err(|_| {
            AbiError::Encoding(format!("invalid array size '{dim}' in type '{expr}'"))
        })?;
        dims_rev.push(size);
        end = open;
    }
    if dims_rev.is_empty() {
        return Ok(None);
    }
    dims_rev.reverse();
    Ok(Some((&expr[..end], dims_rev)))
}

/// Render array dimensions back into a suffix: `[3, 2]` becomes `"[3][2]"`.
pub fn dims_suffix(dims: &[usize]) -> String {
    dims.iter().map(|d| format!("[{d}]")).collect()
}

/// Split a generic instantiation `Name<A,B<C>>` into the base name and
/// its top-level arguments. Returns `None` for plain names.
pub fn parse_generic(expr: &str) -> Option<(&str, Vec<&str>)> {
    let open = expr.find('<')?;
    if !expr.ends_with('>') {
        return None;
    }
    let name = &expr[..open];
    let body = &expr[open + 1..expr.len() - 1];
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(body[start..].trim());
    Some((name, args))
}

/// Rebuild a generic instantiation from a base name and arguments.
pub fn to_generic(name: &str, args: &[String]) -> String {
    format!("{name}<{}>", args.join(","))
}

/// Replace whole-identifier occurrences of generic parameters inside a
/// type expression: substituting `T -> int` turns `ST1<T>[2]` into
/// `ST1<int>[2]` but leaves `ST<int>` alone.
pub fn substitute(expr: &str, bindings: &[(String, String)]) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut ident = String::new();
    let flush = |ident: &mut String, out: &mut String| {
        if ident.is_empty() {
            return;
        }
        match bindings.iter().find(|(from, _)| from == ident) {
            Some((_, to)) => out.push_str(to),
            None => out.push_str(ident),
        }
        ident.clear();
    };
    for c in expr.chars() {
        if c.is_alphanumeric() || c == '_' {
            ident.push(c);
        } else {
            flush(&mut ident, &mut out);
            out.push(c);
        }
    }
    flush(&mut ident, &mut out);
    out
}
