//! Matching deployed scripts against their compiled hex template
//!
//! A template is the contract's code as lowercase hex with `<name>`
//! placeholders standing in for constructor arguments and inline assembly
//! variables. Matching walks the script chunk by chunk against the
//! template's hex cursor; a push-class chunk standing where the template
//! has a placeholder is captured, everything else must match the
//! template's bytes verbatim. An `OP_RETURN` reached after the template
//! is exhausted ends the code part; everything behind it is the data
//! part and stays raw, since state serialization is not chunk-shaped.

use indexmap::IndexMap;
use tracing::trace;

use covenant_script::hexutil::encode_hex;
use covenant_script::opcodes::{is_data_push, is_small_int, OP_0, OP_RETURN};
use covenant_script::{ChunkReader, Script};

use crate::error::{AbiError, Result};

/// Everything extracted by one template walk.
#[derive(Debug, Default)]
pub struct TemplateMatch {
    /// Captured constructor argument chunks, placeholder name (with angle
    /// brackets) to canonical chunk hex, in template order.
    pub args: IndexMap<String, String>,
    /// Captured inline assembly chunks (`<Contract.fn.var>` style names).
    pub inline_asm: IndexMap<String, String>,
    /// Raw bytes behind the code-terminating `OP_RETURN`, if any.
    pub data_part: Option<Vec<u8>>,
    /// Byte length of the code part, excluding the boundary `OP_RETURN`.
    pub code_len: usize,
}

impl TemplateMatch {
    pub fn data_part_hex(&self) -> Option<String> {
        self.data_part.as_deref().map(encode_hex)
    }
}

/// Opcodes a placeholder is allowed to capture. Placeholders stand for
/// pushed values, never for control-flow opcodes.
fn capturable(opcode: u8) -> bool {
    opcode == OP_0 || is_data_push(opcode) || is_small_int(opcode)
}

/// Walk `script` against `template`, capturing placeholder chunks.
///
/// Inline assembly placeholders are the ones whose name starts with the
/// contract's own name, e.g. `<Demo.unlock.loopCount>`.
pub fn match_script(contract: &str, template: &str, script: &[u8]) -> Result<TemplateMatch> {
    let mut result = TemplateMatch::default();
    let inline_prefix = format!("<{contract}.");
    let mut offset = 0usize;
    let mut reader = ChunkReader::new(script);

    loop {
        let chunk_start = reader.position();
        let Some(chunk) = reader.next_chunk()? else {
            break;
        };

        if chunk.opcode() == OP_RETURN && offset >= template.len() {
            result.code_len = chunk_start;
            let rest = reader.take_remaining();
            if !rest.is_empty() {
                result.data_part = Some(rest.to_vec());
            }
            trace!(code_len = chunk_start, "template walk hit data part boundary");
            return Ok(result);
        }

        if capturable(chunk.opcode()) && template[offset..].starts_with('<') {
            let close = template[offset..]
                .find('>')
                .ok_or(AbiError::TemplateMismatch {
                    contract: contract.to_string(),
                    offset,
                })?;
            let name = template[offset..offset + close + 1].to_string();
            let captured = chunk.to_hex();
            trace!(%name, chunk = %captured, "captured placeholder");
            if name.starts_with(&inline_prefix) {
                result.inline_asm.insert(name, captured);
            } else {
                result.args.insert(name, captured);
            }
            offset += close + 1;
            continue;
        }

        // literal chunk, its canonical serialization must appear verbatim
        let literal = chunk.to_hex();
        let end = offset + literal.len();
        if end > template.len() || !template[offset..end].eq_ignore_ascii_case(&literal) {
            return Err(AbiError::TemplateMismatch {
                contract: contract.to_string(),
                offset,
            });
        }
        offset = end;
    }

    if offset != template.len() {
        return Err(AbiError::TemplateMismatch {
            contract: contract.to_string(),
            offset,
        });
    }
    result.code_len = script.len();
    Ok(result)
}

/// Substitute captured (or freshly encoded) chunks back into a template
/// and parse the result. Argument placeholders are unique and replaced
/// once; inline assembly placeholders may repeat and are replaced
/// everywhere.
pub fn build_contract_code(
    args: &IndexMap<String, String>,
    inline_asm: &IndexMap<String, String>,
    template: &str,
) -> Result<Script> {
    let mut code = template.to_string();
    for (name, chunk_hex) in args {
        code = code.replacen(name.as_str(), chunk_hex, 1);
    }
    for (name, chunk_hex) in inline_asm {
        code = code.replace(name.as_str(), chunk_hex);
    }
    if let Some(open) = code.find('<') {
        let rest = &code[open..];
        let name = rest[..=rest.find('>').unwrap_or(rest.len() - 1)].to_string();
        return Err(AbiError::Encoding(format!(
            "unsubstituted placeholder {name} in contract code"
        )));
    }
    Ok(Script::from_hex(&code)?)
}
