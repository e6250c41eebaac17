//! Script chunk representation and bit-exact serialization

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

use crate::error::{Result, ScriptError};
use crate::hexutil;
use crate::opcodes::{
    is_data_push, small_int_value, MAX_DIRECT_PUSH, OP_0, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4,
};

/// One opcode together with the data bytes it pushes, if any.
///
/// The serialized form is the opcode byte, then the length prefix for the
/// OP_PUSHDATA family, then the data. `data` is `None` for opcodes that
/// push nothing (including OP_0, the zero-length push).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptChunk {
    opcode: u8,
    data: Option<Vec<u8>>,
}

impl ScriptChunk {
    /// A bare opcode chunk.
    pub const fn op(opcode: u8) -> Self {
        Self { opcode, data: None }
    }

    /// A data push using the smallest opcode that can carry `data`.
    pub fn push_data(data: Vec<u8>) -> Result<Self> {
        let opcode = match data.len() {
            0 => return Ok(Self::op(OP_0)),
            n if n <= MAX_DIRECT_PUSH => n as u8,
            n if n <= u8::MAX as usize => OP_PUSHDATA1,
            n if n <= u16::MAX as usize => OP_PUSHDATA2,
            n if n <= u32::MAX as usize => OP_PUSHDATA4,
            n => return Err(ScriptError::OversizedPush { len: n }),
        };
        Ok(Self {
            opcode,
            data: Some(data),
        })
    }

    /// Reassemble a chunk parsed from a script. The opcode must agree with
    /// the presence of data; `Script::from_bytes` upholds this.
    pub(crate) fn with_data(opcode: u8, data: Vec<u8>) -> Self {
        Self {
            opcode,
            data: Some(data),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Number of data bytes this chunk pushes.
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    /// Append the canonical serialization: opcode, length prefix, data.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.opcode);
        let Some(data) = self.data.as_ref() else {
            return;
        };
        match self.opcode {
            OP_PUSHDATA1 => out.push(data.len() as u8),
            OP_PUSHDATA2 => {
                let mut len = [0u8; 2];
                LittleEndian::write_u16(&mut len, data.len() as u16);
                out.extend_from_slice(&len);
            }
            OP_PUSHDATA4 => {
                let mut len = [0u8; 4];
                LittleEndian::write_u32(&mut len, data.len() as u32);
                out.extend_from_slice(&len);
            }
            _ => {}
        }
        out.extend_from_slice(data);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 + self.data_len());
        self.write_to(&mut out);
        out
    }

    pub fn to_hex(&self) -> String {
        hexutil::encode_hex(&self.to_bytes())
    }
}

impl fmt::Display for ScriptChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(data) = self.data.as_ref() {
            write!(f, "{}", hexutil::encode_hex(data))
        } else if self.opcode == OP_0 {
            write!(f, "OP_0")
        } else if let Some(n) = small_int_value(self.opcode) {
            if n == -1 {
                write!(f, "OP_1NEGATE")
            } else {
                write!(f, "OP_{n}")
            }
        } else if is_data_push(self.opcode) {
            // empty direct push, cannot happen for parsed scripts
            write!(f, "")
        } else {
            write!(f, "OP_{:#04x}", self.opcode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn direct_push_serialization() {
        let chunk = ScriptChunk::push_data(vec![0xff, 0xee]).unwrap();
        assert_eq!(chunk.opcode(), 0x02);
        assert_eq!(chunk.to_hex(), "02ffee");
    }

    #[test]
    fn empty_push_is_op_0() {
        let chunk = ScriptChunk::push_data(vec![]).unwrap();
        assert_eq!(chunk.opcode(), OP_0);
        assert_eq!(chunk.to_hex(), "00");
    }

    #[test]
    fn pushdata1_serialization() {
        let data = vec![0xab; 100];
        let chunk = ScriptChunk::push_data(data.clone()).unwrap();
        assert_eq!(chunk.opcode(), OP_PUSHDATA1);
        let bytes = chunk.to_bytes();
        assert_eq!(bytes[0], OP_PUSHDATA1);
        assert_eq!(bytes[1], 100);
        assert_eq!(&bytes[2..], &data[..]);
    }

    #[test]
    fn pushdata2_length_is_little_endian() {
        let chunk = ScriptChunk::push_data(vec![0u8; 0x0102]).unwrap();
        let bytes = chunk.to_bytes();
        assert_eq!(bytes[0], OP_PUSHDATA2);
        assert_eq!(&bytes[1..3], &[0x02, 0x01]);
    }
}
