//! Script value object: a parsed list of opcode chunks

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

use crate::chunk::ScriptChunk;
use crate::error::{Result, ScriptError};
use crate::hexutil;
use crate::opcodes::{is_direct_push, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4};

/// An immutable script, decoded into chunks once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    chunks: Vec<ScriptChunk>,
}

impl Script {
    pub fn from_chunks(chunks: Vec<ScriptChunk>) -> Self {
        Self { chunks }
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&hexutil::decode_hex(s)?)
    }

    /// Decode a raw byte stream into chunks, walking every push-data
    /// opcode family. Fails on any push whose declared length runs past
    /// the end of the stream.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ChunkReader::new(bytes);
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk()? {
            chunks.push(chunk);
        }
        Ok(Self { chunks })
    }

    pub fn chunks(&self) -> &[ScriptChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            chunk.write_to(&mut out);
        }
        out
    }

    pub fn to_hex(&self) -> String {
        hexutil::encode_hex(&self.to_bytes())
    }
}

/// Incremental chunk decoder over a byte stream. Lets callers stop at a
/// structural boundary and take the unparsed remainder as raw bytes.
#[derive(Debug)]
pub struct ChunkReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Byte offset of the next chunk.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    /// Consume everything left.
    pub fn take_remaining(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        rest
    }

    /// Decode the next chunk, or `None` at end of stream.
    pub fn next_chunk(&mut self) -> Result<Option<ScriptChunk>> {
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }
        let offset = self.pos;
        let opcode = self.bytes[self.pos];
        self.pos += 1;
        let data_len = if is_direct_push(opcode) {
            Some(opcode as usize)
        } else if opcode == OP_PUSHDATA1 {
            let len = self.take(1, offset)?;
            Some(len[0] as usize)
        } else if opcode == OP_PUSHDATA2 {
            let len = self.take(2, offset)?;
            Some(LittleEndian::read_u16(len) as usize)
        } else if opcode == OP_PUSHDATA4 {
            let len = self.take(4, offset)?;
            Some(LittleEndian::read_u32(len) as usize)
        } else {
            None
        };
        let chunk = match data_len {
            Some(len) => {
                let data = self.take(len, offset)?;
                ScriptChunk::with_data(opcode, data.to_vec())
            }
            None => ScriptChunk::op(opcode),
        };
        Ok(Some(chunk))
    }

    fn take(&mut self, n: usize, offset: usize) -> Result<&'a [u8]> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < n {
            return Err(ScriptError::TruncatedPush {
                offset,
                needed: n,
                remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.chunks.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{chunk}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_mixed_chunks() {
        // OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
        let hex = format!("76a914{}88ac", "11".repeat(20));
        let script = Script::from_hex(&hex).unwrap();
        assert_eq!(script.len(), 5);
        assert_eq!(script.chunks()[2].data_len(), 20);
        assert_eq!(script.to_hex(), hex);
    }

    #[test]
    fn parses_pushdata_families() {
        let mut hex = String::from("4c64");
        hex.push_str(&"22".repeat(100));
        hex.push_str("4d0001");
        hex.push_str(&"33".repeat(256));
        let script = Script::from_hex(&hex).unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(script.chunks()[0].data_len(), 100);
        assert_eq!(script.chunks()[1].data_len(), 256);
        assert_eq!(script.to_hex(), hex);
    }

    #[test]
    fn rejects_truncated_push() {
        let err = Script::from_hex("04ffff").unwrap_err();
        assert!(matches!(
            err,
            ScriptError::TruncatedPush {
                needed: 4,
                remaining: 2,
                ..
            }
        ));
    }

    #[test]
    fn reader_stops_at_a_boundary() {
        // push, OP_RETURN, then bytes that are not a valid push
        let bytes = crate::hexutil::decode_hex("01056a4cff").unwrap();
        let mut reader = ChunkReader::new(&bytes);
        assert_eq!(reader.next_chunk().unwrap().unwrap().data_len(), 1);
        let boundary = reader.next_chunk().unwrap().unwrap();
        assert_eq!(boundary.opcode(), 0x6a);
        assert_eq!(reader.take_remaining(), &[0x4c, 0xff]);
        assert_eq!(reader.next_chunk().unwrap(), None);
    }

    #[test]
    fn empty_script() {
        let script = Script::from_hex("").unwrap();
        assert!(script.is_empty());
        assert_eq!(script.to_hex(), "");
    }
}
