//! Script opcode constants and push-class predicates
//!
//! Only the opcodes the chunk codec has to understand structurally are
//! named here. Opcodes 0x01..=0x4b are their own push lengths and have
//! no individual names.

/// Zero-length push, also the canonical encoding of `false`.
pub const OP_0: u8 = 0x00;
pub const OP_FALSE: u8 = OP_0;

/// Push, length in the next 1 byte.
pub const OP_PUSHDATA1: u8 = 0x4c;
/// Push, length in the next 2 bytes (little-endian).
pub const OP_PUSHDATA2: u8 = 0x4d;
/// Push, length in the next 4 bytes (little-endian).
pub const OP_PUSHDATA4: u8 = 0x4e;

/// Single-byte integer -1.
pub const OP_1NEGATE: u8 = 0x4f;

/// Single-byte integers 1..=16 are OP_1..=OP_16.
pub const OP_1: u8 = 0x51;
pub const OP_TRUE: u8 = OP_1;
pub const OP_16: u8 = 0x60;

/// Marks the boundary before a trailing data part.
pub const OP_RETURN: u8 = 0x6a;

/// Largest length a direct push opcode can carry.
pub const MAX_DIRECT_PUSH: usize = 0x4b;

/// Opcodes 1..=75 push that many bytes directly.
pub const fn is_direct_push(opcode: u8) -> bool {
    opcode >= 1 && opcode as usize <= MAX_DIRECT_PUSH
}

/// Any opcode that is followed by payload bytes in the serialized script.
pub const fn is_data_push(opcode: u8) -> bool {
    is_direct_push(opcode)
        || opcode == OP_PUSHDATA1
        || opcode == OP_PUSHDATA2
        || opcode == OP_PUSHDATA4
}

/// The single-byte integer opcodes: OP_1NEGATE and OP_1..=OP_16.
pub const fn is_small_int(opcode: u8) -> bool {
    opcode == OP_1NEGATE || (opcode >= OP_1 && opcode <= OP_16)
}

/// Value of a single-byte integer opcode, if it is one.
pub fn small_int_value(opcode: u8) -> Option<i64> {
    match opcode {
        OP_1NEGATE => Some(-1),
        OP_1..=OP_16 => Some((opcode - OP_1 + 1) as i64),
        _ => None,
    }
}

/// Single-byte opcode for small integers -1 and 1..=16. Zero is OP_0.
pub fn small_int_opcode(value: i64) -> Option<u8> {
    match value {
        -1 => Some(OP_1NEGATE),
        0 => Some(OP_0),
        1..=16 => Some(OP_1 + (value as u8) - 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_classes() {
        assert!(is_direct_push(0x01));
        assert!(is_direct_push(0x4b));
        assert!(!is_direct_push(OP_0));
        assert!(!is_direct_push(OP_PUSHDATA1));
        assert!(is_data_push(OP_PUSHDATA4));
        assert!(!is_data_push(OP_RETURN));
    }

    #[test]
    fn small_ints() {
        assert_eq!(small_int_value(OP_1NEGATE), Some(-1));
        assert_eq!(small_int_value(OP_1), Some(1));
        assert_eq!(small_int_value(OP_16), Some(16));
        assert_eq!(small_int_value(OP_0), None);
        assert_eq!(small_int_opcode(-1), Some(OP_1NEGATE));
        assert_eq!(small_int_opcode(0), Some(OP_0));
        assert_eq!(small_int_opcode(16), Some(OP_16));
        assert_eq!(small_int_opcode(17), None);
    }
}
