//! Module defining the static EVM opcode table.
//!
//! The table maps every assigned byte value to its mnemonic. Bytes without an entry are
//! unassigned and decode as `INVALID`. The push range is derived from the table itself.

/// Assigned opcodes, in byte order.
const OPCODES: &[(u8, &str)] = &[
    // 0x range - stop & arithmetic
    (0x00, "STOP"),
    (0x01, "ADD"),
    (0x02, "MUL"),
    (0x03, "SUB"),
    (0x04, "DIV"),
    (0x05, "SDIV"),
    (0x06, "MOD"),
    (0x07, "SMOD"),
    (0x08, "ADDMOD"),
    (0x09, "MULMOD"),
    (0x0a, "EXP"),
    (0x0b, "SIGNEXTEND"),
    // 10x range - comparison & bitwise logic
    (0x10, "LT"),
    (0x11, "GT"),
    (0x12, "SLT"),
    (0x13, "SGT"),
    (0x14, "EQ"),
    (0x15, "ISZERO"),
    (0x16, "AND"),
    (0x17, "OR"),
    (0x18, "XOR"),
    (0x19, "NOT"),
    (0x1a, "BYTE"),
    (0x1b, "SHL"),
    (0x1c, "SHR"),
    (0x1d, "SAR"),
    (0x20, "SHA3"),
    // 30x range - environment
    (0x30, "ADDRESS"),
    (0x31, "BALANCE"),
    (0x32, "ORIGIN"),
    (0x33, "CALLER"),
    (0x34, "CALLVALUE"),
    (0x35, "CALLDATALOAD"),
    (0x36, "CALLDATASIZE"),
    (0x37, "CALLDATACOPY"),
    (0x38, "CODESIZE"),
    (0x39, "CODECOPY"),
    (0x3a, "GASPRICE"),
    (0x3b, "EXTCODESIZE"),
    (0x3c, "EXTCODECOPY"),
    (0x3d, "RETURNDATASIZE"),
    (0x3e, "RETURNDATACOPY"),
    (0x3f, "EXTCODEHASH"),
    // 40x range - block information
    (0x40, "BLOCKHASH"),
    (0x41, "COINBASE"),
    (0x42, "TIMESTAMP"),
    (0x43, "NUMBER"),
    (0x44, "PREVRANDAO"),
    (0x45, "GASLIMIT"),
    (0x46, "CHAINID"),
    (0x47, "SELFBALANCE"),
    (0x48, "BASEFEE"),
    (0x49, "BLOBHASH"),
    (0x4a, "BLOBBASEFEE"),
    // 50x range - stack, memory, storage & flow
    (0x50, "POP"),
    (0x51, "MLOAD"),
    (0x52, "MSTORE"),
    (0x53, "MSTORE8"),
    (0x54, "SLOAD"),
    (0x55, "SSTORE"),
    (0x56, "JUMP"),
    (0x57, "JUMPI"),
    (0x58, "PC"),
    (0x59, "MSIZE"),
    (0x5a, "GAS"),
    (0x5b, "JUMPDEST"),
    (0x5c, "TLOAD"),
    (0x5d, "TSTORE"),
    (0x5e, "MCOPY"),
    (0x5f, "PUSH0"),
    // 60x-7fx range - push
    (0x60, "PUSH1"),
    (0x61, "PUSH2"),
    (0x62, "PUSH3"),
    (0x63, "PUSH4"),
    (0x64, "PUSH5"),
    (0x65, "PUSH6"),
    (0x66, "PUSH7"),
    (0x67, "PUSH8"),
    (0x68, "PUSH9"),
    (0x69, "PUSH10"),
    (0x6a, "PUSH11"),
    (0x6b, "PUSH12"),
    (0x6c, "PUSH13"),
    (0x6d, "PUSH14"),
    (0x6e, "PUSH15"),
    (0x6f, "PUSH16"),
    (0x70, "PUSH17"),
    (0x71, "PUSH18"),
    (0x72, "PUSH19"),
    (0x73, "PUSH20"),
    (0x74, "PUSH21"),
    (0x75, "PUSH22"),
    (0x76, "PUSH23"),
    (0x77, "PUSH24"),
    (0x78, "PUSH25"),
    (0x79, "PUSH26"),
    (0x7a, "PUSH27"),
    (0x7b, "PUSH28"),
    (0x7c, "PUSH29"),
    (0x7d, "PUSH30"),
    (0x7e, "PUSH31"),
    (0x7f, "PUSH32"),
    // 80x range - duplication
    (0x80, "DUP1"),
    (0x81, "DUP2"),
    (0x82, "DUP3"),
    (0x83, "DUP4"),
    (0x84, "DUP5"),
    (0x85, "DUP6"),
    (0x86, "DUP7"),
    (0x87, "DUP8"),
    (0x88, "DUP9"),
    (0x89, "DUP10"),
    (0x8a, "DUP11"),
    (0x8b, "DUP12"),
    (0x8c, "DUP13"),
    (0x8d, "DUP14"),
    (0x8e, "DUP15"),
    (0x8f, "DUP16"),
    // 90x range - exchange
    (0x90, "SWAP1"),
    (0x91, "SWAP2"),
    (0x92, "SWAP3"),
    (0x93, "SWAP4"),
    (0x94, "SWAP5"),
    (0x95, "SWAP6"),
    (0x96, "SWAP7"),
    (0x97, "SWAP8"),
    (0x98, "SWAP9"),
    (0x99, "SWAP10"),
    (0x9a, "SWAP11"),
    (0x9b, "SWAP12"),
    (0x9c, "SWAP13"),
    (0x9d, "SWAP14"),
    (0x9e, "SWAP15"),
    (0x9f, "SWAP16"),
    // a0x range - logging
    (0xa0, "LOG0"),
    (0xa1, "LOG1"),
    (0xa2, "LOG2"),
    (0xa3, "LOG3"),
    (0xa4, "LOG4"),
    // f0x range - system
    (0xf0, "CREATE"),
    (0xf1, "CALL"),
    (0xf2, "CALLCODE"),
    (0xf3, "RETURN"),
    (0xf4, "DELEGATECALL"),
    (0xf5, "CREATE2"),
    (0xfa, "STATICCALL"),
    (0xfd, "REVERT"),
    (0xfe, "INVALID"),
    (0xff, "SELFDESTRUCT"),
];

/// Mnemonic used for bytes the table does not know.
pub const UNKNOWN_MNEMONIC: &str = "INVALID";

/// Dense byte-indexed view of [`OPCODES`].
static TABLE: [Option<&str>; 256] = build_table();

/// Byte value of `PUSH0`, found by reverse lookup.
pub const PUSH0: u8 = byte_of("PUSH0");

/// Byte value of `PUSH32`, found by reverse lookup.
pub const PUSH32: u8 = byte_of("PUSH32");

const fn build_table() -> [Option<&'static str>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < OPCODES.len() {
        table[OPCODES[i].0 as usize] = Some(OPCODES[i].1);
        i += 1;
    }
    table
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Reverse lookup evaluated at compile time; a missing mnemonic fails the build.
const fn byte_of(mnemonic: &str) -> u8 {
    let mut i = 0;
    while i < OPCODES.len() {
        if str_eq(OPCODES[i].1, mnemonic) {
            return OPCODES[i].0;
        }
        i += 1;
    }
    panic!("mnemonic missing from opcode table")
}

/// Returns the mnemonic for `byte`, or `None` if the byte is unassigned.
#[inline]
pub fn mnemonic(byte: u8) -> Option<&'static str> {
    TABLE[byte as usize]
}

/// Returns the byte value for `mnemonic`, if the table contains it.
pub fn opcode_for(mnemonic: &str) -> Option<u8> {
    OPCODES
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(mnemonic))
        .map(|&(byte, _)| byte)
}

/// True for PUSH1..PUSH32, the only opcodes carrying immediate bytes.
#[inline]
pub const fn is_push_with_data(byte: u8) -> bool {
    byte > PUSH0 && byte <= PUSH32
}

/// Number of immediate bytes that follow `byte` in well-formed code.
#[inline]
pub const fn immediate_size(byte: u8) -> usize {
    if is_push_with_data(byte) {
        (byte - PUSH0) as usize
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_range_is_derived_from_table() {
        assert_eq!(PUSH0, 0x5f);
        assert_eq!(PUSH32, 0x7f);
        assert_eq!(immediate_size(0x60), 1);
        assert_eq!(immediate_size(0x7f), 32);
        assert_eq!(immediate_size(PUSH0), 0);
        assert_eq!(immediate_size(0x80), 0);
    }

    #[test]
    fn lookups_agree() {
        for &(byte, name) in OPCODES {
            assert_eq!(mnemonic(byte), Some(name));
            assert_eq!(opcode_for(name), Some(byte));
        }
        assert_eq!(opcode_for("jumpdest"), Some(0x5b));
    }

    #[test]
    fn unassigned_bytes_have_no_mnemonic() {
        assert_eq!(mnemonic(0xef), None);
        assert_eq!(mnemonic(0x0c), None);
        assert_eq!(mnemonic(0xfe), Some("INVALID"));
    }
}
