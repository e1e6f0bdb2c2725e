use std::io::Write;
use veriscan_core::decoder::{SourceType, decode, decode_bytecode};
use veriscan_utils::errors::DecodeError;

// PUSH1 0x01, PUSH1 0x02, ADD, PUSH1 0x00, SSTORE
const BYTECODE: &str = "0x6001600201600055";

#[test]
fn test_hex_roundtrip() {
    let (decoded, info, bytes) = decode_bytecode(BYTECODE, false).unwrap();
    for instr in &decoded.instructions {
        tracing::debug!("{}", instr);
    }
    let mnemonics: Vec<_> = decoded.instructions.iter().map(|i| i.mnemonic).collect();
    assert_eq!(mnemonics, vec!["PUSH1", "PUSH1", "ADD", "PUSH1", "SSTORE"]);

    assert_eq!(info.byte_length, 8);
    assert_eq!(info.source, SourceType::HexString);
    assert_eq!(decoded.reassemble(), bytes);

    let joined: String = decoded.instructions.iter().map(|i| i.raw_hex()).collect();
    assert_eq!(joined, BYTECODE.trim_start_matches("0x"));
}

#[test]
fn test_offsets_follow_lengths() {
    // PUSH32 with a full operand, then PUSH0 and STOP
    let code = format!("0x7f{}5f00", "ab".repeat(32));
    let decoded = decode(&code).unwrap();
    let pcs: Vec<_> = decoded.instructions.iter().map(|i| i.pc).collect();
    assert_eq!(pcs, vec![0, 33, 34]);
    for pair in decoded.instructions.windows(2) {
        assert_eq!(pair[1].pc, pair[0].pc + pair[0].len());
    }
}

#[test]
fn test_truncated_push_keeps_present_bytes() {
    let decoded = decode("0x61ab").unwrap();
    assert_eq!(decoded.instructions.len(), 1);
    assert_eq!(decoded.instructions[0].mnemonic, "PUSH2");
    assert_eq!(decoded.instructions[0].imm, vec![0xab]);
}

#[test]
fn test_unassigned_byte_is_invalid() {
    let decoded = decode("0xef00").unwrap();
    assert_eq!(decoded.instructions[0].mnemonic, "INVALID");
    assert_eq!(decoded.instructions[0].len(), 1);
    assert!(decoded.unknown_opcodes.contains("0xef"));
    assert_eq!(decoded.instructions[1].mnemonic, "STOP");
}

#[test]
fn test_bad_hex_is_rejected() {
    assert!(matches!(decode("0x600"), Err(DecodeError::HexDecode(_))));
    assert!(matches!(decode("0x60zz"), Err(DecodeError::HexDecode(_))));
}

#[test]
fn test_decode_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{BYTECODE}").unwrap();
    let path = file.path().to_str().unwrap();

    let (decoded, info, _) = decode_bytecode(path, true).unwrap();
    assert_eq!(info.source, SourceType::File);
    assert_eq!(decoded.instructions.len(), 5);

    let missing = decode_bytecode("/nonexistent/code.hex", true);
    assert!(matches!(missing, Err(DecodeError::FileRead { .. })));
}
