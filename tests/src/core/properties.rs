//! Laws that hold for arbitrary bytecode, checked over generated inputs.
//!
//! The generator mixes plain bytes with push instructions, the string literal guard and short
//! metadata trailers so that trimming and truncated pushes are hit often.

use proptest::prelude::*;
use veriscan_core::compare::ImmutableReferences;
use veriscan_core::decoder::{decode, decode_bytes};
use veriscan_core::opcode::{PUSH0, PUSH32, is_push_with_data};
use veriscan_core::strip::{LITERAL_GUARD, trim};
use veriscan_core::{Verdict, compare};

fn chunk() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        3 => any::<u8>().prop_map(|b| vec![b]),
        3 => (PUSH0..=PUSH32, prop::collection::vec(any::<u8>(), 0..34)).prop_map(|(op, imm)| {
            let mut out = vec![op];
            out.extend(imm);
            out
        }),
        1 => Just(LITERAL_GUARD.to_vec()),
        1 => prop::collection::vec(0x20u8..0x7f, 1..12),
        1 => prop::collection::vec(any::<u8>(), 0..8).prop_map(|body| {
            let mut out = body.clone();
            out.extend((body.len() as u16).to_be_bytes());
            out
        }),
    ]
}

fn bytecode() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(chunk(), 1..24).prop_map(|chunks| chunks.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Concatenated raw bytes and raw hex reproduce the input.
    #[test]
    fn decode_round_trip(bytes in bytecode()) {
        let decoded = decode_bytes(&bytes);
        prop_assert_eq!(decoded.reassemble(), bytes.clone());

        let joined: String = decoded.instructions.iter().map(|i| i.raw_hex()).collect();
        prop_assert_eq!(joined, hex::encode(&bytes));

        let from_hex = decode(&format!("0x{}", hex::encode(&bytes))).unwrap();
        prop_assert_eq!(from_hex, decoded);
    }

    /// Offsets start at zero and advance by each instruction's length; pushes consume their
    /// declared immediate unless the code ends first.
    #[test]
    fn instruction_lengths(bytes in bytecode()) {
        let decoded = decode_bytes(&bytes);
        let mut pc = 0;
        for ins in &decoded.instructions {
            prop_assert_eq!(ins.pc, pc);
            prop_assert_eq!(ins.opcode, bytes[pc]);
            let declared = if is_push_with_data(ins.opcode) {
                (ins.opcode - PUSH0) as usize
            } else {
                0
            };
            prop_assert_eq!(ins.imm.len(), declared.min(bytes.len() - pc - 1));
            pc += ins.len();
        }
        prop_assert_eq!(pc, bytes.len());
    }

    /// Code, literal and metadata concatenate back to the input.
    #[test]
    fn trim_is_lossless(bytes in bytecode()) {
        let trimmed = trim(&bytes);
        prop_assert_eq!(trimmed.reassemble(), bytes.clone());
        if trimmed.has_string_literal() {
            prop_assert!(trimmed.code.ends_with(&LITERAL_GUARD));
            prop_assert_eq!(trimmed.string_literal.as_bytes(), &trimmed.literal[..]);
        }
        if !trimmed.has_metadata() {
            prop_assert!(trimmed.literal.is_empty());
        }
    }

    /// Any bytecode fully matches itself.
    #[test]
    fn self_comparison_is_full_match(bytes in bytecode()) {
        let code = format!("0x{}", hex::encode(&bytes));
        let verdict = compare(&code, &code, &ImmutableReferences::new());
        prop_assert_eq!(verdict.ok(), Some(Verdict::FullMatch));
    }
}
