//! veriscan's single entry-point for turning byte-sequences into instruction streams.
//!
//! Decoding is purely structural: every byte position is classified as an opcode or as
//! immediate data of the preceding push, and nothing is executed.

use crate::opcode::{self, UNKNOWN_MNEMONIC};
use std::collections::BTreeSet;
use std::{fmt, fs, path::Path};
use tiny_keccak::{Hasher, Keccak};
use veriscan_utils::errors::DecodeError;

/// Represents a single decoded instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// the instruction's program counter (in bytes)
    pub pc: usize,
    /// raw opcode byte
    pub opcode: u8,
    /// mnemonic from the opcode table, `INVALID` for unassigned bytes
    pub mnemonic: &'static str,
    /// immediate data; shorter than declared when the code ends inside a push
    pub imm: Vec<u8>,
}

/// Metadata about the decoded bytecode blob.
#[derive(Debug)]
pub struct DecodeInfo {
    /// number of bytes
    pub byte_length: usize,
    /// a 32-byte Keccak-256 hash of the raw bytes
    pub keccak_hash: [u8; 32],
    /// input from the variants of SourceType
    pub source: SourceType,
}

/// Source type of the bytecode input.
#[derive(Debug, PartialEq, Eq)]
pub enum SourceType {
    HexString,
    File,
}

/// Result of decoding a bytecode blob.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Instructions in ascending `pc` order.
    pub instructions: Vec<Instruction>,
    /// Unassigned opcode bytes seen while decoding, formatted as `0x..`.
    pub unknown_opcodes: BTreeSet<String>,
}

impl Instruction {
    /// Returns the number of bytes this instruction occupies in bytecode.
    #[inline]
    pub fn len(&self) -> usize {
        1 + self.imm.len()
    }

    /// Always false; an instruction holds at least its opcode byte.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Byte offset just past this instruction.
    #[inline]
    pub fn end(&self) -> usize {
        self.pc + self.len()
    }

    /// Opcode byte followed by the immediate bytes.
    pub fn raw_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.push(self.opcode);
        out.extend_from_slice(&self.imm);
        out
    }

    /// True if both instructions encode to the same bytes, wherever they sit.
    #[inline]
    pub fn same_bytes(&self, other: &Self) -> bool {
        self.opcode == other.opcode && self.imm == other.imm
    }

    /// Lowercase hex of the full byte span, without `0x`.
    pub fn raw_hex(&self) -> String {
        hex::encode(self.raw_bytes())
    }

    /// `0x`-prefixed immediate, or an empty string for instructions without one.
    pub fn imm_hex(&self) -> String {
        if self.imm.is_empty() {
            String::new()
        } else {
            format!("0x{}", hex::encode(&self.imm))
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pc: six-digit hex, mnemonic left-padded to 8 chars, then optional imm
        if self.imm.is_empty() {
            write!(f, "{:06x}  {}", self.pc, self.mnemonic)
        } else {
            write!(f, "{:06x}  {:<8} {}", self.pc, self.mnemonic, self.imm_hex())
        }
    }
}

impl Decoded {
    /// Concatenated raw bytes of every instruction.
    pub fn reassemble(&self) -> Vec<u8> {
        self.instructions
            .iter()
            .flat_map(|ins| ins.raw_bytes())
            .collect()
    }
}

/// Normalizes hex strings by removing whitespace and the 0x prefix, then validates them.
///
/// Odd-length input and non-hex characters are rejected rather than repaired.
pub fn normalize_hex_string(input: &str) -> Result<String, DecodeError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let clean = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);

    if let Some((index, c)) = clean.char_indices().find(|(_, c)| !c.is_ascii_hexdigit()) {
        return Err(DecodeError::HexDecode(
            hex::FromHexError::InvalidHexCharacter { c, index },
        ));
    }
    if clean.len() % 2 == 1 {
        return Err(DecodeError::HexDecode(hex::FromHexError::OddLength));
    }
    Ok(clean.to_ascii_lowercase())
}

/// Normalizes input into a byte vector from hex string or file.
pub fn input_to_bytes(input: &str, is_file: bool) -> Result<Vec<u8>, DecodeError> {
    let text = if is_file {
        let path = Path::new(input);
        fs::read_to_string(path).map_err(|e| DecodeError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?
    } else {
        input.to_string()
    };
    let normalized = normalize_hex_string(&text)?;
    Ok(hex::decode(normalized)?)
}

/// Decodes raw EVM bytecode bytes into an instruction stream.
///
/// Never fails: unassigned bytes become one-byte `INVALID` instructions and are recorded in
/// [`Decoded::unknown_opcodes`], and a push running past the end keeps only the bytes present.
pub fn decode_bytes(bytes: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();
    let mut pc = 0;

    while pc < bytes.len() {
        let byte = bytes[pc];
        let mnemonic = match opcode::mnemonic(byte) {
            Some(name) => name,
            None => {
                decoded.unknown_opcodes.insert(format!("0x{byte:02x}"));
                UNKNOWN_MNEMONIC
            }
        };

        let imm_end = (pc + 1 + opcode::immediate_size(byte)).min(bytes.len());
        let imm = bytes[pc + 1..imm_end].to_vec();

        decoded.instructions.push(Instruction {
            pc,
            opcode: byte,
            mnemonic,
            imm,
        });
        pc = imm_end;
    }

    decoded
}

/// Decodes a hex string, with or without `0x`, into an instruction stream.
///
/// # Arguments
/// * `bytecode` - Hex-encoded EVM bytecode.
///
/// # Returns
/// The decoded instructions and unknown-opcode set, or an error if the hex is malformed.
pub fn decode(bytecode: &str) -> Result<Decoded, DecodeError> {
    let bytes = input_to_bytes(bytecode, false)?;
    Ok(decode_bytes(&bytes))
}

/// Decodes bytecode from a hex string or file and reports metadata about the blob.
///
/// # Arguments
/// * `input` - A hex string or file path representing the EVM bytecode.
/// * `is_file` - Flag indicating if the input is a file path (false for hex string).
///
/// # Returns
/// A tuple of (Decoded, DecodeInfo, raw bytes), or an error if the input is unreadable.
pub fn decode_bytecode(
    input: &str,
    is_file: bool,
) -> Result<(Decoded, DecodeInfo, Vec<u8>), DecodeError> {
    let bytes = input_to_bytes(input, is_file)?;

    let mut keccak = Keccak::v256();
    keccak.update(&bytes);
    let mut hash = [0u8; 32];
    keccak.finalize(&mut hash);

    let source = if is_file {
        SourceType::File
    } else {
        SourceType::HexString
    };

    let info = DecodeInfo {
        byte_length: bytes.len(),
        keccak_hash: hash,
        source,
    };
    Ok((decode_bytes(&bytes), info, bytes))
}
