//! Trimming of the trailers solc appends to deployed bytecode.
//!
//! Two trailers are recognised: the CBOR metadata blob, whose length is stored big-endian in
//! the final two bytes, and an ASCII string literal placed after a
//! `JUMPDEST POP JUMP INVALID` guard. Trimming never rewrites code before the detected
//! boundaries, so [`TrimmedBytecode::reassemble`] always reproduces the input.
//!
//! # Usage
//! ```rust,ignore
//! let trimmed = trim_hex("0x6001a1650000000000000007")?;
//! assert_eq!(trimmed.reassemble(), hex::decode("6001a1650000000000000007")?);
//! ```

use tracing::{debug, warn};
use veriscan_utils::errors::DecodeError;

/// `JUMPDEST POP JUMP INVALID`, the sequence solc emits ahead of an appended string literal.
pub const LITERAL_GUARD: [u8; 4] = [0x5b, 0x50, 0x56, 0xfe];

/// Bytecode split into code, appended string literal and metadata trailer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrimmedBytecode {
    /// Executable part, ending with the guard when a literal was split off.
    pub code: Vec<u8>,
    /// Raw bytes of the string literal; empty if none was found.
    pub literal: Vec<u8>,
    /// The literal decoded as ASCII; empty if none was found.
    pub string_literal: String,
    /// Metadata blob including its two length bytes; empty if none was found.
    pub metadata: Vec<u8>,
}

impl TrimmedBytecode {
    /// Rebuilds the original bytecode.
    pub fn reassemble(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(self.code.len() + self.literal.len() + self.metadata.len());
        out.extend_from_slice(&self.code);
        out.extend_from_slice(&self.literal);
        out.extend_from_slice(&self.metadata);
        out
    }

    pub fn has_metadata(&self) -> bool {
        !self.metadata.is_empty()
    }

    pub fn has_string_literal(&self) -> bool {
        !self.string_literal.is_empty()
    }

    pub fn code_hex(&self) -> String {
        hex::encode(&self.code)
    }

    pub fn metadata_hex(&self) -> String {
        hex::encode(&self.metadata)
    }
}

/// Length in bytes of the metadata trailer, if the declared size fits inside `bytes`.
///
/// The last two bytes hold the CBOR length; the trailer spans that many bytes plus the two
/// length bytes themselves.
pub fn metadata_len(bytes: &[u8]) -> Option<usize> {
    let [.., hi, lo] = bytes else {
        return None;
    };
    let len = u16::from_be_bytes([*hi, *lo]) as usize + 2;
    (len <= bytes.len()).then_some(len)
}

/// Splits `bytes` into code, string literal and metadata.
///
/// # Arguments
/// * `bytes` - Raw deployed bytecode.
///
/// # Returns
/// The trimmed parts. Input whose declared metadata would exceed its length is returned
/// unchanged as code.
pub fn trim(bytes: &[u8]) -> TrimmedBytecode {
    let Some(meta_len) = metadata_len(bytes) else {
        debug!(len = bytes.len(), "no metadata trailer fits, keeping bytecode as is");
        return TrimmedBytecode {
            code: bytes.to_vec(),
            ..Default::default()
        };
    };

    let (pre, metadata) = bytes.split_at(bytes.len() - meta_len);
    let (code, literal, string_literal) = split_literal(pre);

    TrimmedBytecode {
        code: code.to_vec(),
        literal: literal.to_vec(),
        string_literal,
        metadata: metadata.to_vec(),
    }
}

/// Hex-string variant of [`trim`].
pub fn trim_hex(bytecode: &str) -> Result<TrimmedBytecode, DecodeError> {
    let bytes = crate::decoder::input_to_bytes(bytecode, false)?;
    Ok(trim(&bytes))
}

fn split_literal(pre: &[u8]) -> (&[u8], &[u8], String) {
    let Some(guard_at) = pre
        .windows(LITERAL_GUARD.len())
        .rposition(|w| w == LITERAL_GUARD)
    else {
        return (pre, &[], String::new());
    };

    let (code, literal) = pre.split_at(guard_at + LITERAL_GUARD.len());
    if literal.is_empty() {
        return (pre, &[], String::new());
    }

    match std::str::from_utf8(literal) {
        Ok(text) if text.is_ascii() => (code, literal, text.to_string()),
        _ => {
            warn!(
                offset = code.len(),
                len = literal.len(),
                "bytes after the string literal guard are not ASCII, keeping them as code"
            );
            (pre, &[], String::new())
        }
    }
}
