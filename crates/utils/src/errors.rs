use thiserror::Error;

/// Custom error type for decoding operations.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("hex decode failed: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("could not read file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons a bytecode comparison is rejected.
#[derive(Debug, Error)]
pub enum CompareError {
    /// The instruction streams have a different number of instructions.
    #[error("bytecodes have different length: {actual} vs {expected} instructions")]
    DifferentLength { actual: usize, expected: usize },

    /// At least one mismatching instruction does not touch an immutable slot.
    #[error(
        "bytecodes have differences not on the immutable reference position ({count} instructions)"
    )]
    NotOnImmutable { count: usize },

    /// Both sides carry a trailing string literal, and they differ.
    #[error("string literal mismatch: {actual:?} != {expected:?}")]
    StringLiteral { actual: String, expected: String },

    /// A rendered index exists in neither instruction stream.
    #[error("Invalid bytecode difference data at index {0}")]
    InvalidDifferenceData(usize),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors that can occur while ABI-encoding constructor arguments.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The ABI type string is not one the encoder understands.
    #[error("unknown ABI type: {0}")]
    UnknownType(String),
    /// The value does not fit the declared type.
    #[error("invalid value for {ty}: {reason} (got {value})")]
    InvalidValue {
        ty: String,
        value: String,
        reason: String,
    },
    /// Number of values differs from number of declared inputs or components.
    #[error("expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

impl EncodeError {
    pub fn invalid(ty: &str, value: &serde_json::Value, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            ty: ty.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
