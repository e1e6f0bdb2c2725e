//! Veriscan verification pipeline
//!
//! This crate checks a deployed contract against the sources it claims to be built from:
//!
//! 1. **Source diff**: verified sources from a block explorer against a GitHub checkout
//! 2. **Bytecode diff**: on-chain code against code compiled from those sources

pub mod calldata;
pub mod compiler;
pub mod config;
pub mod explorer;
pub mod github;
pub mod node;
pub mod orchestrator;
pub mod rpc;
pub mod source_diff;

pub use config::Config;
pub use explorer::{ContractSource, Explorer, ExplorerProvider, ProviderKind};
pub use github::{GithubClient, SourceHost};
pub use node::{LocalNode, NodeHandle};
pub use orchestrator::{RunOptions, RunSummary, Verifier};
use veriscan_utils::errors::{CompareError, DecodeError, EncodeError};

/// Main error type for verification operations
#[derive(thiserror::Error, Debug)]
pub enum VerificationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Explorer error: {0}")]
    Explorer(String),

    #[error("Source host error: {0}")]
    SourceHost(String),

    #[error("Compiler error: {0}")]
    Compiler(String),

    #[error("Node error: {0}")]
    Node(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Calldata error: {0}")]
    Calldata(String),

    #[error("Timed out after {seconds} seconds: {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Bytecode comparison failed: {0}")]
    Compare(#[from] CompareError),

    #[error("ABI encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for verification operations
pub type VerificationResult<T> = Result<T, VerificationError>;
