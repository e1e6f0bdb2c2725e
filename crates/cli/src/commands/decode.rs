/// Module for the `decode` subcommand, which prints the instruction listing of EVM bytecode.
use async_trait::async_trait;
use clap::Args;
use std::error::Error;
use tracing::warn;
use veriscan_core::decoder::decode_bytecode;

/// Arguments for the `decode` subcommand.
#[derive(Args)]
pub struct DecodeArgs {
    /// Bytecode as a hex string (0x...) or file path prefixed with @
    pub input: String,
}

#[async_trait]
impl super::Command for DecodeArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let (source, is_file) = super::input_source(&self.input);
        let (decoded, info, _) = decode_bytecode(source, is_file)?;

        println!(
            "; {} bytes, {} instructions, keccak256 0x{}",
            info.byte_length,
            decoded.instructions.len(),
            hex::encode(info.keccak_hash)
        );
        for instr in &decoded.instructions {
            println!("{instr}");
        }
        if !decoded.unknown_opcodes.is_empty() {
            warn!(opcodes = ?decoded.unknown_opcodes, "unknown opcodes decoded as INVALID");
        }
        Ok(())
    }
}
