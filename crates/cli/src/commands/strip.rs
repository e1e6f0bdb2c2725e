use async_trait::async_trait;
use clap::Args;
use serde_json::json;
use std::error::Error;
use veriscan_core::decoder::input_to_bytes;
use veriscan_core::strip::trim;

#[derive(Args)]
pub struct TrimArgs {
    /// Bytecode as a hex string (0x...) or file path prefixed with @
    pub input: String,

    /// Output the trimmed code hex instead of a JSON report
    #[arg(long)]
    raw: bool,
}

#[async_trait]
impl super::Command for TrimArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let (source, is_file) = super::input_source(&self.input);
        let bytes = input_to_bytes(source, is_file)?;
        let trimmed = trim(&bytes);

        if self.raw {
            println!("0x{}", trimmed.code_hex());
        } else {
            let report = json!({
                "input_length": bytes.len(),
                "code_length": trimmed.code.len(),
                "code": format!("0x{}", trimmed.code_hex()),
                "string_literal": trimmed.string_literal,
                "metadata": format!("0x{}", trimmed.metadata_hex()),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(())
    }
}
