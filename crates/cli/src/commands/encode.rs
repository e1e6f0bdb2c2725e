use async_trait::async_trait;
use clap::Args;
use serde_json::Value;
use std::error::Error;
use veriscan_core::encoder::{constructor_inputs, encode_constructor_args};

/// Arguments for the `encode` subcommand.
#[derive(Args)]
pub struct EncodeArgs {
    /// Contract ABI JSON (or compiler output with an `abi` field), inline or @file
    pub abi: String,

    /// Constructor arguments as a JSON array, inline or @file
    pub args: String,
}

#[async_trait]
impl super::Command for EncodeArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let mut abi: Value = serde_json::from_str(&super::read_text(&self.abi)?)?;
        if let Some(inner) = abi.get_mut("abi") {
            abi = inner.take();
        }
        let args: Vec<Value> = serde_json::from_str(&super::read_text(&self.args)?)?;

        let inputs = constructor_inputs(&abi)?.unwrap_or_default();
        let encoded = encode_constructor_args(&inputs, &args)?;
        println!("0x{}", hex::encode(encoded));
        Ok(())
    }
}
