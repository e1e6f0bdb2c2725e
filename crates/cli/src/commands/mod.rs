use async_trait::async_trait;
use clap::Subcommand;
use std::error::Error;

pub mod compare;
pub mod decode;
pub mod encode;
pub mod run;
pub mod strip;

#[derive(Subcommand)]
pub enum Cmd {
    /// Verify the contracts of a config file or a directory of config files
    Run(run::RunArgs),

    /// Decode bytecode to an instruction listing
    Decode(decode::DecodeArgs),

    /// Split off the metadata trailer and appended string literal
    Trim(strip::TrimArgs),

    /// Compare deployed bytecode against expected bytecode
    Compare(compare::CompareArgs),

    /// ABI-encode constructor arguments
    Encode(encode::EncodeArgs),
}

#[async_trait]
pub trait Command {
    async fn execute(self) -> Result<(), Box<dyn Error>>;
}

#[async_trait]
impl Command for Cmd {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Run(args) => args.execute().await,
            Cmd::Decode(args) => args.execute().await,
            Cmd::Trim(args) => args.execute().await,
            Cmd::Compare(args) => args.execute().await,
            Cmd::Encode(args) => args.execute().await,
        }
    }
}

/// Splits a command-line input into `(source, is_file)`; `@path` names a file.
pub fn input_source(input: &str) -> (&str, bool) {
    match input.strip_prefix('@') {
        Some(path) => (path, true),
        None => (input, false),
    }
}

/// Text of an inline argument or of the `@path` file it names.
pub fn read_text(input: &str) -> Result<String, Box<dyn Error>> {
    match input_source(input) {
        (path, true) => Ok(std::fs::read_to_string(path)?),
        (text, false) => Ok(text.to_string()),
    }
}
