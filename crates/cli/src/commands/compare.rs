/// Module for the `compare` subcommand, which runs the bytecode comparator on two inputs.
///
/// Immutable slots are read from solc's `immutableReferences` object, given inline or as an
/// `@file`. The annotated diff is printed and a real mismatch exits with an error.
use async_trait::async_trait;
use clap::Args;
use std::error::Error;
use std::io::IsTerminal;
use veriscan_core::compare::{CompareOptions, DEFAULT_CONTEXT};
use veriscan_core::{BytecodeComparator, Comparison, ImmutableReferences, Verdict};

/// Arguments for the `compare` subcommand.
#[derive(Args)]
pub struct CompareArgs {
    /// Deployed bytecode, hex or @file
    pub actual: String,

    /// Expected bytecode, hex or @file
    pub expected: String,

    /// solc `immutableReferences` JSON of the expected code, inline or @file
    #[arg(long)]
    immutables: Option<String>,

    /// Instructions shown around each difference
    #[arg(long, default_value_t = DEFAULT_CONTEXT)]
    context: usize,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[async_trait]
impl super::Command for CompareArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let actual = super::read_text(&self.actual)?;
        let expected = super::read_text(&self.expected)?;
        let immutables = match &self.immutables {
            Some(text) => {
                let value: serde_json::Value = serde_json::from_str(&super::read_text(text)?)?;
                ImmutableReferences::from_compiler_output(&value)
            }
            None => ImmutableReferences::new(),
        };

        let comparator = BytecodeComparator::new(CompareOptions {
            context: self.context,
        });
        let comparison = comparator.evaluate(actual.trim(), expected.trim(), &immutables)?;

        let color = !self.no_color && std::io::stdout().is_terminal();
        if let Some(text) = diff_text(&comparison, color) {
            println!("{text}");
        }
        match comparison.into_result()? {
            Verdict::FullMatch => println!("bytecodes fully match"),
            _ => println!("bytecodes differ only on immutable reference positions"),
        }
        Ok(())
    }
}

/// The annotated diff, legend included, when the inputs differ.
fn diff_text(comparison: &Comparison, color: bool) -> Option<&str> {
    comparison.diff.as_ref().map(|diff| diff.text(color))
}
