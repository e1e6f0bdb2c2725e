/// Module for the `run` subcommand, which verifies every contract of one or more configs.
use async_trait::async_trait;
use clap::Args;
use std::error::Error;
use std::path::PathBuf;
use tracing::{error, info};
use veriscan_verification::config::{
    DEFAULT_CONFIG_PATH, DEFAULT_LOCAL_RPC_URL, LOCAL_RPC_URL_ENV, REMOTE_RPC_URL_ENV,
    config_paths,
};
use veriscan_verification::orchestrator::default_digest_dir;
use veriscan_verification::{Config, RunOptions, Verifier};

/// Arguments for the `run` subcommand.
#[derive(Args)]
pub struct RunArgs {
    /// Config file, or a directory whose `.json` files are all run
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    pub path: PathBuf,

    /// Don't wait for Enter before each contract
    #[arg(long, short = 'y')]
    yes: bool,

    /// Search repositories by file name, for sources whose import paths were flattened by brownie
    #[arg(long)]
    support_brownie: bool,

    #[arg(long)]
    skip_binary_comparison: bool,

    /// Directory containing the hardhat project used for the fork node
    #[arg(long, default_value = ".")]
    hardhat_path: PathBuf,

    #[arg(long, env = LOCAL_RPC_URL_ENV, default_value = DEFAULT_LOCAL_RPC_URL)]
    local_rpc_url: String,

    #[arg(long, env = REMOTE_RPC_URL_ENV, hide_env_values = true)]
    remote_rpc_url: Option<String>,

    /// Output directory for reports and logs (default: digest/<unix timestamp>)
    #[arg(long)]
    pub digest_dir: Option<PathBuf>,

    /// Print colored report tables and diffs; log files always get the plain text
    #[arg(long)]
    color: bool,
}

impl RunArgs {
    pub const fn color(&self) -> bool {
        self.color
    }

    /// Run directory, fixed on first use so logs and reports share it.
    pub fn digest_dir(&mut self) -> PathBuf {
        self.digest_dir
            .get_or_insert_with(default_digest_dir)
            .clone()
    }
}

#[async_trait]
impl super::Command for RunArgs {
    async fn execute(mut self) -> Result<(), Box<dyn Error>> {
        let options = RunOptions {
            recursive: self.support_brownie,
            skip_binary_comparison: self.skip_binary_comparison,
            interactive: !self.yes,
            hardhat_path: self.hardhat_path.clone(),
            local_rpc_url: self.local_rpc_url.clone(),
            remote_rpc_url: self.remote_rpc_url.clone(),
            digest_dir: self.digest_dir(),
            color: self.color,
        };

        let mut failures = 0;
        for path in config_paths(&self.path)? {
            info!(path = %path.display(), "loading config");
            let config = Config::load(&path)?;
            let summary = Verifier::new(config, options.clone())?.run().await?;
            failures += summary.failures();
        }

        info!(reports = %options.digest_dir.display(), "reports written");
        if failures > 0 {
            error!(failures, "bytecode verification failed");
            return Err(format!("{failures} contract(s) failed bytecode comparison").into());
        }
        Ok(())
    }
}
