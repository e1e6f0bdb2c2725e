//! Runs the source diff and the bytecode comparison for every contract of a config.

use crate::calldata::constructor_calldata;
use crate::compiler::{SolcManager, parse_compiled_contract, target_contract};
use crate::config::{
    Config, DEFAULT_HARDHAT_CONFIG_PATH, DEFAULT_LOCAL_RPC_URL, GITHUB_TOKEN_ENV,
    REMOTE_RPC_URL_ENV, load_env,
};
use crate::explorer::{ContractSource, Explorer, ExplorerProvider, SolcInput};
use crate::github::{GithubClient, SourceHost};
use crate::node::{LocalNode, NodeHandle};
use crate::rpc::RpcClient;
use crate::source_diff::{
    FileDiff, SourceDiffOptions, SourceDiffReport, render_report_table, run_source_diff,
};
use crate::{VerificationError, VerificationResult};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use veriscan_core::compare::CompareOptions;
use veriscan_core::decoder::input_to_bytes;
use veriscan_core::{BytecodeComparator, Verdict};

/// Tracing target of rendered report tables and bytecode diffs. These events always carry the
/// plain rendering; the colored one goes straight to stdout.
pub const REPORT_TARGET: &str = "veriscan::report";

/// Per-run switches, mostly taken from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Search repositories by file name for flattened import paths
    pub recursive: bool,
    pub skip_binary_comparison: bool,
    /// Wait for Enter before diffing each contract
    pub interactive: bool,
    /// Directory `npx hardhat` runs in
    pub hardhat_path: PathBuf,
    pub local_rpc_url: String,
    /// Falls back to `REMOTE_RPC_URL` when unset
    pub remote_rpc_url: Option<String>,
    /// Run directory for reports, `digest/{unix_ts}` by default
    pub digest_dir: PathBuf,
    pub color: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            skip_binary_comparison: false,
            interactive: false,
            hardhat_path: PathBuf::from("."),
            local_rpc_url: DEFAULT_LOCAL_RPC_URL.to_string(),
            remote_rpc_url: None,
            digest_dir: default_digest_dir(),
            color: false,
        }
    }
}

/// `digest/{unix timestamp}` for a run starting now.
pub fn default_digest_dir() -> PathBuf {
    PathBuf::from("digest").join(chrono::Utc::now().timestamp().to_string())
}

/// What happened to a contract's bytecode check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BytecodeOutcome {
    Skipped,
    Verified(Verdict),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ContractOutcome {
    pub address: String,
    pub name: String,
    pub files: Vec<FileDiff>,
    pub bytecode: BytecodeOutcome,
}

impl ContractOutcome {
    pub fn files_found(&self) -> usize {
        self.files.iter().filter(|f| f.found).count()
    }

    pub fn identical_files(&self) -> usize {
        self.files.iter().filter(|f| f.found && f.diffs == 0).count()
    }

    pub fn sources_match(&self) -> bool {
        self.files.iter().all(|f| f.found && f.diffs == 0)
    }
}

/// Outcomes of one config, in config order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub contracts: Vec<ContractOutcome>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Contracts whose bytecode check failed.
    pub fn failures(&self) -> usize {
        self.contracts
            .iter()
            .filter(|c| matches!(c.bytecode, BytecodeOutcome::Failed(_)))
            .count()
    }

    /// Contracts with a missing or differing source file.
    pub fn source_mismatches(&self) -> usize {
        self.contracts.iter().filter(|c| !c.sources_match()).count()
    }

    pub fn passed(&self) -> bool {
        self.failures() == 0
    }

    pub fn log(&self) {
        for c in &self.contracts {
            let bytecode = match &c.bytecode {
                BytecodeOutcome::Skipped => "skipped".to_string(),
                BytecodeOutcome::Verified(v) => format!("{v:?}"),
                BytecodeOutcome::Failed(e) => format!("FAILED: {e}"),
            };
            info!(
                "{} {}: files {}/{} identical, bytecode {bytecode}",
                c.address,
                c.name,
                c.identical_files(),
                c.files.len()
            );
        }
        info!(
            contracts = self.contracts.len(),
            failures = self.failures(),
            source_mismatches = self.source_mismatches(),
            "Done in {:.3}s",
            self.elapsed.as_secs_f64()
        );
    }
}

/// Shared state of the bytecode step for one run.
struct BytecodeContext {
    remote: RpcClient,
    local: Option<RpcClient>,
    solc: SolcManager,
}

/// Verifies the contracts of one config.
pub struct Verifier {
    config: Config,
    options: RunOptions,
    explorer: Box<dyn ExplorerProvider>,
    host: Box<dyn SourceHost>,
}

impl Verifier {
    /// Verifier talking to the configured explorer and to GitHub.
    pub fn new(config: Config, options: RunOptions) -> VerificationResult<Self> {
        let hostname = config.resolve_explorer_hostname()?;
        let token = config.resolve_explorer_token()?;
        let explorer = Explorer::new(&hostname, token, config.explorer_chain_id);
        let github_token = load_env(GITHUB_TOKEN_ENV, true)?;
        let host = GithubClient::new(github_token.as_deref())?;
        Ok(Self::with_collaborators(
            config,
            options,
            Box::new(explorer),
            Box::new(host),
        ))
    }

    pub fn with_collaborators(
        config: Config,
        options: RunOptions,
        explorer: Box<dyn ExplorerProvider>,
        host: Box<dyn SourceHost>,
    ) -> Self {
        Self {
            config,
            options,
            explorer,
            host,
        }
    }

    fn bytecode_enabled(&self) -> bool {
        !self.options.skip_binary_comparison && self.config.bytecode_comparison.is_some()
    }

    fn report(&self, plain: &str, colored: impl FnOnce() -> String) {
        info!(target: REPORT_TARGET, "\n{plain}");
        if self.options.color {
            println!("{}", colored());
        }
    }

    fn remote_rpc_url(&self) -> VerificationResult<String> {
        if let Some(url) = &self.options.remote_rpc_url {
            return Ok(url.clone());
        }
        load_env(REMOTE_RPC_URL_ENV, true)?.ok_or_else(|| {
            VerificationError::Configuration(format!(
                "{REMOTE_RPC_URL_ENV} is required for bytecode comparison"
            ))
        })
    }

    /// Processes every contract in config order.
    ///
    /// With `fail_on_bytecode_comparison_error` set, the first bytecode failure aborts the
    /// run with its error; otherwise it is recorded in the summary and the run goes on.
    pub async fn run(&self) -> VerificationResult<RunSummary> {
        let started = Instant::now();
        let repo = &self.config.github_repo;
        info!(
            repo = %repo.url,
            commit = %repo.commit,
            relative_root = %repo.relative_root,
            contracts = self.config.contracts.len(),
            "starting verification"
        );

        let mut node: Option<NodeHandle> = None;
        let context = if self.bytecode_enabled() {
            let remote_url = self.remote_rpc_url()?;
            let remote = RpcClient::new(remote_url.clone());
            self.check_chain_id(&remote).await?;

            let hardhat_config = self
                .config
                .bytecode_comparison
                .as_ref()
                .and_then(|b| b.hardhat_config_name.clone());
            let local = match hardhat_config {
                Some(name) => {
                    let name = if name.is_empty() {
                        DEFAULT_HARDHAT_CONFIG_PATH.to_string()
                    } else {
                        name
                    };
                    let handle = LocalNode {
                        hardhat_path: self.options.hardhat_path.clone(),
                        config_path: self.options.hardhat_path.join(name),
                        local_rpc_url: self.options.local_rpc_url.clone(),
                        remote_rpc_url: remote_url,
                    }
                    .start()
                    .await?;
                    let client = RpcClient::new(handle.rpc_url());
                    node = Some(handle);
                    Some(client)
                }
                None => {
                    warn!("no hardhat config, comparing against compiled runtime code");
                    None
                }
            };
            Some(BytecodeContext {
                remote,
                local,
                solc: SolcManager::new()?,
            })
        } else {
            debug!("bytecode comparison disabled");
            None
        };

        let result = self.run_contracts(context.as_ref()).await;

        if let Some(handle) = node {
            if let Err(e) = handle.stop().await {
                warn!("failed to stop hardhat node: {e}");
            }
        }

        let mut summary = result?;
        summary.elapsed = started.elapsed();
        summary.log();
        Ok(summary)
    }

    async fn check_chain_id(&self, remote: &RpcClient) -> VerificationResult<()> {
        let Some(expected) = self.config.explorer_chain_id else {
            return Ok(());
        };
        let actual = remote.chain_id().await?;
        if actual != expected {
            return Err(VerificationError::Configuration(format!(
                "remote RPC is on chain {actual}, config expects {expected}"
            )));
        }
        Ok(())
    }

    async fn run_contracts(
        &self,
        context: Option<&BytecodeContext>,
    ) -> VerificationResult<RunSummary> {
        let mut summary = RunSummary::default();
        for (address, name) in &self.config.contracts {
            let outcome = self.run_contract(address, name, context).await?;
            summary.contracts.push(outcome);
        }
        Ok(summary)
    }

    async fn run_contract(
        &self,
        address: &str,
        name: &str,
        context: Option<&BytecodeContext>,
    ) -> VerificationResult<ContractOutcome> {
        info!(address, name, "fetching verified source");
        let source = self.explorer.fetch_verified_source(address).await?;
        source.ensure_name(name)?;
        info!(address, name, files = source.solc_input.sources.len(), "contract found");

        if self.options.interactive {
            wait_for_enter().await?;
        }

        let options = SourceDiffOptions {
            recursive: self.options.recursive,
            digest_dir: self.options.digest_dir.clone(),
        };
        let report =
            run_source_diff(self.host.as_ref(), &self.config, address, &source, &options).await?;
        self.report(&render_report_table(&report.files, false), || {
            render_report_table(&report.files, true)
        });

        let bytecode = match context {
            None => BytecodeOutcome::Skipped,
            Some(context) => match self.verify_bytecode(address, &source, &report, context).await {
                Ok(verdict) => BytecodeOutcome::Verified(verdict),
                Err(e) if self.config.fail_on_bytecode_comparison_error => return Err(e),
                Err(e) => {
                    error!(address, "bytecode comparison failed: {e}");
                    BytecodeOutcome::Failed(e.to_string())
                }
            },
        };

        Ok(ContractOutcome {
            address: address.to_string(),
            name: name.to_string(),
            files: report.files,
            bytecode,
        })
    }

    async fn verify_bytecode(
        &self,
        address: &str,
        source: &ContractSource,
        report: &SourceDiffReport,
        context: &BytecodeContext,
    ) -> VerificationResult<Verdict> {
        info!(address, compiler = %source.compiler_version, "compiling");
        let input = with_repository_sources(&source.solc_input, &report.fetched);
        let build = context.solc.build_info(&source.compiler_version).await?;
        let solc = context.solc.ensure_compiler(&build).await?;
        let output = context.solc.compile(&solc, &input).await?;
        let artifacts = parse_compiled_contract(target_contract(&output, &source.name)?)?;
        info!(
            address,
            immutables = artifacts.immutables.len(),
            "compiled target contract"
        );

        let expected = match &context.local {
            Some(local) => {
                let calldata = constructor_calldata(
                    address,
                    &artifacts.abi,
                    self.config.bytecode_comparison.as_ref(),
                )?;
                let mut creation = input_to_bytes(&artifacts.creation_code, false)?;
                creation.extend(calldata.unwrap_or_default());

                let deployer = local.accounts().await?.into_iter().next().ok_or_else(|| {
                    VerificationError::Rpc("local node has no accounts".to_string())
                })?;
                let deployed = local.deploy(&deployer, &creation).await?;
                info!(address, local = %deployed, "deployed compiled code");
                local.get_code(&deployed).await?.ok_or_else(|| {
                    VerificationError::Rpc(format!("no code at local deployment {deployed}"))
                })?
            }
            None => artifacts.deployed_bytecode.clone(),
        };

        let actual = context.remote.get_code(address).await?.ok_or_else(|| {
            VerificationError::Rpc(format!("no code deployed at {address}"))
        })?;

        let comparison = BytecodeComparator::new(CompareOptions::default()).evaluate(
            &actual,
            &expected,
            &artifacts.immutables,
        )?;
        if let Some(diff) = &comparison.diff {
            self.report(&diff.plain, || diff.colored.clone());
        }
        let verdict = comparison.into_result()?;
        match verdict {
            Verdict::FullMatch => info!(address, "bytecodes fully match"),
            _ => info!(address, "bytecodes differ only on immutable reference positions"),
        }
        Ok(verdict)
    }
}

/// Explorer input with every file found in the repository replaced by the repository copy.
pub fn with_repository_sources(input: &SolcInput, fetched: &IndexMap<String, String>) -> SolcInput {
    let mut input = input.clone();
    for (path, file) in input.sources.iter_mut() {
        match fetched.get(path) {
            Some(content) => file.content = content.clone(),
            None => warn!(path = %path, "compiling explorer copy, file not found in repository"),
        }
    }
    input
}

async fn wait_for_enter() -> VerificationResult<()> {
    println!("Press Enter to proceed...");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::SourceFile;

    #[test]
    fn repository_sources_replace_explorer_copies() {
        let mut sources = IndexMap::new();
        sources.insert(
            "contracts/A.sol".to_string(),
            SourceFile {
                content: "explorer A".into(),
            },
        );
        sources.insert(
            "contracts/B.sol".to_string(),
            SourceFile {
                content: "explorer B".into(),
            },
        );
        let input = SolcInput {
            language: "Solidity".into(),
            sources,
            settings: serde_json::json!({}),
        };
        let fetched = IndexMap::from([("contracts/A.sol".to_string(), "repo A".to_string())]);

        let merged = with_repository_sources(&input, &fetched);
        assert_eq!(merged.sources["contracts/A.sol"].content, "repo A");
        assert_eq!(merged.sources["contracts/B.sol"].content, "explorer B");
    }

    #[test]
    fn summary_fails_only_on_bytecode() {
        let outcome = |bytecode| ContractOutcome {
            address: "0x1".into(),
            name: "A".into(),
            files: Vec::new(),
            bytecode,
        };
        let mut summary = RunSummary {
            contracts: vec![
                outcome(BytecodeOutcome::Skipped),
                outcome(BytecodeOutcome::Verified(Verdict::ImmutableOnlyMismatch)),
            ],
            elapsed: Duration::ZERO,
        };
        assert!(summary.passed());
        summary
            .contracts
            .push(outcome(BytecodeOutcome::Failed("boom".into())));
        assert!(!summary.passed());
        assert_eq!(summary.failures(), 1);
    }
}
