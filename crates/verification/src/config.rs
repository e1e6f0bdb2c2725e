//! Run configuration and environment settings

use crate::{VerificationError, VerificationResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Config file looked up when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
/// Hardhat config used for the local fork node when the config names none.
pub const DEFAULT_HARDHAT_CONFIG_PATH: &str = "hardhat_config.js";
/// RPC endpoint of the local fork node.
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:7545";

pub const GITHUB_TOKEN_ENV: &str = "GITHUB_API_TOKEN";
pub const REMOTE_RPC_URL_ENV: &str = "REMOTE_RPC_URL";
pub const LOCAL_RPC_URL_ENV: &str = "LOCAL_RPC_URL";

/// A repository pinned to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Repository URL, e.g. `https://github.com/org/repo`
    pub url: String,
    /// Commit hash or ref to read files at
    pub commit: String,
    /// Directory inside the repository that source paths are relative to
    #[serde(default)]
    pub relative_root: String,
}

/// Settings for the bytecode comparison step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BytecodeComparisonConfig {
    /// Hardhat config for the local fork node; without one the compiled runtime code is used
    #[serde(default)]
    pub hardhat_config_name: Option<String>,
    /// Raw constructor calldata per contract address
    #[serde(default)]
    pub constructor_calldata: IndexMap<String, String>,
    /// Constructor arguments per contract address, ABI-encoded before deployment
    #[serde(default)]
    pub constructor_args: IndexMap<String, Vec<Value>>,
}

/// One verification run: a set of contracts on one chain checked against one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Contract address to contract name, in run order
    pub contracts: IndexMap<String, String>,

    /// Repository the contracts are built from
    pub github_repo: RepoRef,

    /// Repositories of imported packages, keyed by import prefix (e.g. `@openzeppelin/contracts`)
    #[serde(default)]
    pub dependencies: IndexMap<String, RepoRef>,

    #[serde(default)]
    pub explorer_hostname: Option<String>,

    /// Environment variable holding the explorer hostname, if not given inline
    #[serde(default)]
    pub explorer_hostname_env_var: Option<String>,

    /// Environment variable holding the explorer API token
    #[serde(default)]
    pub explorer_token_env_var: Option<String>,

    #[serde(default)]
    pub explorer_chain_id: Option<u64>,

    #[serde(default)]
    pub bytecode_comparison: Option<BytecodeComparisonConfig>,

    /// Abort the batch on the first bytecode failure instead of logging it
    #[serde(default = "default_true")]
    pub fail_on_bytecode_comparison_error: bool,

    #[serde(default)]
    pub audit_url: Option<String>,

    /// Free-form data carried along for reports
    #[serde(default)]
    pub metadata: Option<Value>,
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Loads a config file. Only `.json` files are accepted.
    pub fn load(path: &Path) -> VerificationResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {}
            other => {
                return Err(VerificationError::Configuration(format!(
                    "unsupported config file extension {:?} for {}",
                    other.unwrap_or(""),
                    path.display()
                )));
            }
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        info!(path = %path.display(), contracts = config.contracts.len(), "loaded config");
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> VerificationResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> VerificationResult<()> {
        if self.contracts.is_empty() {
            return Err(VerificationError::Configuration(
                "contracts must list at least one address".to_string(),
            ));
        }

        if let Some(bad) = self.contracts.keys().find(|a| !is_address(a)) {
            return Err(VerificationError::Configuration(format!(
                "invalid contract address: {bad}"
            )));
        }

        if self.explorer_hostname.is_none() && self.explorer_hostname_env_var.is_none() {
            return Err(VerificationError::Configuration(
                "either explorer_hostname or explorer_hostname_env_var must be set".to_string(),
            ));
        }

        if self.github_repo.url.is_empty() || self.github_repo.commit.is_empty() {
            return Err(VerificationError::Configuration(
                "github_repo needs both url and commit".to_string(),
            ));
        }

        if let Some(cmp) = &self.bytecode_comparison {
            let unknown = cmp
                .constructor_calldata
                .keys()
                .chain(cmp.constructor_args.keys())
                .find(|a| !self.contracts.contains_key(*a));
            if let Some(address) = unknown {
                return Err(VerificationError::Configuration(format!(
                    "constructor data given for unlisted contract {address}"
                )));
            }
        }

        Ok(())
    }

    /// Explorer hostname, read from the environment when only the variable name is configured.
    pub fn resolve_explorer_hostname(&self) -> VerificationResult<String> {
        if let Some(host) = &self.explorer_hostname {
            return Ok(host.clone());
        }
        let var = self.explorer_hostname_env_var.as_deref().unwrap_or_default();
        load_env(var, false)?.ok_or_else(|| {
            VerificationError::Configuration(format!("environment variable {var} is not set"))
        })
    }

    /// Explorer API token, if a token variable is configured and set.
    pub fn resolve_explorer_token(&self) -> VerificationResult<Option<String>> {
        match &self.explorer_token_env_var {
            Some(var) => load_env(var, true),
            None => Ok(None),
        }
    }
}

/// Reads an environment variable and logs it, masking secrets.
pub fn load_env(name: &str, masked: bool) -> VerificationResult<Option<String>> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => {
            let shown = if masked {
                mask_text(&value, 3)
            } else {
                value.clone()
            };
            info!("{name} = {shown}");
            Ok(Some(value))
        }
        Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(VerificationError::Configuration(format!("{name}: {e}"))),
    }
}

/// Keeps `visible` characters at both ends and stars out the rest.
pub fn mask_text(text: &str, visible: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= visible * 2 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..visible].iter().collect();
    let tail: String = chars[chars.len() - visible..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - visible * 2))
}

/// `0x` followed by 40 hex digits.
pub fn is_address(text: &str) -> bool {
    text.strip_prefix("0x")
        .is_some_and(|h| h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Config files to run: the file itself, or every `.json` file in a directory, sorted.
pub fn config_paths(path: &Path) -> VerificationResult<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "json"))
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(VerificationError::Configuration(format!(
            "no config files found in {}",
            path.display()
        )));
    }
    Ok(paths)
}
