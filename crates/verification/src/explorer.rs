//! Verified-source retrieval from block explorers.
//!
//! Every supported explorer exposes the same capability, fetching the verified sources of a
//! contract, but with its own endpoint and response shape. The provider is picked from the
//! explorer hostname.

use crate::{VerificationError, VerificationResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

/// One source file of a solc standard-JSON input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub content: String,
}

/// Solc standard-JSON input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolcInput {
    pub language: String,
    pub sources: IndexMap<String, SourceFile>,
    #[serde(default)]
    pub settings: Value,
}

/// Verified contract as reported by an explorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractSource {
    pub name: String,
    /// Compiler long version, e.g. `v0.8.9+commit.e5eed63a`
    pub compiler_version: String,
    pub solc_input: SolcInput,
}

impl ContractSource {
    /// Fails unless the explorer reports the contract under `expected`.
    pub fn ensure_name(&self, expected: &str) -> VerificationResult<()> {
        if self.name == expected {
            Ok(())
        } else {
            Err(VerificationError::Explorer(format!(
                "contract name mismatch: explorer reports {}, config expects {expected}",
                self.name
            )))
        }
    }
}

/// Anything that can return the verified sources of a deployed contract.
#[async_trait]
pub trait ExplorerProvider: Send + Sync {
    async fn fetch_verified_source(&self, address: &str) -> VerificationResult<ContractSource>;
}

/// The explorer API families veriscan speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Etherscan,
    /// Etherscan-compatible API that rejects an `apikey` parameter
    EtherscanNoToken,
    Blockscout,
    Zksync,
    Mantle,
}

#[derive(Debug, Clone, Copy)]
enum HostPattern {
    Prefix(&'static str),
    Suffix(&'static str),
}

impl HostPattern {
    fn matches(self, host: &str) -> bool {
        match self {
            Self::Prefix(p) => host.starts_with(p),
            Self::Suffix(s) => host.ends_with(s),
        }
    }
}

/// First match wins; anything unmatched is treated as Etherscan.
const PROVIDER_PATTERNS: &[(HostPattern, ProviderKind)] = &[
    (HostPattern::Prefix("zksync"), ProviderKind::Zksync),
    (HostPattern::Suffix("mantle.xyz"), ProviderKind::Mantle),
    (HostPattern::Suffix("lineascan.build"), ProviderKind::EtherscanNoToken),
    (HostPattern::Suffix("mode.network"), ProviderKind::Blockscout),
    (HostPattern::Suffix("blockscout.com"), ProviderKind::Blockscout),
    (HostPattern::Suffix("swellnetwork.io"), ProviderKind::Blockscout),
    (HostPattern::Suffix("lisk.com"), ProviderKind::Blockscout),
];

/// Picks the provider for an explorer hostname.
pub fn provider_kind(hostname: &str) -> ProviderKind {
    PROVIDER_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.matches(hostname))
        .map(|&(_, kind)| kind)
        .unwrap_or(ProviderKind::Etherscan)
}

/// Outputs requested from solc for every compilation.
pub fn output_selection() -> Value {
    json!({
        "*": {
            "*": [
                "abi",
                "evm.bytecode",
                "evm.deployedBytecode",
                "evm.methodIdentifiers",
                "metadata"
            ],
            "": ["ast"]
        }
    })
}

/// HTTP client for one explorer.
#[derive(Debug, Clone)]
pub struct Explorer {
    kind: ProviderKind,
    client: reqwest::Client,
    hostname: String,
    token: Option<String>,
    chain_id: Option<u64>,
}

impl Explorer {
    pub fn new(hostname: &str, token: Option<String>, chain_id: Option<u64>) -> Self {
        let kind = provider_kind(hostname);
        info!(hostname, ?kind, "using explorer");
        Self {
            kind,
            client: reqwest::Client::new(),
            hostname: hostname.to_string(),
            token,
            chain_id,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Request URL for `address` on this explorer.
    pub fn source_url(&self, address: &str) -> String {
        let host = &self.hostname;
        match self.kind {
            ProviderKind::Zksync => format!("https://{host}/contract_verification/info/{address}"),
            ProviderKind::Blockscout => format!("https://{host}/api/v2/smart-contracts/{address}"),
            ProviderKind::Etherscan | ProviderKind::EtherscanNoToken | ProviderKind::Mantle => {
                let mut url = format!(
                    "https://{host}/api?module=contract&action=getsourcecode&address={address}"
                );
                if let Some(chain_id) = self.chain_id {
                    url.push_str(&format!("&chainid={chain_id}"));
                }
                if let (ProviderKind::Etherscan, Some(token)) = (self.kind, &self.token) {
                    url.push_str(&format!("&apikey={token}"));
                }
                url
            }
        }
    }

    async fn get_json(&self, address: &str) -> VerificationResult<Value> {
        let url = self.source_url(address);
        debug!(kind = ?self.kind, address, "requesting verified source");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ExplorerProvider for Explorer {
    async fn fetch_verified_source(&self, address: &str) -> VerificationResult<ContractSource> {
        let body = self.get_json(address).await?;
        let source = match self.kind {
            ProviderKind::Etherscan | ProviderKind::EtherscanNoToken => parse_etherscan(&body)?,
            ProviderKind::Mantle => parse_mantle(&body)?,
            ProviderKind::Blockscout => parse_blockscout(&body)?,
            ProviderKind::Zksync => parse_zksync(&body)?,
        };
        info!(
            address,
            name = %source.name,
            files = source.solc_input.sources.len(),
            compiler = %source.compiler_version,
            "fetched verified source"
        );
        Ok(source)
    }
}

fn field<'a>(value: &'a Value, key: &str) -> VerificationResult<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| VerificationError::Explorer(format!("response is missing `{key}`")))
}

/// First entry of an Etherscan-style `result` array, after checking the status.
fn etherscan_result(body: &Value) -> VerificationResult<&Value> {
    if body.get("status").and_then(Value::as_str) == Some("0") {
        let detail = body
            .get("result")
            .and_then(Value::as_str)
            .or_else(|| body.get("message").and_then(Value::as_str))
            .unwrap_or("unknown error");
        return Err(VerificationError::Explorer(format!(
            "explorer returned NOTOK: {detail}"
        )));
    }
    let result = body
        .get("result")
        .and_then(|r| r.get(0))
        .ok_or_else(|| VerificationError::Explorer("empty result".to_string()))?;
    if field(result, "SourceCode")?.is_empty() {
        return Err(VerificationError::Explorer(
            "contract is not verified".to_string(),
        ));
    }
    Ok(result)
}

/// Settings for sources that did not come with their own standard-JSON settings.
fn default_settings(optimize: bool, runs: u64, evm_version: Option<&str>) -> Value {
    let mut settings = json!({
        "optimizer": { "enabled": optimize, "runs": runs },
        "outputSelection": output_selection(),
    });
    if let Some(evm) = evm_version.filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("default"))
    {
        settings["evmVersion"] = json!(evm);
    }
    settings
}

fn with_output_selection(mut settings: Value) -> Value {
    if !settings.is_object() {
        settings = json!({});
    }
    settings["outputSelection"] = output_selection();
    settings
}

fn parse_runs(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(200),
        Some(Value::String(s)) => s.parse().unwrap_or(200),
        _ => 200,
    }
}

/// Parses an Etherscan `getsourcecode` response.
///
/// `SourceCode` comes in three shapes: a standard-JSON input wrapped in an extra pair of
/// braces, a bare `{path: {content}}` map, or a single flattened file.
pub fn parse_etherscan(body: &Value) -> VerificationResult<ContractSource> {
    let result = etherscan_result(body)?;
    let name = field(result, "ContractName")?.to_string();
    let compiler_version = field(result, "CompilerVersion")?.to_string();
    let code = field(result, "SourceCode")?;

    let solc_input = if let Some(inner) = code
        .strip_prefix("{{")
        .and_then(|c| c.strip_suffix("}}"))
    {
        let mut input: SolcInput = serde_json::from_str(&format!("{{{inner}}}"))?;
        input.settings = with_output_selection(input.settings);
        input
    } else {
        let optimize = field(result, "OptimizationUsed").unwrap_or("0") == "1";
        let runs = parse_runs(result.get("Runs"));
        let settings = default_settings(optimize, runs, result.get("EVMVersion").and_then(Value::as_str));
        let sources = if code.trim_start().starts_with('{') {
            serde_json::from_str(code)?
        } else {
            IndexMap::from([(
                format!("{name}.sol"),
                SourceFile {
                    content: code.to_string(),
                },
            )])
        };
        SolcInput {
            language: "Solidity".to_string(),
            sources,
            settings,
        }
    };

    Ok(ContractSource {
        name,
        compiler_version,
        solc_input,
    })
}

/// Parses a Mantle explorer response: Etherscan-style, with the main file name and the
/// remaining files listed separately.
pub fn parse_mantle(body: &Value) -> VerificationResult<ContractSource> {
    let result = etherscan_result(body)?;
    let code = field(result, "SourceCode")?;
    if code.starts_with('{') {
        return parse_etherscan(body);
    }
    let name = field(result, "ContractName")?.to_string();
    let file_name = field(result, "FileName").unwrap_or(&name).to_string();

    let mut sources = IndexMap::from([(
        file_name,
        SourceFile {
            content: code.to_string(),
        },
    )]);
    for extra in result
        .get("AdditionalSources")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        sources.insert(
            field(extra, "Filename")?.to_string(),
            SourceFile {
                content: field(extra, "SourceCode")?.to_string(),
            },
        );
    }

    Ok(ContractSource {
        name,
        compiler_version: field(result, "CompilerVersion")?.to_string(),
        solc_input: SolcInput {
            language: "Solidity".to_string(),
            sources,
            settings: default_settings(
                field(result, "OptimizationUsed").unwrap_or("0") == "1",
                parse_runs(result.get("Runs")),
                result.get("EVMVersion").and_then(Value::as_str),
            ),
        },
    })
}

/// Parses a Blockscout `/api/v2/smart-contracts/{address}` response.
pub fn parse_blockscout(body: &Value) -> VerificationResult<ContractSource> {
    if body.get("is_verified").and_then(Value::as_bool) == Some(false) {
        return Err(VerificationError::Explorer(
            "contract is not verified".to_string(),
        ));
    }
    let name = field(body, "name")?.to_string();
    let main_path = field(body, "file_path").unwrap_or(&name).to_string();

    let mut sources = IndexMap::from([(
        main_path,
        SourceFile {
            content: field(body, "source_code")?.to_string(),
        },
    )]);
    for extra in body
        .get("additional_sources")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        sources.insert(
            field(extra, "file_path")?.to_string(),
            SourceFile {
                content: field(extra, "source_code")?.to_string(),
            },
        );
    }

    let settings = match body.get("compiler_settings") {
        Some(settings) if settings.is_object() => with_output_selection(settings.clone()),
        _ => default_settings(
            body.get("optimization_enabled")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            parse_runs(body.get("optimization_runs")),
            body.get("evm_version").and_then(Value::as_str),
        ),
    };

    Ok(ContractSource {
        name,
        compiler_version: field(body, "compiler_version")?.to_string(),
        solc_input: SolcInput {
            language: "Solidity".to_string(),
            sources,
            settings,
        },
    })
}

/// Parses a zkSync `contract_verification/info` response.
pub fn parse_zksync(body: &Value) -> VerificationResult<ContractSource> {
    let request = body
        .get("request")
        .ok_or_else(|| VerificationError::Explorer("response is missing `request`".to_string()))?;
    let qualified = field(request, "contractName")?;
    let name = qualified.rsplit(':').next().unwrap_or(qualified).to_string();
    let version = field(request, "compilerSolcVersion")?;
    let compiler_version = if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{version}")
    };

    let source_code = request
        .get("sourceCode")
        .ok_or_else(|| VerificationError::Explorer("response is missing `sourceCode`".into()))?;
    let solc_input = match source_code {
        Value::Object(_) if source_code.get("sources").is_some() => {
            let mut input: SolcInput = serde_json::from_value(source_code.clone())?;
            input.settings = with_output_selection(input.settings);
            input
        }
        Value::String(code) => {
            let path = qualified
                .rsplit_once(':')
                .map(|(p, _)| p.to_string())
                .unwrap_or_else(|| format!("{name}.sol"));
            SolcInput {
                language: "Solidity".to_string(),
                sources: IndexMap::from([(path, SourceFile { content: code.clone() })]),
                settings: default_settings(
                    request
                        .pointer("/optimizationUsed")
                        .and_then(Value::as_bool)
                        .unwrap_or(true),
                    200,
                    None,
                ),
            }
        }
        _ => {
            return Err(VerificationError::Explorer(
                "unsupported zkSync sourceCode format".to_string(),
            ));
        }
    };

    Ok(ContractSource {
        name,
        compiler_version,
        solc_input,
    })
}
