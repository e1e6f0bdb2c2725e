//! Solc toolchain: build lookup, download, checksum and standard-JSON compilation.

use crate::explorer::SolcInput;
use crate::{VerificationError, VerificationResult};
use serde::Deserialize;
use serde_json::Value;
use sha3::{Digest, Keccak256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use veriscan_core::ImmutableReferences;

/// Host serving solc builds and their `list.json` indexes.
pub const SOLC_BINARIES_URL: &str = "https://binaries.soliditylang.org";
/// Limit for a single `solc --standard-json` run.
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry of a platform's `list.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildInfo {
    pub path: String,
    pub version: String,
    #[serde(rename = "longVersion")]
    pub long_version: String,
    pub keccak256: String,
    #[serde(default)]
    pub sha256: String,
}

#[derive(Debug, Deserialize)]
struct BuildList {
    builds: Vec<BuildInfo>,
}

/// Outputs of the target contract needed for bytecode comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifacts {
    pub abi: Value,
    /// Creation code, hex without `0x`
    pub creation_code: String,
    /// Runtime code, hex without `0x`; immutable slots are zero-filled
    pub deployed_bytecode: String,
    pub immutables: ImmutableReferences,
}

/// solc-bin platform directory for the running OS.
pub fn platform() -> VerificationResult<&'static str> {
    match std::env::consts::OS {
        "linux" => Ok("linux-amd64"),
        "macos" => Ok("macosx-amd64"),
        "windows" => Ok("windows-amd64"),
        other => Err(VerificationError::Compiler(format!(
            "no solc builds for platform {other}"
        ))),
    }
}

/// Build whose long version equals `compiler_version` with any leading `v` removed.
pub fn find_build<'a>(builds: &'a [BuildInfo], compiler_version: &str) -> Option<&'a BuildInfo> {
    let wanted = compiler_version.strip_prefix('v').unwrap_or(compiler_version);
    builds.iter().find(|b| b.long_version == wanted)
}

/// Checks `bytes` against a `0x`-prefixed keccak256 digest from `list.json`.
pub fn verify_checksum(bytes: &[u8], expected: &str) -> VerificationResult<()> {
    let digest = Keccak256::digest(bytes);
    let actual = hex::encode(digest);
    let expected = expected.strip_prefix("0x").unwrap_or(expected);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(VerificationError::Compiler(format!(
            "compiler checksum mismatch: expected {expected}, got {actual}"
        )))
    }
}

/// Downloads, caches and runs solc builds.
#[derive(Debug, Clone)]
pub struct SolcManager {
    client: reqwest::Client,
    cache_dir: PathBuf,
    platform: &'static str,
}

impl SolcManager {
    /// Manager caching builds in `<tmp>/solc_builds`.
    pub fn new() -> VerificationResult<Self> {
        Self::with_cache_dir(std::env::temp_dir().join("solc_builds"))
    }

    pub fn with_cache_dir(cache_dir: PathBuf) -> VerificationResult<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            cache_dir,
            platform: platform()?,
        })
    }

    /// Looks up the build for an explorer-reported compiler version.
    pub async fn build_info(&self, compiler_version: &str) -> VerificationResult<BuildInfo> {
        let url = format!("{SOLC_BINARIES_URL}/{}/list.json", self.platform);
        let list: BuildList = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        find_build(&list.builds, compiler_version)
            .cloned()
            .ok_or_else(|| {
                VerificationError::Compiler(format!(
                    "compiler {compiler_version} not found for {}",
                    self.platform
                ))
            })
    }

    /// Path of a verified, executable compiler, downloading it on first use.
    pub async fn ensure_compiler(&self, build: &BuildInfo) -> VerificationResult<PathBuf> {
        let path = self.cache_dir.join(&build.path);
        if path.exists() {
            let cached = tokio::fs::read(&path).await?;
            if verify_checksum(&cached, &build.keccak256).is_ok() {
                debug!(path = %path.display(), "using cached compiler");
                return Ok(path);
            }
            warn!(path = %path.display(), "cached compiler failed checksum, downloading again");
        }

        let url = format!("{SOLC_BINARIES_URL}/{}/{}", self.platform, build.path);
        info!(version = %build.long_version, "downloading compiler");
        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        verify_checksum(&bytes, &build.keccak256)?;

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::write(&path, &bytes).await?;
        make_executable(&path).await?;
        Ok(path)
    }

    /// Runs `solc --standard-json` on `input` and returns the parsed output.
    pub async fn compile(&self, solc: &Path, input: &SolcInput) -> VerificationResult<Value> {
        let payload = serde_json::to_vec(input)?;
        let mut child = Command::new(solc)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
        }

        let output = timeout(COMPILE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| VerificationError::Timeout {
                what: "solc compilation".to_string(),
                seconds: COMPILE_TIMEOUT.as_secs(),
            })??;

        if !output.status.success() {
            return Err(VerificationError::Compiler(format!(
                "solc exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let parsed: Value = serde_json::from_slice(&output.stdout)?;
        let errors: Vec<&str> = parsed
            .get("errors")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|e| e.get("severity").and_then(Value::as_str) == Some("error"))
            .filter_map(|e| {
                e.get("formattedMessage")
                    .or_else(|| e.get("message"))
                    .and_then(Value::as_str)
            })
            .collect();
        if !errors.is_empty() {
            return Err(VerificationError::Compiler(errors.join("\n")));
        }
        Ok(parsed)
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> VerificationResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> VerificationResult<()> {
    Ok(())
}

/// The single compiled contract named `name`, searched across all source files.
pub fn target_contract<'a>(output: &'a Value, name: &str) -> VerificationResult<&'a Value> {
    let matches: Vec<&Value> = output
        .get("contracts")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|files| files.values())
        .filter_map(|contracts| contracts.get(name))
        .collect();
    match matches.as_slice() {
        [contract] => Ok(contract),
        [] => Err(VerificationError::Compiler(format!(
            "contract {name} not found in compiler output"
        ))),
        _ => Err(VerificationError::Compiler(format!(
            "multiple contracts with the same name {name}"
        ))),
    }
}

/// Extracts ABI, creation code, runtime code and immutable slots of a compiled contract.
pub fn parse_compiled_contract(contract: &Value) -> VerificationResult<CompiledArtifacts> {
    let object = |pointer: &str| {
        contract
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| VerificationError::Compiler(format!("compiler output lacks {pointer}")))
    };
    Ok(CompiledArtifacts {
        abi: contract.get("abi").cloned().unwrap_or(Value::Array(Vec::new())),
        creation_code: object("/evm/bytecode/object")?,
        deployed_bytecode: object("/evm/deployedBytecode/object")?,
        immutables: contract
            .pointer("/evm/deployedBytecode/immutableReferences")
            .map(ImmutableReferences::from_compiler_output)
            .unwrap_or_default(),
    })
}
