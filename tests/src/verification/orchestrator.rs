use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use veriscan_verification::config::RepoRef;
use veriscan_verification::explorer::{SolcInput, SourceFile};
use veriscan_verification::orchestrator::{BytecodeOutcome, REPORT_TARGET};
use veriscan_verification::source_diff::MISSING_FILE_PLACEHOLDER;
use veriscan_verification::{
    Config, ContractSource, ExplorerProvider, RunOptions, SourceHost, VerificationError,
    VerificationResult, Verifier,
};

const TOKEN: &str = "0x1111111111111111111111111111111111111111";
const TOKEN_SOL: &str = "pragma solidity 0.8.9;\n\ncontract Token is ERC20 {}\n";
const ERC20_SOL: &str = "pragma solidity ^0.8.0;\n\ncontract ERC20 {\n    uint256 supply;\n}\n";

struct FakeExplorer {
    sources: IndexMap<String, String>,
}

#[async_trait]
impl ExplorerProvider for FakeExplorer {
    async fn fetch_verified_source(&self, address: &str) -> VerificationResult<ContractSource> {
        if address != TOKEN {
            return Err(VerificationError::Explorer(format!("{address} is not verified")));
        }
        let sources = self
            .sources
            .iter()
            .map(|(path, content)| {
                (
                    path.clone(),
                    SourceFile {
                        content: content.clone(),
                    },
                )
            })
            .collect();
        Ok(ContractSource {
            name: "Token".to_string(),
            compiler_version: "v0.8.9+commit.e5eed63a".to_string(),
            solc_input: SolcInput {
                language: "Solidity".to_string(),
                sources,
                settings: serde_json::json!({}),
            },
        })
    }
}

/// Serves files keyed by `(repo url, path)` and records every request.
#[derive(Clone, Default)]
struct FakeHost {
    files: HashMap<(String, String), String>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn fetch(
        &self,
        repo: &RepoRef,
        path: &str,
        _recursive: bool,
    ) -> VerificationResult<Option<String>> {
        let key = (repo.url.clone(), path.to_string());
        self.requests.lock().unwrap().push(key.clone());
        Ok(self.files.get(&key).cloned())
    }
}

fn config(name: &str) -> Config {
    Config::from_json_str(&format!(
        r#"{{
            "contracts": {{ "{TOKEN}": "{name}" }},
            "explorer_hostname": "api.etherscan.io",
            "github_repo": {{
                "url": "https://github.com/acme/token",
                "commit": "abc",
                "relative_root": ""
            }},
            "dependencies": {{
                "@openzeppelin/contracts": {{
                    "url": "https://github.com/OpenZeppelin/openzeppelin-contracts",
                    "commit": "v4.9.0",
                    "relative_root": "contracts"
                }}
            }}
        }}"#
    ))
    .unwrap()
}

fn explorer() -> FakeExplorer {
    FakeExplorer {
        sources: IndexMap::from([
            ("contracts/Token.sol".to_string(), TOKEN_SOL.to_string()),
            (
                "@openzeppelin/contracts/token/ERC20/ERC20.sol".to_string(),
                ERC20_SOL.to_string(),
            ),
            ("contracts/Extra.sol".to_string(), "contract Extra {}\n".to_string()),
        ]),
    }
}

fn host() -> FakeHost {
    let mut host = FakeHost::default();
    host.files.insert(
        (
            "https://github.com/acme/token".to_string(),
            "contracts/Token.sol".to_string(),
        ),
        TOKEN_SOL.to_string(),
    );
    host.files.insert(
        (
            "https://github.com/OpenZeppelin/openzeppelin-contracts".to_string(),
            "token/ERC20/ERC20.sol".to_string(),
        ),
        ERC20_SOL.replace("supply", "totalSupply"),
    );
    host
}

fn options(digest_dir: &std::path::Path) -> RunOptions {
    RunOptions {
        digest_dir: digest_dir.to_path_buf(),
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn test_source_diff_run() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let digest = tempfile::tempdir().unwrap();
    let host = host();
    let requests = host.requests.clone();

    let verifier = Verifier::with_collaborators(
        config("Token"),
        options(digest.path()),
        Box::new(explorer()),
        Box::new(host),
    );
    let summary = verifier.run().await.unwrap();

    assert!(summary.passed());
    assert_eq!(summary.contracts.len(), 1);
    let outcome = &summary.contracts[0];
    assert_eq!(outcome.bytecode, BytecodeOutcome::Skipped);
    assert_eq!(outcome.files.len(), 3);
    assert_eq!(outcome.files_found(), 2);
    assert_eq!(outcome.identical_files(), 1);
    assert!(!outcome.sources_match());
    assert_eq!(summary.source_mismatches(), 1);

    let token = &outcome.files[0];
    assert_eq!((token.index, token.found, token.diffs), (1, true, 0));
    assert_eq!(token.origin, "contracts");

    let erc20 = &outcome.files[1];
    assert_eq!(erc20.origin, "@openzeppelin");
    assert_eq!(erc20.diffs, 2);

    let extra = &outcome.files[2];
    assert!(!extra.found);
    let report = std::fs::read_to_string(&extra.report_path).unwrap();
    assert!(report.contains(&MISSING_FILE_PLACEHOLDER.replace('<', "&lt;").replace('>', "&gt;")));

    for file in &outcome.files {
        assert!(file.report_path.starts_with(digest.path().join("diffs").join(TOKEN)));
        assert!(file.report_path.is_file());
    }

    // dependency files are requested from their own repository, without the prefix
    let requests = requests.lock().unwrap();
    assert!(requests.contains(&(
        "https://github.com/OpenZeppelin/openzeppelin-contracts".to_string(),
        "token/ERC20/ERC20.sol".to_string()
    )));
}

#[tokio::test]
async fn test_contract_name_mismatch_aborts() {
    let digest = tempfile::tempdir().unwrap();
    let verifier = Verifier::with_collaborators(
        config("Vault"),
        options(digest.path()),
        Box::new(explorer()),
        Box::new(host()),
    );
    let err = verifier.run().await.unwrap_err();
    assert!(matches!(err, VerificationError::Explorer(_)));
    assert!(err.to_string().contains("contract name mismatch"));
}

#[tokio::test]
async fn test_skip_flag_disables_bytecode_step() {
    let digest = tempfile::tempdir().unwrap();
    let mut config = config("Token");
    config.bytecode_comparison = Some(Default::default());
    let verifier = Verifier::with_collaborators(
        config,
        RunOptions {
            skip_binary_comparison: true,
            ..options(digest.path())
        },
        Box::new(explorer()),
        Box::new(host()),
    );
    let summary = verifier.run().await.unwrap();
    assert_eq!(summary.contracts[0].bytecode, BytecodeOutcome::Skipped);
}

/// Collects everything a fmt layer writes.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_colored_run_logs_plain_reports() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_target(true)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let digest = tempfile::tempdir().unwrap();
    let verifier = Verifier::with_collaborators(
        config("Token"),
        RunOptions {
            color: true,
            ..options(digest.path())
        },
        Box::new(explorer()),
        Box::new(host()),
    );
    verifier.run().await.unwrap();

    let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(text.contains(REPORT_TARGET));
    assert!(text.contains("Filename"));
    assert!(!text.contains('\x1b'), "escape codes in log output:\n{text}");
}
