use std::fs;
use veriscan_verification::config::{Config, config_paths};
use veriscan_verification::VerificationError;

const CONFIG: &str = r#"{
    "contracts": {
        "0xC1d0b3DE6792Bf6b4b37EccdcC24e45978Cfd2Eb": "LidoLocator"
    },
    "explorer_hostname": "api.etherscan.io",
    "explorer_chain_id": 1,
    "github_repo": {
        "url": "https://github.com/lidofinance/core",
        "commit": "e2d1b3d5b3b2c2c9f7e07a4f3e3b1b8a4d1c0f3a",
        "relative_root": ""
    },
    "dependencies": {},
    "bytecode_comparison": {
        "hardhat_config_name": "mainnet_hardhat_config.js",
        "constructor_args": {
            "0xC1d0b3DE6792Bf6b4b37EccdcC24e45978Cfd2Eb": [
                ["0x0000000000000000000000000000000000000001"]
            ]
        }
    },
    "fail_on_bytecode_comparison_error": false
}"#;

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lido.json");
    fs::write(&path, CONFIG).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.explorer_chain_id, Some(1));
    assert!(!config.fail_on_bytecode_comparison_error);
    let cmp = config.bytecode_comparison.unwrap();
    assert_eq!(
        cmp.hardhat_config_name.as_deref(),
        Some("mainnet_hardhat_config.js")
    );
    assert_eq!(cmp.constructor_args.len(), 1);
}

#[test]
fn test_directory_runs_every_json_file_in_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.json", "a.json", "notes.txt"] {
        fs::write(dir.path().join(name), CONFIG).unwrap();
    }
    let paths = config_paths(dir.path()).unwrap();
    let names: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["a.json", "b.json"]);

    let empty = tempfile::tempdir().unwrap();
    assert!(config_paths(empty.path()).is_err());
}

#[test]
fn test_constructor_data_for_unknown_contract_is_rejected() {
    let text = CONFIG.replace(
        "\"constructor_args\": {\n            \"0xC1d0b3DE6792Bf6b4b37EccdcC24e45978Cfd2Eb\"",
        "\"constructor_args\": {\n            \"0x0000000000000000000000000000000000000002\"",
    );
    assert_ne!(text, CONFIG);
    assert!(matches!(
        Config::from_json_str(&text),
        Err(VerificationError::Configuration(_))
    ));
}

#[test]
fn test_malformed_json_is_a_serialization_error() {
    assert!(matches!(
        Config::from_json_str("{\"contracts\": "),
        Err(VerificationError::Serialization(_))
    ));
}
