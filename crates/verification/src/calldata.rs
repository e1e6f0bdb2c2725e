//! Constructor calldata appended to creation code before a local deployment.

use crate::config::BytecodeComparisonConfig;
use crate::{VerificationError, VerificationResult};
use serde_json::Value;
use tracing::info;
use veriscan_core::decoder::input_to_bytes;
use veriscan_core::encoder::{constructor_inputs, encode_constructor_args};

/// Calldata for the contract at `address`.
///
/// Contracts whose ABI has no constructor, or a constructor without inputs, need none.
/// Otherwise exactly one of `constructor_calldata` (raw hex) or `constructor_args`
/// (JSON values, ABI-encoded here) must name the address.
pub fn constructor_calldata(
    address: &str,
    abi: &Value,
    settings: Option<&BytecodeComparisonConfig>,
) -> VerificationResult<Option<Vec<u8>>> {
    let Some(inputs) = constructor_inputs(abi)?.filter(|inputs| !inputs.is_empty()) else {
        info!(address, "ABI has no constructor, calldata skipped");
        return Ok(None);
    };

    let raw = settings.and_then(|s| s.constructor_calldata.get(address));
    let args = settings.and_then(|s| s.constructor_args.get(address));
    match (raw, args) {
        (Some(_), Some(_)) => Err(VerificationError::Calldata(format!(
            "contract {address} found in both constructor_args and constructor_calldata"
        ))),
        (None, None) => Err(VerificationError::Calldata(format!(
            "contract {address} not found in constructor_args or constructor_calldata, but ABI has a constructor"
        ))),
        (Some(raw), None) => {
            info!(address, "using prepared calldata");
            Ok(Some(input_to_bytes(raw, false)?))
        }
        (None, Some(args)) => {
            info!(address, args = args.len(), "encoding constructor arguments");
            let encoded = encode_constructor_args(&inputs, args)?;
            if encoded.is_empty() {
                return Err(VerificationError::Calldata(
                    "contract calldata is empty".to_string(),
                ));
            }
            Ok(Some(encoded))
        }
    }
}
