//! Minimal Ethereum JSON-RPC client.

use crate::{VerificationError, VerificationResult};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Gas limit sent with deployment transactions.
pub const DEPLOY_GAS: u64 = 9_000_000;
const RECEIPT_POLLS: usize = 20;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one request and returns its `result`, turning a JSON-RPC `error` into [`VerificationError::Rpc`].
    pub async fn call(&self, method: &str, params: Value) -> VerificationResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc call");
        let response: Value = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_response(method, response)
    }

    /// Runtime code at `address`, or `None` for an account without code.
    pub async fn get_code(&self, address: &str) -> VerificationResult<Option<String>> {
        let result = self.call("eth_getCode", json!([address, "latest"])).await?;
        let code = result
            .as_str()
            .ok_or_else(|| VerificationError::Rpc("eth_getCode returned a non-string".into()))?;
        let body = code.strip_prefix("0x").unwrap_or(code);
        Ok((!body.is_empty()).then(|| body.to_string()))
    }

    pub async fn chain_id(&self) -> VerificationResult<u64> {
        let result = self.call("eth_chainId", json!([])).await?;
        result
            .as_str()
            .and_then(parse_quantity)
            .ok_or_else(|| VerificationError::Rpc(format!("bad eth_chainId result {result}")))
    }

    pub async fn accounts(&self) -> VerificationResult<Vec<String>> {
        let result = self.call("eth_accounts", json!([])).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Deploys `data` from `from` and returns the new contract address.
    pub async fn deploy(&self, from: &str, data: &[u8]) -> VerificationResult<String> {
        let tx = json!({
            "from": from,
            "gas": format!("0x{DEPLOY_GAS:x}"),
            "data": format!("0x{}", hex::encode(data)),
        });
        let hash = self.call("eth_sendTransaction", json!([tx])).await?;
        let hash = hash
            .as_str()
            .ok_or_else(|| VerificationError::Rpc("eth_sendTransaction returned no hash".into()))?
            .to_string();
        info!(tx = %hash, "deployment transaction sent");

        for _ in 0..RECEIPT_POLLS {
            let receipt = self
                .call("eth_getTransactionReceipt", json!([hash]))
                .await?;
            if !receipt.is_null() {
                return contract_address(&receipt);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
        Err(VerificationError::Timeout {
            what: format!("receipt for {hash}"),
            seconds: (RECEIPT_POLL_INTERVAL * RECEIPT_POLLS as u32).as_secs(),
        })
    }
}

fn parse_response(method: &str, mut response: Value) -> VerificationResult<Value> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(VerificationError::Rpc(format!("{method}: {message}")));
    }
    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(VerificationError::Rpc(format!("{method}: response has no result"))),
    }
}

fn contract_address(receipt: &Value) -> VerificationResult<String> {
    let status = receipt.get("status").and_then(Value::as_str);
    if status.and_then(parse_quantity) != Some(1) {
        return Err(VerificationError::Rpc(format!(
            "deployment reverted (status {})",
            status.unwrap_or("missing")
        )));
    }
    receipt
        .get("contractAddress")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VerificationError::Rpc("receipt has no contractAddress".into()))
}

/// Parses a hex quantity such as `0x1`.
pub fn parse_quantity(text: &str) -> Option<u64> {
    u64::from_str_radix(text.strip_prefix("0x")?, 16).ok()
}
