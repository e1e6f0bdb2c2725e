//! Local Hardhat fork node used to deploy compiled code.

use crate::{VerificationError, VerificationResult};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// How long the node gets to start listening.
pub const NODE_INIT_TIMEOUT: Duration = Duration::from_secs(5);
const PORT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Settings for one Hardhat fork node.
#[derive(Debug, Clone)]
pub struct LocalNode {
    /// Directory `npx hardhat` runs in
    pub hardhat_path: PathBuf,
    pub config_path: PathBuf,
    pub local_rpc_url: String,
    pub remote_rpc_url: String,
}

/// A running node; dropped handles kill the process.
#[derive(Debug)]
pub struct NodeHandle {
    child: Child,
    url: String,
}

/// `(host, port)` of an RPC URL; the port must be explicit.
pub fn host_and_port(url: &str) -> VerificationResult<(String, u16)> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| VerificationError::Node(format!("invalid local RPC url {url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| VerificationError::Node(format!("local RPC url {url} has no host")))?;
    let port = parsed.port().ok_or_else(|| {
        VerificationError::Node(format!(
            "invalid local RPC url (TCP port not specified): {url}"
        ))
    })?;
    Ok((host.to_string(), port))
}

async fn port_in_use(host: &str, port: u16) -> bool {
    TcpStream::connect((host, port)).await.is_ok()
}

impl LocalNode {
    pub fn command_line(&self, host: &str, port: u16) -> Vec<String> {
        vec![
            "hardhat".to_string(),
            "node".to_string(),
            "--hostname".to_string(),
            host.to_string(),
            "--port".to_string(),
            port.to_string(),
            "--config".to_string(),
            self.config_path.display().to_string(),
            "--fork".to_string(),
            self.remote_rpc_url.clone(),
        ]
    }

    /// Starts the node and waits until its port accepts connections.
    pub async fn start(&self) -> VerificationResult<NodeHandle> {
        let (host, port) = host_and_port(&self.local_rpc_url)?;
        if !self.config_path.is_file() {
            return Err(VerificationError::Node(format!(
                "failed to find Hardhat config at {}",
                self.config_path.display()
            )));
        }
        if port_in_use(&host, port).await {
            return Err(VerificationError::Node(format!("{host}:{port} is busy")));
        }

        let args = self.command_line(&host, port);
        info!(dir = %self.hardhat_path.display(), port, "starting hardhat node");
        let mut child = Command::new("npx")
            .args(&args)
            .current_dir(&self.hardhat_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VerificationError::Node(format!("failed to spawn npx: {e}")))?;

        let deadline = Instant::now() + NODE_INIT_TIMEOUT;
        loop {
            if let Some(status) = child.try_wait()? {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    pipe.read_to_string(&mut stderr).await?;
                }
                return Err(VerificationError::Node(format!(
                    "hardhat exited with {status}: {}",
                    stderr.trim()
                )));
            }
            if port_in_use(&host, port).await {
                info!(pid = ?child.id(), "hardhat node started");
                return Ok(NodeHandle {
                    child,
                    url: self.local_rpc_url.clone(),
                });
            }
            if Instant::now() >= deadline {
                // kill_on_drop takes the process down with `child`
                return Err(VerificationError::Timeout {
                    what: "hardhat node start".to_string(),
                    seconds: NODE_INIT_TIMEOUT.as_secs(),
                });
            }
            debug!("waiting for hardhat node");
            sleep(PORT_POLL_INTERVAL).await;
        }
    }
}

impl NodeHandle {
    pub fn rpc_url(&self) -> &str {
        &self.url
    }

    /// Kills the node and reaps it.
    pub async fn stop(mut self) -> VerificationResult<()> {
        if self.child.try_wait()?.is_some() {
            warn!("hardhat node already exited");
            return Ok(());
        }
        let pid = self.child.id();
        self.child.kill().await?;
        info!(pid = ?pid, "hardhat node stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_is_required() {
        assert_eq!(
            host_and_port("http://127.0.0.1:7545").unwrap(),
            ("127.0.0.1".to_string(), 7545)
        );
        let err = host_and_port("http://localhost").unwrap_err();
        assert!(err.to_string().contains("TCP port not specified"));
    }

    #[test]
    fn builds_fork_command() {
        let node = LocalNode {
            hardhat_path: PathBuf::from("."),
            config_path: PathBuf::from("hardhat_config.js"),
            local_rpc_url: "http://127.0.0.1:7545".into(),
            remote_rpc_url: "https://rpc.example".into(),
        };
        let args = node.command_line("127.0.0.1", 7545).join(" ");
        assert_eq!(
            args,
            "hardhat node --hostname 127.0.0.1 --port 7545 --config hardhat_config.js --fork https://rpc.example"
        );
    }

    #[tokio::test]
    async fn missing_config_fails_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let node = LocalNode {
            hardhat_path: dir.path().to_path_buf(),
            config_path: dir.path().join("absent.js"),
            local_rpc_url: "http://127.0.0.1:7545".into(),
            remote_rpc_url: "https://rpc.example".into(),
        };
        let err = node.start().await.unwrap_err();
        assert!(err.to_string().contains("failed to find Hardhat config"));
    }
}
