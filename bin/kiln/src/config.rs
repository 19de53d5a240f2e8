//! Layered configuration: defaults, then `Kiln.toml`, then `KILN_*` variables, then flags.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use kiln_deploy::{DeploymentDir, Parameters, ReceiptPolling, RpcChainClient};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default RPC endpoint (local anvil or hardhat node).
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnConfig {
    pub rpc_url: Url,
    pub artifacts_dir: PathBuf,
    pub deployments_dir: PathBuf,
    /// Defaults to `chain-<chain-id>` when unset.
    pub deployment_id: Option<String>,
    pub sender: Option<Address>,
    pub receipt_poll_interval_ms: u64,
    pub receipt_poll_attempts: usize,
}

impl Default for KilnConfig {
    fn default() -> Self {
        let polling = ReceiptPolling::default();
        Self {
            rpc_url: Url::parse(DEFAULT_RPC_URL).expect("default RPC URL is valid"),
            artifacts_dir: PathBuf::from("artifacts"),
            deployments_dir: PathBuf::from("deployments"),
            deployment_id: None,
            sender: None,
            receipt_poll_interval_ms: polling.interval.as_millis() as u64,
            receipt_poll_attempts: polling.attempts,
        }
    }
}

/// Values set on the command line. Unset values leave lower layers untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployments_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Address>,
}

impl KilnConfig {
    pub fn load(path: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("KILN_").ignore(&["verbosity"]))
            .merge(Serialized::defaults(overrides))
            .extract()
            .with_context(|| format!("Invalid kiln configuration (file: {})", path.display()))?;

        tracing::debug!(
            rpc_url = %config.rpc_url,
            artifacts_dir = %config.artifacts_dir.display(),
            deployments_dir = %config.deployments_dir.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn receipt_polling(&self) -> ReceiptPolling {
        ReceiptPolling {
            interval: Duration::from_millis(self.receipt_poll_interval_ms),
            attempts: self.receipt_poll_attempts,
        }
    }

    pub fn client(&self) -> Result<RpcChainClient> {
        let client = RpcChainClient::connect(self.rpc_url.clone())?
            .with_receipt_polling(self.receipt_polling());
        Ok(match self.sender {
            Some(sender) => client.with_sender(sender),
            None => client,
        })
    }

    /// The deployment directory, naming it after the chain when no id is configured.
    pub async fn deployment(&self, client: &RpcChainClient) -> Result<DeploymentDir> {
        let id = match &self.deployment_id {
            Some(id) => id.clone(),
            None => {
                let chain_id = client
                    .chain_id()
                    .await
                    .with_context(|| format!("Failed to fetch the chain id from {}", client.url()))?;
                format!("chain-{chain_id}")
            }
        };
        Ok(DeploymentDir::new(&self.deployments_dir, id))
    }
}

/// Load a parameters file. `.json` files are read as JSON, everything else as TOML.
pub fn load_parameters(path: &Path) -> Result<Parameters> {
    if !path.exists() {
        anyhow::bail!("Parameters file not found: {}", path.display());
    }

    let figment = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Figment::from(Json::file(path)),
        _ => Figment::from(Toml::file(path)),
    };
    let document: serde_json::Value = figment
        .extract()
        .with_context(|| format!("Failed to parse parameters file {}", path.display()))?;

    Parameters::from_json(&document)
        .with_context(|| format!("Invalid parameters in {}", path.display()))
}
