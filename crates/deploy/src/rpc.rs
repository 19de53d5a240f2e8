//! JSON-RPC chain client for nodes with unlocked accounts (anvil, hardhat node, geth dev).

use std::{sync::Mutex, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes, U64};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use crate::chain::{ChainClient, Receipt};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// How long to wait for a transaction to be mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolling {
    pub interval: Duration,
    pub attempts: usize,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            attempts: 240,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    contract_address: Option<Address>,
    block_number: Option<U64>,
    status: Option<U64>,
}

/// [`ChainClient`] over HTTP JSON-RPC.
///
/// Transactions are sent with `eth_sendTransaction` from an account the node manages;
/// signing is left to the node.
#[derive(Debug)]
pub struct RpcChainClient {
    client: reqwest::Client,
    url: Url,
    sender: Option<Address>,
    accounts: OnceCell<Vec<Address>>,
    polling: ReceiptPolling,
    in_flight: Mutex<Option<B256>>,
}

impl RpcChainClient {
    pub fn connect(url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
            sender: None,
            accounts: OnceCell::new(),
            polling: ReceiptPolling::default(),
            in_flight: Mutex::new(None),
        })
    }

    /// Send transactions from `sender` instead of the node's first account.
    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_receipt_polling(mut self, polling: ReceiptPolling) -> Self {
        self.polling = polling;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn chain_id(&self) -> anyhow::Result<u64> {
        let id: U64 = self.call_rpc("eth_chainId", vec![]).await?;
        Ok(id.to::<u64>())
    }

    async fn call_rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> anyhow::Result<T> {
        json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }

    async fn accounts(&self) -> anyhow::Result<&[Address]> {
        let accounts = self
            .accounts
            .get_or_try_init(|| async {
                let accounts: Vec<Address> = self.call_rpc("eth_accounts", vec![]).await?;
                tracing::debug!(count = accounts.len(), "Fetched node accounts");
                Ok::<_, anyhow::Error>(accounts)
            })
            .await?;
        Ok(accounts)
    }

    async fn sender(&self) -> anyhow::Result<Address> {
        if let Some(sender) = self.sender {
            return Ok(sender);
        }
        self.account(0)
            .await
            .context("No sender configured and the node exposes no unlocked account")
    }

    async fn submit(&self, mut tx: serde_json::Map<String, Value>) -> anyhow::Result<Receipt> {
        tx.insert("from".to_string(), serde_json::to_value(self.sender().await?)?);
        let tx_hash: B256 = self
            .call_rpc("eth_sendTransaction", vec![Value::Object(tx)])
            .await?;
        tracing::debug!(%tx_hash, "Transaction submitted, waiting for receipt");
        self.set_in_flight(Some(tx_hash));
        let receipt = self.wait_for_receipt(tx_hash).await;
        self.set_in_flight(None);
        receipt
    }

    fn set_in_flight(&self, tx_hash: Option<B256>) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            *in_flight = tx_hash;
        }
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> anyhow::Result<Receipt> {
        let fetch = || async {
            let receipt: Option<RpcReceipt> = self
                .call_rpc("eth_getTransactionReceipt", vec![serde_json::to_value(tx_hash)?])
                .await?;
            receipt.with_context(|| format!("Transaction {tx_hash} is not mined yet"))
        };

        let receipt = fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.polling.interval)
                    .with_max_times(self.polling.attempts),
            )
            .notify(|err, _| {
                tracing::trace!(error = %err, %tx_hash, "Receipt not available, retrying...");
            })
            .await
            .with_context(|| format!("Timeout waiting for the receipt of {tx_hash}"))?;

        if receipt.status.is_some_and(|status| status.is_zero()) {
            anyhow::bail!("Transaction {tx_hash} reverted");
        }

        Ok(Receipt {
            tx_hash: receipt.transaction_hash,
            contract_address: receipt.contract_address,
            block_number: receipt.block_number.map(|n| n.to::<u64>()),
        })
    }
}

impl ChainClient for RpcChainClient {
    async fn deploy(&self, init_code: Bytes) -> anyhow::Result<Receipt> {
        let mut tx = serde_json::Map::new();
        tx.insert("data".to_string(), serde_json::to_value(init_code)?);
        self.submit(tx).await
    }

    async fn send(&self, to: Address, calldata: Bytes) -> anyhow::Result<Receipt> {
        let mut tx = serde_json::Map::new();
        tx.insert("to".to_string(), serde_json::to_value(to)?);
        tx.insert("data".to_string(), serde_json::to_value(calldata)?);
        self.submit(tx).await
    }

    async fn call(&self, to: Address, calldata: Bytes) -> anyhow::Result<Bytes> {
        let mut tx = serde_json::Map::new();
        tx.insert("to".to_string(), serde_json::to_value(to)?);
        tx.insert("data".to_string(), serde_json::to_value(calldata)?);
        if let Some(sender) = self.sender {
            tx.insert("from".to_string(), serde_json::to_value(sender)?);
        }
        self.call_rpc("eth_call", vec![Value::Object(tx), Value::from("latest")])
            .await
    }

    async fn account(&self, index: usize) -> anyhow::Result<Address> {
        let accounts = self.accounts().await?;
        accounts.get(index).copied().with_context(|| {
            format!(
                "Account #{index} requested but the node exposes {} account(s)",
                accounts.len()
            )
        })
    }

    fn pending_transaction(&self) -> Option<B256> {
        self.in_flight.lock().ok().and_then(|in_flight| *in_flight)
    }
}
