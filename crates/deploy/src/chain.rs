//! The chain client the engine drives.

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    /// Set for contract creations.
    pub contract_address: Option<Address>,
    pub block_number: Option<u64>,
}

/// Submits transactions and reads chain state.
///
/// Implementations return only once a transaction is mined, and return an error for
/// reverted transactions. Calldata and init code are fully encoded by the engine, so a
/// client needs no knowledge of contract ABIs.
pub trait ChainClient {
    /// Submit a contract creation and wait for its receipt.
    fn deploy(
        &self,
        init_code: Bytes,
    ) -> impl std::future::Future<Output = anyhow::Result<Receipt>> + Send;

    /// Submit a call transaction and wait for its receipt.
    fn send(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> impl std::future::Future<Output = anyhow::Result<Receipt>> + Send;

    /// Execute a read-only call and return the raw return data.
    fn call(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> impl std::future::Future<Output = anyhow::Result<Bytes>> + Send;

    /// The Nth account available to the client.
    fn account(
        &self,
        index: usize,
    ) -> impl std::future::Future<Output = anyhow::Result<Address>> + Send;

    /// Hash of a submitted transaction whose receipt is still awaited.
    ///
    /// Read by the engine when it abandons an action, so the journal names the
    /// transaction an operator must check before re-running.
    fn pending_transaction(&self) -> Option<B256> {
        None
    }
}
