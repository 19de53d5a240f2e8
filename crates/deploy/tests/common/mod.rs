//! Shared fixtures: an in-memory chain client, proxy artifacts and the proxy modules.

#![allow(dead_code)]

use std::sync::Mutex;

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes, U256},
};
use kiln_deploy::{
    ActionOptions, Artifact, ChainClient, MemoryArtifacts, Module, ModuleBuilder, ParamDefault,
    Receipt,
};
use tokio::sync::Notify;

/// A transaction the mock chain received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Deploy { init_code: Bytes, address: Address },
    Send { to: Address, calldata: Bytes },
}

#[derive(Debug, Default)]
struct State {
    submissions: Vec<Submission>,
    calls: usize,
    account_lookups: usize,
    failing: Vec<usize>,
    hanging: Option<usize>,
    awaiting: Option<B256>,
}

/// Chain client that mines every transaction instantly.
///
/// Addresses and hashes are derived from the submission number, so they are
/// deterministic across test runs.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<State>,
    /// Notified when a submission starts hanging.
    pub hung: Notify,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revert the `n`th submission (1-based) made to this chain.
    pub fn fail_submission(&self, n: usize) {
        self.state.lock().unwrap().failing.push(n);
    }

    /// Never mine the `n`th submission (1-based).
    pub fn hang_on_submission(&self, n: usize) {
        self.state.lock().unwrap().hanging = Some(n);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Every client call, including reads and account lookups.
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn account_lookups(&self) -> usize {
        self.state.lock().unwrap().account_lookups
    }

    pub fn deployed(&self) -> Vec<Address> {
        self.submissions()
            .into_iter()
            .filter_map(|s| match s {
                Submission::Deploy { address, .. } => Some(address),
                Submission::Send { .. } => None,
            })
            .collect()
    }

    pub fn account_address(index: usize) -> Address {
        Address::repeat_byte(0xa0 + index as u8)
    }

    /// Record a submission; `None` when it must hang.
    fn submit(&self, submission: impl FnOnce(u64) -> Submission) -> Option<anyhow::Result<Receipt>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let n = state.submissions.len() + 1;
        let submission = submission(n as u64);
        let contract_address = match &submission {
            Submission::Deploy { address, .. } => Some(*address),
            Submission::Send { .. } => None,
        };
        state.submissions.push(submission);

        if state.hanging == Some(n) {
            state.awaiting = Some(tx_hash(n as u64));
            return None;
        }
        if state.failing.contains(&n) {
            return Some(Err(anyhow::anyhow!("Transaction #{n} reverted")));
        }
        Some(Ok(Receipt {
            tx_hash: tx_hash(n as u64),
            contract_address,
            block_number: Some(n as u64),
        }))
    }

    async fn mine(&self, submission: impl FnOnce(u64) -> Submission) -> anyhow::Result<Receipt> {
        match self.submit(submission) {
            Some(receipt) => receipt,
            None => {
                self.hung.notify_one();
                std::future::pending().await
            }
        }
    }
}

pub fn contract_address(n: u64) -> Address {
    Address::left_padding_from(&(0x1000 + n).to_be_bytes())
}

pub fn tx_hash(n: u64) -> B256 {
    B256::left_padding_from(&n.to_be_bytes())
}

/// Return data of every read: `uint256(42)`.
pub fn read_result() -> Bytes {
    Bytes::from(U256::from(42).to_be_bytes::<32>().to_vec())
}

impl ChainClient for MockChain {
    async fn deploy(&self, init_code: Bytes) -> anyhow::Result<Receipt> {
        self.mine(|n| Submission::Deploy {
            init_code,
            address: contract_address(n),
        })
        .await
    }

    async fn send(&self, to: Address, calldata: Bytes) -> anyhow::Result<Receipt> {
        self.mine(|_| Submission::Send { to, calldata }).await
    }

    async fn call(&self, _to: Address, _calldata: Bytes) -> anyhow::Result<Bytes> {
        self.state.lock().unwrap().calls += 1;
        Ok(read_result())
    }

    async fn account(&self, index: usize) -> anyhow::Result<Address> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state.account_lookups += 1;
        Ok(Self::account_address(index))
    }

    fn pending_transaction(&self) -> Option<B256> {
        self.state.lock().unwrap().awaiting
    }
}

fn artifact(name: &str, signatures: &[&str], bytecode: u8) -> Artifact {
    let abi = JsonAbi::parse(signatures.iter().copied()).expect("valid test ABI");
    Artifact::new(name, abi, vec![0x60, bytecode])
}

/// BoxV1, BoxV2 and an ERC-1967 proxy.
pub fn artifacts() -> MemoryArtifacts {
    MemoryArtifacts::new()
        .with(artifact(
            "BoxV1",
            &[
                "function initialize(address admin)",
                "function store(uint256 value)",
                "function retrieve() view returns (uint256)",
                "function upgradeTo(address newImplementation)",
            ],
            0x01,
        ))
        .with(artifact(
            "BoxV2",
            &[
                "function initialize(address admin)",
                "function store(uint256 value)",
                "function retrieve() view returns (uint256)",
                "function increment()",
                "function upgradeTo(address newImplementation)",
            ],
            0x02,
        ))
        .with(artifact(
            "ERC1967Proxy",
            &[
                "constructor(address implementation, bytes data)",
                "function upgradeTo(address newImplementation)",
            ],
            0x03,
        ))
}

/// Implementation, initializer calldata and proxy.
pub fn deployment_module() -> Module {
    let mut m = ModuleBuilder::new("Deployment");
    let admin = m.parameter("admin", ParamDefault::Account(0)).unwrap();
    let implementation = m.deploy("BoxV1", vec![]).unwrap();
    let init = m
        .encode_call(&implementation, "initialize", vec![admin.into()])
        .unwrap();
    let proxy = m
        .deploy("ERC1967Proxy", vec![(&implementation).into(), init.into()])
        .unwrap();
    m.output("proxy", &proxy).unwrap();
    m.output("implementation", &implementation).unwrap();
    m.build()
}

/// Upgrades the proxy of [`deployment_module`] to BoxV2.
pub fn upgrade_module(deployment: &Module) -> Module {
    let mut m = ModuleBuilder::new("Upgrade");
    let proxy = m.use_module(deployment).unwrap().contract("proxy").unwrap();
    let v2 = m.deploy("BoxV2", vec![]).unwrap();
    let upgrade = m
        .send_call(&proxy, "upgradeTo", vec![(&v2).into()])
        .unwrap();
    let proxied = m
        .attach_with(
            "BoxV2",
            &proxy,
            ActionOptions::id("ProxiedBox").after(&upgrade.key),
        )
        .unwrap();
    m.output("box", &proxied).unwrap();
    m.output("upgrade_tx", &upgrade).unwrap();
    m.build()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
