//! Actions: the units of on-chain work a module declares.

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::{
    future::{ActionKey, Arg, ContractFuture, FutureOutput, FutureRef, ParamRef},
    value::Value,
};

/// What an action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "kind", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ActionKind {
    /// Deploy an artifact with constructor arguments.
    Deploy { artifact: String, args: Vec<Arg> },
    /// ABI-encode a call to `target` without sending it.
    EncodeCall {
        target: ActionKey,
        function: String,
        args: Vec<Arg>,
    },
    /// Send a transaction calling `target`.
    SendCall {
        target: ActionKey,
        function: String,
        args: Vec<Arg>,
    },
    /// Execute a read-only call against `target`.
    StaticCall {
        target: ActionKey,
        function: String,
        args: Vec<Arg>,
    },
    /// Use an existing contract at `address` through an artifact's ABI.
    AttachExisting { artifact: String, address: Arg },
}

impl ActionKind {
    /// The id an action gets when none is passed explicitly.
    pub fn default_id(&self) -> String {
        match self {
            ActionKind::Deploy { artifact, .. } | ActionKind::AttachExisting { artifact, .. } => {
                artifact.clone()
            }
            ActionKind::SendCall {
                target, function, ..
            } => format!("{}.{}", target.id, function_name(function)),
            ActionKind::EncodeCall {
                target, function, ..
            } => format!("{}.encode.{}", target.id, function_name(function)),
            ActionKind::StaticCall {
                target, function, ..
            } => format!("{}.read.{}", target.id, function_name(function)),
        }
    }

    pub fn label(&self) -> &'static str {
        self.into()
    }

    /// All arguments of the action, including the address of an attach.
    pub fn args(&self) -> Vec<&Arg> {
        match self {
            ActionKind::Deploy { args, .. }
            | ActionKind::EncodeCall { args, .. }
            | ActionKind::SendCall { args, .. }
            | ActionKind::StaticCall { args, .. } => args.iter().collect(),
            ActionKind::AttachExisting { address, .. } => vec![address],
        }
    }

    /// The contract a call is made against.
    pub fn target(&self) -> Option<&ActionKey> {
        match self {
            ActionKind::EncodeCall { target, .. }
            | ActionKind::SendCall { target, .. }
            | ActionKind::StaticCall { target, .. } => Some(target),
            ActionKind::Deploy { .. } | ActionKind::AttachExisting { .. } => None,
        }
    }

    /// The artifact whose ABI describes the produced contract.
    pub fn artifact(&self) -> Option<&str> {
        match self {
            ActionKind::Deploy { artifact, .. } | ActionKind::AttachExisting { artifact, .. } => {
                Some(artifact)
            }
            _ => None,
        }
    }

    pub fn produces_contract(&self) -> bool {
        self.artifact().is_some()
    }

    pub fn sends_transaction(&self) -> bool {
        matches!(self, ActionKind::Deploy { .. } | ActionKind::SendCall { .. })
    }

    /// Rebuild the action with every argument passed through `f`.
    pub fn map_args(&self, mut f: impl FnMut(&Arg) -> Arg) -> ActionKind {
        match self {
            ActionKind::Deploy { artifact, args } => ActionKind::Deploy {
                artifact: artifact.clone(),
                args: map_all(args, &mut f),
            },
            ActionKind::EncodeCall {
                target,
                function,
                args,
            } => ActionKind::EncodeCall {
                target: target.clone(),
                function: function.clone(),
                args: map_all(args, &mut f),
            },
            ActionKind::SendCall {
                target,
                function,
                args,
            } => ActionKind::SendCall {
                target: target.clone(),
                function: function.clone(),
                args: map_all(args, &mut f),
            },
            ActionKind::StaticCall {
                target,
                function,
                args,
            } => ActionKind::StaticCall {
                target: target.clone(),
                function: function.clone(),
                args: map_all(args, &mut f),
            },
            ActionKind::AttachExisting { artifact, address } => ActionKind::AttachExisting {
                artifact: artifact.clone(),
                address: f(address),
            },
        }
    }
}

fn map_all(args: &[Arg], f: &mut impl FnMut(&Arg) -> Arg) -> Vec<Arg> {
    args.iter().map(|arg| f(arg)).collect()
}

/// `upgradeTo(address)` -> `upgradeTo`
fn function_name(function: &str) -> &str {
    function.split('(').next().unwrap_or(function)
}

/// A declared action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub key: ActionKey,
    pub kind: ActionKind,
    /// Ordering-only dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<ActionKey>,
}

impl Action {
    /// Futures read by the action's arguments.
    pub fn futures(&self) -> Vec<&FutureRef> {
        let mut out = Vec::new();
        for arg in self.kind.args() {
            arg.futures(&mut out);
        }
        out
    }

    pub fn parameters(&self) -> Vec<&ParamRef> {
        let mut out = Vec::new();
        for arg in self.kind.args() {
            arg.parameters(&mut out);
        }
        out
    }

    /// Every action this one must run after: call target, argument futures and explicit
    /// `after` edges, deduplicated in order of appearance.
    pub fn dependencies(&self) -> Vec<&ActionKey> {
        let mut deps: Vec<&ActionKey> = Vec::new();
        let candidates = self
            .kind
            .target()
            .into_iter()
            .chain(self.futures().into_iter().map(|f| &f.key))
            .chain(self.after.iter());
        for key in candidates {
            if !deps.contains(&key) {
                deps.push(key);
            }
        }
        deps
    }
}

/// Optional settings of a declaration.
#[derive(Debug, Clone, Default)]
pub struct ActionOptions {
    pub id: Option<String>,
    pub after: Vec<ActionKey>,
}

impl ActionOptions {
    /// Options with an explicit action id.
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            after: Vec::new(),
        }
    }

    /// Run after the given action even without a data dependency.
    pub fn after(mut self, key: &ActionKey) -> Self {
        self.after.push(key.clone());
        self
    }

    pub fn after_contract(self, contract: &ContractFuture) -> Self {
        self.after(contract.key())
    }
}

/// Result of an executed action, as persisted in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ActionOutcome {
    Deployed { address: Address, tx_hash: B256 },
    Encoded { data: Bytes },
    Sent { tx_hash: B256 },
    Called { data: Bytes },
    Attached { address: Address },
}

impl ActionOutcome {
    /// Extract the value a future stands for.
    pub fn extract(&self, output: FutureOutput) -> Option<Value> {
        match (self, output) {
            (ActionOutcome::Deployed { address, .. }, FutureOutput::Primary)
            | (ActionOutcome::Attached { address }, FutureOutput::Primary) => {
                Some(Value::Address(*address))
            }
            (ActionOutcome::Encoded { data }, FutureOutput::Primary)
            | (ActionOutcome::Called { data }, FutureOutput::Primary) => {
                Some(Value::Bytes(data.clone()))
            }
            (ActionOutcome::Sent { tx_hash }, _)
            | (ActionOutcome::Deployed { tx_hash, .. }, FutureOutput::TxHash) => {
                Some(Value::Hash(*tx_hash))
            }
            _ => None,
        }
    }

    /// The contract address produced, if any.
    pub fn address(&self) -> Option<Address> {
        match self {
            ActionOutcome::Deployed { address, .. } | ActionOutcome::Attached { address } => {
                Some(*address)
            }
            _ => None,
        }
    }
}
