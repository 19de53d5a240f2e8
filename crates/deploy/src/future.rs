//! Futures: placeholders for values produced by actions that have not run yet.

use std::fmt;

use alloy_core::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable identifier of an action: the module that declares it and its module-scoped id.
///
/// Keys are persisted in the deployment journal. Renaming a module or an action id
/// orphans the journal history of that action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionKey {
    pub module: String,
    pub id: String,
}

impl ActionKey {
    pub fn new(module: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.module, self.id)
    }
}

/// Which value of an action's result a future stands for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FutureOutput {
    /// Contract address for deploy/attach, calldata for encode, return data for static
    /// calls, transaction hash for sends.
    #[default]
    Primary,
    /// Hash of the transaction that executed the action.
    TxHash,
}

/// Reference to the output of a producing action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FutureRef {
    pub key: ActionKey,
    #[serde(default)]
    pub output: FutureOutput,
}

impl FutureRef {
    pub fn new(key: ActionKey) -> Self {
        Self {
            key,
            output: FutureOutput::Primary,
        }
    }

    /// The transaction hash of the producing action.
    pub fn tx_hash(&self) -> FutureRef {
        FutureRef {
            key: self.key.clone(),
            output: FutureOutput::TxHash,
        }
    }
}

impl fmt::Display for FutureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.output {
            FutureOutput::Primary => write!(f, "{}", self.key),
            FutureOutput::TxHash => write!(f, "{}:tx", self.key),
        }
    }
}

/// A future contract address typed with the artifact whose ABI applies to it.
///
/// Returned by deploy and attach declarations, and usable as the target of calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractFuture {
    pub(crate) future: FutureRef,
    pub(crate) artifact: String,
}

impl ContractFuture {
    pub fn key(&self) -> &ActionKey {
        &self.future.key
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// The future contract address.
    pub fn address(&self) -> FutureRef {
        self.future.clone()
    }

    /// The transaction hash of the deployment.
    pub fn tx_hash(&self) -> FutureRef {
        self.future.tx_hash()
    }
}

/// Reference to a module parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamRef {
    pub module: String,
    pub name: String,
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}", self.module, self.name)
    }
}

/// An action argument, possibly unknown until other actions have executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "arg", content = "value", rename_all = "kebab-case")]
pub enum Arg {
    Literal(Value),
    Future(FutureRef),
    Parameter(ParamRef),
    Array(Vec<Arg>),
}

impl Arg {
    /// Collect the futures this argument depends on, in order of appearance.
    pub fn futures<'a>(&'a self, out: &mut Vec<&'a FutureRef>) {
        match self {
            Arg::Future(future) => out.push(future),
            Arg::Array(items) => items.iter().for_each(|item| item.futures(out)),
            Arg::Literal(_) | Arg::Parameter(_) => {}
        }
    }

    /// Collect the parameters this argument reads, in order of appearance.
    pub fn parameters<'a>(&'a self, out: &mut Vec<&'a ParamRef>) {
        match self {
            Arg::Parameter(param) => out.push(param),
            Arg::Array(items) => items.iter().for_each(|item| item.parameters(out)),
            Arg::Literal(_) | Arg::Future(_) => {}
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Literal(value)
    }
}

impl From<FutureRef> for Arg {
    fn from(future: FutureRef) -> Self {
        Arg::Future(future)
    }
}

impl From<&FutureRef> for Arg {
    fn from(future: &FutureRef) -> Self {
        Arg::Future(future.clone())
    }
}

impl From<&ContractFuture> for Arg {
    fn from(contract: &ContractFuture) -> Self {
        Arg::Future(contract.address())
    }
}

impl From<ContractFuture> for Arg {
    fn from(contract: ContractFuture) -> Self {
        Arg::Future(contract.future)
    }
}

impl From<ParamRef> for Arg {
    fn from(param: ParamRef) -> Self {
        Arg::Parameter(param)
    }
}

impl From<&ParamRef> for Arg {
    fn from(param: &ParamRef) -> Self {
        Arg::Parameter(param.clone())
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(items: Vec<Arg>) -> Self {
        Arg::Array(items)
    }
}

impl From<Address> for Arg {
    fn from(address: Address) -> Self {
        Arg::Literal(Value::Address(address))
    }
}

impl From<U256> for Arg {
    fn from(n: U256) -> Self {
        Arg::Literal(Value::Uint(n))
    }
}

impl From<u64> for Arg {
    fn from(n: u64) -> Self {
        Arg::Literal(Value::from(n))
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Literal(Value::Bool(b))
    }
}

impl From<Bytes> for Arg {
    fn from(bytes: Bytes) -> Self {
        Arg::Literal(Value::Bytes(bytes))
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Literal(Value::from(s))
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Literal(Value::String(s))
    }
}
