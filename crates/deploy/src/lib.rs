//! kiln-deploy - Declarative, resumable deployment engine for upgradeable contracts.
//!
//! Deployments are described as a [`Module`]: a graph of named actions (deploy an
//! implementation, encode an initializer, deploy a proxy, attach an ABI to an address,
//! call an upgrade function) whose arguments may be futures produced by other actions.
//! The [`resolve`] phase orders the graph without any I/O, and the [`Executor`] walks the
//! resulting [`ExecutionPlan`], recording every step in a [`JournalStore`] so that an
//! interrupted deployment resumes exactly where it stopped.
//!
//! # Example
//!
//! ```no_run
//! use kiln_deploy::{ModuleBuilder, ParamDefault};
//!
//! # fn example() -> Result<(), kiln_deploy::BuildError> {
//! let mut m = ModuleBuilder::new("ProxyModule");
//! let admin = m.parameter("admin", ParamDefault::Account(0))?;
//! let implementation = m.deploy("BoxV1", vec![])?;
//! let init = m.encode_call(&implementation, "initialize", vec![admin.into()])?;
//! let proxy = m.deploy("ERC1967Proxy", vec![(&implementation).into(), init.into()])?;
//! m.output("proxy", &proxy)?;
//! let module = m.build();
//! # Ok(())
//! # }
//! ```

mod abi;
mod action;
mod artifacts;
mod builder;
mod chain;
mod composition;
mod deployment;
mod engine;
mod error;
mod fingerprint;
mod future;
mod journal;
mod manifest;
mod module;
mod params;
mod resolver;
mod rpc;
mod value;

pub use abi::{encode_deploy, encode_function, find_function};
pub use action::{Action, ActionKind, ActionOptions, ActionOutcome};
pub use artifacts::{Artifact, ArtifactSet, ArtifactSource, FsArtifactSource, MemoryArtifacts};
pub use builder::{ModuleBuilder, OutputSource};
pub use chain::{ChainClient, Receipt};
pub use composition::ModuleOutputs;
pub use deployment::{ADDRESSES_FILENAME, DeploymentDir, JOURNAL_FILENAME};
pub use engine::{DeploymentResult, ExecutionOptions, Executor};
pub use error::{BuildError, DeployError, ExecutionError, JournalError};
pub use fingerprint::fingerprint;
pub use future::{ActionKey, Arg, ContractFuture, FutureOutput, FutureRef, ParamRef};
pub use journal::{EntryStatus, FileJournal, JournalEntry, JournalStore, MemoryJournal};
pub use manifest::{ModuleManifest, load_module};
pub use module::{ActionGraph, Module, ModuleOutput};
pub use params::{ParamDefault, ParameterProvider, Parameters, ResolvedParam, ResolvedParameters};
pub use resolver::{ExecutionPlan, PlannedStep, resolve};
pub use rpc::{ReceiptPolling, RpcChainClient};
pub use value::Value;
