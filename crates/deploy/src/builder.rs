//! Builder module for declaring a [`Module`].
//!
//! [`ModuleBuilder`] is the declaration DSL: every method records an action (or a
//! parameter, or an output) and hands back a future that later declarations can use as
//! an argument. Nothing is executed here.
//!
//! # Example
//!
//! ```no_run
//! use kiln_deploy::{ActionOptions, ModuleBuilder};
//!
//! # fn example(deployment: &kiln_deploy::Module) -> Result<(), kiln_deploy::BuildError> {
//! let mut m = ModuleBuilder::new("UpgradeModule");
//! let proxy = m.use_module(deployment)?.contract("proxy")?;
//! let proxied = m.attach_with("BoxV1", &proxy, ActionOptions::id("ProxiedBox"))?;
//! let v2 = m.deploy("BoxV2", vec![])?;
//! m.send_call(&proxied, "upgradeTo", vec![(&v2).into()])?;
//! let module = m.build();
//! # Ok(())
//! # }
//! ```

use indexmap::IndexMap;

use crate::{
    action::{Action, ActionKind, ActionOptions},
    composition::ModuleOutputs,
    error::BuildError,
    future::{ActionKey, Arg, ContractFuture, FutureRef, ParamRef},
    module::{ActionGraph, Module, ModuleOutput},
    params::ParamDefault,
};

/// Builder for a [`Module`].
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    name: String,
    graph: ActionGraph,
    outputs: IndexMap<String, ModuleOutput>,
    submodules: Vec<String>,
}

impl ModuleBuilder {
    /// Create a builder for the module `name`.
    ///
    /// The name becomes the journal namespace of every action declared here.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: ActionGraph::default(),
            outputs: IndexMap::new(),
            submodules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a parameter and get a reference usable as an argument.
    pub fn parameter(
        &mut self,
        name: impl Into<String>,
        default: ParamDefault,
    ) -> Result<ParamRef, BuildError> {
        let param = ParamRef {
            module: self.name.clone(),
            name: name.into(),
        };
        self.graph.insert_parameter(param.clone(), default)?;
        Ok(param)
    }

    /// Deploy `artifact` with constructor `args`.
    pub fn deploy(&mut self, artifact: &str, args: Vec<Arg>) -> Result<ContractFuture, BuildError> {
        self.deploy_with(artifact, args, ActionOptions::default())
    }

    pub fn deploy_with(
        &mut self,
        artifact: &str,
        args: Vec<Arg>,
        options: ActionOptions,
    ) -> Result<ContractFuture, BuildError> {
        let kind = ActionKind::Deploy {
            artifact: artifact.to_string(),
            args,
        };
        let key = self.add_action(options.id, kind, options.after)?;
        Ok(contract(key, artifact))
    }

    /// Encode a call to `function` on `target` into calldata, without sending it.
    pub fn encode_call(
        &mut self,
        target: &ContractFuture,
        function: &str,
        args: Vec<Arg>,
    ) -> Result<FutureRef, BuildError> {
        self.encode_call_with(target, function, args, ActionOptions::default())
    }

    pub fn encode_call_with(
        &mut self,
        target: &ContractFuture,
        function: &str,
        args: Vec<Arg>,
        options: ActionOptions,
    ) -> Result<FutureRef, BuildError> {
        let kind = ActionKind::EncodeCall {
            target: target.key().clone(),
            function: function.to_string(),
            args,
        };
        let key = self.add_action(options.id, kind, options.after)?;
        Ok(FutureRef::new(key))
    }

    /// Send a transaction calling `function` on `target`. The future is the tx hash.
    pub fn send_call(
        &mut self,
        target: &ContractFuture,
        function: &str,
        args: Vec<Arg>,
    ) -> Result<FutureRef, BuildError> {
        self.send_call_with(target, function, args, ActionOptions::default())
    }

    pub fn send_call_with(
        &mut self,
        target: &ContractFuture,
        function: &str,
        args: Vec<Arg>,
        options: ActionOptions,
    ) -> Result<FutureRef, BuildError> {
        let kind = ActionKind::SendCall {
            target: target.key().clone(),
            function: function.to_string(),
            args,
        };
        let key = self.add_action(options.id, kind, options.after)?;
        Ok(FutureRef::new(key))
    }

    /// Read from `target` without a transaction. The future is the raw return data.
    pub fn static_call(
        &mut self,
        target: &ContractFuture,
        function: &str,
        args: Vec<Arg>,
    ) -> Result<FutureRef, BuildError> {
        self.static_call_with(target, function, args, ActionOptions::default())
    }

    pub fn static_call_with(
        &mut self,
        target: &ContractFuture,
        function: &str,
        args: Vec<Arg>,
        options: ActionOptions,
    ) -> Result<FutureRef, BuildError> {
        let kind = ActionKind::StaticCall {
            target: target.key().clone(),
            function: function.to_string(),
            args,
        };
        let key = self.add_action(options.id, kind, options.after)?;
        Ok(FutureRef::new(key))
    }

    /// Use the contract at `address` through the ABI of `artifact`.
    pub fn attach(
        &mut self,
        artifact: &str,
        address: impl Into<Arg>,
    ) -> Result<ContractFuture, BuildError> {
        self.attach_with(artifact, address, ActionOptions::default())
    }

    pub fn attach_with(
        &mut self,
        artifact: &str,
        address: impl Into<Arg>,
        options: ActionOptions,
    ) -> Result<ContractFuture, BuildError> {
        let kind = ActionKind::AttachExisting {
            artifact: artifact.to_string(),
            address: address.into(),
        };
        let key = self.add_action(options.id, kind, options.after)?;
        Ok(contract(key, artifact))
    }

    /// Declare an action from its parts. Used by manifests, where references are by
    /// name and may point at actions declared further down.
    pub fn add_action(
        &mut self,
        id: Option<String>,
        kind: ActionKind,
        after: Vec<ActionKey>,
    ) -> Result<ActionKey, BuildError> {
        let id = id.unwrap_or_else(|| kind.default_id());
        let key = ActionKey::new(self.name.clone(), id);
        self.graph.insert_action(Action {
            key: key.clone(),
            kind,
            after,
        })?;
        tracing::trace!(action = %key, "Declared action");
        Ok(key)
    }

    /// Embed `module` and get its outputs as futures of this module.
    pub fn use_module(&mut self, module: &Module) -> Result<ModuleOutputs, BuildError> {
        self.graph.splice(module)?;
        if !self.submodules.contains(&module.name) {
            self.submodules.push(module.name.clone());
        }
        Ok(ModuleOutputs::new(module))
    }

    /// Expose a future as a named output of the module.
    pub fn output(&mut self, name: impl Into<String>, future: impl Into<OutputSource>) -> Result<(), BuildError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(BuildError::DuplicateOutput {
                module: self.name.clone(),
                name,
            });
        }
        let output = match future.into() {
            OutputSource::Contract(contract) => ModuleOutput {
                future: contract.future,
                artifact: Some(contract.artifact),
            },
            OutputSource::Future(future) => {
                let artifact = self
                    .graph
                    .action(&future.key)
                    .and_then(|action| action.kind.artifact())
                    .filter(|_| future.output == crate::future::FutureOutput::Primary)
                    .map(ToString::to_string);
                ModuleOutput { future, artifact }
            }
        };
        self.outputs.insert(name, output);
        Ok(())
    }

    /// Finish the declaration. Ordering and reference checks happen in
    /// [`crate::resolve`].
    pub fn build(self) -> Module {
        Module {
            name: self.name,
            graph: self.graph,
            outputs: self.outputs,
            submodules: self.submodules,
        }
    }
}

/// Something that can be exposed as a module output.
pub enum OutputSource {
    Contract(ContractFuture),
    Future(FutureRef),
}

impl From<&ContractFuture> for OutputSource {
    fn from(contract: &ContractFuture) -> Self {
        OutputSource::Contract(contract.clone())
    }
}

impl From<ContractFuture> for OutputSource {
    fn from(contract: ContractFuture) -> Self {
        OutputSource::Contract(contract)
    }
}

impl From<&FutureRef> for OutputSource {
    fn from(future: &FutureRef) -> Self {
        OutputSource::Future(future.clone())
    }
}

impl From<FutureRef> for OutputSource {
    fn from(future: FutureRef) -> Self {
        OutputSource::Future(future)
    }
}

fn contract(key: ActionKey, artifact: &str) -> ContractFuture {
    ContractFuture {
        future: FutureRef::new(key),
        artifact: artifact.to_string(),
    }
}
