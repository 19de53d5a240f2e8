//! Module composition: splicing one module's graph into another.
//!
//! Composed actions keep the key they were declared with (`<module>#<id>`), so a module
//! embedded by several others, or embedded twice, is still a single set of actions with
//! a single journal history.

use indexmap::IndexMap;

use crate::{
    error::BuildError,
    future::{ContractFuture, FutureRef},
    module::{ActionGraph, Module, ModuleOutput},
};

impl ActionGraph {
    /// Merge the graph of `module` into this one.
    ///
    /// Keys already present with an identical definition are shared; a different
    /// definition under the same key is a [`BuildError::NamespaceConflict`].
    pub(crate) fn splice(&mut self, module: &Module) -> Result<(), BuildError> {
        let conflict = |key: String| BuildError::NamespaceConflict {
            module: module.name.clone(),
            key,
        };

        // Nothing is inserted until the whole module is known to fit.
        for (key, action) in &module.graph.actions {
            if self.actions.get(key).is_some_and(|existing| existing != action) {
                return Err(conflict(key.to_string()));
            }
        }
        for (param, default) in &module.graph.parameters {
            if self.parameters.get(param).is_some_and(|existing| existing != default) {
                return Err(conflict(param.to_string()));
            }
        }

        for (key, action) in &module.graph.actions {
            if self.actions.contains_key(key) {
                tracing::trace!(action = %key, "Action already composed, sharing it");
            } else {
                self.actions.insert(key.clone(), action.clone());
            }
        }
        for (param, default) in &module.graph.parameters {
            self.parameters
                .entry(param.clone())
                .or_insert_with(|| default.clone());
        }

        tracing::debug!(
            module = %module.name,
            actions = module.graph.len(),
            "Composed module"
        );
        Ok(())
    }
}

/// Outputs of a composed module, usable as futures in the composing module.
#[derive(Debug, Clone)]
pub struct ModuleOutputs {
    module: String,
    outputs: IndexMap<String, ModuleOutput>,
}

impl ModuleOutputs {
    pub(crate) fn new(module: &Module) -> Self {
        Self {
            module: module.name.clone(),
            outputs: module.outputs.clone(),
        }
    }

    /// A contract output, usable as a call target.
    pub fn contract(&self, name: &str) -> Result<ContractFuture, BuildError> {
        let output = self.get(name)?;
        let artifact = output
            .artifact
            .clone()
            .ok_or_else(|| BuildError::NotAContract {
                module: self.module.clone(),
                name: name.to_string(),
            })?;
        Ok(ContractFuture {
            future: output.future.clone(),
            artifact,
        })
    }

    /// Any output as a plain future.
    pub fn future(&self, name: &str) -> Result<FutureRef, BuildError> {
        Ok(self.get(name)?.future.clone())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    fn get(&self, name: &str) -> Result<&ModuleOutput, BuildError> {
        self.outputs.get(name).ok_or_else(|| BuildError::UnknownOutput {
            module: self.module.clone(),
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        builder::ModuleBuilder,
        error::BuildError,
        future::ActionKey,
        params::ParamDefault,
    };

    fn deployment() -> crate::module::Module {
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
        m.output("deploy_tx", proxy.tx_hash()).unwrap();
        m.build()
    }

    #[test]
    fn test_composed_actions_keep_their_namespace() {
        let mut m = ModuleBuilder::new("Upgrade");
        let outputs = m.use_module(&deployment()).unwrap();
        let proxy = outputs.contract("proxy").unwrap();
        assert_eq!(proxy.key(), &ActionKey::new("Deployment", "ERC1967Proxy"));

        let module = m.build();
        assert_eq!(module.submodules().to_vec(), vec!["Deployment".to_string()]);
        assert_eq!(module.graph().len(), 3);
        assert_eq!(module.namespaces(), vec!["Deployment", "Upgrade"]);
    }

    #[test]
    fn test_composing_twice_shares_actions() {
        let deployment = deployment();
        let mut m = ModuleBuilder::new("Upgrade");
        let first = m.use_module(&deployment).unwrap().contract("proxy").unwrap();
        let second = m.use_module(&deployment).unwrap().contract("proxy").unwrap();
        assert_eq!(first, second);

        let module = m.build();
        assert_eq!(module.graph().len(), 3);
        assert_eq!(module.submodules().len(), 1);
    }

    #[test]
    fn test_conflicting_definition_is_rejected() {
        let mut other = ModuleBuilder::new("Deployment");
        other.deploy("BoxV1", vec![7u64.into()]).unwrap();
        let other = other.build();

        let mut m = ModuleBuilder::new("Upgrade");
        m.use_module(&deployment()).unwrap();
        let err = m.use_module(&other).unwrap_err();
        assert!(matches!(err, BuildError::NamespaceConflict { ref key, .. } if key == "Deployment#BoxV1"));
    }

    #[test]
    fn test_rejected_composition_leaves_the_graph_untouched() {
        let mut first = ModuleBuilder::new("D");
        first.deploy("X", vec![]).unwrap();
        first.deploy("Y", vec![]).unwrap();
        let first = first.build();

        let mut second = ModuleBuilder::new("D");
        second.parameter("owner", ParamDefault::Account(1)).unwrap();
        second.deploy("Z", vec![]).unwrap();
        second.deploy("Y", vec![1u64.into()]).unwrap();
        let second = second.build();

        let mut m = ModuleBuilder::new("App");
        m.use_module(&first).unwrap();
        let err = m.use_module(&second).unwrap_err();
        assert!(matches!(err, BuildError::NamespaceConflict { ref key, .. } if key == "D#Y"));

        let module = m.build();
        let keys: Vec<String> = module.actions().map(|a| a.key.to_string()).collect();
        assert_eq!(keys, vec!["D#X", "D#Y"]);
        assert_eq!(module.graph().parameters().count(), 0);
    }

    #[test]
    fn test_unknown_and_non_contract_outputs() {
        let mut m = ModuleBuilder::new("Upgrade");
        let outputs = m.use_module(&deployment()).unwrap();
        assert!(matches!(
            outputs.contract("missing"),
            Err(BuildError::UnknownOutput { .. })
        ));
        assert!(matches!(
            outputs.contract("deploy_tx"),
            Err(BuildError::NotAContract { .. })
        ));
        assert!(outputs.future("deploy_tx").is_ok());
    }
}
