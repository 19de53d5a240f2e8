//! Modules: named, immutable action graphs with output futures.

use indexmap::IndexMap;

use crate::{
    action::Action,
    error::BuildError,
    future::{ActionKey, FutureRef, ParamRef},
    params::ParamDefault,
};

/// Actions and parameters of a module graph, in declaration order.
///
/// Composed modules contribute their actions under their own module name, so one graph
/// holds keys from several namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionGraph {
    pub(crate) actions: IndexMap<ActionKey, Action>,
    pub(crate) parameters: IndexMap<ParamRef, ParamDefault>,
}

impl ActionGraph {
    /// Add an action, rejecting an id already used in its module.
    pub(crate) fn insert_action(&mut self, action: Action) -> Result<(), BuildError> {
        if self.actions.contains_key(&action.key) {
            return Err(BuildError::DuplicateAction { key: action.key });
        }
        self.actions.insert(action.key.clone(), action);
        Ok(())
    }

    pub(crate) fn insert_parameter(
        &mut self,
        param: ParamRef,
        default: ParamDefault,
    ) -> Result<(), BuildError> {
        if self.parameters.contains_key(&param) {
            return Err(BuildError::DuplicateParameter {
                module: param.module,
                name: param.name,
            });
        }
        self.parameters.insert(param, default);
        Ok(())
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    pub fn action(&self, key: &ActionKey) -> Option<&Action> {
        self.actions.get(key)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&ParamRef, &ParamDefault)> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// An output future exposed by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutput {
    pub future: FutureRef,
    /// Set when the output is a contract, so composing modules can call it.
    pub artifact: Option<String>,
}

/// A built module. Building performs no I/O; see [`crate::resolve`] and
/// [`crate::Executor`] for what happens next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub(crate) name: String,
    pub(crate) graph: ActionGraph,
    pub(crate) outputs: IndexMap<String, ModuleOutput>,
    /// Names of the modules composed into this one, in composition order.
    pub(crate) submodules: Vec<String>,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &ActionGraph {
        &self.graph
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.graph.actions()
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&String, &ModuleOutput)> {
        self.outputs.iter()
    }

    pub fn output(&self, name: &str) -> Option<&ModuleOutput> {
        self.outputs.get(name)
    }

    pub fn submodules(&self) -> &[String] {
        &self.submodules
    }

    /// Names of every module namespace present in the graph.
    pub fn namespaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for key in self.graph.actions.keys() {
            if !names.contains(&key.module.as_str()) {
                names.push(&key.module);
            }
        }
        if !names.contains(&self.name.as_str()) {
            names.push(&self.name);
        }
        names
    }
}
