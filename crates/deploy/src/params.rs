//! Module parameters: declared defaults, caller overrides and their resolution.

use std::collections::{BTreeMap, HashMap};

use alloy_core::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{chain::ChainClient, error::BuildError, future::ParamRef, module::Module, value::Value};

/// Default of a declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamDefault {
    /// The caller must supply a value.
    Required,
    Value(Value),
    /// The Nth account of the chain client.
    Account(usize),
}

/// Caller-supplied parameter values, per module.
///
/// The file format is `{ "<module>": { "<parameter>": <value> } }`, in TOML or JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    modules: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, module: impl Into<String>, name: impl Into<String>, value: impl Into<Value>) {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(name.into(), value.into());
    }

    pub fn with(mut self, module: impl Into<String>, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(module, name, value);
        self
    }

    pub fn get(&self, module: &str, name: &str) -> Option<&Value> {
        self.modules.get(module).and_then(|params| params.get(name))
    }

    /// Parse a parameters document.
    pub fn from_json(json: &serde_json::Value) -> anyhow::Result<Self> {
        let modules = json
            .as_object()
            .context("parameters must be a table of modules")?;

        let mut parameters = Self::new();
        for (module, params) in modules {
            let params = params
                .as_object()
                .with_context(|| format!("parameters of module `{module}` must be a table"))?;
            for (name, value) in params {
                let value = Value::from_json(value)
                    .map_err(|e| anyhow::anyhow!("parameter `{module}.{name}`: {e}"))?;
                parameters.set(module.clone(), name.clone(), value);
            }
        }
        Ok(parameters)
    }
}

/// A parameter after overrides and defaults were applied.
///
/// Accounts stay symbolic until an action that reads them executes, so skipping
/// journaled actions never reaches the chain client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedParam {
    Value(Value),
    Account(usize),
}

/// All parameters of a module graph, resolved once per run.
#[derive(Debug, Clone, Default)]
pub struct ResolvedParameters {
    values: HashMap<ParamRef, ResolvedParam>,
}

impl ResolvedParameters {
    pub fn resolve(module: &Module, input: &Parameters) -> Result<Self, BuildError> {
        let mut values = HashMap::new();
        for (param, default) in module.graph().parameters() {
            let resolved = match (input.get(&param.module, &param.name), default) {
                (Some(value), _) => ResolvedParam::Value(value.clone()),
                (None, ParamDefault::Value(value)) => ResolvedParam::Value(value.clone()),
                (None, ParamDefault::Account(index)) => ResolvedParam::Account(*index),
                (None, ParamDefault::Required) => {
                    return Err(BuildError::MissingParameter {
                        module: param.module.clone(),
                        name: param.name.clone(),
                    });
                }
            };
            tracing::debug!(parameter = %param, value = ?resolved, "Resolved parameter");
            values.insert(param.clone(), resolved);
        }

        for (module_name, params) in &input.modules {
            for name in params.keys() {
                let param = ParamRef {
                    module: module_name.clone(),
                    name: name.clone(),
                };
                if !values.contains_key(&param) {
                    tracing::warn!(parameter = %param, "Ignoring value for undeclared parameter");
                }
            }
        }

        Ok(Self { values })
    }

    pub fn get(&self, param: &ParamRef) -> Option<&ResolvedParam> {
        self.values.get(param)
    }
}

/// Materializes resolved parameters, looking accounts up lazily.
pub struct ParameterProvider<'a> {
    resolved: &'a ResolvedParameters,
    accounts: HashMap<usize, Address>,
}

impl<'a> ParameterProvider<'a> {
    pub fn new(resolved: &'a ResolvedParameters) -> Self {
        Self {
            resolved,
            accounts: HashMap::new(),
        }
    }

    /// Fetch the accounts the given parameters refer to, once per index.
    pub async fn prefetch<C: ChainClient>(
        &mut self,
        client: &C,
        params: &[&ParamRef],
    ) -> anyhow::Result<()> {
        for param in params {
            if let Some(ResolvedParam::Account(index)) = self.resolved.get(param) {
                if self.accounts.contains_key(index) {
                    continue;
                }
                let address = client
                    .account(*index)
                    .await
                    .with_context(|| format!("Failed to fetch account #{index} for {param}"))?;
                tracing::debug!(parameter = %param, index, %address, "Resolved account parameter");
                self.accounts.insert(*index, address);
            }
        }
        Ok(())
    }

    /// The concrete value of a parameter. Accounts must have been prefetched.
    pub fn value(&self, param: &ParamRef) -> anyhow::Result<Value> {
        match self.resolved.get(param) {
            Some(ResolvedParam::Value(value)) => Ok(value.clone()),
            Some(ResolvedParam::Account(index)) => self
                .accounts
                .get(index)
                .map(|address| Value::Address(*address))
                .with_context(|| format!("account #{index} for {param} was not fetched")),
            None => anyhow::bail!("parameter {param} is not declared"),
        }
    }
}
