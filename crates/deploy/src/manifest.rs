//! TOML module manifests.
//!
//! A manifest declares one module. Action arguments are plain TOML values; strings
//! starting with `@` reference the output of an action (`@Id`, `@Module#Id`, and
//! `@Id:tx` for the transaction hash) and strings starting with `$` reference a
//! parameter of the module.
//!
//! ```toml
//! name = "ProxyModule"
//!
//! [parameters]
//! admin = { account = 0 }
//!
//! [[actions]]
//! kind = "deploy"
//! artifact = "BoxV1"
//!
//! [[actions]]
//! kind = "encode-call"
//! target = "@BoxV1"
//! function = "initialize"
//! args = ["$admin"]
//!
//! [[actions]]
//! kind = "deploy"
//! artifact = "ERC1967Proxy"
//! args = ["@BoxV1", "@BoxV1.encode.initialize"]
//!
//! [outputs]
//! proxy = "@ERC1967Proxy"
//! ```

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::{
    action::ActionKind,
    builder::ModuleBuilder,
    error::BuildError,
    future::{ActionKey, Arg, FutureRef, ParamRef},
    module::Module,
    params::ParamDefault,
    value::Value,
};

/// A module as written in a manifest file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleManifest {
    pub name: String,
    /// Manifests of composed modules, relative to this one.
    #[serde(default)]
    pub uses: Vec<PathBuf>,
    #[serde(default)]
    pub parameters: IndexMap<String, ParameterSpec>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

/// `{ account = N }`, `{ value = ... }`, or `{}` for a required parameter.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSpec {
    pub account: Option<usize>,
    pub value: Option<toml::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionSpecKind {
    Deploy,
    EncodeCall,
    SendCall,
    StaticCall,
    Attach,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    pub kind: ActionSpecKind,
    pub id: Option<String>,
    pub artifact: Option<String>,
    pub target: Option<String>,
    pub function: Option<String>,
    #[serde(default)]
    pub args: Vec<toml::Value>,
    pub address: Option<toml::Value>,
    #[serde(default)]
    pub after: Vec<String>,
}

impl ModuleManifest {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse module manifest")
    }

    /// Declare the module, composing the already loaded modules it uses.
    pub fn build(&self, uses: &[Module]) -> Result<Module, BuildError> {
        let mut m = ModuleBuilder::new(self.name.clone());
        for module in uses {
            m.use_module(module)?;
        }

        for (name, spec) in &self.parameters {
            let default = match (spec.account, &spec.value) {
                (Some(_), Some(_)) => {
                    return Err(invalid(format!(
                        "parameter `{name}` has both an account and a value"
                    )));
                }
                (Some(index), None) => ParamDefault::Account(index),
                (None, Some(value)) => ParamDefault::Value(literal(value).map_err(|e| {
                    invalid(format!("default of parameter `{name}`: {e}"))
                })?),
                (None, None) => ParamDefault::Required,
            };
            m.parameter(name.clone(), default)?;
        }

        for (i, action) in self.actions.iter().enumerate() {
            let kind = action
                .kind(&self.name)
                .map_err(|e| invalid(format!("action #{} of `{}`: {e}", i + 1, self.name)))?;
            let after = action
                .after
                .iter()
                .map(|reference| parse_key(&self.name, reference))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(format!("action #{} of `{}`: {e}", i + 1, self.name)))?;
            m.add_action(action.id.clone(), kind, after)?;
        }

        for (name, reference) in &self.outputs {
            let future = parse_future(&self.name, reference)
                .map_err(|e| invalid(format!("output `{name}`: {e}")))?;
            m.output(name.clone(), future)?;
        }

        Ok(m.build())
    }
}

impl ActionSpec {
    fn kind(&self, module: &str) -> Result<ActionKind, String> {
        let args = self
            .args
            .iter()
            .map(|arg| parse_arg(module, arg))
            .collect::<Result<Vec<_>, _>>()?;

        let kind = match self.kind {
            ActionSpecKind::Deploy => ActionKind::Deploy {
                artifact: required(&self.artifact, "artifact")?,
                args,
            },
            ActionSpecKind::Attach => {
                if !args.is_empty() {
                    return Err("`attach` takes an `address`, not `args`".to_string());
                }
                let address = self
                    .address
                    .as_ref()
                    .ok_or_else(|| "missing `address`".to_string())?;
                ActionKind::AttachExisting {
                    artifact: required(&self.artifact, "artifact")?,
                    address: parse_arg(module, address)?,
                }
            }
            ActionSpecKind::EncodeCall | ActionSpecKind::SendCall | ActionSpecKind::StaticCall => {
                let target = parse_key(module, &required(&self.target, "target")?)?;
                let function = required(&self.function, "function")?;
                match self.kind {
                    ActionSpecKind::EncodeCall => ActionKind::EncodeCall {
                        target,
                        function,
                        args,
                    },
                    ActionSpecKind::SendCall => ActionKind::SendCall {
                        target,
                        function,
                        args,
                    },
                    _ => ActionKind::StaticCall {
                        target,
                        function,
                        args,
                    },
                }
            }
        };
        Ok(kind)
    }
}

fn required(field: &Option<String>, name: &str) -> Result<String, String> {
    field.clone().ok_or_else(|| format!("missing `{name}`"))
}

fn invalid(message: String) -> BuildError {
    BuildError::InvalidManifest(message)
}

/// `@Id`, `@Module#Id`, optionally suffixed with `:tx`.
fn parse_future(module: &str, reference: &str) -> Result<FutureRef, String> {
    let body = reference
        .strip_prefix('@')
        .ok_or_else(|| format!("`{reference}` is not an action reference"))?;
    let (body, tx) = match body.strip_suffix(":tx") {
        Some(body) => (body, true),
        None => (body, false),
    };
    let future = FutureRef::new(parse_key(module, body)?);
    Ok(if tx { future.tx_hash() } else { future })
}

/// An action key, with or without the leading `@`.
fn parse_key(module: &str, reference: &str) -> Result<ActionKey, String> {
    let body = reference.strip_prefix('@').unwrap_or(reference);
    let key = match body.split_once('#') {
        Some((module, id)) => ActionKey::new(module, id),
        None => ActionKey::new(module, body),
    };
    if key.module.is_empty() || key.id.is_empty() {
        return Err(format!("`{reference}` is not a valid action reference"));
    }
    Ok(key)
}

fn parse_arg(module: &str, value: &toml::Value) -> Result<Arg, String> {
    match value {
        toml::Value::String(s) if s.starts_with('@') => parse_future(module, s).map(Arg::Future),
        toml::Value::String(s) if s.starts_with('$') => Ok(Arg::Parameter(ParamRef {
            module: module.to_string(),
            name: s[1..].to_string(),
        })),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| parse_arg(module, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Arg::Array),
        other => literal(other).map(Arg::Literal),
    }
}

fn literal(value: &toml::Value) -> Result<Value, String> {
    let json = serde_json::to_value(value).map_err(|e| e.to_string())?;
    Value::from_json(&json)
}

/// Load the module declared by the manifest at `path`, with every module it uses.
pub fn load_module(path: impl AsRef<Path>) -> anyhow::Result<Module> {
    ManifestLoader::default().load(path.as_ref())
}

#[derive(Default)]
struct ManifestLoader {
    stack: Vec<PathBuf>,
    loaded: HashMap<PathBuf, Module>,
}

impl ManifestLoader {
    fn load(&mut self, path: &Path) -> anyhow::Result<Module> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Module manifest not found: {}", path.display()))?;
        if let Some(module) = self.loaded.get(&path) {
            return Ok(module.clone());
        }
        if self.stack.contains(&path) {
            return Err(invalid(format!("`uses` cycle through {}", path.display())).into());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read module manifest {}", path.display()))?;
        let manifest = ModuleManifest::parse(&content)
            .with_context(|| format!("Invalid module manifest {}", path.display()))?;

        self.stack.push(path.clone());
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut uses = Vec::with_capacity(manifest.uses.len());
        for used in &manifest.uses {
            uses.push(self.load(&base.join(used))?);
        }
        self.stack.pop();

        let module = manifest
            .build(&uses)
            .with_context(|| format!("Failed to build module from {}", path.display()))?;
        tracing::debug!(
            module = %module.name(),
            path = %path.display(),
            actions = module.graph().len(),
            "Loaded module manifest"
        );
        self.loaded.insert(path, module.clone());
        Ok(module)
    }
}
