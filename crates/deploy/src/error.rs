//! Error taxonomy of the deployment engine.
//!
//! [`BuildError`]s are raised before anything touches the chain. [`ExecutionError`]s name
//! the action that failed so a re-run resumes at it. [`JournalError`]s are never
//! swallowed: a journal that cannot be trusted stops the run.

use thiserror::Error;

use crate::future::ActionKey;

/// Errors detected while declaring, composing, resolving or validating a module.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("action id `{key}` is declared more than once; pass an explicit id to disambiguate")]
    DuplicateAction { key: ActionKey },

    #[error("parameter `{name}` is declared more than once in module `{module}`")]
    DuplicateParameter { module: String, name: String },

    #[error("module output `{name}` is declared more than once in module `{module}`")]
    DuplicateOutput { module: String, name: String },

    #[error("composing module `{module}` conflicts with an existing definition of `{key}`")]
    NamespaceConflict { module: String, key: String },

    #[error("`{from}` references `{reference}`, which is not declared in the module graph")]
    UnresolvedReference { from: String, reference: String },

    #[error("dependency cycle between actions: {}", .keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
    Cycle { keys: Vec<ActionKey> },

    #[error("action `{key}` targets `{target}`, which does not produce a contract")]
    InvalidTarget { key: ActionKey, target: ActionKey },

    #[error("`{from}` asks for the transaction hash of `{reference}`, which sends no transaction")]
    NoTransaction { from: String, reference: ActionKey },

    #[error("module `{module}` has no output named `{name}`")]
    UnknownOutput { module: String, name: String },

    #[error("output `{name}` of module `{module}` is not a contract")]
    NotAContract { module: String, name: String },

    #[error("artifact `{name}` not found")]
    UnknownArtifact { name: String },

    #[error("failed to load artifact `{name}`")]
    ArtifactLoad {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "action `{key}`: artifact `{artifact}` has no unique function `{function}` taking {arity} argument(s); use a full signature for overloaded functions"
    )]
    UnknownFunction {
        key: ActionKey,
        artifact: String,
        function: String,
        arity: usize,
    },

    #[error("action `{key}`: constructor of `{artifact}` expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        key: ActionKey,
        artifact: String,
        expected: usize,
        actual: usize,
    },

    #[error("parameter `{name}` of module `{module}` has no default and no value was supplied")]
    MissingParameter { module: String, name: String },

    #[error("invalid module manifest: {0}")]
    InvalidManifest(String),
}

/// A specific action failed on-chain (or while its inputs were prepared).
#[derive(Debug, Error)]
#[error("action `{key}` failed")]
pub struct ExecutionError {
    pub key: ActionKey,
    #[source]
    pub source: anyhow::Error,
}

/// Persisted journal state is unusable or a write was rejected.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error(
        "journal is corrupted at {location}: {reason}. Inspect the journal file, or reset the deployment to start over"
    )]
    Corrupt { location: String, reason: String },

    #[error("refusing to overwrite the succeeded journal entry of `{key}`")]
    Resurrection { key: ActionKey },

    #[error("journal {path} is locked by another process")]
    Locked { path: String },

    #[error("journal I/O error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error of a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(
        "journal entry `{key}` does not match the module: {reason}. Inspect the journal, or reset the deployment"
    )]
    Reconciliation { key: ActionKey, reason: String },

    #[error(
        "action `{key}` was in flight when a previous run stopped; check whether its transaction was mined, then re-run with pending retries enabled"
    )]
    InFlight { key: ActionKey },

    #[error("deployment cancelled{}", .during.as_ref().map(|k| format!(" while executing `{k}`")).unwrap_or_default())]
    Cancelled { during: Option<ActionKey> },
}
