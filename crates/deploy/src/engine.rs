//! Execution engine: walks an execution plan against a chain client and a journal.

use std::collections::HashMap;

use alloy_core::primitives::{Address, Bytes};
use anyhow::Context;
use indexmap::IndexMap;
use tokio::sync::watch;
use tracing::Instrument;

use crate::{
    abi::{encode_deploy, encode_function},
    action::{Action, ActionKind, ActionOutcome},
    artifacts::{ArtifactSet, ArtifactSource},
    chain::ChainClient,
    error::{DeployError, ExecutionError},
    fingerprint::fingerprint,
    future::{ActionKey, Arg},
    journal::{EntryStatus, JournalEntry, JournalStore},
    module::Module,
    params::{ParameterProvider, Parameters, ResolvedParameters},
    resolver::{ExecutionPlan, resolve},
    value::Value,
};

/// Knobs of a deployment run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Re-execute actions whose journal entry is still `pending`. Only safe once the
    /// operator has checked that the interrupted transaction was not mined.
    pub retry_pending: bool,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub module: String,
    /// Values of the module outputs.
    pub outputs: IndexMap<String, Value>,
    /// Actions executed by this run, in order.
    pub executed: Vec<ActionKey>,
    /// Actions reused from the journal.
    pub skipped: Vec<ActionKey>,
    /// Every contract address known to the plan.
    pub addresses: IndexMap<ActionKey, Address>,
}

/// Drives a module to completion, at most once per action.
pub struct Executor<'a, C, A, J> {
    client: &'a C,
    artifacts: &'a A,
    journal: &'a mut J,
    options: ExecutionOptions,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a, C, A, J> Executor<'a, C, A, J>
where
    C: ChainClient,
    A: ArtifactSource,
    J: JournalStore,
{
    pub fn new(client: &'a C, artifacts: &'a A, journal: &'a mut J) -> Self {
        Self {
            client,
            artifacts,
            journal,
            options: ExecutionOptions::default(),
            cancel: None,
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop the run once `true` is sent on the channel.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Execute every action of `module` that has not already succeeded.
    pub async fn run(
        &mut self,
        module: &Module,
        parameters: &Parameters,
    ) -> Result<DeploymentResult, DeployError> {
        let plan = resolve(module)?;
        let artifacts = plan.validate(self.artifacts)?;
        let params = ResolvedParameters::resolve(module, parameters)?;
        let fingerprints: HashMap<ActionKey, String> = plan
            .steps()
            .iter()
            .map(|step| (step.key().clone(), fingerprint(&step.action, &params)))
            .collect();
        self.reconcile(module, &fingerprints)?;

        tracing::info!(module = %module.name(), actions = plan.len(), "Starting deployment");

        let client = self.client;
        let mut provider = ParameterProvider::new(&params);
        let mut outcomes: HashMap<ActionKey, ActionOutcome> = HashMap::new();
        let mut executed = Vec::new();
        let mut skipped = Vec::new();

        for step in plan.steps() {
            let key = step.key();
            let fingerprint = &fingerprints[key];

            if let Some(entry) = self.journal.lookup(key)
                && entry.status == EntryStatus::Succeeded
            {
                let outcome = entry.result.ok_or_else(|| DeployError::Reconciliation {
                    key: key.clone(),
                    reason: "succeeded entry has no recorded result".to_string(),
                })?;
                tracing::info!(action = %key, "Skipping action, already succeeded");
                outcomes.insert(key.clone(), outcome);
                skipped.push(key.clone());
                continue;
            }

            if self.is_cancelled() {
                tracing::warn!(action = %key, "Deployment cancelled before action");
                return Err(DeployError::Cancelled { during: None });
            }

            self.journal.record(key, JournalEntry::pending(fingerprint))?;

            let span = tracing::info_span!("action", action = %key, kind = step.action.kind.label());
            let execution = execute_action(
                client,
                &plan,
                &artifacts,
                &step.action,
                &outcomes,
                &mut provider,
            )
            .instrument(span);

            let result = match self.cancel.as_mut() {
                Some(cancel) => tokio::select! {
                    result = execution => Some(result),
                    _ = cancelled(cancel) => None,
                },
                None => Some(execution.await),
            };

            match result {
                Some(Ok(outcome)) => {
                    self.journal
                        .record(key, JournalEntry::succeeded(fingerprint, outcome.clone()))?;
                    tracing::info!(action = %key, outcome = ?outcome, "Action succeeded");
                    outcomes.insert(key.clone(), outcome);
                    executed.push(key.clone());
                }
                Some(Err(source)) => {
                    let detail = format!("{source:#}");
                    tracing::error!(action = %key, error = %detail, "Action failed");
                    self.journal
                        .record(key, JournalEntry::failed(fingerprint, detail))?;
                    return Err(ExecutionError {
                        key: key.clone(),
                        source,
                    }
                    .into());
                }
                None => {
                    let detail = match client.pending_transaction() {
                        Some(tx_hash) => format!(
                            "cancelled while waiting for transaction {tx_hash}; check whether it was mined before re-running"
                        ),
                        None => "cancelled".to_string(),
                    };
                    tracing::warn!(action = %key, detail = %detail, "Deployment cancelled during action");
                    self.journal
                        .record(key, JournalEntry::failed(fingerprint, detail))?;
                    return Err(DeployError::Cancelled {
                        during: Some(key.clone()),
                    });
                }
            }
        }

        let mut outputs = IndexMap::new();
        for (name, output) in module.outputs() {
            let value = outcomes
                .get(&output.future.key)
                .and_then(|outcome| outcome.extract(output.future.output))
                .ok_or_else(|| DeployError::Reconciliation {
                    key: output.future.key.clone(),
                    reason: format!("no value recorded for output `{name}`"),
                })?;
            outputs.insert(name.clone(), value);
        }

        let addresses = plan
            .keys()
            .filter_map(|key| {
                let address = outcomes.get(key)?.address()?;
                Some((key.clone(), address))
            })
            .collect();

        tracing::info!(
            module = %module.name(),
            executed = executed.len(),
            skipped = skipped.len(),
            "Deployment complete"
        );

        Ok(DeploymentResult {
            module: module.name().to_string(),
            outputs,
            executed,
            skipped,
            addresses,
        })
    }

    /// Check the journal against the plan before anything executes.
    fn reconcile(
        &self,
        module: &Module,
        fingerprints: &HashMap<ActionKey, String>,
    ) -> Result<(), DeployError> {
        let namespaces = module.namespaces();

        for (key, entry) in self.journal.entries() {
            match (fingerprints.get(&key), entry.status) {
                (Some(expected), EntryStatus::Succeeded) if *expected != entry.fingerprint => {
                    return Err(DeployError::Reconciliation {
                        key,
                        reason: "the action definition or its parameters changed after it succeeded"
                            .to_string(),
                    });
                }
                (Some(_), EntryStatus::Pending) if !self.options.retry_pending => {
                    return Err(DeployError::InFlight { key });
                }
                (Some(_), EntryStatus::Pending) => {
                    tracing::warn!(action = %key, "Retrying action left in flight by a previous run");
                }
                (Some(_), _) => {}
                (None, EntryStatus::Failed) if namespaces.contains(&key.module.as_str()) => {
                    tracing::warn!(action = %key, "Ignoring failed journal entry of an action no longer declared");
                }
                (None, _) if namespaces.contains(&key.module.as_str()) => {
                    return Err(DeployError::Reconciliation {
                        key,
                        reason: format!(
                            "orphaned {} entry, the action is no longer declared",
                            entry.status
                        ),
                    });
                }
                (None, _) => {}
            }
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| *cancel.borrow())
    }
}

/// Resolves once cancellation is requested. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn execute_action<C: ChainClient>(
    client: &C,
    plan: &ExecutionPlan,
    artifacts: &ArtifactSet,
    action: &Action,
    outcomes: &HashMap<ActionKey, ActionOutcome>,
    provider: &mut ParameterProvider<'_>,
) -> anyhow::Result<ActionOutcome> {
    provider.prefetch(client, &action.parameters()).await?;
    let inputs = Inputs { outcomes, provider };

    let outcome = match &action.kind {
        ActionKind::Deploy { artifact, args } => {
            let init_code = encode_deploy(artifacts.get(artifact)?, &inputs.values(args)?)?;
            tracing::debug!(artifact = %artifact, size = init_code.len(), "Deploying contract");
            let receipt = client.deploy(init_code).await?;
            let address = receipt
                .contract_address
                .context("Deployment receipt has no contract address")?;
            ActionOutcome::Deployed {
                address,
                tx_hash: receipt.tx_hash,
            }
        }
        ActionKind::EncodeCall {
            target,
            function,
            args,
        } => {
            let data = encode_call(plan, artifacts, target, function, &inputs.values(args)?)?;
            ActionOutcome::Encoded { data }
        }
        ActionKind::SendCall {
            target,
            function,
            args,
        } => {
            let data = encode_call(plan, artifacts, target, function, &inputs.values(args)?)?;
            let to = inputs.address_of(target)?;
            tracing::debug!(%to, function = %function, "Sending call");
            let receipt = client.send(to, data).await?;
            ActionOutcome::Sent {
                tx_hash: receipt.tx_hash,
            }
        }
        ActionKind::StaticCall {
            target,
            function,
            args,
        } => {
            let data = encode_call(plan, artifacts, target, function, &inputs.values(args)?)?;
            let to = inputs.address_of(target)?;
            tracing::debug!(%to, function = %function, "Reading from contract");
            let data = client.call(to, data).await?;
            ActionOutcome::Called { data }
        }
        ActionKind::AttachExisting { address, .. } => {
            let value = inputs.value(address)?;
            let address = value
                .to_address()
                .with_context(|| format!("{value} is not a contract address"))?;
            ActionOutcome::Attached { address }
        }
    };

    Ok(outcome)
}

/// Calldata for `function` on `target`, encoded with the ABI of the target's artifact.
fn encode_call(
    plan: &ExecutionPlan,
    artifacts: &ArtifactSet,
    target: &ActionKey,
    function: &str,
    args: &[Value],
) -> anyhow::Result<Bytes> {
    let artifact = plan
        .step(target)
        .and_then(|step| step.action.kind.artifact())
        .with_context(|| format!("{target} does not produce a contract"))?;
    encode_function(artifacts.get(artifact)?, function, args)
}

/// Materializes arguments from executed actions and parameters.
struct Inputs<'r, 'p> {
    outcomes: &'r HashMap<ActionKey, ActionOutcome>,
    provider: &'r ParameterProvider<'p>,
}

impl Inputs<'_, '_> {
    fn value(&self, arg: &Arg) -> anyhow::Result<Value> {
        match arg {
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Future(future) => self
                .outcomes
                .get(&future.key)
                .with_context(|| format!("{} has not been executed", future.key))?
                .extract(future.output)
                .with_context(|| format!("{future} has no such output")),
            Arg::Parameter(param) => self.provider.value(param),
            Arg::Array(items) => items
                .iter()
                .map(|item| self.value(item))
                .collect::<anyhow::Result<Vec<_>>>()
                .map(Value::Array),
        }
    }

    fn values(&self, args: &[Arg]) -> anyhow::Result<Vec<Value>> {
        args.iter().map(|arg| self.value(arg)).collect()
    }

    fn address_of(&self, target: &ActionKey) -> anyhow::Result<Address> {
        self.outcomes
            .get(target)
            .and_then(ActionOutcome::address)
            .with_context(|| format!("{target} has no contract address"))
    }
}
