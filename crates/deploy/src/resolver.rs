//! Ordering of a module graph into an execution plan.
//!
//! Resolution is pure: it checks every reference of the graph, rejects cycles and sorts
//! the actions topologically, breaking ties by declaration order so the same module
//! always yields the same plan.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};

use crate::{
    abi::find_function,
    action::{Action, ActionKind},
    artifacts::{ArtifactSet, ArtifactSource},
    error::BuildError,
    future::{ActionKey, FutureOutput, FutureRef},
    module::{ActionGraph, Module},
};

/// An action in execution order, with the keys it waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub action: Action,
    pub dependencies: Vec<ActionKey>,
}

impl PlannedStep {
    pub fn key(&self) -> &ActionKey {
        &self.action.key
    }
}

/// A resolved module: its actions in a valid execution order.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    module: String,
    steps: Vec<PlannedStep>,
    positions: HashMap<ActionKey, usize>,
}

impl ExecutionPlan {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn keys(&self) -> impl Iterator<Item = &ActionKey> {
        self.steps.iter().map(PlannedStep::key)
    }

    pub fn step(&self, key: &ActionKey) -> Option<&PlannedStep> {
        self.positions.get(key).map(|i| &self.steps[*i])
    }

    pub fn contains(&self, key: &ActionKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Load every artifact the plan uses and check constructors and called functions
    /// against their ABIs.
    pub fn validate(&self, source: &impl ArtifactSource) -> Result<ArtifactSet, BuildError> {
        let mut artifacts = ArtifactSet::default();

        for step in &self.steps {
            let action = &step.action;
            match &action.kind {
                ActionKind::Deploy { artifact, args } => {
                    load(source, &mut artifacts, artifact)?;
                    let expected = artifacts
                        .get(artifact)
                        .ok()
                        .and_then(|a| a.abi.constructor())
                        .map_or(0, |c| c.inputs.len());
                    if expected != args.len() {
                        return Err(BuildError::ArgumentCount {
                            key: action.key.clone(),
                            artifact: artifact.clone(),
                            expected,
                            actual: args.len(),
                        });
                    }
                }
                ActionKind::AttachExisting { artifact, .. } => {
                    load(source, &mut artifacts, artifact)?;
                }
                ActionKind::EncodeCall {
                    target,
                    function,
                    args,
                }
                | ActionKind::SendCall {
                    target,
                    function,
                    args,
                }
                | ActionKind::StaticCall {
                    target,
                    function,
                    args,
                } => {
                    let artifact = self
                        .step(target)
                        .and_then(|s| s.action.kind.artifact())
                        .ok_or_else(|| BuildError::InvalidTarget {
                            key: action.key.clone(),
                            target: target.clone(),
                        })?;
                    load(source, &mut artifacts, artifact)?;
                    let known = artifacts
                        .get(artifact)
                        .ok()
                        .and_then(|a| find_function(&a.abi, function, args.len()))
                        .is_some();
                    if !known {
                        return Err(BuildError::UnknownFunction {
                            key: action.key.clone(),
                            artifact: artifact.to_string(),
                            function: function.clone(),
                            arity: args.len(),
                        });
                    }
                }
            }
        }

        tracing::debug!(module = %self.module, "Validated artifacts");
        Ok(artifacts)
    }
}

fn load(
    source: &impl ArtifactSource,
    artifacts: &mut ArtifactSet,
    name: &str,
) -> Result<(), BuildError> {
    if artifacts.contains(name) {
        return Ok(());
    }
    let artifact = source
        .load(name)
        .map_err(|source| BuildError::ArtifactLoad {
            name: name.to_string(),
            source,
        })?
        .ok_or_else(|| BuildError::UnknownArtifact {
            name: name.to_string(),
        })?;
    artifacts.insert(artifact);
    Ok(())
}

/// Order the actions of `module` for execution.
pub fn resolve(module: &Module) -> Result<ExecutionPlan, BuildError> {
    let graph = module.graph();
    check_references(module)?;

    let actions: Vec<&Action> = graph.actions().collect();
    let index: HashMap<&ActionKey, usize> = actions
        .iter()
        .enumerate()
        .map(|(i, action)| (&action.key, i))
        .collect();

    let mut dag: DiGraph<usize, ()> = DiGraph::with_capacity(actions.len(), actions.len());
    let nodes: Vec<NodeIndex> = (0..actions.len()).map(|i| dag.add_node(i)).collect();
    for (i, action) in actions.iter().enumerate() {
        for dep in action.dependencies() {
            if dep == &action.key {
                return Err(BuildError::Cycle {
                    keys: vec![action.key.clone()],
                });
            }
            dag.add_edge(nodes[index[dep]], nodes[i], ());
        }
    }

    if let Some(mut cycle) = tarjan_scc(&dag)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| scc.into_iter().map(|n| dag[n]).collect::<Vec<_>>())
        .min_by_key(|scc| scc.iter().copied().min())
    {
        cycle.sort_unstable();
        return Err(BuildError::Cycle {
            keys: cycle.into_iter().map(|i| actions[i].key.clone()).collect(),
        });
    }

    // Kahn's algorithm, always taking the earliest declared ready action.
    let mut in_degree: Vec<usize> = nodes
        .iter()
        .map(|n| dag.neighbors_directed(*n, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut steps = Vec::with_capacity(actions.len());
    while let Some(Reverse(i)) = ready.pop() {
        for next in dag.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = dag[next];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
        let action = actions[i];
        steps.push(PlannedStep {
            action: action.clone(),
            dependencies: action.dependencies().into_iter().cloned().collect(),
        });
    }

    let positions = steps
        .iter()
        .enumerate()
        .map(|(i, step)| (step.key().clone(), i))
        .collect();

    tracing::debug!(module = %module.name(), actions = steps.len(), "Resolved execution plan");
    Ok(ExecutionPlan {
        module: module.name().to_string(),
        steps,
        positions,
    })
}

fn check_references(module: &Module) -> Result<(), BuildError> {
    let graph = module.graph();
    let declared: std::collections::HashSet<_> = graph.parameters().map(|(p, _)| p).collect();

    for action in graph.actions() {
        let from = action.key.to_string();

        if let Some(target) = action.kind.target() {
            let target_action = lookup(graph, &from, target)?;
            if !target_action.kind.produces_contract() {
                return Err(BuildError::InvalidTarget {
                    key: action.key.clone(),
                    target: target.clone(),
                });
            }
        }
        for future in action.futures() {
            check_future(graph, &from, future)?;
        }
        for key in &action.after {
            lookup(graph, &from, key)?;
        }
        for param in action.parameters() {
            if !declared.contains(param) {
                return Err(BuildError::UnresolvedReference {
                    from,
                    reference: param.to_string(),
                });
            }
        }
    }

    for (name, output) in module.outputs() {
        check_future(graph, &format!("{}.outputs.{}", module.name(), name), &output.future)?;
    }
    Ok(())
}

fn check_future(graph: &ActionGraph, from: &str, future: &FutureRef) -> Result<(), BuildError> {
    let producer = lookup(graph, from, &future.key)?;
    if future.output == FutureOutput::TxHash && !producer.kind.sends_transaction() {
        return Err(BuildError::NoTransaction {
            from: from.to_string(),
            reference: future.key.clone(),
        });
    }
    Ok(())
}

fn lookup<'a>(graph: &'a ActionGraph, from: &str, key: &ActionKey) -> Result<&'a Action, BuildError> {
    graph
        .action(key)
        .ok_or_else(|| BuildError::UnresolvedReference {
            from: from.to_string(),
            reference: key.to_string(),
        })
}
