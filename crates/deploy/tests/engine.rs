//! End-to-end tests of the execution engine against an in-memory chain.
//!
//! Run with: cargo test -p kiln-deploy --test engine

mod common;

use alloy_core::primitives::Address;
use common::{MockChain, Submission, artifacts, deployment_module, init_tracing, upgrade_module};
use kiln_deploy::{
    ActionKey, ActionOptions, ArtifactSource, BuildError, DeployError, EntryStatus, ExecutionOptions, Executor,
    JournalEntry, JournalError, JournalStore, MemoryJournal, ModuleBuilder, ParamDefault,
    Parameters, Value, encode_function, fingerprint, resolve,
};
use tokio::sync::watch;

fn key(module: &str, id: &str) -> ActionKey {
    ActionKey::new(module, id)
}

fn ids(keys: &[ActionKey]) -> Vec<String> {
    keys.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_scenario_proxy_deployment() {
    init_tracing();
    let module = deployment_module();
    let plan = resolve(&module).unwrap();
    let order: Vec<String> = plan.keys().map(|k| k.id.clone()).collect();
    assert_eq!(order, vec!["BoxV1", "BoxV1.encode.initialize", "ERC1967Proxy"]);

    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();
    let result = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap();

    assert_eq!(
        ids(&result.executed),
        vec![
            "Deployment#BoxV1",
            "Deployment#BoxV1.encode.initialize",
            "Deployment#ERC1967Proxy"
        ]
    );
    assert!(result.skipped.is_empty());

    let deployed = chain.deployed();
    assert_eq!(deployed.len(), 2);
    assert_eq!(result.outputs["proxy"], Value::Address(deployed[1]));
    assert_eq!(result.outputs["implementation"], Value::Address(deployed[0]));
    assert_eq!(result.addresses[&key("Deployment", "ERC1967Proxy")], deployed[1]);

    // The proxy was deployed with the implementation address and the encoded initializer.
    let init = encode_function(
        &artifacts.load("BoxV1").unwrap().unwrap(),
        "initialize",
        &[Value::Address(MockChain::account_address(0))],
    )
    .unwrap();
    match &chain.submissions()[1] {
        Submission::Deploy { init_code, .. } => {
            assert_eq!(&init_code[..2], &[0x60, 0x03]);
            assert!(init_code.windows(init.len()).any(|w| w == &init[..]));
            assert!(init_code.windows(20).any(|w| w == deployed[0].as_slice()));
        }
        other => panic!("expected a deployment, got {other:?}"),
    }

    let entry = journal.lookup(&key("Deployment", "ERC1967Proxy")).unwrap();
    assert_eq!(entry.status, EntryStatus::Succeeded);
}

#[tokio::test]
async fn test_scenario_upgrade_reuses_deployment() {
    init_tracing();
    let deployment = deployment_module();
    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();

    let first = Executor::new(&chain, &artifacts, &mut journal)
        .run(&deployment, &Parameters::new())
        .await
        .unwrap();
    let proxy = first.outputs["proxy"].to_address().unwrap();

    let upgrade = upgrade_module(&deployment);
    let order: Vec<String> = resolve(&upgrade).unwrap().keys().map(ToString::to_string).collect();
    assert_eq!(
        order,
        vec![
            "Deployment#BoxV1",
            "Deployment#BoxV1.encode.initialize",
            "Deployment#ERC1967Proxy",
            "Upgrade#BoxV2",
            "Upgrade#ERC1967Proxy.upgradeTo",
            "Upgrade#ProxiedBox",
        ]
    );

    let result = Executor::new(&chain, &artifacts, &mut journal)
        .run(&upgrade, &Parameters::new())
        .await
        .unwrap();

    assert_eq!(ids(&result.skipped), ids(&first.executed));
    assert_eq!(
        ids(&result.executed),
        vec![
            "Upgrade#BoxV2",
            "Upgrade#ERC1967Proxy.upgradeTo",
            "Upgrade#ProxiedBox"
        ]
    );
    assert_eq!(result.outputs["box"], Value::Address(proxy));

    let submissions = chain.submissions();
    assert_eq!(submissions.len(), 4);
    let v2 = match &submissions[2] {
        Submission::Deploy { address, .. } => *address,
        other => panic!("expected BoxV2 deployment, got {other:?}"),
    };
    match &submissions[3] {
        Submission::Send { to, calldata } => {
            assert_eq!(*to, proxy);
            assert_eq!(&calldata[16..36], v2.as_slice());
        }
        other => panic!("expected the upgrade call, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rerun_makes_no_chain_calls() {
    init_tracing();
    let module = deployment_module();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();

    let first_chain = MockChain::new();
    let first = Executor::new(&first_chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap();

    let chain = MockChain::new();
    let second = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap();

    assert_eq!(chain.calls(), 0);
    assert_eq!(second.outputs, first.outputs);
    assert_eq!(second.addresses, first.addresses);
    assert!(second.executed.is_empty());
    assert_eq!(second.skipped.len(), 3);
}

#[tokio::test]
async fn test_resume_at_failed_action() {
    init_tracing();
    let module = deployment_module();
    let chain = MockChain::new();
    chain.fail_submission(2);
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();

    let err = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap_err();
    match err {
        DeployError::Execution(err) => {
            assert_eq!(err.key, key("Deployment", "ERC1967Proxy"));
            assert!(format!("{:#}", err.source).contains("reverted"));
        }
        other => panic!("expected an execution error, got {other:?}"),
    }

    let failed = journal.lookup(&key("Deployment", "ERC1967Proxy")).unwrap();
    assert_eq!(failed.status, EntryStatus::Failed);
    assert!(failed.error.unwrap().contains("reverted"));

    let result = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap();
    assert_eq!(ids(&result.executed), vec!["Deployment#ERC1967Proxy"]);
    assert_eq!(result.skipped.len(), 2);
    assert_eq!(chain.submissions().len(), 3);
}

/// Journal that stops recording once a given action is about to start, as if the
/// process died between two actions.
struct CrashingJournal {
    inner: MemoryJournal,
    crash_before: ActionKey,
}

impl JournalStore for CrashingJournal {
    fn lookup(&self, key: &ActionKey) -> Option<JournalEntry> {
        self.inner.lookup(key)
    }

    fn record(&mut self, key: &ActionKey, entry: JournalEntry) -> Result<(), JournalError> {
        if *key == self.crash_before {
            return Err(JournalError::Io {
                path: "<crash>".to_string(),
                source: std::io::Error::other("simulated crash"),
            });
        }
        self.inner.record(key, entry)
    }

    fn entries(&self) -> Vec<(ActionKey, JournalEntry)> {
        self.inner.entries()
    }
}

#[tokio::test]
async fn test_crash_between_actions_resumes_without_resubmitting() {
    init_tracing();
    let module = deployment_module();
    let artifacts = artifacts();
    let chain = MockChain::new();
    let parameters = Parameters::new().with("Deployment", "admin", Address::repeat_byte(0x42));

    let mut crashing = CrashingJournal {
        inner: MemoryJournal::new(),
        crash_before: key("Deployment", "ERC1967Proxy"),
    };
    let err = Executor::new(&chain, &artifacts, &mut crashing)
        .run(&module, &parameters)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Journal(JournalError::Io { .. })));
    assert_eq!(chain.calls(), 1);

    let mut journal = crashing.inner;
    let result = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &parameters)
        .await
        .unwrap();

    assert_eq!(chain.calls(), 2);
    assert_eq!(chain.submissions().len(), 2);
    assert_eq!(ids(&result.executed), vec!["Deployment#ERC1967Proxy"]);
}

#[tokio::test]
async fn test_composing_twice_deploys_once() {
    init_tracing();
    let deployment = deployment_module();

    let mut wrapper = ModuleBuilder::new("Wrapper");
    let proxy = wrapper.use_module(&deployment).unwrap().contract("proxy").unwrap();
    wrapper.output("proxy", &proxy).unwrap();
    let wrapper = wrapper.build();

    let mut m = ModuleBuilder::new("App");
    let direct = m.use_module(&deployment).unwrap().contract("proxy").unwrap();
    let again = m.use_module(&deployment).unwrap().contract("proxy").unwrap();
    let wrapped = m.use_module(&wrapper).unwrap().contract("proxy").unwrap();
    assert_eq!(direct, again);
    assert_eq!(direct, wrapped);
    let app = m.build();

    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();
    Executor::new(&chain, &artifacts, &mut journal)
        .run(&app, &Parameters::new())
        .await
        .unwrap();

    let boxes = chain
        .submissions()
        .iter()
        .filter(|s| matches!(s, Submission::Deploy { init_code, .. } if init_code[..2] == [0x60, 0x01]))
        .count();
    assert_eq!(boxes, 1);
    assert_eq!(chain.deployed().len(), 2);
}

#[tokio::test]
async fn test_cycle_fails_before_any_call() {
    init_tracing();
    let mut m = ModuleBuilder::new("Cyclic");
    let a_key = key("Cyclic", "A");
    let b = m
        .deploy_with("BoxV1", vec![], ActionOptions::id("B").after(&a_key))
        .unwrap();
    m.deploy_with("BoxV2", vec![], ActionOptions::id("A").after(b.key()))
        .unwrap();
    let module = m.build();

    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();
    let err = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap_err();

    match err {
        DeployError::Build(BuildError::Cycle { keys }) => {
            assert_eq!(ids(&keys), vec!["Cyclic#B", "Cyclic#A"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert_eq!(chain.calls(), 0);
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_changed_parameters_fail_reconciliation() {
    init_tracing();
    let module = deployment_module();
    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();

    Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap();
    let calls = chain.calls();

    let changed = Parameters::new().with("Deployment", "admin", Address::repeat_byte(0x42));
    let err = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &changed)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::Reconciliation { ref key, .. } if key.id == "BoxV1.encode.initialize"
    ));
    assert_eq!(chain.calls(), calls);
}

#[tokio::test]
async fn test_orphaned_entry_fails_reconciliation() {
    init_tracing();
    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();

    Executor::new(&chain, &artifacts, &mut journal)
        .run(&deployment_module(), &Parameters::new())
        .await
        .unwrap();

    // Same module, the proxy renamed.
    let mut m = ModuleBuilder::new("Deployment");
    let admin = m.parameter("admin", ParamDefault::Account(0)).unwrap();
    let implementation = m.deploy("BoxV1", vec![]).unwrap();
    let init = m
        .encode_call(&implementation, "initialize", vec![admin.into()])
        .unwrap();
    m.deploy_with(
        "ERC1967Proxy",
        vec![(&implementation).into(), init.into()],
        ActionOptions::id("Proxy"),
    )
    .unwrap();
    let renamed = m.build();

    let err = Executor::new(&chain, &artifacts, &mut journal)
        .run(&renamed, &Parameters::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::Reconciliation { ref key, ref reason } if key.id == "ERC1967Proxy" && reason.contains("orphaned")
    ));
}

#[tokio::test]
async fn test_pending_entry_requires_retry_opt_in() {
    init_tracing();
    let module = deployment_module();
    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();

    // A previous run died while the implementation deployment was in flight.
    let plan = resolve(&module).unwrap();
    let params = kiln_deploy::ResolvedParameters::resolve(&module, &Parameters::new()).unwrap();
    let first = &plan.steps()[0].action;
    journal
        .record(&first.key, JournalEntry::pending(fingerprint(first, &params)))
        .unwrap();

    let err = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::InFlight { ref key } if key.id == "BoxV1"));
    assert_eq!(chain.calls(), 0);

    let result = Executor::new(&chain, &artifacts, &mut journal)
        .with_options(ExecutionOptions {
            retry_pending: true,
        })
        .run(&module, &Parameters::new())
        .await
        .unwrap();
    assert_eq!(result.executed.len(), 3);
}

#[tokio::test]
async fn test_cancelled_before_start_leaves_journal_untouched() {
    init_tracing();
    let module = deployment_module();
    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();
    let (cancel, cancelled) = watch::channel(true);

    let err = Executor::new(&chain, &artifacts, &mut journal)
        .with_cancellation(cancelled)
        .run(&module, &Parameters::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Cancelled { during: None }));
    assert!(journal.entries().is_empty());
    assert_eq!(chain.calls(), 0);
    drop(cancel);
}

#[tokio::test]
async fn test_cancelled_during_submission_records_failure() {
    init_tracing();
    let module = deployment_module();
    let chain = MockChain::new();
    chain.hang_on_submission(2);
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();
    let (cancel, cancelled) = watch::channel(false);

    let params = Parameters::new();
    let mut executor = Executor::new(&chain, &artifacts, &mut journal).with_cancellation(cancelled);
    let (result, _) = tokio::join!(executor.run(&module, &params), async {
        chain.hung.notified().await;
        cancel.send(true).unwrap();
    });

    match result {
        Err(DeployError::Cancelled { during: Some(key) }) => assert_eq!(key.id, "ERC1967Proxy"),
        other => panic!("expected cancellation during the proxy deployment, got {other:?}"),
    }

    let entry = journal.lookup(&key("Deployment", "ERC1967Proxy")).unwrap();
    assert_eq!(entry.status, EntryStatus::Failed);
    let detail = entry.error.as_deref().unwrap();
    assert!(detail.starts_with("cancelled"));
    // The proxy transaction was broadcast; the operator needs its hash to reconcile.
    assert!(detail.contains(&common::tx_hash(2).to_string()));
    assert_eq!(
        journal.lookup(&key("Deployment", "BoxV1")).unwrap().status,
        EntryStatus::Succeeded
    );
}

#[tokio::test]
async fn test_static_call_and_attach() {
    init_tracing();
    let deployment = deployment_module();
    let mut m = ModuleBuilder::new("Reader");
    let proxy = m.use_module(&deployment).unwrap().contract("proxy").unwrap();
    let proxied = m
        .attach_with("BoxV1", &proxy, ActionOptions::id("ProxiedBox"))
        .unwrap();
    let value = m.static_call(&proxied, "retrieve", vec![]).unwrap();
    m.output("value", &value).unwrap();
    let module = m.build();

    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();
    let result = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap();

    assert_eq!(result.outputs["value"], Value::Bytes(common::read_result()));
    assert_eq!(
        result.addresses[&key("Reader", "ProxiedBox")],
        result.addresses[&key("Deployment", "ERC1967Proxy")]
    );
    // Attaching and reading submit nothing.
    assert_eq!(chain.submissions().len(), 2);
}

#[tokio::test]
async fn test_validation_fails_before_any_call() {
    init_tracing();
    let mut m = ModuleBuilder::new("Broken");
    let b = m.deploy("BoxV1", vec![]).unwrap();
    m.send_call(&b, "store", vec![]).unwrap();
    let module = m.build();

    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();
    let err = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::Build(BuildError::UnknownFunction { .. })
    ));
    assert_eq!(chain.calls(), 0);
}

#[tokio::test]
async fn test_signature_with_wrong_arity_fails_before_any_call() {
    init_tracing();
    let mut m = ModuleBuilder::new("Broken");
    let b = m.deploy("BoxV1", vec![]).unwrap();
    m.send_call(&b, "store(uint256)", vec![]).unwrap();
    let module = m.build();

    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();
    let err = Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeployError::Build(BuildError::UnknownFunction { arity: 0, .. })
    ));
    assert_eq!(chain.calls(), 0);
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_account_parameters_are_fetched_once() {
    init_tracing();
    let mut m = ModuleBuilder::new("Accounts");
    let admin = m.parameter("admin", ParamDefault::Account(1)).unwrap();
    let b = m.deploy("BoxV1", vec![]).unwrap();
    m.send_call(&b, "initialize", vec![(&admin).into()]).unwrap();
    m.send_call_with(&b, "upgradeTo", vec![admin.into()], ActionOptions::id("Upgrade"))
        .unwrap();
    let module = m.build();

    let chain = MockChain::new();
    let artifacts = artifacts();
    let mut journal = MemoryJournal::new();
    Executor::new(&chain, &artifacts, &mut journal)
        .run(&module, &Parameters::new())
        .await
        .unwrap();

    assert_eq!(chain.account_lookups(), 1);
    match &chain.submissions()[1] {
        Submission::Send { calldata, .. } => {
            assert_eq!(&calldata[16..36], MockChain::account_address(1).as_slice());
        }
        other => panic!("expected a call, got {other:?}"),
    }
}
