use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reconf_executor::{
    ActuationError, Actuator, ActuatorBuilder, ActuatorFactory, Executor, ExecutorConfig,
    ExecutorError, InvariantViolation,
};
use reconf_model::{
    Action, ActionId, ActionKind, DependencyMonitor, Model, Node, PlanMonitor,
    ReconfigurationPlan, Vm,
};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Shared observations across every actuator built for one run.
#[derive(Default)]
struct Probe {
    built: Mutex<Vec<Action>>,
    executed: AtomicUsize,
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl Probe {
    fn built(&self) -> Vec<Action> {
        self.built.lock().unwrap().clone()
    }
}

struct MockActuator {
    action: Action,
    delay: Duration,
    timeout: Duration,
    fail: bool,
    probe: Arc<Probe>,
}

impl Actuator for MockActuator {
    fn execute(&mut self) -> Result<(), ActuationError> {
        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak.fetch_max(live, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
        self.probe.executed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ActuationError::failed("simulated failure"));
        }
        Ok(())
    }

    fn action(&self) -> &Action {
        &self.action
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn label(&self) -> String {
        format!("mock {}", self.action.kind())
    }
}

/// Sleeps `unit` per time unit of the action. Refuses to build an actuator
/// whose preconditions do not hold on the model it is given.
#[derive(Clone)]
struct MockBuilder {
    kind: ActionKind,
    unit: Duration,
    timeout: Duration,
    failing: Vec<Action>,
    probe: Arc<Probe>,
}

impl ActuatorBuilder for MockBuilder {
    fn associated_kind(&self) -> ActionKind {
        self.kind
    }

    fn build(&self, model: &Model, action: &Action) -> Result<Box<dyn Actuator>, ActuationError> {
        let mut check = model.clone();
        if !action.apply(&mut check) {
            return Err(ActuationError::rejected(format!(
                "{action} does not apply on the current model"
            )));
        }
        self.probe.built.lock().unwrap().push(action.clone());
        Ok(Box::new(MockActuator {
            action: action.clone(),
            delay: self.unit * action.duration(),
            timeout: self.timeout,
            fail: self.failing.contains(action),
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct Setup {
    unit: Duration,
    timeout: Duration,
    failing: Vec<Action>,
    skip: Vec<ActionKind>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            unit: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
            failing: Vec::new(),
            skip: Vec::new(),
        }
    }
}

impl Setup {
    fn factory(self, probe: &Arc<Probe>) -> ActuatorFactory {
        let mut factory = ActuatorFactory::new();
        for kind in ActionKind::all() {
            if self.skip.contains(kind) {
                continue;
            }
            factory.register(MockBuilder {
                kind: *kind,
                unit: self.unit,
                timeout: self.timeout,
                failing: self.failing.clone(),
                probe: Arc::clone(probe),
            });
        }
        factory
    }
}

fn boot_chain() -> (ReconfigurationPlan, Action, Action) {
    let mut origin = Model::new();
    origin.add_offline_node(Node(0));
    origin.add_ready_vm(Vm(0));
    let boot_node = Action::boot_node(Node(0), 0, 2);
    let boot_vm = Action::boot_vm(Vm(0), Node(0), 2, 3);
    let mut plan = ReconfigurationPlan::new(origin);
    plan.add(boot_node.clone()).unwrap();
    plan.add(boot_vm.clone()).unwrap();
    (plan, boot_node, boot_vm)
}

/// `n` offline nodes booted over the same window: no dependency between them.
fn independent_boots(n: u32, end: u32) -> ReconfigurationPlan {
    let mut origin = Model::new();
    for i in 0..n {
        origin.add_offline_node(Node(i));
    }
    let mut plan = ReconfigurationPlan::new(origin);
    for i in 0..n {
        plan.add(Action::boot_node(Node(i), 0, end)).unwrap();
    }
    plan
}

/// Two independent branches, each booting a node then a VM on it. The first
/// branch is short, the second one three times longer.
fn two_branches() -> (ReconfigurationPlan, [Action; 4]) {
    let mut origin = Model::new();
    origin.add_offline_node(Node(0));
    origin.add_offline_node(Node(1));
    origin.add_ready_vm(Vm(0));
    origin.add_ready_vm(Vm(1));
    let actions = [
        Action::boot_node(Node(0), 0, 1),
        Action::boot_node(Node(1), 0, 3),
        Action::boot_vm(Vm(0), Node(0), 1, 2),
        Action::boot_vm(Vm(1), Node(1), 3, 4),
    ];
    let mut plan = ReconfigurationPlan::new(origin);
    for action in &actions {
        plan.add(action.clone()).unwrap();
    }
    (plan, actions)
}

/// A richer plan: shutdown, migration, then node power changes.
fn consolidation() -> ReconfigurationPlan {
    let mut origin = Model::new();
    origin.add_online_node(Node(0));
    origin.add_online_node(Node(1));
    origin.add_offline_node(Node(2));
    origin.add_running_vm(Vm(0), Node(0)).unwrap();
    origin.add_running_vm(Vm(1), Node(0)).unwrap();
    origin.add_running_vm(Vm(2), Node(1)).unwrap();
    origin.add_ready_vm(Vm(3));

    let mut plan = ReconfigurationPlan::new(origin);
    plan.add(Action::shutdown_vm(Vm(0), Node(0), 0, 1)).unwrap();
    plan.add(Action::migrate_vm(Vm(1), Node(0), Node(1), 0, 3)).unwrap();
    plan.add(Action::boot_node(Node(2), 0, 2)).unwrap();
    plan.add(Action::shutdown_node(Node(0), 3, 5)).unwrap();
    plan.add(Action::boot_vm(Vm(3), Node(2), 2, 4)).unwrap();
    plan.add(Action::migrate_vm(Vm(2), Node(1), Node(2), 4, 6)).unwrap();
    plan
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn boot_node_then_boot_vm_succeeds() {
    let (plan, _, _) = boot_chain();
    let expected = plan.apply_sequentially().unwrap();
    let probe = Arc::new(Probe::default());

    let result = Executor::new(plan, Setup::default().factory(&probe))
        .run()
        .await
        .unwrap();

    assert_eq!(result, expected);
    assert!(result.is_online(Node(0)));
    assert_eq!(result.host_of(Vm(0)), Some(Node(0)));
    assert_eq!(probe.executed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failing_boot_node_stops_the_plan() {
    let (plan, boot_node, _) = boot_chain();
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        failing: vec![boot_node.clone()],
        ..Default::default()
    }
    .factory(&probe);

    let err = Executor::new(plan, factory).run().await.unwrap_err();

    match &err {
        ExecutorError::Execution {
            id,
            action,
            actuator,
            source,
        } => {
            assert_eq!(*id, ActionId(0));
            assert_eq!(action, &boot_node);
            assert_eq!(actuator, "mock boot_node");
            assert_eq!(source.to_string(), "simulated failure");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("mock boot_node"));
    // The VM boot was never built, let alone executed.
    assert_eq!(probe.built(), vec![boot_node]);
}

#[tokio::test]
async fn zero_timeout_fails_a_slow_boot_node() {
    let (plan, boot_node, _) = boot_chain();
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        unit: Duration::from_millis(50),
        timeout: Duration::ZERO,
        ..Default::default()
    }
    .factory(&probe);

    let err = Executor::new(plan, factory).run().await.unwrap_err();

    match err {
        ExecutorError::Timeout {
            id,
            action,
            actuator,
            timeout,
        } => {
            assert_eq!(id, ActionId(0));
            assert_eq!(action, boot_node);
            assert_eq!(actuator, "mock boot_node");
            assert_eq!(timeout, Duration::ZERO);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(probe.built(), vec![boot_node]);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_matches_sequential_application() {
    let plan = consolidation();
    let expected = plan.apply_sequentially().unwrap();
    let actions = plan.len();
    let probe = Arc::new(Probe::default());

    let result = Executor::new(plan, Setup::default().factory(&probe))
        .run()
        .await
        .unwrap();

    assert_eq!(result, expected);
    assert!(!result.is_online(Node(0)));
    assert_eq!(result.host_of(Vm(2)), Some(Node(2)));
    assert_eq!(probe.executed.load(Ordering::SeqCst), actions);
}

#[tokio::test]
async fn every_action_is_dispatched_once_after_its_prerequisites() {
    let plan = consolidation();
    let monitor = DependencyMonitor::new(&plan);
    let all: Vec<Action> = plan.iter().map(|(_, a)| a.clone()).collect();
    let probe = Arc::new(Probe::default());

    // Builders refuse actions whose preconditions do not hold yet, so a
    // premature dispatch would surface as a build error.
    Executor::new(plan, Setup::default().factory(&probe))
        .run()
        .await
        .unwrap();

    let built = probe.built();
    assert_eq!(built.len(), all.len());
    for (i, action) in all.iter().enumerate() {
        let pos = built.iter().position(|b| b == action).unwrap();
        assert_eq!(built.iter().filter(|b| *b == action).count(), 1);
        for dep in monitor.dependencies(ActionId(i)).unwrap() {
            let dep_pos = built.iter().position(|b| b == &all[dep.index()]).unwrap();
            assert!(dep_pos < pos, "{} built before its prerequisite {}", action, all[dep.index()]);
        }
    }
}

#[tokio::test]
async fn success_before_timeout_is_not_reported_as_timeout() {
    let (plan, _, _) = boot_chain();
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        unit: Duration::from_millis(5),
        timeout: Duration::from_millis(500),
        ..Default::default()
    }
    .factory(&probe);

    let result = Executor::new(plan, factory).run().await;
    assert!(result.is_ok(), "{result:?}");
    tokio::time::sleep(Duration::from_millis(600)).await;
}

#[tokio::test]
async fn unmapped_action_kind_is_reported() {
    let (plan, _, _) = boot_chain();
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        skip: vec![ActionKind::BootNode],
        ..Default::default()
    }
    .factory(&probe);

    let err = Executor::new(plan, factory).run().await.unwrap_err();

    assert!(matches!(err, ExecutorError::NoActuator { id: ActionId(0), .. }));
    assert!(err.to_string().contains("'boot_node'"));
    assert!(probe.built().is_empty());
}

#[tokio::test]
async fn unmapped_successor_is_reported_once_reached() {
    let (plan, boot_node, _) = boot_chain();
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        skip: vec![ActionKind::BootVm],
        ..Default::default()
    }
    .factory(&probe);

    let err = Executor::new(plan, factory).run().await.unwrap_err();

    assert!(matches!(err, ExecutorError::NoActuator { id: ActionId(1), .. }));
    assert_eq!(probe.built(), vec![boot_node]);
}

#[tokio::test]
async fn builder_rejection_is_a_build_error() {
    let mut origin = Model::new();
    origin.add_online_node(Node(0));
    let mut plan = ReconfigurationPlan::new(origin);
    // Node 0 is already online.
    plan.add(Action::boot_node(Node(0), 0, 1)).unwrap();
    let probe = Arc::new(Probe::default());

    let err = Executor::new(plan, Setup::default().factory(&probe))
        .run()
        .await
        .unwrap_err();

    match err {
        ExecutorError::Build { id, source, .. } => {
            assert_eq!(id, ActionId(0));
            assert!(matches!(source, ActuationError::Rejected(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Builds without looking at the model.
struct Blind;

impl ActuatorBuilder for Blind {
    fn associated_kind(&self) -> ActionKind {
        ActionKind::BootNode
    }

    fn build(&self, _model: &Model, action: &Action) -> Result<Box<dyn Actuator>, ActuationError> {
        Ok(Box::new(MockActuator {
            action: action.clone(),
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
            fail: false,
            probe: Arc::new(Probe::default()),
        }))
    }
}

#[tokio::test]
async fn action_inconsistent_with_the_model_fails_the_plan() {
    let mut origin = Model::new();
    origin.add_online_node(Node(0));
    let mut plan = ReconfigurationPlan::new(origin);
    plan.add(Action::boot_node(Node(0), 0, 1)).unwrap();
    let mut factory = ActuatorFactory::new();
    factory.register(Blind);

    let err = Executor::new(plan, factory).run().await.unwrap_err();

    assert!(matches!(err, ExecutorError::Inconsistent { id: ActionId(0), .. }));
    assert!(!err.is_internal());
}

#[tokio::test]
async fn concurrency_is_capped() {
    let probe = Arc::new(Probe::default());
    let factory = Setup::default().factory(&probe);

    Executor::new(independent_boots(4, 10), factory)
        .with_config(ExecutorConfig::default().with_max_concurrency(1))
        .run()
        .await
        .unwrap();

    assert_eq!(probe.executed.load(Ordering::SeqCst), 4);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn independent_actions_overlap() {
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        unit: Duration::from_millis(20),
        ..Default::default()
    }
    .factory(&probe);

    Executor::new(independent_boots(4, 10), factory)
        .with_config(ExecutorConfig::default().with_max_concurrency(4))
        .run()
        .await
        .unwrap();

    assert!(probe.peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn first_failure_observed_is_the_one_reported() {
    let (plan, [fast, slow, ..]) = two_branches();
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        unit: Duration::from_millis(40),
        failing: vec![fast.clone(), slow.clone()],
        ..Default::default()
    }
    .factory(&probe);

    let err = Executor::new(plan, factory).run().await.unwrap_err();

    match err {
        ExecutorError::Execution { id, action, .. } => {
            assert_eq!(id, ActionId(0));
            assert_eq!(action, fast);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Both heads were started together; neither successor ever was.
    assert_eq!(probe.built(), vec![fast, slow]);
}

#[tokio::test]
async fn sibling_in_flight_at_failure_never_releases_its_successor() {
    let (plan, [fast, slow, _, slow_successor]) = two_branches();
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        unit: Duration::from_millis(40),
        failing: vec![fast.clone()],
        ..Default::default()
    }
    .factory(&probe);

    let err = Executor::new(plan, factory).run().await.unwrap_err();
    assert!(matches!(err, ExecutorError::Execution { id: ActionId(0), .. }));

    // Let the slow head complete on its blocking thread.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(probe.executed.load(Ordering::SeqCst), 2);
    let built = probe.built();
    assert_eq!(built, vec![fast, slow]);
    assert!(!built.contains(&slow_successor));
}

#[test]
fn blocking_execute_runs_every_permitted_actuator_at_once() {
    // More actuators than tokio's default blocking pool holds.
    let plan = independent_boots(600, 1);
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        unit: Duration::from_millis(400),
        timeout: Duration::from_millis(700),
        ..Default::default()
    }
    .factory(&probe);

    let result = Executor::new(plan, factory)
        .with_config(ExecutorConfig::default().with_max_concurrency(600))
        .execute();

    assert!(result.is_ok(), "{:?}", result.err());
    assert_eq!(probe.executed.load(Ordering::SeqCst), 600);
    assert!(probe.peak.load(Ordering::SeqCst) > 512);
}

#[tokio::test]
async fn empty_plan_succeeds_with_the_origin() {
    let mut origin = Model::new();
    origin.add_online_node(Node(0));
    origin.add_running_vm(Vm(0), Node(0)).unwrap();
    let plan = ReconfigurationPlan::new(origin.clone());

    let result = Executor::new(plan, ActuatorFactory::new()).run().await.unwrap();
    assert_eq!(result, origin);
}

#[test]
fn blocking_execute_runs_the_plan() {
    let (plan, _, _) = boot_chain();
    let expected = plan.apply_sequentially().unwrap();
    let probe = Arc::new(Probe::default());
    let config = ExecutorConfig {
        worker_threads: Some(2),
        ..Default::default()
    };

    let result = Executor::new(plan, Setup::default().factory(&probe))
        .with_config(config)
        .execute()
        .unwrap();
    assert_eq!(result, expected);
}

#[test]
fn blocking_execute_does_not_wait_for_abandoned_actuators() {
    let (plan, _, _) = boot_chain();
    let probe = Arc::new(Probe::default());
    let factory = Setup {
        unit: Duration::from_millis(500),
        timeout: Duration::from_millis(10),
        ..Default::default()
    }
    .factory(&probe);

    let started = std::time::Instant::now();
    let err = Executor::new(plan, factory).execute().unwrap_err();
    assert!(matches!(err, ExecutorError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_millis(900));
}

// ---------------------------------------------------------------------------
// Misbehaving monitors
// ---------------------------------------------------------------------------

struct Forgetful;

impl PlanMonitor for Forgetful {
    fn is_blocked(&self, _action: ActionId) -> bool {
        false
    }

    fn commit(&mut self, _action: ActionId) -> Option<BTreeSet<ActionId>> {
        None
    }
}

struct AllBlocked;

impl PlanMonitor for AllBlocked {
    fn is_blocked(&self, _action: ActionId) -> bool {
        true
    }

    fn commit(&mut self, _action: ActionId) -> Option<BTreeSet<ActionId>> {
        None
    }
}

/// Releases action 0 again whenever anything commits.
struct Echo;

impl PlanMonitor for Echo {
    fn is_blocked(&self, _action: ActionId) -> bool {
        false
    }

    fn commit(&mut self, _action: ActionId) -> Option<BTreeSet<ActionId>> {
        Some(BTreeSet::from([ActionId(0)]))
    }
}

fn single_boot() -> ReconfigurationPlan {
    let mut origin = Model::new();
    origin.add_offline_node(Node(0));
    let mut plan = ReconfigurationPlan::new(origin);
    plan.add(Action::boot_node(Node(0), 0, 1)).unwrap();
    plan
}

#[tokio::test]
async fn monitor_refusing_a_commit_is_an_internal_error() {
    let probe = Arc::new(Probe::default());
    let err = Executor::new(single_boot(), Setup::default().factory(&probe))
        .with_monitor(Forgetful)
        .run()
        .await
        .unwrap_err();

    assert!(err.is_internal());
    assert!(matches!(
        err,
        ExecutorError::Invariant(InvariantViolation::UnknownCommit(ActionId(0)))
    ));
}

#[tokio::test]
async fn work_unblocked_after_the_last_commit_is_an_internal_error() {
    let probe = Arc::new(Probe::default());
    let err = Executor::new(single_boot(), Setup::default().factory(&probe))
        .with_monitor(Echo)
        .run()
        .await
        .unwrap_err();

    assert!(err.is_internal());
    assert!(matches!(
        err,
        ExecutorError::Invariant(InvariantViolation::OutstandingWork { unblocked: 1, .. })
    ));
}

#[tokio::test]
async fn nothing_runnable_is_reported_as_stalled() {
    let probe = Arc::new(Probe::default());
    let err = Executor::new(single_boot(), Setup::default().factory(&probe))
        .with_monitor(AllBlocked)
        .run()
        .await
        .unwrap_err();

    assert!(err.is_internal());
    assert!(matches!(
        err,
        ExecutorError::Invariant(InvariantViolation::Stalled { remaining: 1 })
    ));
    assert!(probe.built().is_empty());
}
