use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use reconf_model::{ActionId, DependencyMonitor, Model, PlanMonitor, ReconfigurationPlan};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::actuator::ActuatorFactory;
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, InvariantViolation};
use crate::unit::{self, Claim, DispatchId, Outcome, Report, ReportSender};
use crate::Result;

/// tokio's own default for `max_blocking_threads`.
const DEFAULT_BLOCKING_THREADS: usize = 512;

// ─── Executor ─────────────────────────────────────────────────────────────

/// Executes a [`ReconfigurationPlan`], running independent actions in
/// parallel and each action only once its prerequisites have committed.
///
/// An executor runs a single plan once: [`Executor::run`] and
/// [`Executor::execute`] consume it.
pub struct Executor {
    plan: ReconfigurationPlan,
    factory: ActuatorFactory,
    monitor: Box<dyn PlanMonitor>,
    config: ExecutorConfig,
    model: Model,
}

impl Executor {
    /// New executor tracking dependencies with a [`DependencyMonitor`].
    pub fn new(plan: ReconfigurationPlan, factory: ActuatorFactory) -> Self {
        let monitor = Box::new(DependencyMonitor::new(&plan));
        let model = plan.origin().clone();
        Self {
            plan,
            factory,
            monitor,
            config: ExecutorConfig::default(),
            model,
        }
    }

    pub fn with_monitor<M>(mut self, monitor: M) -> Self
    where
        M: PlanMonitor + 'static,
    {
        self.monitor = Box::new(monitor);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute the plan and return the resulting simulated model.
    ///
    /// Resolves once every action has committed, or with the first failure.
    /// Actuators still running at that point are abandoned, not interrupted.
    ///
    /// Actuators run on the current runtime's blocking pool; at most
    /// `max_concurrency` of them execute at once, fewer if that pool is smaller.
    pub async fn run(self) -> Result<Model> {
        self.config.validate()?;
        let (reports, inbox) = mpsc::unbounded_channel();
        let run = Run {
            remaining: self.plan.len(),
            limiter: Arc::new(Semaphore::new(self.config.max_concurrency)),
            plan: self.plan,
            factory: self.factory,
            monitor: self.monitor,
            model: self.model,
            in_flight: InFlight::default(),
            reports,
            next_dispatch: 0,
        };
        run.drive(inbox).await
    }

    /// Blocking flavour of [`Executor::run`], on a dedicated multi-threaded
    /// runtime. Must not be called from within an async context.
    pub fn execute(self) -> Result<Model> {
        self.config.validate()?;
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        // Every unit holding a permit gets its own blocking thread.
        builder
            .enable_all()
            .max_blocking_threads(self.config.max_concurrency.max(DEFAULT_BLOCKING_THREADS));
        if let Some(n) = self.config.worker_threads {
            builder.worker_threads(n);
        }
        let runtime = builder.build().map_err(ExecutorError::Runtime)?;
        let result = runtime.block_on(self.run());
        // Abandoned actuators must not keep the caller waiting.
        runtime.shutdown_background();
        result
    }
}

// ─── In-flight registry ───────────────────────────────────────────────────

struct InFlightEntry {
    action: ActionId,
    actuator: String,
    timeout: Duration,
    claim: Claim,
    unit: Option<AbortHandle>,
}

/// Dispatches awaiting their report. Dropping the registry aborts every unit
/// still registered.
#[derive(Default)]
struct InFlight {
    entries: HashMap<DispatchId, InFlightEntry>,
}

impl InFlight {
    fn insert(&mut self, dispatch: DispatchId, entry: InFlightEntry) {
        self.entries.insert(dispatch, entry);
    }

    fn attach(&mut self, dispatch: DispatchId, unit: AbortHandle) {
        if let Some(entry) = self.entries.get_mut(&dispatch) {
            entry.unit = Some(unit);
        }
    }

    fn remove(&mut self, dispatch: DispatchId) -> Option<InFlightEntry> {
        self.entries.remove(&dispatch)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        for (dispatch, entry) in self.entries.drain() {
            if let Some(unit) = entry.unit {
                trace!(%dispatch, action = %entry.action, "abandoning unit");
                unit.abort();
            }
        }
    }
}

// ─── Run: the single owner of all mutable execution state ─────────────────

struct Run {
    plan: ReconfigurationPlan,
    factory: ActuatorFactory,
    monitor: Box<dyn PlanMonitor>,
    model: Model,
    remaining: usize,
    in_flight: InFlight,
    limiter: Arc<Semaphore>,
    reports: ReportSender,
    next_dispatch: u64,
}

impl Run {
    async fn drive(mut self, mut inbox: mpsc::UnboundedReceiver<Report>) -> Result<Model> {
        info!(
            actions = self.remaining,
            max_concurrency = self.limiter.available_permits(),
            "starting plan execution"
        );

        let ready: Vec<ActionId> = self
            .plan
            .ids()
            .filter(|id| !self.monitor.is_blocked(*id))
            .collect();
        for id in ready {
            self.dispatch(id)?;
        }

        while self.remaining > 0 {
            if self.in_flight.is_empty() {
                return Err(InvariantViolation::Stalled {
                    remaining: self.remaining,
                }
                .into());
            }
            // `self.reports` keeps the channel open, so `None` cannot happen
            // while entries are registered.
            let Some(report) = inbox.recv().await else {
                return Err(InvariantViolation::Stalled {
                    remaining: self.remaining,
                }
                .into());
            };
            self.handle(report)?;
        }

        info!("plan executed successfully");
        Ok(self.model)
    }

    /// Build the actuator for `id` against the current model and start it.
    fn dispatch(&mut self, id: ActionId) -> Result<()> {
        let Some(action) = self.plan.action(id) else {
            return Err(InvariantViolation::UnknownCommit(id).into());
        };

        let actuator = self
            .factory
            .get_actuator(&self.model, action)
            .map_err(|source| ExecutorError::Build {
                id,
                action: action.clone(),
                source,
            })?
            .ok_or_else(|| ExecutorError::NoActuator {
                id,
                action: action.clone(),
            })?;

        let dispatch = DispatchId(self.next_dispatch);
        self.next_dispatch += 1;
        let claim = Claim::new();
        debug!(%dispatch, action = %action, "dispatch");

        // Registered before the unit exists, so any report finds its entry.
        self.in_flight.insert(
            dispatch,
            InFlightEntry {
                action: id,
                actuator: actuator.label(),
                timeout: actuator.timeout(),
                claim: claim.clone(),
                unit: None,
            },
        );
        let unit = unit::spawn(
            dispatch,
            actuator,
            claim,
            Arc::clone(&self.limiter),
            self.reports.clone(),
        );
        self.in_flight.attach(dispatch, unit.abort_handle());
        Ok(())
    }

    fn handle(&mut self, report: Report) -> Result<()> {
        let Some(entry) = self.in_flight.remove(report.dispatch) else {
            trace!(dispatch = %report.dispatch, "ignoring report for a settled dispatch");
            return Ok(());
        };
        debug_assert!(entry.claim.is_claimed());

        match report.outcome {
            Outcome::Completed => self.commit_success(entry),
            Outcome::Failed(source) => {
                let err = ExecutorError::Execution {
                    id: entry.action,
                    action: self.action_of(entry.action)?,
                    actuator: entry.actuator,
                    source,
                };
                Err(self.commit_failure(err))
            }
            Outcome::TimedOut => {
                debug!(actuator = %entry.actuator, timeout = ?entry.timeout, "timeout");
                let err = ExecutorError::Timeout {
                    id: entry.action,
                    action: self.action_of(entry.action)?,
                    actuator: entry.actuator,
                    timeout: entry.timeout,
                };
                Err(self.commit_failure(err))
            }
        }
    }

    fn commit_success(&mut self, entry: InFlightEntry) -> Result<()> {
        let id = entry.action;
        let Some(action) = self.plan.action(id) else {
            return Err(InvariantViolation::UnknownCommit(id).into());
        };

        if !action.apply(&mut self.model) {
            let err = ExecutorError::Inconsistent {
                id,
                action: action.clone(),
                actuator: entry.actuator,
            };
            return Err(self.commit_failure(err));
        }

        let unblocked: BTreeSet<ActionId> = self
            .monitor
            .commit(id)
            .ok_or(InvariantViolation::UnknownCommit(id))?;

        self.remaining -= 1;
        debug!(
            action = %action,
            remaining = self.remaining,
            unblocked = unblocked.len(),
            "successful termination"
        );

        if self.remaining == 0 {
            if !unblocked.is_empty() {
                return Err(InvariantViolation::OutstandingWork {
                    action: id,
                    unblocked: unblocked.len(),
                }
                .into());
            }
            return Ok(());
        }

        for next in unblocked {
            self.dispatch(next)?;
        }
        Ok(())
    }

    /// Bookkeeping for a failed action. The returned error terminates the run.
    fn commit_failure(&mut self, err: ExecutorError) -> ExecutorError {
        self.remaining = self.remaining.saturating_sub(1);
        warn!(
            remaining = self.remaining,
            in_flight = self.in_flight.len(),
            error = %err,
            "plan execution aborted"
        );
        err
    }

    fn action_of(&self, id: ActionId) -> Result<reconf_model::Action> {
        self.plan
            .action(id)
            .cloned()
            .ok_or_else(|| InvariantViolation::UnknownCommit(id).into())
    }
}
