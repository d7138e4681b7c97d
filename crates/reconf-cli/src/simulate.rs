use reconf_executor::{ActuationError, Actuator, ActuatorBuilder, ActuatorFactory};
use reconf_model::{Action, ActionId, ActionKind, Model, ReconfigurationPlan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// SimulationConfig
// ---------------------------------------------------------------------------

/// How the simulated actuators behave. Found under `simulation:` in plan files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Wall-clock length of one plan time unit.
    #[serde(default = "default_time_unit_ms")]
    pub time_unit_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Indexes of the actions whose actuator reports a failure.
    #[serde(default)]
    pub fail: Vec<usize>,
    /// Per-kind timeout, in milliseconds.
    #[serde(default)]
    pub timeout_overrides: BTreeMap<ActionKind, u64>,
}

fn default_time_unit_ms() -> u64 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_unit_ms: default_time_unit_ms(),
            timeout_secs: default_timeout_secs(),
            fail: Vec::new(),
            timeout_overrides: BTreeMap::new(),
        }
    }
}

impl SimulationConfig {
    pub fn timeout_for(&self, kind: ActionKind) -> Duration {
        match self.timeout_overrides.get(&kind) {
            Some(ms) => Duration::from_millis(*ms),
            None => Duration::from_secs(self.timeout_secs),
        }
    }

    /// A factory with one simulated builder per action kind.
    ///
    /// Builders only see the action, not its index, so a failing action must
    /// not have an identical twin elsewhere in the plan.
    pub fn factory(&self, plan: &ReconfigurationPlan) -> anyhow::Result<ActuatorFactory> {
        let time_unit = Duration::from_millis(self.time_unit_ms);
        for (id, action) in plan.iter() {
            if time_unit.checked_mul(action.duration()).is_none() {
                anyhow::bail!(
                    "time_unit_ms {} is too large: simulating action {} ({action}) would overflow",
                    self.time_unit_ms,
                    id.index()
                );
            }
        }

        let mut failing = Vec::with_capacity(self.fail.len());
        for index in &self.fail {
            let action = plan.action(ActionId(*index)).ok_or_else(|| {
                anyhow::anyhow!("cannot fail action {index}: the plan has {} action(s)", plan.len())
            })?;
            if let Some((twin, _)) = plan
                .iter()
                .find(|(id, other)| id.index() != *index && *other == action)
            {
                anyhow::bail!(
                    "cannot fail action {index} alone: action {} is identical ({action})",
                    twin.index()
                );
            }
            failing.push(action.clone());
        }
        let failing = Arc::new(failing);

        let mut factory = ActuatorFactory::new();
        for kind in ActionKind::all() {
            factory.register(SimulatedBuilder {
                kind: *kind,
                time_unit,
                timeout: self.timeout_for(*kind),
                failing: Arc::clone(&failing),
            });
        }
        Ok(factory)
    }
}

// ---------------------------------------------------------------------------
// Simulated actuators
// ---------------------------------------------------------------------------

struct SimulatedBuilder {
    kind: ActionKind,
    time_unit: Duration,
    timeout: Duration,
    failing: Arc<Vec<Action>>,
}

impl ActuatorBuilder for SimulatedBuilder {
    fn associated_kind(&self) -> ActionKind {
        self.kind
    }

    /// Refuses actions that do not apply on `model`, as a real driver would
    /// refuse to boot a node that is already up.
    fn build(&self, model: &Model, action: &Action) -> Result<Box<dyn Actuator>, ActuationError> {
        if !action.apply(&mut model.clone()) {
            return Err(ActuationError::rejected(format!(
                "{action} is not possible on the current cluster state"
            )));
        }
        let delay = self
            .time_unit
            .checked_mul(action.duration())
            .ok_or_else(|| ActuationError::rejected(format!("simulated delay of {action} overflows")))?;
        Ok(Box::new(SimulatedActuator {
            action: action.clone(),
            delay,
            timeout: self.timeout,
            fail: self.failing.contains(action),
        }))
    }
}

struct SimulatedActuator {
    action: Action,
    delay: Duration,
    timeout: Duration,
    fail: bool,
}

impl Actuator for SimulatedActuator {
    fn execute(&mut self) -> Result<(), ActuationError> {
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(ActuationError::failed("simulated failure"));
        }
        tracing::debug!(action = %self.action, "simulated");
        Ok(())
    }

    fn action(&self) -> &Action {
        &self.action
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn label(&self) -> String {
        format!("sim:{}", self.action.kind())
    }
}
