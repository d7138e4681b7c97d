use crate::simulate::SimulationConfig;
use anyhow::Context;
use reconf_executor::ExecutorConfig;
use reconf_model::{Action, Model, PlanDocument, ReconfigurationPlan};
use serde::Deserialize;
use std::path::Path;

/// A plan file: the plan itself plus how to execute and simulate it.
///
/// ```yaml
/// origin:
///   nodes: [{ id: 0, state: offline }]
///   vms: [{ id: 0, state: ready }]
/// actions:
///   - { type: boot_node, node: 0, start: 0, end: 2 }
///   - { type: boot_vm, vm: 0, destination: 0, start: 2, end: 3 }
/// executor:
///   max_concurrency: 8
/// simulation:
///   time_unit_ms: 50
///   fail: [1]
/// ```
#[derive(Debug, Deserialize)]
pub struct PlanFile {
    pub origin: Model,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

pub struct LoadedPlan {
    pub plan: ReconfigurationPlan,
    pub executor: ExecutorConfig,
    pub simulation: SimulationConfig,
}

impl PlanFile {
    pub fn load(path: &Path) -> anyhow::Result<LoadedPlan> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let file: PlanFile = serde_yaml::from_str(&data)
            .with_context(|| format!("invalid plan file {}", path.display()))?;
        file.into_loaded()
            .with_context(|| format!("invalid plan in {}", path.display()))
    }

    fn into_loaded(self) -> anyhow::Result<LoadedPlan> {
        let plan = PlanDocument {
            origin: self.origin,
            actions: self.actions,
        }
        .into_plan()?;
        Ok(LoadedPlan {
            plan,
            executor: self.executor,
            simulation: self.simulation,
        })
    }
}
