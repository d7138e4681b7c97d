//! `reconf-model`: the cluster model a reconfiguration plan operates on.
//!
//! - [`Model`]: node power states and VM placement.
//! - [`Action`]: one unit of change, applied with [`Action::apply`].
//! - [`ReconfigurationPlan`]: an origin model plus the actions to run on it.
//! - [`PlanMonitor`] / [`DependencyMonitor`]: which actions may start, and
//!   which ones a commit releases.

pub mod action;
pub mod element;
pub mod error;
pub mod model;
pub mod monitor;
pub mod plan;

pub use action::{Action, ActionKind};
pub use element::{Element, Node, Vm};
pub use error::{ModelError, Result};
pub use model::{Model, ModelDocument, NodeState, VmState};
pub use monitor::{DependencyMonitor, PlanMonitor};
pub use plan::{ActionId, PlanDocument, ReconfigurationPlan};
