//! Dependency tracking for plan execution.
//!
//! A [`PlanMonitor`] answers two questions for an executor: may this action
//! start now, and which actions does committing it release.

use crate::plan::{ActionId, ReconfigurationPlan};
use std::collections::BTreeSet;
use tracing::trace;

/// Tracks which actions of a plan are still blocked by uncommitted
/// prerequisites.
pub trait PlanMonitor: Send {
    /// `true` while at least one prerequisite of `action` has not committed.
    fn is_blocked(&self, action: ActionId) -> bool;

    /// Record the successful completion of `action`.
    ///
    /// Returns the actions that became unblocked, or `None` when the monitor
    /// cannot commit `action` (unknown, already committed, or still blocked).
    fn commit(&mut self, action: ActionId) -> Option<BTreeSet<ActionId>>;
}

/// Default monitor: action `b` depends on action `a` when `a` ends no later
/// than `b` starts and both touch a common node or VM.
#[derive(Debug, Clone)]
pub struct DependencyMonitor {
    depends_on: Vec<BTreeSet<ActionId>>,
    pending: Vec<BTreeSet<ActionId>>,
    dependents: Vec<Vec<ActionId>>,
    committed: Vec<bool>,
}

impl DependencyMonitor {
    pub fn new(plan: &ReconfigurationPlan) -> Self {
        let n = plan.len();
        let mut depends_on = vec![BTreeSet::new(); n];
        let mut dependents = vec![Vec::new(); n];

        for (b_id, b) in plan.iter() {
            let b_elements = b.elements();
            for (a_id, a) in plan.iter() {
                if a_id == b_id || a.end() > b.start() {
                    continue;
                }
                // Zero-length actions at the same instant would otherwise
                // depend on each other.
                if (a.start(), a.end(), a_id) >= (b.start(), b.end(), b_id) {
                    continue;
                }
                if a.elements().iter().any(|e| b_elements.contains(e)) {
                    depends_on[b_id.0].insert(a_id);
                    dependents[a_id.0].push(b_id);
                }
            }
        }

        Self {
            pending: depends_on.clone(),
            depends_on,
            dependents,
            committed: vec![false; n],
        }
    }

    /// Static prerequisites of `action`.
    pub fn dependencies(&self, action: ActionId) -> Option<&BTreeSet<ActionId>> {
        self.depends_on.get(action.0)
    }

    pub fn is_committed(&self, action: ActionId) -> bool {
        self.committed.get(action.0).copied().unwrap_or(false)
    }
}

impl PlanMonitor for DependencyMonitor {
    fn is_blocked(&self, action: ActionId) -> bool {
        self.pending
            .get(action.0)
            .map(|deps| !deps.is_empty())
            .unwrap_or(true)
    }

    fn commit(&mut self, action: ActionId) -> Option<BTreeSet<ActionId>> {
        if self.is_blocked(action) || self.is_committed(action) {
            return None;
        }
        self.committed[action.0] = true;

        let mut unblocked = BTreeSet::new();
        for next in &self.dependents[action.0] {
            let deps = &mut self.pending[next.0];
            if deps.remove(&action) && deps.is_empty() {
                unblocked.insert(*next);
            }
        }
        trace!(%action, unblocked = unblocked.len(), "committed");
        Some(unblocked)
    }
}
