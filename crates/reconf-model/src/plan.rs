use crate::action::Action;
use crate::error::{ModelError, Result};
use crate::model::Model;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identity of an action inside a [`ReconfigurationPlan`]: its insertion index.
///
/// Actions are tracked by identity, never by value, so two identical actions
/// in one plan remain distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub usize);

impl ActionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A set of actions to apply on an origin model.
#[derive(Debug, Clone)]
pub struct ReconfigurationPlan {
    origin: Model,
    actions: Vec<Action>,
}

impl ReconfigurationPlan {
    pub fn new(origin: Model) -> Self {
        Self {
            origin,
            actions: Vec::new(),
        }
    }

    /// Append an action, returning its identity.
    ///
    /// The window must be well-formed and every element the action touches
    /// must exist in the origin model.
    pub fn add(&mut self, action: Action) -> Result<ActionId> {
        if action.end() < action.start() {
            return Err(ModelError::InvalidWindow {
                start: action.start(),
                end: action.end(),
            });
        }
        for node in action.nodes() {
            if !self.origin.contains_node(node) {
                return Err(ModelError::UnknownNode(node));
            }
        }
        for vm in action.vms() {
            if !self.origin.contains_vm(vm) {
                return Err(ModelError::UnknownVm(vm));
            }
        }
        self.actions.push(action);
        Ok(ActionId(self.actions.len() - 1))
    }

    pub fn origin(&self) -> &Model {
        &self.origin
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn action(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(id.0)
    }

    pub fn ids(&self) -> impl Iterator<Item = ActionId> {
        (0..self.actions.len()).map(ActionId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionId, &Action)> {
        self.actions.iter().enumerate().map(|(i, a)| (ActionId(i), a))
    }

    /// Moment the last action ends.
    pub fn duration(&self) -> u32 {
        self.actions.iter().map(Action::end).max().unwrap_or(0)
    }

    /// Ids ordered by `(start, end, id)`: a linear extension of the
    /// dependency order.
    pub fn schedule(&self) -> Vec<ActionId> {
        let mut ids: Vec<ActionId> = self.ids().collect();
        ids.sort_by_key(|id| {
            let a = &self.actions[id.0];
            (a.start(), a.end(), *id)
        });
        ids
    }

    /// Apply every action, one after the other following [`Self::schedule`],
    /// on a clone of the origin.
    pub fn apply_sequentially(&self) -> Result<Model> {
        let mut model = self.origin.clone();
        for id in self.schedule() {
            let action = &self.actions[id.0];
            if !action.apply(&mut model) {
                return Err(ModelError::NotApplicable {
                    index: id.0,
                    action: action.to_string(),
                    reason: "precondition does not hold on the simulated model".into(),
                });
            }
        }
        Ok(model)
    }
}

// ---------------------------------------------------------------------------
// Document form
// ---------------------------------------------------------------------------

/// Serialized shape of a plan: an origin model and its actions, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub origin: Model,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl PlanDocument {
    pub fn into_plan(self) -> Result<ReconfigurationPlan> {
        let mut plan = ReconfigurationPlan::new(self.origin);
        for action in self.actions {
            plan.add(action)?;
        }
        Ok(plan)
    }
}

impl From<&ReconfigurationPlan> for PlanDocument {
    fn from(plan: &ReconfigurationPlan) -> Self {
        Self {
            origin: plan.origin.clone(),
            actions: plan.actions.clone(),
        }
    }
}

impl ReconfigurationPlan {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let doc: PlanDocument = serde_yaml::from_str(yaml)?;
        doc.into_plan()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }
}

impl<'a> IntoIterator for &'a ReconfigurationPlan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
