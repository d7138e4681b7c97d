use reconf_model::{Action, ActionKind, Model};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ActuationError;

// ─── Actuator ─────────────────────────────────────────────────────────────

/// Performs the real-world side effect of one [`Action`].
///
/// An actuator is built fresh for every dispatch and is owned by the
/// execution unit that runs it.
pub trait Actuator: Send + 'static {
    /// Execute the action. This call **must** block until the action is done.
    fn execute(&mut self) -> Result<(), ActuationError>;

    fn action(&self) -> &Action;

    /// How long the executor waits for [`Actuator::execute`] before declaring
    /// the action failed. Zero is legal.
    fn timeout(&self) -> Duration;

    /// Human-readable name used in logs and errors.
    fn label(&self) -> String {
        format!("{}", self.action())
    }
}

// ─── ActuatorBuilder ──────────────────────────────────────────────────────

/// Makes actuators for one [`ActionKind`].
pub trait ActuatorBuilder: Send + Sync {
    fn associated_kind(&self) -> ActionKind;

    /// Build an actuator for `action` given the current simulated `model`.
    ///
    /// Fails when the model is inconsistent with what the action needs.
    fn build(&self, model: &Model, action: &Action) -> Result<Box<dyn Actuator>, ActuationError>;
}

// ─── ActuatorFactory ──────────────────────────────────────────────────────

/// Registry of [`ActuatorBuilder`]s keyed by the kind of action they handle.
#[derive(Default, Clone)]
pub struct ActuatorFactory {
    builders: HashMap<ActionKind, Arc<dyn ActuatorBuilder>>,
}

impl ActuatorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `builder` for its associated kind, replacing and returning any
    /// builder previously registered for that kind.
    pub fn register<B>(&mut self, builder: B) -> Option<Arc<dyn ActuatorBuilder>>
    where
        B: ActuatorBuilder + 'static,
    {
        self.builders
            .insert(builder.associated_kind(), Arc::new(builder))
    }

    /// Returns `true` if a builder was registered for `kind` and is now removed.
    pub fn unregister(&mut self, kind: ActionKind) -> bool {
        self.builders.remove(&kind).is_some()
    }

    pub fn is_registered(&self, kind: ActionKind) -> bool {
        self.builders.contains_key(&kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<ActionKind> = self.builders.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Build the actuator for `action`.
    ///
    /// `Ok(None)` when no builder handles the action's kind; builder errors are
    /// returned unchanged.
    pub fn get_actuator(
        &self,
        model: &Model,
        action: &Action,
    ) -> Result<Option<Box<dyn Actuator>>, ActuationError> {
        match self.builders.get(&action.kind()) {
            None => Ok(None),
            Some(builder) => builder.build(model, action).map(Some),
        }
    }
}

impl std::fmt::Debug for ActuatorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorFactory")
            .field("kinds", &self.kinds())
            .finish()
    }
}
