use reconf_model::{Action, ActionId};
use std::time::Duration;
use thiserror::Error;

/// Failure reported by an actuator or by the builder that makes one.
#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("{0}")]
    Failed(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("actuator panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ActuationError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// A broken internal contract: the executor or its monitor misbehaved.
///
/// These signal a bug in this software or in a [`reconf_model::PlanMonitor`]
/// implementation, not a problem with the cluster.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error("the monitor has no commit for dispatched action {0}")]
    UnknownCommit(ActionId),

    #[error("action {action} unblocked {unblocked} action(s) although the plan was supposed to be over")]
    OutstandingWork { action: ActionId, unblocked: usize },

    #[error("execution stalled: {remaining} action(s) left but none is running")]
    Stalled { remaining: usize },
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no actuator available for action '{kind}' ({action})", kind = .action.kind())]
    NoActuator { id: ActionId, action: Action },

    #[error("unable to build an actuator for {action}: {source}")]
    Build {
        id: ActionId,
        action: Action,
        #[source]
        source: ActuationError,
    },

    #[error("actuator '{actuator}' failed at executing {action}: {source}")]
    Execution {
        id: ActionId,
        action: Action,
        actuator: String,
        #[source]
        source: ActuationError,
    },

    #[error("actuator '{actuator}' failed at executing {action}: no response before its timeout ({timeout:?})")]
    Timeout {
        id: ActionId,
        action: Action,
        actuator: String,
        timeout: Duration,
    },

    #[error("actuator '{actuator}' failed at executing {action}: the action cannot be applied on the simulated model")]
    Inconsistent {
        id: ActionId,
        action: Action,
        actuator: String,
    },

    #[error("internal error: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("invalid executor configuration: {0}")]
    Config(String),

    #[error("unable to start the executor runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl ExecutorError {
    /// `true` when the error reveals a bug rather than a cluster-side failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    /// The action the failure is attributed to, if any.
    pub fn action_id(&self) -> Option<ActionId> {
        match self {
            Self::NoActuator { id, .. }
            | Self::Build { id, .. }
            | Self::Execution { id, .. }
            | Self::Timeout { id, .. }
            | Self::Inconsistent { id, .. } => Some(*id),
            Self::Invariant(InvariantViolation::UnknownCommit(id)) => Some(*id),
            Self::Invariant(InvariantViolation::OutstandingWork { action, .. }) => Some(*action),
            Self::Invariant(InvariantViolation::Stalled { .. })
            | Self::Config(_)
            | Self::Runtime(_) => None,
        }
    }
}
