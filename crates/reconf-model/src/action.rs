//! Reconfiguration actions.
//!
//! An [`Action`] is one unit of cluster change with a validity window
//! (`start`, `end`, in abstract time units) and a mutation that
//! [`Action::apply`] performs on a [`Model`].

use crate::element::{Element, Node, Vm};
use crate::model::{Model, NodeState, VmState};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// Runtime type tag of an [`Action`]. Actuator builders are registered per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    BootNode,
    ShutdownNode,
    BootVm,
    ShutdownVm,
    MigrateVm,
}

impl ActionKind {
    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::BootNode,
            ActionKind::ShutdownNode,
            ActionKind::BootVm,
            ActionKind::ShutdownVm,
            ActionKind::MigrateVm,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::BootNode => "boot_node",
            ActionKind::ShutdownNode => "shutdown_node",
            ActionKind::BootVm => "boot_vm",
            ActionKind::ShutdownVm => "shutdown_vm",
            ActionKind::MigrateVm => "migrate_vm",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    BootNode {
        node: Node,
        start: u32,
        end: u32,
    },
    ShutdownNode {
        node: Node,
        start: u32,
        end: u32,
    },
    BootVm {
        vm: Vm,
        destination: Node,
        start: u32,
        end: u32,
    },
    ShutdownVm {
        vm: Vm,
        host: Node,
        start: u32,
        end: u32,
    },
    MigrateVm {
        vm: Vm,
        source: Node,
        destination: Node,
        start: u32,
        end: u32,
    },
}

impl Action {
    pub fn boot_node(node: Node, start: u32, end: u32) -> Self {
        Action::BootNode { node, start, end }
    }

    pub fn shutdown_node(node: Node, start: u32, end: u32) -> Self {
        Action::ShutdownNode { node, start, end }
    }

    pub fn boot_vm(vm: Vm, destination: Node, start: u32, end: u32) -> Self {
        Action::BootVm {
            vm,
            destination,
            start,
            end,
        }
    }

    pub fn shutdown_vm(vm: Vm, host: Node, start: u32, end: u32) -> Self {
        Action::ShutdownVm {
            vm,
            host,
            start,
            end,
        }
    }

    pub fn migrate_vm(vm: Vm, source: Node, destination: Node, start: u32, end: u32) -> Self {
        Action::MigrateVm {
            vm,
            source,
            destination,
            start,
            end,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::BootNode { .. } => ActionKind::BootNode,
            Action::ShutdownNode { .. } => ActionKind::ShutdownNode,
            Action::BootVm { .. } => ActionKind::BootVm,
            Action::ShutdownVm { .. } => ActionKind::ShutdownVm,
            Action::MigrateVm { .. } => ActionKind::MigrateVm,
        }
    }

    pub fn start(&self) -> u32 {
        match self {
            Action::BootNode { start, .. }
            | Action::ShutdownNode { start, .. }
            | Action::BootVm { start, .. }
            | Action::ShutdownVm { start, .. }
            | Action::MigrateVm { start, .. } => *start,
        }
    }

    pub fn end(&self) -> u32 {
        match self {
            Action::BootNode { end, .. }
            | Action::ShutdownNode { end, .. }
            | Action::BootVm { end, .. }
            | Action::ShutdownVm { end, .. }
            | Action::MigrateVm { end, .. } => *end,
        }
    }

    /// `end - start`, saturating at zero.
    pub fn duration(&self) -> u32 {
        self.end().saturating_sub(self.start())
    }

    pub fn nodes(&self) -> Vec<Node> {
        match self {
            Action::BootNode { node, .. } | Action::ShutdownNode { node, .. } => vec![*node],
            Action::BootVm { destination, .. } => vec![*destination],
            Action::ShutdownVm { host, .. } => vec![*host],
            Action::MigrateVm {
                source,
                destination,
                ..
            } => vec![*source, *destination],
        }
    }

    pub fn vms(&self) -> Vec<Vm> {
        match self {
            Action::BootNode { .. } | Action::ShutdownNode { .. } => Vec::new(),
            Action::BootVm { vm, .. }
            | Action::ShutdownVm { vm, .. }
            | Action::MigrateVm { vm, .. } => vec![*vm],
        }
    }

    /// Every node and VM this action touches.
    pub fn elements(&self) -> Vec<Element> {
        self.nodes()
            .into_iter()
            .map(Element::from)
            .chain(self.vms().into_iter().map(Element::from))
            .collect()
    }

    /// Apply the action to `model`.
    ///
    /// Returns `false`, leaving `model` untouched, when the model does not
    /// satisfy the action's precondition.
    pub fn apply(&self, model: &mut Model) -> bool {
        match self {
            Action::BootNode { node, .. } => {
                if model.node_state(*node) != Some(NodeState::Offline) {
                    return false;
                }
                model.set_node_state(*node, NodeState::Online);
                true
            }
            Action::ShutdownNode { node, .. } => {
                if !model.is_online(*node) || !model.running_vms(*node).is_empty() {
                    return false;
                }
                model.set_node_state(*node, NodeState::Offline);
                true
            }
            Action::BootVm {
                vm, destination, ..
            } => {
                if model.vm_state(*vm) != Some(VmState::Ready) || !model.is_online(*destination) {
                    return false;
                }
                model.set_vm_state(*vm, VmState::Running { host: *destination });
                true
            }
            Action::ShutdownVm { vm, host, .. } => {
                if model.host_of(*vm) != Some(*host) {
                    return false;
                }
                model.set_vm_state(*vm, VmState::Ready);
                true
            }
            Action::MigrateVm {
                vm,
                source,
                destination,
                ..
            } => {
                if source == destination
                    || model.host_of(*vm) != Some(*source)
                    || !model.is_online(*destination)
                {
                    return false;
                }
                model.set_vm_state(*vm, VmState::Running { host: *destination });
                true
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::BootNode { node, .. } => write!(f, "boot({node})"),
            Action::ShutdownNode { node, .. } => write!(f, "shutdown({node})"),
            Action::BootVm {
                vm, destination, ..
            } => write!(f, "boot({vm}, on={destination})"),
            Action::ShutdownVm { vm, host, .. } => write!(f, "shutdown({vm}, on={host})"),
            Action::MigrateVm {
                vm,
                source,
                destination,
                ..
            } => write!(f, "migrate({vm}, from={source}, to={destination})"),
        }?;
        write!(f, " [{}:{}]", self.start(), self.end())
    }
}
