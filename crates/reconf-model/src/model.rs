use crate::element::{Node, Vm};
use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Element states
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Online,
    Offline,
}

impl NodeState {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::Online => "online",
            NodeState::Offline => "offline",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmState {
    /// Known to the cluster but not placed anywhere.
    Ready,
    Running { host: Node },
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmState::Ready => f.write_str("ready"),
            VmState::Running { host } => write!(f, "running on {host}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// In-memory snapshot of the cluster: node power states and VM placement.
///
/// The executor keeps one clone of the plan origin and mutates it through
/// [`crate::Action::apply`] as actions commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ModelDocument", into = "ModelDocument")]
pub struct Model {
    nodes: BTreeMap<Node, NodeState>,
    vms: BTreeMap<Vm, VmState>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_online_node(&mut self, node: Node) {
        self.nodes.insert(node, NodeState::Online);
    }

    pub fn add_offline_node(&mut self, node: Node) {
        self.nodes.insert(node, NodeState::Offline);
    }

    pub fn add_ready_vm(&mut self, vm: Vm) {
        self.vms.insert(vm, VmState::Ready);
    }

    /// Place `vm` on `host`. The host must be known and online.
    pub fn add_running_vm(&mut self, vm: Vm, host: Node) -> Result<()> {
        match self.nodes.get(&host) {
            None => Err(ModelError::UnknownNode(host)),
            Some(NodeState::Offline) => Err(ModelError::InvalidPlacement {
                vm,
                node: host,
                reason: "node is offline".into(),
            }),
            Some(NodeState::Online) => {
                self.vms.insert(vm, VmState::Running { host });
                Ok(())
            }
        }
    }

    pub fn contains_node(&self, node: Node) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn contains_vm(&self, vm: Vm) -> bool {
        self.vms.contains_key(&vm)
    }

    pub fn node_state(&self, node: Node) -> Option<NodeState> {
        self.nodes.get(&node).copied()
    }

    pub fn vm_state(&self, vm: Vm) -> Option<VmState> {
        self.vms.get(&vm).copied()
    }

    pub fn is_online(&self, node: Node) -> bool {
        self.node_state(node) == Some(NodeState::Online)
    }

    pub fn host_of(&self, vm: Vm) -> Option<Node> {
        match self.vm_state(vm)? {
            VmState::Running { host } => Some(host),
            VmState::Ready => None,
        }
    }

    pub fn running_vms(&self, node: Node) -> Vec<Vm> {
        self.vms
            .iter()
            .filter(|(_, s)| matches!(s, VmState::Running { host } if *host == node))
            .map(|(v, _)| *v)
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (Node, NodeState)> + '_ {
        self.nodes.iter().map(|(n, s)| (*n, *s))
    }

    pub fn vms(&self) -> impl Iterator<Item = (Vm, VmState)> + '_ {
        self.vms.iter().map(|(v, s)| (*v, *s))
    }

    pub(crate) fn set_node_state(&mut self, node: Node, state: NodeState) {
        self.nodes.insert(node, state);
    }

    pub(crate) fn set_vm_state(&mut self, vm: Vm, state: VmState) {
        self.vms.insert(vm, state);
    }
}

// ---------------------------------------------------------------------------
// Document form
// ---------------------------------------------------------------------------

/// Serialized shape of a [`Model`], as found under `origin:` in plan files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDocument {
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    #[serde(default)]
    pub vms: Vec<VmEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub id: Node,
    pub state: NodeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmStatus {
    Ready,
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmEntry {
    pub id: Vm,
    pub state: VmStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<Node>,
}

impl TryFrom<ModelDocument> for Model {
    type Error = ModelError;

    fn try_from(doc: ModelDocument) -> Result<Self> {
        let mut model = Model::new();
        for entry in doc.nodes {
            if model.contains_node(entry.id) {
                return Err(ModelError::DuplicateNode(entry.id));
            }
            model.set_node_state(entry.id, entry.state);
        }
        for entry in doc.vms {
            if model.contains_vm(entry.id) {
                return Err(ModelError::DuplicateVm(entry.id));
            }
            match (entry.state, entry.host) {
                (VmStatus::Ready, None) => model.add_ready_vm(entry.id),
                (VmStatus::Running, Some(host)) => model.add_running_vm(entry.id, host)?,
                (VmStatus::Ready, Some(host)) => {
                    return Err(ModelError::InvalidPlacement {
                        vm: entry.id,
                        node: host,
                        reason: "a ready vm has no host".into(),
                    })
                }
                (VmStatus::Running, None) => return Err(ModelError::MissingHost(entry.id)),
            }
        }
        Ok(model)
    }
}

impl From<Model> for ModelDocument {
    fn from(model: Model) -> Self {
        let nodes = model
            .nodes
            .into_iter()
            .map(|(id, state)| NodeEntry { id, state })
            .collect();
        let vms = model
            .vms
            .into_iter()
            .map(|(id, state)| match state {
                VmState::Ready => VmEntry {
                    id,
                    state: VmStatus::Ready,
                    host: None,
                },
                VmState::Running { host } => VmEntry {
                    id,
                    state: VmStatus::Running,
                    host: Some(host),
                },
            })
            .collect();
        ModelDocument { nodes, vms }
    }
}
