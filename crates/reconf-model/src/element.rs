use serde::{Deserialize, Serialize};
use std::fmt;

/// A physical node of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Node(pub u32);

/// A virtual machine hosted (or to be hosted) on a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vm(pub u32);

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vm#{}", self.0)
    }
}

/// Any element an action may involve. Used to derive dependencies between
/// actions that touch the same part of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Element {
    Node(Node),
    Vm(Vm),
}

impl From<Node> for Element {
    fn from(n: Node) -> Self {
        Element::Node(n)
    }
}

impl From<Vm> for Element {
    fn from(v: Vm) -> Self {
        Element::Vm(v)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Node(n) => n.fmt(f),
            Element::Vm(v) => v.fmt(f),
        }
    }
}
