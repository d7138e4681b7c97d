use thiserror::Error;

use crate::element::{Node, Vm};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown node: {0}")]
    UnknownNode(Node),

    #[error("unknown vm: {0}")]
    UnknownVm(Vm),

    #[error("node declared twice: {0}")]
    DuplicateNode(Node),

    #[error("vm declared twice: {0}")]
    DuplicateVm(Vm),

    #[error("{0} is running but has no host")]
    MissingHost(Vm),

    #[error("{vm} cannot run on {node}: {reason}")]
    InvalidPlacement { vm: Vm, node: Node, reason: String },

    #[error("invalid time window [{start}, {end}]: end precedes start")]
    InvalidWindow { start: u32, end: u32 },

    #[error("action #{index} ({action}) cannot be applied: {reason}")]
    NotApplicable {
        index: usize,
        action: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
