pub mod check;
pub mod run;

use reconf_model::{Model, VmState};

/// One row per node (state and hosted VMs), then one per ready VM.
pub(crate) fn model_rows(model: &Model) -> Vec<Vec<String>> {
    let nodes = model.nodes().map(|(node, state)| {
        let vms: Vec<String> = model.running_vms(node).iter().map(|v| v.to_string()).collect();
        vec![node.to_string(), state.to_string(), vms.join(", ")]
    });
    let ready = model.vms().filter_map(|(vm, state)| match state {
        VmState::Ready => Some(vec![vm.to_string(), "ready".to_string(), String::new()]),
        VmState::Running { .. } => None,
    });
    nodes.chain(ready).collect()
}
