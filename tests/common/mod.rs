#![allow(dead_code)]

use std::collections::BTreeMap;

use hostdag::dag::{Fragment, NodeId};
use hostdag::result::GraphExecutionResult;
use hostdag::types::Status;

pub use hostdag_test_utils::builders::*;
pub use hostdag_test_utils::fake_step::{Outcome, ScriptedStep, Timeline};
pub use hostdag_test_utils::{init_tracing, with_timeout};

/// Node id for a node name, panicking when absent.
pub fn id_of(fragment: &Fragment, name: &str) -> NodeId {
    fragment
        .find_by_name(name)
        .unwrap_or_else(|| panic!("no node named '{name}'"))
}

/// Final status of every node, keyed by node name.
pub fn statuses(result: &GraphExecutionResult) -> BTreeMap<String, Status> {
    result
        .node_results
        .values()
        .map(|n| (n.node_name.clone(), n.status))
        .collect()
}

pub fn status_of(result: &GraphExecutionResult, name: &str) -> Status {
    result
        .node_by_name(name)
        .unwrap_or_else(|| panic!("no result for node '{name}'"))
        .status
}
