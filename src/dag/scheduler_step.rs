// src/dag/scheduler_step.rs

//! Result type for a single scheduler step.

use crate::dag::node::NodeId;

/// Why a node was skipped without being dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A dependency failed without tolerating it, or was itself skipped.
    DependencyFailed { dependency: NodeId, name: String },
    /// The run was cancelled before the node was dispatched.
    Cancelled,
}

impl SkipReason {
    pub fn message(&self) -> String {
        match self {
            SkipReason::DependencyFailed { name, .. } => {
                format!("skipped: dependency '{name}' did not succeed")
            }
            SkipReason::Cancelled => "skipped: run cancelled before dispatch".to_string(),
        }
    }
}

/// What changed as the result of one scheduler step.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Nodes whose dependencies are now satisfied; they are `Running`.
    pub newly_scheduled: Vec<NodeId>,
    /// Nodes marked `Skipped` in this step, with the reason.
    pub newly_skipped: Vec<(NodeId, SkipReason)>,
    /// Whether every node is now terminal.
    pub run_finished: bool,
}
