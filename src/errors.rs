// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Variants follow the three places a run can go wrong before or while it
//! executes: the plan file, the planners that turn it into fragments, and
//! the composed graph itself. Step failures on a host are *not* errors at
//! this level; they are recorded as `Failed` host results.

use thiserror::Error;

use crate::dag::NodeId;

#[derive(Error, Debug)]
pub enum HostdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Planning failed in task '{task}': {message}")]
    PlanError { task: String, message: String },

    #[error("Unknown host role: {0}")]
    UnknownRole(String),

    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("Node '{0}' has no target hosts")]
    EmptyHosts(String),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Dangling dependency edge {from} -> {to}")]
    DanglingEdge { from: NodeId, to: NodeId },

    #[error("Cycle detected in execution graph: {}", .0.join(" -> "))]
    DagCycle(Vec<String>),

    #[error("Step error: {0}")]
    StepError(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    SerializeError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HostdagError {
    /// Graph-validity errors are planner defects, never runtime conditions.
    pub fn is_graph_defect(&self) -> bool {
        matches!(
            self,
            HostdagError::UnknownNode(_)
                | HostdagError::DuplicateNode(_)
                | HostdagError::DanglingEdge { .. }
                | HostdagError::DagCycle(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HostdagError>;
