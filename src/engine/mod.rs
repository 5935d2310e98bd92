// src/engine/mod.rs

//! Execution engine for hostdag.
//!
//! This module ties together:
//! - the run context handed to planners and steps ([`context`])
//! - scoped typed caches ([`cache`])
//! - the per-node host fan-out ([`node_runner`])
//! - the async executor driving the pure [`crate::dag::Scheduler`]
//!   ([`executor`])

use crate::dag::NodeId;
use crate::types::Status;

/// Progress notifications emitted while a graph executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// A node's dependencies were satisfied and it was dispatched.
    NodeStarted { node: NodeId, name: String },
    /// One host of a running node reported a terminal status.
    HostFinished {
        node: NodeId,
        host: String,
        status: Status,
    },
    /// A dispatched node finished on all of its hosts.
    NodeFinished {
        node: NodeId,
        name: String,
        status: Status,
    },
    /// A node was skipped without being dispatched.
    NodeSkipped {
        node: NodeId,
        name: String,
        reason: String,
    },
}

/// Concurrency limits for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Nodes allowed in flight at once.
    pub max_parallel_nodes: usize,
    /// Host executions allowed at once, across all running nodes.
    pub max_parallel_hosts: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 8,
            max_parallel_hosts: 16,
        }
    }
}

pub mod cache;
pub mod context;
pub mod executor;
pub mod node_runner;

pub use cache::{CacheKey, Caches, Flag, Scope, ScopedStore};
pub use context::{ExecutionContext, RunContext, RunContextBuilder};
pub use executor::GraphExecutor;
