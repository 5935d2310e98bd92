// src/dag/mod.rs

//! Execution-graph model, composition and scheduling.
//!
//! - [`node`] and [`host`]: the atomic schedulable unit and its targets.
//! - [`fragment`]: composable sub-graphs with derived entry/exit sets.
//! - [`compose`]: merge, sequencing, per-host chaining and barriers.
//! - [`validate`]: structural checks and topological layering.
//! - [`graph`]: adjacency index used while scheduling.
//! - [`scheduler`] / [`state_manager`]: the per-run state machine that
//!   decides which nodes are ready and which are skipped.

pub mod compose;
pub mod fragment;
pub mod graph;
pub mod host;
pub mod node;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod validate;

pub use compose::{chain_per_host, merge_all};
pub use fragment::{Fragment, NodeSet};
pub use graph::DagGraph;
pub use host::{Host, CONTROL_ROLE};
pub use node::{ExecutionNode, NodeId};
pub use scheduler::Scheduler;
pub use scheduler_step::{SchedulerStep, SkipReason};
pub use validate::{validate, ExecutionPlan};
