// src/dag/node.rs

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::dag::host::Host;
use crate::exec::Step;

/// Opaque identifier of a node, unique within one planning + execution cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell nodes apart in logs.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// One schedulable unit: a step bound to the hosts it must run against.
///
/// `id` is `None` until the node is added to a [`Fragment`](super::Fragment),
/// which assigns a fresh one.
#[derive(Clone)]
pub struct ExecutionNode {
    pub id: Option<NodeId>,
    pub name: String,
    pub step: Arc<dyn Step>,
    pub hosts: Vec<Host>,
}

impl ExecutionNode {
    pub fn new(name: impl Into<String>, step: Arc<dyn Step>, hosts: Vec<Host>) -> Self {
        let mut hosts = hosts;
        hosts.sort();
        hosts.dedup();
        Self {
            id: None,
            name: name.into(),
            step,
            hosts,
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether dependents may proceed when this node fails.
    pub fn tolerates_failure(&self) -> bool {
        self.step.meta().ignore_error
    }

    pub fn step_name(&self) -> &str {
        &self.step.meta().name
    }
}

impl fmt::Debug for ExecutionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hosts: Vec<&str> = self.hosts.iter().map(|h| h.name.as_str()).collect();
        f.debug_struct("ExecutionNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("step", &self.step.meta().name)
            .field("hosts", &hosts)
            .finish()
    }
}
