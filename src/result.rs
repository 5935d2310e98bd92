// src/result.rs

//! Result records produced by a run, and the rules that roll them up.
//!
//! Host outcomes aggregate into a node status with
//! [`aggregate_host_statuses`]; node statuses aggregate into a graph status
//! with [`aggregate_node_statuses`]. Both are pure functions of their
//! inputs, so re-running them as results stream in never double-counts.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::NodeId;
use crate::errors::{HostdagError, Result};
use crate::types::Status;

/// Node status from its host statuses.
///
/// - no hosts reported yet: `Pending`
/// - any host not yet terminal: `Running`
/// - any host `Failed`: `Failed`
/// - at least one host `Success` (others may be precheck-`Skipped`): `Success`
/// - every host `Skipped`: `Skipped`
pub fn aggregate_host_statuses(statuses: impl IntoIterator<Item = Status>) -> Status {
    let mut any = false;
    let mut running = false;
    let mut failed = false;
    let mut succeeded = false;

    for status in statuses {
        any = true;
        match status {
            Status::Pending | Status::Running => running = true,
            Status::Failed => failed = true,
            Status::Success => succeeded = true,
            Status::Skipped => {}
        }
    }

    if !any {
        Status::Pending
    } else if running {
        Status::Running
    } else if failed {
        Status::Failed
    } else if succeeded {
        Status::Success
    } else {
        Status::Skipped
    }
}

/// Graph status from its node statuses: `Failed` dominates, then anything
/// unfinished (`Running`), then `Skipped`, then `Success`. An empty graph is
/// a `Success`.
pub fn aggregate_node_statuses(statuses: impl IntoIterator<Item = Status>) -> Status {
    let mut running = false;
    let mut failed = false;
    let mut skipped = false;

    for status in statuses {
        match status {
            Status::Failed => failed = true,
            Status::Pending | Status::Running => running = true,
            Status::Skipped => skipped = true,
            Status::Success => {}
        }
    }

    if failed {
        Status::Failed
    } else if running {
        Status::Running
    } else if skipped {
        Status::Skipped
    } else {
        Status::Success
    }
}

/// Outcome of one node on one host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostResult {
    pub host_name: String,
    pub status: Status,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl HostResult {
    pub fn pending(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            status: Status::Pending,
            message: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn skipped(host_name: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            status: Status::Skipped,
            message: message.into(),
            start_time: Some(now),
            end_time: Some(now),
            ..Self::pending(host_name)
        }
    }
}

/// Outcome of one node across all of its hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeResult {
    pub node_name: String,
    pub step_name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub message: String,
    pub host_results: BTreeMap<String, HostResult>,
}

impl NodeResult {
    /// A node that has not been dispatched, with a pending entry per host.
    pub fn pending<'a>(
        node_name: impl Into<String>,
        step_name: impl Into<String>,
        hosts: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            step_name: step_name.into(),
            status: Status::Pending,
            start_time: None,
            end_time: None,
            message: String::new(),
            host_results: hosts
                .into_iter()
                .map(|h| (h.to_string(), HostResult::pending(h)))
                .collect(),
        }
    }

    /// Mark the node and all of its hosts skipped without running anything.
    pub fn mark_skipped(&mut self, message: impl Into<String>) {
        let message = message.into();
        for (name, host) in self.host_results.iter_mut() {
            *host = HostResult::skipped(name.clone(), message.clone());
        }
        let now = Utc::now();
        self.status = Status::Skipped;
        self.start_time.get_or_insert(now);
        self.end_time = Some(now);
        self.message = message;
    }

    /// Re-derive `status` from the host results. Idempotent.
    pub fn refresh_status(&mut self) -> Status {
        self.status = aggregate_host_statuses(self.host_results.values().map(|h| h.status));
        self.status
    }

    pub fn failed_hosts(&self) -> impl Iterator<Item = &HostResult> {
        self.host_results
            .values()
            .filter(|h| h.status == Status::Failed)
    }
}

/// Outcome of one graph execution.
///
/// Created when the run starts, updated in place as nodes finish, and
/// finalized exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphExecutionResult {
    pub graph_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: Status,
    pub node_results: BTreeMap<NodeId, NodeResult>,
}

impl GraphExecutionResult {
    pub fn new(graph_name: impl Into<String>) -> Self {
        Self {
            graph_name: graph_name.into(),
            start_time: Utc::now(),
            end_time: None,
            status: Status::Running,
            node_results: BTreeMap::new(),
        }
    }

    /// Re-derive the graph status from node results. Idempotent.
    pub fn refresh_status(&mut self) -> Status {
        if self.end_time.is_none() {
            self.status = aggregate_node_statuses(self.node_results.values().map(|n| n.status));
        }
        self.status
    }

    /// Set the final status and end time. Only the first call has effect;
    /// returns whether this call finalized the result.
    pub fn finalize(&mut self) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.status = aggregate_node_statuses(self.node_results.values().map(|n| n.status));
        self.end_time = Some(Utc::now());
        true
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeResult> {
        self.node_results.get(&id)
    }

    /// First node result carrying the given name.
    pub fn node_by_name(&self, name: &str) -> Option<&NodeResult> {
        self.node_results.values().find(|n| n.node_name == name)
    }

    pub fn nodes_with_status(&self, status: Status) -> Vec<&NodeResult> {
        self.node_results
            .values()
            .filter(|n| n.status == status)
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| HostdagError::SerializeError(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HostdagError::SerializeError(e.to_string()))
    }

    /// Human-readable report: every node, and the output of failed hosts.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "graph {}: {}", self.graph_name, self.status);

        let mut nodes: Vec<&NodeResult> = self.node_results.values().collect();
        nodes.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.node_name.cmp(&b.node_name)));

        for node in nodes {
            let _ = writeln!(out, "  [{}] {} ({})", node.status, node.node_name, node.step_name);
            if node.status == Status::Skipped && !node.message.is_empty() {
                let _ = writeln!(out, "      {}", node.message);
            }
            for host in node.failed_hosts() {
                let _ = writeln!(out, "      host {} failed: {}", host.host_name, host.message);
                for line in host.stdout.lines() {
                    let _ = writeln!(out, "        stdout | {line}");
                }
                for line in host.stderr.lines() {
                    let _ = writeln!(out, "        stderr | {line}");
                }
            }
        }
        out
    }
}

/// Outcome of a pipeline: one graph result per module that ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub name: String,
    pub status: Status,
    pub modules: Vec<GraphExecutionResult>,
}

impl PipelineResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Running,
            modules: Vec::new(),
        }
    }

    pub fn refresh_status(&mut self) -> Status {
        self.status = aggregate_node_statuses(self.modules.iter().map(|m| m.status));
        self.status
    }

    pub fn module(&self, name: &str) -> Option<&GraphExecutionResult> {
        self.modules.iter().find(|m| m.graph_name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| HostdagError::SerializeError(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HostdagError::SerializeError(e.to_string()))
    }

    pub fn render_text(&self) -> String {
        let mut out = format!("pipeline {}: {}\n", self.name, self.status);
        for module in &self.modules {
            out.push_str(&module.render_text());
        }
        out
    }
}
