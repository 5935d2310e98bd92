// src/dag/state_manager.rs

//! Per-run node state transitions used by the scheduler.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::dag::graph::DagGraph;
use crate::dag::node::NodeId;
use crate::dag::scheduler_step::SkipReason;
use crate::types::Status;

/// Dependency disposition of a pending node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Every dependency is satisfied.
    Ready,
    /// Some dependency has not finished yet.
    Waiting,
    /// A dependency ended negatively and does not let its dependents through.
    Blocked(NodeId),
}

/// Mutable view over node states for one run.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    states: &'a mut HashMap<NodeId, Status>,
    tolerant: &'a HashSet<NodeId>,
    unrun: &'a mut HashSet<NodeId>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        states: &'a mut HashMap<NodeId, Status>,
        tolerant: &'a HashSet<NodeId>,
        unrun: &'a mut HashSet<NodeId>,
    ) -> Self {
        Self {
            graph,
            states,
            tolerant,
            unrun,
        }
    }

    pub fn readiness(&self, id: NodeId) -> Readiness {
        readiness(self.graph, self.states, self.tolerant, self.unrun, id)
    }

    /// Skip every pending dependent that is blocked by `root`, then keep
    /// going from each newly skipped node.
    ///
    /// A tolerant node only stops the walk if it actually ran; skipped nodes
    /// never ran, so tolerant or not they pass the skip on.
    ///
    /// Returns the newly skipped nodes (excluding `root`).
    pub fn mark_dependents_skipped(&mut self, root: NodeId, names: &HashMap<NodeId, String>) -> Vec<(NodeId, SkipReason)> {
        let mut skipped = Vec::new();
        let mut stack = vec![root];

        while let Some(current) = stack.pop() {
            if self.tolerant.contains(&current) && !self.unrun.contains(&current) {
                continue;
            }
            for dependent in self.graph.dependents_of(current).iter().copied() {
                if self.states.get(&dependent) != Some(&Status::Pending) {
                    continue;
                }
                let name = names.get(&current).cloned().unwrap_or_default();
                debug!(node = %dependent, blocked_by = %name, "marking dependent Skipped");
                self.states.insert(dependent, Status::Skipped);
                self.unrun.insert(dependent);
                skipped.push((
                    dependent,
                    SkipReason::DependencyFailed {
                        dependency: current,
                        name,
                    },
                ));
                stack.push(dependent);
            }
        }

        skipped
    }

    /// Collect pending nodes whose dependencies are satisfied and mark them
    /// `Running`.
    pub fn collect_new_ready_nodes(&mut self) -> Vec<NodeId> {
        let candidates: Vec<NodeId> = self
            .states
            .iter()
            .filter(|(id, status)| **status == Status::Pending && self.readiness(**id) == Readiness::Ready)
            .map(|(id, _)| *id)
            .collect();

        for id in &candidates {
            self.states.insert(*id, Status::Running);
        }
        candidates
    }

    /// Skip every node still `Pending`.
    pub fn skip_all_pending(&mut self) -> Vec<NodeId> {
        let pending: Vec<NodeId> = self
            .states
            .iter()
            .filter(|(_, s)| **s == Status::Pending)
            .map(|(id, _)| *id)
            .collect();
        for id in &pending {
            self.states.insert(*id, Status::Skipped);
            self.unrun.insert(*id);
        }
        pending
    }

    pub fn all_nodes_terminal(&self) -> bool {
        self.states.values().all(|s| s.is_terminal())
    }
}

/// Canonical dependency check, shared by the mutable and read-only paths.
///
/// `unrun` holds nodes skipped without being dispatched; failure tolerance
/// never applies to them.
pub fn readiness(
    graph: &DagGraph,
    states: &HashMap<NodeId, Status>,
    tolerant: &HashSet<NodeId>,
    unrun: &HashSet<NodeId>,
    id: NodeId,
) -> Readiness {
    let mut waiting = false;
    for dep in graph.dependencies_of(id) {
        match states.get(dep) {
            Some(Status::Success) => {}
            Some(Status::Failed) | Some(Status::Skipped) => {
                if !tolerant.contains(dep) || unrun.contains(dep) {
                    return Readiness::Blocked(*dep);
                }
            }
            Some(Status::Pending) | Some(Status::Running) => waiting = true,
            None => {
                warn!(node = %id, dep = %dep, "dependency missing from state map");
                waiting = true;
            }
        }
    }
    if waiting { Readiness::Waiting } else { Readiness::Ready }
}
