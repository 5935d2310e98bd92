use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::node::NodeId;
use crate::dag::scheduler_step::{SchedulerStep, SkipReason};
use crate::dag::state_manager::{readiness, Readiness, StateManager};
use crate::dag::validate::ExecutionPlan;
use crate::types::Status;

/// Pure, synchronous per-run state machine over a validated plan.
///
/// It decides:
/// - which nodes are ready (all dependencies `Success`, or ran, ended
///   negatively and tolerate failure)
/// - which nodes must be skipped because a dependency failed without
///   tolerating it, or was itself skipped before it could run
/// - when the run is finished
///
/// It never performs IO; the executor feeds it completions and dispatches
/// whatever it returns.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    states: HashMap<NodeId, Status>,
    tolerant: HashSet<NodeId>,
    /// Skipped without ever being dispatched.
    unrun: HashSet<NodeId>,
    names: HashMap<NodeId, String>,
    layer_of: HashMap<NodeId, usize>,
    started: bool,
}

impl Scheduler {
    pub fn new(plan: &ExecutionPlan) -> Self {
        let fragment = plan.fragment();
        let graph = DagGraph::from_fragment(fragment);

        let mut states = HashMap::new();
        let mut tolerant = HashSet::new();
        let mut names = HashMap::new();
        let mut layer_of = HashMap::new();

        for (id, node) in fragment.nodes() {
            states.insert(*id, Status::Pending);
            names.insert(*id, node.name.clone());
            layer_of.insert(*id, plan.layer_of(*id).unwrap_or(0));
            if node.tolerates_failure() {
                tolerant.insert(*id);
            }
        }

        Self {
            graph,
            states,
            tolerant,
            unrun: HashSet::new(),
            names,
            layer_of,
            started: false,
        }
    }

    pub fn state_of(&self, id: NodeId) -> Option<Status> {
        self.states.get(&id).copied()
    }

    pub fn deps_satisfied(&self, id: NodeId) -> Option<bool> {
        self.states.get(&id)?;
        Some(readiness(&self.graph, &self.states, &self.tolerant, &self.unrun, id) == Readiness::Ready)
    }

    pub fn is_finished(&self) -> bool {
        self.states.values().all(|s| s.is_terminal())
    }

    /// Nodes in the given state.
    pub fn nodes_in(&self, status: Status) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .states
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| *id)
            .collect();
        self.sort_for_dispatch(&mut ids);
        ids
    }

    /// Begin the run: schedule the entry nodes.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!("scheduler: start called twice; ignoring");
            return SchedulerStep {
                run_finished: self.is_finished(),
                ..SchedulerStep::default()
            };
        }
        self.started = true;
        debug!(nodes = self.states.len(), "scheduler: starting run");
        self.advance(Vec::new())
    }

    /// Record the terminal status of a dispatched node.
    pub fn complete(&mut self, id: NodeId, status: Status) -> SchedulerStep {
        match self.states.get(&id) {
            Some(Status::Running) => {}
            Some(other) => {
                warn!(node = %id, state = %other, "completion for node that is not running; ignoring");
                return SchedulerStep {
                    run_finished: self.is_finished(),
                    ..SchedulerStep::default()
                };
            }
            None => {
                warn!(node = %id, "completion for unknown node; ignoring");
                return SchedulerStep {
                    run_finished: self.is_finished(),
                    ..SchedulerStep::default()
                };
            }
        }

        let status = match status {
            Status::Success | Status::Failed | Status::Skipped => status,
            Status::Pending | Status::Running => {
                warn!(node = %id, status = %status, "non-terminal completion; treating as failed");
                Status::Failed
            }
        };
        self.states.insert(id, status);

        let mut skipped = Vec::new();
        if status.is_negative() {
            let name = self.names.get(&id).map(String::as_str).unwrap_or_default();
            if self.tolerant.contains(&id) && !self.unrun.contains(&id) {
                info!(node = %id, name, status = %status, "node did not succeed but tolerates failure");
            } else {
                warn!(node = %id, name, status = %status, "node did not succeed; skipping dependents");
                let mut manager = StateManager::new(&self.graph, &mut self.states, &self.tolerant, &mut self.unrun);
                skipped = manager.mark_dependents_skipped(id, &self.names);
            }
        }

        self.advance(skipped)
    }

    /// Hand back a node that was scheduled but never dispatched, returning it
    /// to `Pending`. Returns false if the node is not `Running`.
    pub fn release(&mut self, id: NodeId) -> bool {
        if self.states.get(&id) != Some(&Status::Running) {
            warn!(node = %id, "release for node that is not running; ignoring");
            return false;
        }
        debug!(node = %id, "scheduler: node released back to Pending");
        self.states.insert(id, Status::Pending);
        true
    }

    /// Stop scheduling: every node still pending is skipped.
    pub fn cancel(&mut self) -> SchedulerStep {
        let mut manager = StateManager::new(&self.graph, &mut self.states, &self.tolerant, &mut self.unrun);
        let mut cancelled = manager.skip_all_pending();
        self.sort_for_dispatch(&mut cancelled);
        if !cancelled.is_empty() {
            info!(count = cancelled.len(), "scheduler: run cancelled; pending nodes skipped");
        }
        SchedulerStep {
            newly_scheduled: Vec::new(),
            newly_skipped: cancelled
                .into_iter()
                .map(|id| (id, SkipReason::Cancelled))
                .collect(),
            run_finished: self.is_finished(),
        }
    }

    fn advance(&mut self, mut skipped: Vec<(NodeId, SkipReason)>) -> SchedulerStep {
        // Anything still pending behind a negative, non-tolerant dependency is
        // skipped here as well, so a blocked node can never wait forever.
        loop {
            let blocked: Vec<(NodeId, NodeId)> = self
                .states
                .iter()
                .filter(|(_, s)| **s == Status::Pending)
                .filter_map(|(id, _)| match readiness(&self.graph, &self.states, &self.tolerant, &self.unrun, *id) {
                    Readiness::Blocked(dep) => Some((*id, dep)),
                    _ => None,
                })
                .collect();
            if blocked.is_empty() {
                break;
            }
            for (id, dep) in blocked {
                self.states.insert(id, Status::Skipped);
                self.unrun.insert(id);
                let name = self.names.get(&dep).cloned().unwrap_or_default();
                skipped.push((id, SkipReason::DependencyFailed { dependency: dep, name }));
            }
        }

        let mut manager = StateManager::new(&self.graph, &mut self.states, &self.tolerant, &mut self.unrun);
        let mut ready = manager.collect_new_ready_nodes();
        let run_finished = manager.all_nodes_terminal();
        self.sort_for_dispatch(&mut ready);

        for id in &ready {
            debug!(
                node = %id,
                name = self.names.get(id).map(String::as_str).unwrap_or_default(),
                layer = self.layer_of.get(id).copied().unwrap_or_default(),
                "dependencies satisfied; marking Running"
            );
        }
        if run_finished {
            info!("scheduler: all nodes terminal; run finished");
        }

        SchedulerStep {
            newly_scheduled: ready,
            newly_skipped: skipped,
            run_finished,
        }
    }

    /// Dispatch order: topological layer first, then name, then id.
    fn sort_for_dispatch(&self, ids: &mut [NodeId]) {
        ids.sort_by(|a, b| {
            let la = self.layer_of.get(a).copied().unwrap_or_default();
            let lb = self.layer_of.get(b).copied().unwrap_or_default();
            la.cmp(&lb)
                .then_with(|| self.names.get(a).cmp(&self.names.get(b)))
                .then_with(|| a.cmp(b))
        });
    }
}
