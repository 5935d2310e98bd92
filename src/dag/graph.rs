// src/dag/graph.rs

use std::collections::HashMap;

use crate::dag::fragment::Fragment;
use crate::dag::node::NodeId;

/// Adjacency entry: immediate deps and dependents of one node.
#[derive(Debug, Clone, Default)]
struct DagNode {
    deps: Vec<NodeId>,
    dependents: Vec<NodeId>,
}

/// Adjacency index over a validated fragment.
///
/// [`Fragment`] only stores incoming edges; the scheduler needs both
/// directions on every completion, so they are precomputed once here.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<NodeId, DagNode>,
}

impl DagGraph {
    pub fn from_fragment(fragment: &Fragment) -> Self {
        let mut nodes: HashMap<NodeId, DagNode> = fragment
            .node_ids()
            .map(|id| {
                (
                    id,
                    DagNode {
                        deps: fragment.dependencies_of(id).collect(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        for (from, to) in fragment.edges() {
            if let Some(node) = nodes.get_mut(&from) {
                node.dependents.push(to);
            }
        }

        Self { nodes }
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn dependencies_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}
