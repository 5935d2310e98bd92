// src/dag/fragment.rs

//! Composable sub-graphs produced by task planners.
//!
//! A [`Fragment`] owns its nodes and the dependency relation between them.
//! Entry and exit sets are always *derived*: they are recomputed by
//! [`Fragment::calculate_entry_and_exit_nodes`] and never edited by hand.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::dag::node::{ExecutionNode, NodeId};
use crate::errors::{HostdagError, Result};

/// One side of a dependency edge: a single node or a join over several.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet(Vec<NodeId>);

impl NodeSet {
    pub fn ids(&self) -> &[NodeId] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<NodeId> for NodeSet {
    fn from(id: NodeId) -> Self {
        NodeSet(vec![id])
    }
}

impl From<Vec<NodeId>> for NodeSet {
    fn from(ids: Vec<NodeId>) -> Self {
        NodeSet(ids)
    }
}

impl From<&Vec<NodeId>> for NodeSet {
    fn from(ids: &Vec<NodeId>) -> Self {
        NodeSet(ids.clone())
    }
}

impl From<&[NodeId]> for NodeSet {
    fn from(ids: &[NodeId]) -> Self {
        NodeSet(ids.to_vec())
    }
}

impl<const N: usize> From<[NodeId; N]> for NodeSet {
    fn from(ids: [NodeId; N]) -> Self {
        NodeSet(ids.to_vec())
    }
}

/// A directed acyclic graph of [`ExecutionNode`]s.
///
/// `dependencies[to]` holds every node `to` waits for.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    pub name: String,
    nodes: BTreeMap<NodeId, ExecutionNode>,
    dependencies: BTreeMap<NodeId, BTreeSet<NodeId>>,
    entry_nodes: Vec<NodeId>,
    exit_nodes: Vec<NodeId>,
}

impl Fragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Assemble a fragment from externally built parts without checking
    /// edges. Use [`crate::dag::ExecutionPlan::new`] to validate the result.
    pub fn from_raw_parts(
        name: impl Into<String>,
        nodes: BTreeMap<NodeId, ExecutionNode>,
        dependencies: BTreeMap<NodeId, BTreeSet<NodeId>>,
    ) -> Self {
        let mut fragment = Self {
            name: name.into(),
            nodes,
            dependencies,
            entry_nodes: Vec::new(),
            exit_nodes: Vec::new(),
        };
        fragment.calculate_entry_and_exit_nodes();
        fragment
    }

    /// Add a node, assigning it a fresh id if it has none.
    pub fn add_node(&mut self, mut node: ExecutionNode) -> Result<NodeId> {
        if node.hosts.is_empty() {
            return Err(HostdagError::EmptyHosts(node.name));
        }

        let id = *node.id.get_or_insert_with(NodeId::new);
        if self.nodes.contains_key(&id) {
            return Err(HostdagError::DuplicateNode(id));
        }

        debug!(fragment = %self.name, node = %node.name, id = %id, "adding node");
        self.nodes.insert(id, node);
        self.dependencies.entry(id).or_default();
        Ok(id)
    }

    /// Make every node in `to` depend on the completion of every node in
    /// `from`.
    ///
    /// Nothing is recorded unless all referenced ids are known.
    pub fn add_dependency(&mut self, from: impl Into<NodeSet>, to: impl Into<NodeSet>) -> Result<()> {
        let from = from.into();
        let to = to.into();

        for id in from.ids().iter().chain(to.ids()) {
            if !self.nodes.contains_key(id) {
                return Err(HostdagError::UnknownNode(*id));
            }
        }

        for target in to.ids() {
            if from.ids().contains(target) {
                let name = self.node_name(*target).to_string();
                return Err(HostdagError::DagCycle(vec![name.clone(), name]));
            }
        }

        for target in to.ids() {
            let deps = self.dependencies.entry(*target).or_default();
            deps.extend(from.ids().iter().copied());
        }
        Ok(())
    }

    /// Recompute entry nodes (no incoming edges) and exit nodes (no outgoing
    /// edges) from the dependency map.
    pub fn calculate_entry_and_exit_nodes(&mut self) {
        let mut has_dependents: BTreeSet<NodeId> = BTreeSet::new();
        for deps in self.dependencies.values() {
            has_dependents.extend(deps.iter().copied());
        }

        self.entry_nodes = self
            .nodes
            .keys()
            .filter(|id| self.dependencies.get(id).is_none_or(|d| d.is_empty()))
            .copied()
            .collect();

        self.exit_nodes = self
            .nodes
            .keys()
            .filter(|id| !has_dependents.contains(id))
            .copied()
            .collect();
    }

    pub fn entry_nodes(&self) -> &[NodeId] {
        &self.entry_nodes
    }

    pub fn exit_nodes(&self) -> &[NodeId] {
        &self.exit_nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&ExecutionNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &ExecutionNode)> {
        self.nodes.iter()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes `id` waits for.
    pub fn dependencies_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.dependencies
            .get(&id)
            .into_iter()
            .flat_map(|deps| deps.iter().copied())
    }

    /// Nodes waiting for `id`.
    pub fn dependents_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.dependencies
            .iter()
            .filter(move |(_, deps)| deps.contains(&id))
            .map(|(node, _)| *node)
    }

    /// The full dependency map, keyed by dependent node.
    pub fn dependencies(&self) -> &BTreeMap<NodeId, BTreeSet<NodeId>> {
        &self.dependencies
    }

    /// Every `(from, to)` edge.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.dependencies
            .iter()
            .flat_map(|(to, deps)| deps.iter().map(move |from| (*from, *to)))
    }

    /// First node carrying the given name, if any.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(id, _)| *id)
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        self.nodes.get(&id).map(|n| n.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Move all nodes and edges out of `other` into `self` without touching
    /// entry/exit sets. Callers must have checked for collisions.
    pub(crate) fn absorb(&mut self, other: Fragment) {
        self.nodes.extend(other.nodes);
        for (id, deps) in other.dependencies {
            self.dependencies.entry(id).or_default().extend(deps);
        }
    }
}
