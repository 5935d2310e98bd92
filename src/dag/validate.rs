// src/dag/validate.rs

//! Structural validation and topological layering of a composed graph.
//!
//! Nothing is executed unless [`ExecutionPlan::new`] succeeds. It checks:
//! - every edge references known nodes
//! - every node has at least one host
//! - the dependency relation is acyclic (reporting the cycle by name)
//!
//! and then groups nodes into layers by their longest distance from the
//! entry set, so that every dependency of a node sits in an earlier layer.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::fragment::Fragment;
use crate::dag::node::NodeId;
use crate::errors::{HostdagError, Result};

/// A validated fragment plus its topological layers.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    fragment: Fragment,
    layers: Vec<Vec<NodeId>>,
    layer_of: HashMap<NodeId, usize>,
}

impl ExecutionPlan {
    pub fn new(mut fragment: Fragment) -> Result<Self> {
        fragment.calculate_entry_and_exit_nodes();
        let layers = validate(&fragment)?;

        let mut layer_of = HashMap::new();
        for (idx, layer) in layers.iter().enumerate() {
            for id in layer {
                layer_of.insert(*id, idx);
            }
        }

        debug!(
            graph = %fragment.name,
            nodes = fragment.len(),
            layers = layers.len(),
            "execution plan validated"
        );

        Ok(Self {
            fragment,
            layers,
            layer_of,
        })
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn name(&self) -> &str {
        &self.fragment.name
    }

    pub fn layers(&self) -> &[Vec<NodeId>] {
        &self.layers
    }

    pub fn layer_of(&self, id: NodeId) -> Option<usize> {
        self.layer_of.get(&id).copied()
    }
}

/// Validate `fragment` and return its topological layers.
pub fn validate(fragment: &Fragment) -> Result<Vec<Vec<NodeId>>> {
    check_edges(fragment)?;
    check_hosts(fragment)?;

    let mut graph: DiGraphMap<NodeId, ()> = DiGraphMap::new();
    for id in fragment.node_ids() {
        graph.add_node(id);
    }
    for (from, to) in fragment.edges() {
        graph.add_edge(from, to, ());
    }

    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(cycle) => {
            let names = find_cycle(fragment, cycle.node_id())
                .into_iter()
                .map(|id| fragment.node_name(id).to_string())
                .collect();
            return Err(HostdagError::DagCycle(names));
        }
    };

    let mut depth: HashMap<NodeId, usize> = HashMap::new();
    for id in &order {
        let d = fragment
            .dependencies_of(*id)
            .filter_map(|dep| depth.get(&dep).map(|d| d + 1))
            .max()
            .unwrap_or(0);
        depth.insert(*id, d);
    }

    let mut layers: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for id in order {
        layers.entry(depth[&id]).or_default().push(id);
    }
    Ok(layers
        .into_values()
        .map(|mut layer| {
            layer.sort_by(|a, b| fragment.node_name(*a).cmp(fragment.node_name(*b)).then(a.cmp(b)));
            layer
        })
        .collect())
}

fn check_edges(fragment: &Fragment) -> Result<()> {
    for (to, deps) in fragment.dependencies() {
        for from in deps {
            if !fragment.contains(*from) || !fragment.contains(*to) {
                return Err(HostdagError::DanglingEdge {
                    from: *from,
                    to: *to,
                });
            }
        }
    }
    Ok(())
}

fn check_hosts(fragment: &Fragment) -> Result<()> {
    for (_, node) in fragment.nodes() {
        if node.hosts.is_empty() {
            return Err(HostdagError::EmptyHosts(node.name.clone()));
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Depth-first colouring walk returning the ids along one cycle, with the
/// first id repeated at the end.
fn find_cycle(fragment: &Fragment, hint: NodeId) -> Vec<NodeId> {
    let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for (from, to) in fragment.edges() {
        dependents.entry(from).or_default().push(to);
    }

    let mut colour: HashMap<NodeId, Colour> =
        fragment.node_ids().map(|id| (id, Colour::White)).collect();

    let starts = std::iter::once(hint).chain(fragment.node_ids());
    for start in starts {
        if colour.get(&start) != Some(&Colour::White) {
            continue;
        }
        let mut path = Vec::new();
        if let Some(cycle) = visit(start, &dependents, &mut colour, &mut path) {
            return cycle;
        }
    }
    Vec::new()
}

fn visit(
    id: NodeId,
    dependents: &HashMap<NodeId, Vec<NodeId>>,
    colour: &mut HashMap<NodeId, Colour>,
    path: &mut Vec<NodeId>,
) -> Option<Vec<NodeId>> {
    colour.insert(id, Colour::Grey);
    path.push(id);

    for next in dependents.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
        match colour.get(next).copied().unwrap_or(Colour::White) {
            Colour::Grey => {
                let start = path.iter().position(|n| n == next).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(*next);
                return Some(cycle);
            }
            Colour::White => {
                if let Some(cycle) = visit(*next, dependents, colour, path) {
                    return Some(cycle);
                }
            }
            Colour::Black => {}
        }
    }

    path.pop();
    colour.insert(id, Colour::Black);
    None
}
