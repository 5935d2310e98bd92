// src/dag/compose.rs

//! Composition algebra over [`Fragment`]s.
//!
//! - [`Fragment::merge`] / [`merge_all`]: disjoint union of sibling fragments.
//! - [`Fragment::then`]: sequential composition (every exit of `self` gates
//!   every entry of the next fragment).
//! - [`chain_per_host`]: one private chain per host, threaded so that only
//!   one host is worked on at a time.
//! - [`Fragment::add_barrier`]: a single no-op join point over many nodes.
//!
//! Every operation leaves the entry/exit sets recomputed.

use std::sync::Arc;

use tracing::debug;

use crate::dag::fragment::{Fragment, NodeSet};
use crate::dag::host::Host;
use crate::dag::node::{ExecutionNode, NodeId};
use crate::errors::{HostdagError, Result};
use crate::exec::NoopStep;

impl Fragment {
    /// Disjoint union with `other`.
    ///
    /// Fails without modifying `self` if any node id appears in both.
    pub fn merge(&mut self, other: Fragment) -> Result<()> {
        if let Some(id) = other.node_ids().find(|id| self.contains(*id)) {
            return Err(HostdagError::DuplicateNode(id));
        }

        debug!(
            into = %self.name,
            from = %other.name,
            nodes = other.len(),
            "merging fragment"
        );
        self.absorb(other);
        self.calculate_entry_and_exit_nodes();
        Ok(())
    }

    /// Sequential composition: `next` starts only after all of `self` has
    /// finished.
    pub fn then(&mut self, next: Fragment) -> Result<()> {
        let exits = self.exit_nodes().to_vec();
        let entries = next.entry_nodes().to_vec();

        self.merge(next)?;
        if !exits.is_empty() && !entries.is_empty() {
            self.add_dependency(exits, entries)?;
        }
        self.calculate_entry_and_exit_nodes();
        Ok(())
    }

    /// Add a no-op node on `host` that depends on every node in `after`.
    ///
    /// Later stages can then depend on the returned id alone.
    pub fn add_barrier(
        &mut self,
        name: impl Into<String>,
        after: impl Into<NodeSet>,
        host: Host,
    ) -> Result<NodeId> {
        let name = name.into();
        let after = after.into();
        let step = Arc::new(NoopStep::new(name.clone()));
        let id = self.add_node(ExecutionNode::new(name, step, vec![host]))?;
        if !after.is_empty() {
            self.add_dependency(after, id)?;
        }
        self.calculate_entry_and_exit_nodes();
        Ok(id)
    }
}

/// Disjoint merge of any number of sibling fragments.
pub fn merge_all(name: impl Into<String>, fragments: impl IntoIterator<Item = Fragment>) -> Result<Fragment> {
    let mut merged = Fragment::new(name);
    for fragment in fragments {
        merged.merge(fragment)?;
    }
    merged.calculate_entry_and_exit_nodes();
    Ok(merged)
}

/// Build one chain per host with `build` and run the hosts strictly one at
/// a time, in the order given.
///
/// The exits of host *i*'s chain gate the entries of host *i+1*'s chain.
/// Hosts whose chain comes back empty are passed over.
pub fn chain_per_host<F>(name: impl Into<String>, hosts: &[Host], mut build: F) -> Result<Fragment>
where
    F: FnMut(&Host) -> Result<Fragment>,
{
    let mut chained = Fragment::new(name);
    let mut previous_exits: Vec<NodeId> = Vec::new();

    for host in hosts {
        let mut per_host = build(host)?;
        per_host.calculate_entry_and_exit_nodes();
        if per_host.is_empty() {
            continue;
        }

        let entries = per_host.entry_nodes().to_vec();
        let exits = per_host.exit_nodes().to_vec();

        chained.merge(per_host)?;
        if !previous_exits.is_empty() {
            chained.add_dependency(previous_exits.clone(), entries)?;
        }
        previous_exits = exits;
    }

    chained.calculate_entry_and_exit_nodes();
    Ok(chained)
}
