// src/plan/task.rs

use tracing::debug;

use crate::dag::Fragment;
use crate::engine::ExecutionContext;
use crate::errors::Result;

/// A unit of intent that plans itself into a [`Fragment`].
///
/// Planning is pure graph construction: it may read the context's hosts and
/// caches but never touches a host.
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// Gate evaluated before planning; `false` means the task contributes
    /// nothing to this run.
    fn is_required(&self, _ctx: &dyn ExecutionContext) -> Result<bool> {
        Ok(true)
    }

    fn plan(&self, ctx: &dyn ExecutionContext) -> Result<Fragment>;
}

/// Plan `task`, or return an empty fragment when it is not required.
pub fn plan_task(task: &dyn Task, ctx: &dyn ExecutionContext) -> Result<Fragment> {
    if !task.is_required(ctx)? {
        debug!(task = task.name(), "task not required; planning empty fragment");
        return Ok(Fragment::new(task.name()));
    }

    let mut fragment = task.plan(ctx)?;
    fragment.calculate_entry_and_exit_nodes();
    debug!(
        task = task.name(),
        nodes = fragment.len(),
        entries = fragment.entry_nodes().len(),
        exits = fragment.exit_nodes().len(),
        "task planned"
    );
    Ok(fragment)
}
