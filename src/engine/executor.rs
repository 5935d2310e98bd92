// src/engine/executor.rs

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::dag::{ExecutionPlan, Fragment, NodeId, Scheduler, SchedulerStep, SkipReason};
use crate::errors::Result;
use crate::result::{GraphExecutionResult, HostResult, NodeResult};
use crate::types::Status;

use super::node_runner::run_node;
use super::{ExecutionContext, ExecutionEvent, ExecutorOptions};

type NodeJoin = (NodeId, std::result::Result<NodeResult, JoinError>);

/// Executes a validated graph against a run context.
///
/// This is the async shell around [`Scheduler`]: the scheduler decides what
/// is ready or skipped, and the executor dispatches ready nodes (up to
/// `max_parallel_nodes` at once), feeds completions back, and records
/// results.
pub struct GraphExecutor {
    options: ExecutorOptions,
    events: Option<mpsc::Sender<ExecutionEvent>>,
}

impl fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphExecutor")
            .field("options", &self.options)
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl Default for GraphExecutor {
    fn default() -> Self {
        Self::new(ExecutorOptions::default())
    }
}

impl GraphExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            options,
            events: None,
        }
    }

    /// Stream [`ExecutionEvent`]s to `tx` while executing.
    pub fn with_events(mut self, tx: mpsc::Sender<ExecutionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn options(&self) -> ExecutorOptions {
        self.options
    }

    /// Validate `fragment` and execute it.
    ///
    /// Structural problems (cycles, dangling edges, nodes without hosts) are
    /// returned as errors before anything runs. Step failures are not errors:
    /// they are recorded in the returned result.
    pub async fn execute(
        &self,
        fragment: Fragment,
        ctx: Arc<dyn ExecutionContext>,
    ) -> Result<GraphExecutionResult> {
        let plan = ExecutionPlan::new(fragment)?;
        Ok(self.execute_plan(&plan, ctx).await)
    }

    /// Execute an already validated plan.
    pub async fn execute_plan(
        &self,
        plan: &ExecutionPlan,
        ctx: Arc<dyn ExecutionContext>,
    ) -> GraphExecutionResult {
        let fragment = plan.fragment();
        let mut result = GraphExecutionResult::new(plan.name());
        for (id, node) in fragment.nodes() {
            result.node_results.insert(
                *id,
                NodeResult::pending(
                    node.name.clone(),
                    node.step_name().to_string(),
                    node.hosts.iter().map(|h| h.name.as_str()),
                ),
            );
        }

        info!(
            graph = plan.name(),
            nodes = fragment.len(),
            layers = plan.layers().len(),
            run_id = ctx.run_id(),
            "graph execution started"
        );

        let max_nodes = self.options.max_parallel_nodes.max(1);
        let host_limit = Arc::new(Semaphore::new(self.options.max_parallel_hosts.max(1)));
        let mut scheduler = Scheduler::new(plan);
        let mut ready: VecDeque<NodeId> = VecDeque::new();
        let mut in_flight: JoinSet<NodeJoin> = JoinSet::new();
        let mut cancelled = false;

        let step = scheduler.start();
        self.apply(step, plan, &mut ready, &mut result).await;

        loop {
            if !cancelled && ctx.cancellation().is_cancelled() {
                cancelled = true;
                warn!(graph = plan.name(), "cancellation requested; no further nodes will start");
                // Claimed by the scheduler but never dispatched.
                for id in ready.drain(..) {
                    scheduler.release(id);
                }
                let step = scheduler.cancel();
                self.apply(step, plan, &mut ready, &mut result).await;
            }

            while !cancelled && in_flight.len() < max_nodes {
                let Some(id) = ready.pop_front() else {
                    break;
                };
                self.dispatch(id, plan, &ctx, &host_limit, &mut in_flight, &mut result)
                    .await;
            }

            if in_flight.is_empty() {
                if ready.is_empty() || cancelled {
                    break;
                }
                continue;
            }

            let joined = tokio::select! {
                joined = in_flight.join_next() => joined,
                _ = ctx.cancellation().cancelled(), if !cancelled => continue,
            };

            let (id, node_result) = match joined {
                Some(Ok((id, Ok(node_result)))) => (id, node_result),
                Some(Ok((id, Err(e)))) => {
                    error!(node = %id, error = %e, "node execution panicked");
                    (id, aborted_node(&result, id, &e.to_string()))
                }
                Some(Err(e)) => {
                    error!(error = %e, "node wrapper task failed");
                    continue;
                }
                None => continue,
            };

            let status = node_result.status;
            if let Some(tx) = &self.events {
                let _ = tx
                    .send(ExecutionEvent::NodeFinished {
                        node: id,
                        name: node_result.node_name.clone(),
                        status,
                    })
                    .await;
            }
            result.node_results.insert(id, node_result);
            result.refresh_status();

            let step = scheduler.complete(id, status);
            self.apply(step, plan, &mut ready, &mut result).await;
        }

        // Anything left unfinished could not be driven to completion.
        for node in result.node_results.values_mut() {
            if !node.status.is_terminal() {
                for host in node.host_results.values_mut() {
                    if !host.status.is_terminal() {
                        host.status = Status::Failed;
                        host.message = "node execution lost".to_string();
                    }
                }
                node.refresh_status();
                node.message = "node execution lost".to_string();
            }
        }

        result.finalize();
        info!(
            graph = plan.name(),
            status = %result.status,
            succeeded = result.nodes_with_status(Status::Success).len(),
            failed = result.nodes_with_status(Status::Failed).len(),
            skipped = result.nodes_with_status(Status::Skipped).len(),
            "graph execution finished"
        );
        result
    }

    async fn apply(
        &self,
        step: SchedulerStep,
        plan: &ExecutionPlan,
        ready: &mut VecDeque<NodeId>,
        result: &mut GraphExecutionResult,
    ) {
        for (id, reason) in &step.newly_skipped {
            self.record_skip(*id, reason, plan, result).await;
        }
        ready.extend(step.newly_scheduled);
        if step.run_finished {
            debug!(graph = plan.name(), "scheduler reports all nodes terminal");
        }
    }

    async fn record_skip(
        &self,
        id: NodeId,
        reason: &SkipReason,
        plan: &ExecutionPlan,
        result: &mut GraphExecutionResult,
    ) {
        let message = reason.message();
        let name = plan.fragment().node_name(id).to_string();
        debug!(node = %id, name = %name, reason = %message, "node skipped");
        if let Some(node) = result.node_results.get_mut(&id) {
            node.mark_skipped(message.clone());
        }
        if let Some(tx) = &self.events {
            let _ = tx
                .send(ExecutionEvent::NodeSkipped {
                    node: id,
                    name,
                    reason: message,
                })
                .await;
        }
    }

    async fn dispatch(
        &self,
        id: NodeId,
        plan: &ExecutionPlan,
        ctx: &Arc<dyn ExecutionContext>,
        host_limit: &Arc<Semaphore>,
        in_flight: &mut JoinSet<NodeJoin>,
        result: &mut GraphExecutionResult,
    ) {
        let Some(node) = plan.fragment().node(id).cloned() else {
            error!(node = %id, "scheduled node missing from plan");
            return;
        };

        if let Some(entry) = result.node_results.get_mut(&id) {
            entry.status = Status::Running;
        }
        if let Some(tx) = &self.events {
            let _ = tx
                .send(ExecutionEvent::NodeStarted {
                    node: id,
                    name: node.name.clone(),
                })
                .await;
        }

        let fut = run_node(
            id,
            node,
            Arc::clone(ctx),
            Arc::clone(host_limit),
            self.events.clone(),
        );
        in_flight.spawn(async move { (id, tokio::spawn(fut).await) });
    }
}

/// Node result for a node whose task died before reporting.
fn aborted_node(result: &GraphExecutionResult, id: NodeId, message: &str) -> NodeResult {
    let mut node = result
        .node(id)
        .cloned()
        .unwrap_or_else(|| NodeResult::pending(id.to_string(), String::new(), std::iter::empty::<&str>()));
    let now = chrono::Utc::now();
    for (name, host) in node.host_results.iter_mut() {
        if !host.status.is_terminal() {
            *host = HostResult {
                status: Status::Failed,
                message: format!("node execution aborted: {message}"),
                start_time: host.start_time.or(Some(now)),
                end_time: Some(now),
                ..HostResult::pending(name.clone())
            };
        }
    }
    node.refresh_status();
    if node.status != Status::Failed {
        node.status = Status::Failed;
    }
    node.end_time = Some(now);
    node.message = format!("node execution aborted: {message}");
    node
}
