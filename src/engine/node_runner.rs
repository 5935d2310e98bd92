// src/engine/node_runner.rs

//! Fan one dispatched node out across its hosts.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dag::{ExecutionNode, Host, NodeId};
use crate::engine::{ExecutionContext, ExecutionEvent};
use crate::errors::HostdagError;
use crate::exec::Step;
use crate::result::{HostResult, NodeResult};
use crate::types::Status;

/// Run `node` on every one of its hosts concurrently and aggregate.
///
/// Each host waits for a permit from `host_limit`, which is shared by the
/// whole run. Returns once every host has reported.
pub async fn run_node(
    id: NodeId,
    node: ExecutionNode,
    ctx: Arc<dyn ExecutionContext>,
    host_limit: Arc<Semaphore>,
    events: Option<mpsc::Sender<ExecutionEvent>>,
) -> NodeResult {
    let mut result = NodeResult::pending(
        node.name.clone(),
        node.step_name().to_string(),
        node.hosts.iter().map(|h| h.name.as_str()),
    );
    result.status = Status::Running;
    result.start_time = Some(Utc::now());

    info!(
        node = %id,
        name = %node.name,
        hosts = node.hosts.len(),
        run_id = ctx.run_id(),
        "dispatching node"
    );

    let mut set = JoinSet::new();
    for host in node.hosts.iter().cloned() {
        let step = Arc::clone(&node.step);
        let ctx = Arc::clone(&ctx);
        let limit = Arc::clone(&host_limit);
        let host_name = host.name.clone();
        set.spawn(async move {
            let handle = tokio::spawn(run_host(step, host, ctx, limit));
            (host_name, handle.await)
        });
    }

    while let Some(joined) = set.join_next().await {
        let host_result = match joined {
            Ok((_, Ok(host_result))) => host_result,
            Ok((host_name, Err(e))) => {
                error!(node = %id, host = %host_name, error = %e, "host execution panicked");
                let now = Utc::now();
                HostResult {
                    status: Status::Failed,
                    message: format!("host execution aborted: {e}"),
                    start_time: Some(now),
                    end_time: Some(now),
                    ..HostResult::pending(host_name)
                }
            }
            Err(e) => {
                error!(node = %id, error = %e, "host wrapper task failed");
                continue;
            }
        };

        if let Some(tx) = &events {
            let _ = tx
                .send(ExecutionEvent::HostFinished {
                    node: id,
                    host: host_result.host_name.clone(),
                    status: host_result.status,
                })
                .await;
        }
        result
            .host_results
            .insert(host_result.host_name.clone(), host_result);
        result.refresh_status();
    }

    // Hosts that never reported are failures.
    for host in result.host_results.values_mut() {
        if !host.status.is_terminal() {
            host.status = Status::Failed;
            host.message = "host execution lost".to_string();
            host.end_time = Some(Utc::now());
        }
    }

    let status = result.refresh_status();
    result.end_time = Some(Utc::now());
    result.message = node_message(&result);

    match status {
        Status::Failed => warn!(node = %id, name = %node.name, message = %result.message, "node failed"),
        _ => info!(node = %id, name = %node.name, status = %status, "node finished"),
    }
    result
}

fn node_message(result: &NodeResult) -> String {
    match result.status {
        Status::Failed => {
            let hosts: Vec<&str> = result.failed_hosts().map(|h| h.host_name.as_str()).collect();
            format!("failed on host(s): {}", hosts.join(", "))
        }
        Status::Skipped => "skipped on every host".to_string(),
        _ => String::new(),
    }
}

/// Execute one step on one host: permit, precheck, run.
pub async fn run_host(
    step: Arc<dyn Step>,
    host: Host,
    ctx: Arc<dyn ExecutionContext>,
    host_limit: Arc<Semaphore>,
) -> HostResult {
    let mut result = HostResult::pending(host.name.clone());
    let step_name = step.meta().name.clone();
    let cancel = ctx.cancellation().clone();

    let _permit = tokio::select! {
        permit = Arc::clone(&host_limit).acquire_owned() => match permit {
            Ok(p) => p,
            Err(_) => return finish(result, Status::Failed, "host limiter closed".to_string()),
        },
        _ = cancel.cancelled() => {
            return finish(result, Status::Failed, HostdagError::Cancelled.to_string());
        }
    };

    result.status = Status::Running;
    result.start_time = Some(Utc::now());
    debug!(step = %step_name, host = %host, "host execution started");

    let precheck = tokio::select! {
        done = step.precheck(&host, ctx.as_ref()) => done,
        _ = cancel.cancelled() => Err(HostdagError::Cancelled),
    };
    match precheck {
        Ok(true) => {
            debug!(step = %step_name, host = %host, "precheck satisfied; skipping host");
            return finish(result, Status::Skipped, "precheck: already satisfied".to_string());
        }
        Ok(false) => {}
        Err(e) => {
            warn!(step = %step_name, host = %host, error = %e, "precheck failed");
            return finish(result, Status::Failed, format!("precheck failed: {e}"));
        }
    }

    let outcome = tokio::select! {
        out = step.run(&host, ctx.as_ref()) => out,
        _ = cancel.cancelled() => Err(HostdagError::Cancelled),
    };

    match outcome {
        Ok(output) => {
            let status = if output.success { Status::Success } else { Status::Failed };
            let message = if output.success {
                String::new()
            } else {
                "step reported failure".to_string()
            };
            result.stdout = output.stdout;
            result.stderr = output.stderr;
            finish(result, status, message)
        }
        Err(e) => {
            warn!(step = %step_name, host = %host, error = %e, "step execution error");
            finish(result, Status::Failed, e.to_string())
        }
    }
}

fn finish(mut result: HostResult, status: Status, message: String) -> HostResult {
    let now = Utc::now();
    result.start_time.get_or_insert(now);
    result.end_time = Some(now);
    result.status = status;
    result.message = message;
    result
}
