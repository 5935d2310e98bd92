// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod plan;
pub mod result;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::dag::ExecutionPlan;
use crate::engine::cache::Flag;
use crate::engine::{ExecutionContext, ExecutionEvent, ExecutorOptions, GraphExecutor, RunContext};
use crate::plan::Pipeline;
use crate::types::{OutputFormat, Status};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the plan file, builds the run context and pipeline,
/// then either prints the planned layers (`--dry-run`) or executes the
/// pipeline and writes the report to stdout. Returns the final status.
pub async fn run(args: CliArgs) -> Result<Status> {
    let config_path = PathBuf::from(&args.config);
    let mut plan = load_and_validate(&config_path)
        .with_context(|| format!("failed to load plan file {}", config_path.display()))?;

    if args.offline {
        plan.config.offline = true;
    }
    if let Some(n) = args.max_parallel_nodes {
        plan.config.max_parallel_nodes = n as usize;
    }
    if let Some(n) = args.max_parallel_hosts {
        plan.config.max_parallel_hosts = n as usize;
    }

    let ctx = RunContext::from_plan(&plan)?;
    for name in &args.flags {
        ctx.caches().run().set(Flag::new(name.clone()), true);
    }

    let mut pipeline = Pipeline::from_plan(&plan);
    if let Some(module) = &args.module {
        pipeline.retain_module(module)?;
    }

    if args.dry_run {
        let graph = pipeline.plan(&ctx)?;
        let execution_plan = ExecutionPlan::new(graph)?;
        print_dry_run(&execution_plan);
        return Ok(Status::Success);
    }

    // Ctrl-C → cancel the run.
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("interrupt received; cancelling run");
            ctx.cancel();
        });
    }

    let (event_tx, event_rx) = mpsc::channel::<ExecutionEvent>(256);
    let progress = tokio::spawn(log_progress(event_rx));

    let executor = GraphExecutor::new(ExecutorOptions {
        max_parallel_nodes: plan.config.max_parallel_nodes,
        max_parallel_hosts: plan.config.max_parallel_hosts,
    })
    .with_events(event_tx);

    info!(
        pipeline = pipeline.name(),
        run_id = ctx.run_id(),
        offline = ctx.is_offline(),
        "starting run"
    );
    let shared: Arc<dyn ExecutionContext> = Arc::new(ctx.clone());
    let result = pipeline.run(&executor, shared).await?;
    drop(executor);
    let _ = progress.await;

    match args.output {
        OutputFormat::Text => print!("{}", result.render_text()),
        OutputFormat::Json => println!("{}", result.to_json()?),
        OutputFormat::Toml => println!("{}", result.to_toml()?),
    }

    Ok(result.status)
}

async fn log_progress(mut rx: mpsc::Receiver<ExecutionEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ExecutionEvent::NodeStarted { name, .. } => info!(node = %name, "started"),
            ExecutionEvent::HostFinished { node, host, status } => {
                debug!(%node, %host, %status, "host finished")
            }
            ExecutionEvent::NodeFinished { name, status, .. } => {
                info!(node = %name, %status, "finished")
            }
            ExecutionEvent::NodeSkipped { name, reason, .. } => {
                info!(node = %name, %reason, "skipped")
            }
        }
    }
}

/// Dry-run output: the validated layers, with hosts and dependencies.
fn print_dry_run(plan: &ExecutionPlan) {
    let fragment = plan.fragment();
    println!("hostdag dry-run: {}", plan.name());
    println!("  nodes: {}", fragment.len());
    println!();

    for (idx, layer) in plan.layers().iter().enumerate() {
        println!("layer {idx}:");
        for id in layer {
            let Some(node) = fragment.node(*id) else {
                continue;
            };
            let hosts: Vec<&str> = node.hosts.iter().map(|h| h.name.as_str()).collect();
            println!("  - {} on [{}]", node.name, hosts.join(", "));
            let deps: Vec<&str> = fragment
                .dependencies_of(*id)
                .map(|dep| fragment.node_name(dep))
                .collect();
            if !deps.is_empty() {
                println!("      after: {}", deps.join(", "));
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
