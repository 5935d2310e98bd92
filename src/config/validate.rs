// src/config/validate.rs

use std::collections::{BTreeSet, HashSet};

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{parse_duration, PlanFile, RawPlanFile, TaskConfig};
use crate::dag::CONTROL_ROLE;
use crate::errors::{HostdagError, Result};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = crate::errors::HostdagError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_plan(&raw)?;
        Ok(PlanFile::new_unchecked(raw))
    }
}

/// Check every cross-reference in a raw plan file.
pub fn validate_raw_plan(plan: &RawPlanFile) -> Result<()> {
    ensure_has_tasks(plan)?;
    validate_global_config(plan)?;
    validate_pipeline(plan)?;
    for (name, task) in plan.task.iter() {
        validate_task_steps(plan, name, task)?;
        validate_step_dag(name, task)?;
    }
    Ok(())
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.task.is_empty() {
        return Err(HostdagError::ConfigError(
            "plan must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(plan: &RawPlanFile) -> Result<()> {
    let cfg = &plan.config;
    if cfg.max_parallel_nodes == 0 {
        return Err(HostdagError::ConfigError(
            "[config].max_parallel_nodes must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.max_parallel_hosts == 0 {
        return Err(HostdagError::ConfigError(
            "[config].max_parallel_hosts must be >= 1 (got 0)".to_string(),
        ));
    }
    if let Some(control) = &cfg.control_host {
        if !plan.host.contains_key(control) {
            return Err(HostdagError::ConfigError(format!(
                "[config].control_host '{control}' is not a declared [host.<name>]"
            )));
        }
    }
    Ok(())
}

fn validate_pipeline(plan: &RawPlanFile) -> Result<()> {
    let listed = &plan.pipeline.modules;
    if listed.is_empty() {
        return Ok(());
    }

    let mut seen = HashSet::new();
    for module in listed {
        if !seen.insert(module.as_str()) {
            return Err(HostdagError::ConfigError(format!(
                "[pipeline].modules lists module '{module}' more than once"
            )));
        }
    }

    for (name, task) in plan.task.iter() {
        if !seen.contains(task.module.as_str()) {
            return Err(HostdagError::ConfigError(format!(
                "task '{name}' belongs to module '{}', which is missing from [pipeline].modules",
                task.module
            )));
        }
    }
    Ok(())
}

fn validate_task_steps(plan: &RawPlanFile, task_name: &str, task: &TaskConfig) -> Result<()> {
    if task.steps.is_empty() {
        return Err(HostdagError::ConfigError(format!(
            "task '{task_name}' must contain at least one [[task.{task_name}.step]]"
        )));
    }

    let declared_roles: BTreeSet<&str> = plan
        .host
        .values()
        .flat_map(|h| h.roles.iter().map(String::as_str))
        .chain(std::iter::once(CONTROL_ROLE))
        .collect();

    let mut names = HashSet::new();
    for step in &task.steps {
        if !names.insert(step.name.as_str()) {
            return Err(HostdagError::ConfigError(format!(
                "task '{task_name}' has duplicate step name '{}'",
                step.name
            )));
        }
    }

    for step in &task.steps {
        let at = |msg: String| {
            HostdagError::ConfigError(format!("task '{task_name}', step '{}': {msg}", step.name))
        };

        for dep in &step.after {
            if dep == &step.name {
                return Err(at("cannot depend on itself in `after`".to_string()));
            }
            if !names.contains(dep.as_str()) {
                return Err(at(format!("unknown step '{dep}' in `after`")));
            }
        }

        for host in &step.hosts {
            if !plan.host.contains_key(host) {
                return Err(at(format!("unknown host '{host}'")));
            }
        }

        for role in &step.roles {
            if !declared_roles.contains(role.as_str()) {
                return Err(at(format!("role '{role}' is not carried by any host")));
            }
        }

        if let Some(delay) = &step.retry_delay {
            parse_duration(delay).map_err(|e| at(format!("invalid retry_delay: {e}")))?;
        }

        match (&step.flag_on_stdout, &step.flag) {
            (Some(pattern), Some(_)) => {
                Regex::new(pattern).map_err(|e| at(format!("invalid flag_on_stdout regex: {e}")))?;
            }
            (None, None) => {}
            _ => {
                return Err(at(
                    "`flag_on_stdout` and `flag` must be given together".to_string()
                ));
            }
        }

        for component in &step.components {
            let Some(versions) = plan.bom.get(component) else {
                return Err(at(format!("component '{component}' has no [bom] entry")));
            };
            let Some(cluster) = &plan.config.cluster_version else {
                return Err(at(format!(
                    "component '{component}' needs [config].cluster_version to be set"
                )));
            };
            if !versions.contains_key(cluster) {
                return Err(at(format!(
                    "component '{component}' has no [bom] entry for cluster version '{cluster}'"
                )));
            }
        }
    }

    let gates = task.when_flag.iter().chain(task.unless_flag.iter());
    if gates.into_iter().any(|flag| flag.trim().is_empty()) {
        return Err(HostdagError::ConfigError(format!(
            "task '{task_name}' has an empty gate flag name"
        )));
    }

    Ok(())
}

/// Steps of one task form a DAG through their `after` lists.
fn validate_step_dag(task_name: &str, task: &TaskConfig) -> Result<()> {
    // Edge direction: dep -> step
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for step in &task.steps {
        graph.add_node(step.name.as_str());
    }
    for step in &task.steps {
        for dep in &step.after {
            graph.add_edge(dep.as_str(), step.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let start = cycle.node_id();
            let mut members: Vec<String> = kosaraju_scc(&graph)
                .into_iter()
                .find(|scc| scc.contains(&start))
                .unwrap_or_else(|| vec![start])
                .into_iter()
                .map(|s| format!("{task_name}/{s}"))
                .collect();
            members.sort();
            if let Some(first) = members.first().cloned() {
                members.push(first);
            }
            Err(HostdagError::DagCycle(members))
        }
    }
}
