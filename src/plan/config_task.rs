// src/plan/config_task.rs

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::config::{parse_duration, StepConfig, TaskConfig};
use crate::dag::{chain_per_host, ExecutionNode, Fragment, Host, NodeId};
use crate::engine::cache::Flag;
use crate::engine::ExecutionContext;
use crate::errors::{HostdagError, Result};
use crate::exec::{Retry, RetryPolicy, ShellStep, Step, StepMeta};
use crate::plan::bom::{StaticBom, VersionResolver};
use crate::plan::task::Task;

/// A task described by a `[task.<name>]` section of the plan file.
///
/// Each step becomes one node fanned out across its hosts, with `after`
/// lists turned into edges. A `rolling` task instead walks its hosts one at
/// a time, running that host's steps before moving on.
pub struct ConfigTask {
    name: String,
    config: TaskConfig,
    cluster_version: Option<String>,
    resolver: Arc<dyn VersionResolver>,
}

impl ConfigTask {
    pub fn new(name: impl Into<String>, config: TaskConfig) -> Self {
        Self {
            name: name.into(),
            config,
            cluster_version: None,
            resolver: Arc::new(StaticBom::new()),
        }
    }

    /// Component versions come from `resolver` for `cluster_version`.
    pub fn with_bom(
        mut self,
        cluster_version: Option<String>,
        resolver: Arc<dyn VersionResolver>,
    ) -> Self {
        self.cluster_version = cluster_version;
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    fn plan_error(&self, message: impl Into<String>) -> HostdagError {
        HostdagError::PlanError {
            task: self.name.clone(),
            message: message.into(),
        }
    }

    fn node_name(&self, step: &StepConfig) -> String {
        format!("{}/{}", self.name, step.name)
    }

    fn build_step(&self, step: &StepConfig) -> Result<Arc<dyn Step>> {
        let meta = StepMeta::new(self.node_name(step))
            .with_description(step.description.clone())
            .ignore_error(step.ignore_error);

        let mut shell = ShellStep::new(meta, step.cmd.clone()).online_only(step.online_only);
        if let Some(precheck) = &step.precheck {
            shell = shell.with_precheck(precheck.clone());
        }
        if let (Some(pattern), Some(flag)) = (&step.flag_on_stdout, &step.flag) {
            let regex = Regex::new(pattern)
                .map_err(|e| self.plan_error(format!("step '{}': invalid regex: {e}", step.name)))?;
            shell = shell.with_flag_on_stdout(regex, Flag::new(flag.clone()));
        }

        for component in &step.components {
            let cluster = self.cluster_version.as_deref().ok_or_else(|| {
                self.plan_error(format!(
                    "step '{}' needs component '{component}' but no cluster version is set",
                    step.name
                ))
            })?;
            let resolved = self.resolver.resolve(component, cluster)?;
            for (key, value) in resolved.env_vars() {
                shell = shell.with_env(key, value);
            }
        }

        if step.retries == 0 {
            return Ok(Arc::new(shell));
        }
        let delay = match &step.retry_delay {
            Some(raw) => parse_duration(raw).map_err(|e| {
                self.plan_error(format!("step '{}': invalid retry_delay: {e}", step.name))
            })?,
            None => std::time::Duration::from_secs(1),
        };
        let policy = RetryPolicy::new(step.retries.saturating_add(1), delay);
        Ok(Arc::new(Retry::new(shell, policy)))
    }

    /// Roles and names resolved against the context; the control host when
    /// the step names neither.
    fn step_hosts(&self, step: &StepConfig, ctx: &dyn ExecutionContext) -> Result<Vec<Host>> {
        if step.roles.is_empty() && step.hosts.is_empty() {
            return Ok(vec![ctx.control_host().clone()]);
        }

        let mut hosts = Vec::new();
        for role in &step.roles {
            hosts.extend(ctx.hosts_by_role(role)?);
        }
        for name in &step.hosts {
            hosts.push(ctx.host(name)?);
        }
        hosts.sort();
        hosts.dedup();
        Ok(hosts)
    }

    fn plan_fan_out(&self, ctx: &dyn ExecutionContext) -> Result<Fragment> {
        let mut fragment = Fragment::new(self.name.clone());
        let mut ids: HashMap<&str, NodeId> = HashMap::new();

        for step in &self.config.steps {
            let hosts = self.step_hosts(step, ctx)?;
            let node = ExecutionNode::new(self.node_name(step), self.build_step(step)?, hosts);
            ids.insert(step.name.as_str(), fragment.add_node(node)?);
        }
        self.link_steps(&mut fragment, &ids)?;
        Ok(fragment)
    }

    fn plan_rolling(&self, ctx: &dyn ExecutionContext) -> Result<Fragment> {
        let mut targets: Vec<(&StepConfig, Arc<dyn Step>, Vec<Host>)> = Vec::new();
        let mut all_hosts: Vec<Host> = Vec::new();
        for step in &self.config.steps {
            let hosts = self.step_hosts(step, ctx)?;
            all_hosts.extend(hosts.iter().cloned());
            targets.push((step, self.build_step(step)?, hosts));
        }
        all_hosts.sort();
        all_hosts.dedup();

        chain_per_host(self.name.clone(), &all_hosts, |host| {
            let mut fragment = Fragment::new(format!("{}@{}", self.name, host.name));
            let mut ids: HashMap<&str, NodeId> = HashMap::new();
            for (step, runnable, hosts) in &targets {
                if !hosts.contains(host) {
                    continue;
                }
                let node = ExecutionNode::new(
                    format!("{}@{}", self.node_name(step), host.name),
                    Arc::clone(runnable),
                    vec![host.clone()],
                );
                ids.insert(step.name.as_str(), fragment.add_node(node)?);
            }
            self.link_steps(&mut fragment, &ids)?;
            Ok(fragment)
        })
    }

    /// Turn `after` lists into edges between the planned steps. Steps absent
    /// from `ids` (a rolling host they do not target) are passed over.
    fn link_steps(&self, fragment: &mut Fragment, ids: &HashMap<&str, NodeId>) -> Result<()> {
        for step in &self.config.steps {
            let Some(&to) = ids.get(step.name.as_str()) else {
                continue;
            };
            for dep in &step.after {
                if let Some(&from) = ids.get(dep.as_str()) {
                    fragment.add_dependency(from, to)?;
                } else if !self.config.rolling {
                    return Err(self.plan_error(format!(
                        "step '{}' waits for unknown step '{dep}'",
                        step.name
                    )));
                }
            }
        }
        fragment.calculate_entry_and_exit_nodes();
        Ok(())
    }
}

impl Task for ConfigTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_required(&self, ctx: &dyn ExecutionContext) -> Result<bool> {
        let flags = ctx.caches().run();
        if let Some(flag) = &self.config.when_flag {
            if !flags.flag(flag) {
                return Ok(false);
            }
        }
        if let Some(flag) = &self.config.unless_flag {
            if flags.flag(flag) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn plan(&self, ctx: &dyn ExecutionContext) -> Result<Fragment> {
        let mut fragment = if self.config.rolling {
            self.plan_rolling(ctx)?
        } else {
            self.plan_fan_out(ctx)?
        };

        if self.config.barrier && !fragment.is_empty() {
            let exits = fragment.exit_nodes().to_vec();
            fragment.add_barrier(
                format!("{}/barrier", self.name),
                exits,
                ctx.control_host().clone(),
            )?;
        }

        debug!(
            task = %self.name,
            rolling = self.config.rolling,
            nodes = fragment.len(),
            "config task planned"
        );
        Ok(fragment)
    }
}
