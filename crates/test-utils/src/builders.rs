#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use hostdag::config::{
    BomEntry, ConfigSection, HostConfig, PipelineSection, PlanFile, RawPlanFile, StepConfig,
    TaskConfig,
};
use hostdag::dag::{ExecutionNode, Host};
use hostdag::engine::{ExecutionContext, RunContext};
use hostdag::exec::Step;

/// Hosts with the given names and no roles.
pub fn hosts(names: &[&str]) -> Vec<Host> {
    names.iter().map(|n| Host::new(*n)).collect()
}

pub fn host_with_roles(name: &str, roles: &[&str]) -> Host {
    roles
        .iter()
        .fold(Host::new(name), |host, role| host.with_role(*role))
}

/// A run context over `hosts` plus the synthetic local control host.
pub fn run_context(hosts: Vec<Host>) -> RunContext {
    RunContext::builder()
        .hosts(hosts)
        .build()
        .expect("failed to build run context")
}

pub fn shared_context(hosts: Vec<Host>) -> Arc<dyn ExecutionContext> {
    Arc::new(run_context(hosts))
}

pub fn node(name: &str, step: Arc<dyn Step>, hosts: Vec<Host>) -> ExecutionNode {
    ExecutionNode::new(name, step, hosts)
}

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanFileBuilder {
    plan: RawPlanFile,
}

impl PlanFileBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile {
                config: ConfigSection::default(),
                host: BTreeMap::new(),
                pipeline: PipelineSection::default(),
                task: BTreeMap::new(),
                bom: BTreeMap::new(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.plan.config.name = name.to_string();
        self
    }

    pub fn with_host(mut self, name: &str, roles: &[&str]) -> Self {
        self.plan.host.insert(
            name.to_string(),
            HostConfig {
                roles: roles.iter().map(|r| r.to_string()).collect(),
                ..HostConfig::default()
            },
        );
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.plan.task.insert(name.to_string(), task);
        self
    }

    pub fn with_modules(mut self, modules: &[&str]) -> Self {
        self.plan.pipeline.modules = modules.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn cluster_version(mut self, version: &str) -> Self {
        self.plan.config.cluster_version = Some(version.to_string());
        self
    }

    pub fn with_bom(mut self, component: &str, cluster: &str, version: &str, checksum: Option<&str>) -> Self {
        self.plan.bom.entry(component.to_string()).or_default().insert(
            cluster.to_string(),
            BomEntry {
                version: version.to_string(),
                checksum: checksum.map(str::to_string),
            },
        );
        self
    }

    pub fn offline(mut self) -> Self {
        self.plan.config.offline = true;
        self
    }

    pub fn build_raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn build(self) -> PlanFile {
        PlanFile::try_from(self.plan).expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskConfig {
                module: "default".to_string(),
                when_flag: None,
                unless_flag: None,
                rolling: false,
                barrier: false,
                steps: Vec::new(),
            },
        }
    }

    pub fn module(mut self, module: &str) -> Self {
        self.task.module = module.to_string();
        self
    }

    pub fn when_flag(mut self, flag: &str) -> Self {
        self.task.when_flag = Some(flag.to_string());
        self
    }

    pub fn unless_flag(mut self, flag: &str) -> Self {
        self.task.unless_flag = Some(flag.to_string());
        self
    }

    pub fn rolling(mut self) -> Self {
        self.task.rolling = true;
        self
    }

    pub fn barrier(mut self) -> Self {
        self.task.barrier = true;
        self
    }

    pub fn step(mut self, step: StepConfig) -> Self {
        self.task.steps.push(step);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

impl Default for TaskConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StepConfig`.
pub struct StepConfigBuilder {
    step: StepConfig,
}

impl StepConfigBuilder {
    pub fn new(name: &str, cmd: &str) -> Self {
        Self {
            step: StepConfig {
                name: name.to_string(),
                cmd: cmd.to_string(),
                ..StepConfig::default()
            },
        }
    }

    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.step.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn hosts(mut self, hosts: &[&str]) -> Self {
        self.step.hosts = hosts.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.step.after = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn ignore_error(mut self) -> Self {
        self.step.ignore_error = true;
        self
    }

    pub fn retries(mut self, retries: u32, delay: &str) -> Self {
        self.step.retries = retries;
        self.step.retry_delay = Some(delay.to_string());
        self
    }

    pub fn precheck(mut self, cmd: &str) -> Self {
        self.step.precheck = Some(cmd.to_string());
        self
    }

    pub fn flag_on_stdout(mut self, pattern: &str, flag: &str) -> Self {
        self.step.flag_on_stdout = Some(pattern.to_string());
        self.step.flag = Some(flag.to_string());
        self
    }

    pub fn online_only(mut self) -> Self {
        self.step.online_only = true;
        self
    }

    pub fn components(mut self, components: &[&str]) -> Self {
        self.step.components = components.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}
