// src/engine/context.rs

//! The capability set handed to planners and steps.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PlanFile;
use crate::dag::{Host, CONTROL_ROLE};
use crate::engine::cache::Caches;
use crate::errors::{HostdagError, Result};

/// Everything a planner or step may ask of the run it belongs to.
///
/// This is the one interface passed everywhere; there is no narrower
/// context that has to be downcast back into a richer one.
pub trait ExecutionContext: Send + Sync {
    /// Identifier of this run, for logs and the process environment.
    fn run_id(&self) -> &str;

    /// Every known host, including the control host.
    fn hosts(&self) -> &[Host];

    /// Hosts carrying `role`. Unknown roles are a planning error.
    fn hosts_by_role(&self, role: &str) -> Result<Vec<Host>> {
        let hosts: Vec<Host> = self
            .hosts()
            .iter()
            .filter(|h| h.has_role(role))
            .cloned()
            .collect();
        if hosts.is_empty() {
            return Err(HostdagError::UnknownRole(role.to_string()));
        }
        Ok(hosts)
    }

    fn host(&self, name: &str) -> Result<Host> {
        self.hosts()
            .iter()
            .find(|h| h.name == name)
            .cloned()
            .ok_or_else(|| HostdagError::UnknownHost(name.to_string()))
    }

    /// The distinguished host that drives the run.
    fn control_host(&self) -> &Host;

    fn is_offline(&self) -> bool;

    fn caches(&self) -> &Caches;

    /// Raised to stop dispatching and interrupt in-flight hosts.
    fn cancellation(&self) -> &CancellationToken;
}

/// Concrete [`ExecutionContext`]. Cheap to clone; clones share caches and
/// the cancellation token.
#[derive(Clone)]
pub struct RunContext {
    inner: Arc<RunContextInner>,
}

struct RunContextInner {
    run_id: String,
    hosts: Vec<Host>,
    control: Host,
    offline: bool,
    caches: Caches,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn builder() -> RunContextBuilder {
        RunContextBuilder::default()
    }

    /// Build a context from a validated plan file.
    pub fn from_plan(plan: &PlanFile) -> Result<Self> {
        let mut builder = Self::builder().offline(plan.config.offline);
        for host in plan.hosts() {
            builder = builder.host(host);
        }
        if let Some(name) = &plan.config.control_host {
            builder = builder.control_host_name(name);
        }
        builder.build()
    }

    /// Request cancellation of everything running under this context.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }
}

impl ExecutionContext for RunContext {
    fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    fn hosts(&self) -> &[Host] {
        &self.inner.hosts
    }

    fn control_host(&self) -> &Host {
        &self.inner.control
    }

    fn is_offline(&self) -> bool {
        self.inner.offline
    }

    fn caches(&self) -> &Caches {
        &self.inner.caches
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.inner.run_id)
            .field("hosts", &self.inner.hosts.len())
            .field("control", &self.inner.control.name)
            .field("offline", &self.inner.offline)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct RunContextBuilder {
    run_id: Option<String>,
    hosts: Vec<Host>,
    control_name: Option<String>,
    offline: bool,
    cancel: Option<CancellationToken>,
}

impl RunContextBuilder {
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn host(mut self, host: Host) -> Self {
        self.hosts.push(host);
        self
    }

    pub fn hosts(mut self, hosts: impl IntoIterator<Item = Host>) -> Self {
        self.hosts.extend(hosts);
        self
    }

    /// Use an already-registered host as the control host.
    pub fn control_host_name(mut self, name: impl Into<String>) -> Self {
        self.control_name = Some(name.into());
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Without an explicit control host, a local host named `control` is
    /// added (unless one with that name already exists).
    pub fn build(self) -> Result<RunContext> {
        let mut hosts = self.hosts;

        let control_idx = match &self.control_name {
            Some(name) => hosts
                .iter()
                .position(|h| &h.name == name)
                .ok_or_else(|| HostdagError::UnknownHost(name.clone()))?,
            None => match hosts.iter().position(|h| h.name == CONTROL_ROLE) {
                Some(idx) => idx,
                None => {
                    hosts.push(Host::local_control());
                    hosts.len() - 1
                }
            },
        };
        hosts[control_idx].roles.insert(CONTROL_ROLE.to_string());
        let control = hosts[control_idx].clone();

        Ok(RunContext {
            inner: Arc::new(RunContextInner {
                run_id: self.run_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
                hosts,
                control,
                offline: self.offline,
                caches: Caches::default(),
                cancel: self.cancel.unwrap_or_default(),
            }),
        })
    }
}
