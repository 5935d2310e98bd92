// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::Host;

/// Plan file exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [config]
/// name = "cluster-upgrade"
/// max_parallel_hosts = 4
///
/// [host.node1]
/// address = "10.0.0.11"
/// roles = ["master"]
///
/// [task.install]
/// module = "upgrade"
///
/// [[task.install.step]]
/// name = "extract"
/// roles = ["master"]
/// cmd = "tar xf /tmp/k8s.tgz -C /opt"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawPlanFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Hosts keyed by name, from `[host.<name>]`.
    #[serde(default)]
    pub host: BTreeMap<String, HostConfig>,

    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Tasks keyed by name, from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Versions per component, then per cluster version.
    #[serde(default)]
    pub bom: BTreeMap<String, BTreeMap<String, BomEntry>>,
}

/// A plan file that passed validation.
///
/// Constructed only through `TryFrom<RawPlanFile>`, so holding one means
/// every cross-reference in it resolves.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub config: ConfigSection,
    pub host: BTreeMap<String, HostConfig>,
    pub pipeline: PipelineSection,
    pub task: BTreeMap<String, TaskConfig>,
    pub bom: BTreeMap<String, BTreeMap<String, BomEntry>>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(raw: RawPlanFile) -> Self {
        Self {
            config: raw.config,
            host: raw.host,
            pipeline: raw.pipeline,
            task: raw.task,
            bom: raw.bom,
        }
    }

    /// Declared hosts, in name order.
    pub fn hosts(&self) -> Vec<Host> {
        self.host
            .iter()
            .map(|(name, cfg)| cfg.to_host(name))
            .collect()
    }

    /// Module names in execution order.
    ///
    /// Falls back to the sorted set of modules used by tasks when
    /// `[pipeline].modules` is empty.
    pub fn module_order(&self) -> Vec<String> {
        if !self.pipeline.modules.is_empty() {
            return self.pipeline.modules.clone();
        }
        let mut modules: Vec<String> = self.task.values().map(|t| t.module.clone()).collect();
        modules.sort();
        modules.dedup();
        modules
    }

    /// Tasks belonging to `module`, in name order.
    pub fn tasks_in_module<'a>(
        &'a self,
        module: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a TaskConfig)> + 'a {
        self.task.iter().filter(move |(_, t)| t.module == module)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_max_parallel_nodes")]
    pub max_parallel_nodes: usize,

    #[serde(default = "default_max_parallel_hosts")]
    pub max_parallel_hosts: usize,

    /// Offline runs skip `online_only` steps.
    #[serde(default)]
    pub offline: bool,

    /// Name of a declared host to use as the control host.
    #[serde(default)]
    pub control_host: Option<String>,

    /// Cluster version used to look up `[bom]` entries.
    #[serde(default)]
    pub cluster_version: Option<String>,
}

fn default_name() -> String {
    "hostdag".to_string()
}

fn default_max_parallel_nodes() -> usize {
    8
}

fn default_max_parallel_hosts() -> usize {
    16
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_parallel_nodes: default_max_parallel_nodes(),
            max_parallel_hosts: default_max_parallel_hosts(),
            offline: false,
            control_host: None,
            cluster_version: None,
        }
    }
}

/// `[host.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl HostConfig {
    pub fn to_host(&self, name: &str) -> Host {
        let mut host = Host::new(name);
        host.address = self.address.clone();
        host.user = self.user.clone();
        host.port = self.port;
        host.roles.extend(self.roles.iter().cloned());
        host
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    #[serde(default)]
    pub modules: Vec<String>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default = "default_module")]
    pub module: String,

    /// Plan the task only when this run-scoped flag is set.
    #[serde(default)]
    pub when_flag: Option<String>,

    /// Plan the task only when this run-scoped flag is *not* set.
    #[serde(default)]
    pub unless_flag: Option<String>,

    /// Run the steps host by host instead of fanning out.
    #[serde(default)]
    pub rolling: bool,

    /// Append a barrier node after the task's exits.
    #[serde(default)]
    pub barrier: bool,

    #[serde(default, rename = "step")]
    pub steps: Vec<StepConfig>,
}

fn default_module() -> String {
    "default".to_string()
}

/// `[[task.<name>.step]]` entry.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Target every host carrying one of these roles.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Target these hosts by name. With neither `roles` nor `hosts` the
    /// step runs on the control host.
    #[serde(default)]
    pub hosts: Vec<String>,

    pub cmd: String,

    /// Script whose zero exit status means "already done".
    #[serde(default)]
    pub precheck: Option<String>,

    /// Step names within the same task this step waits for.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub ignore_error: bool,

    #[serde(default)]
    pub retries: u32,

    /// Base delay between retries, e.g. `"3s"`.
    #[serde(default)]
    pub retry_delay: Option<String>,

    /// Regex matched against each stdout line.
    #[serde(default)]
    pub flag_on_stdout: Option<String>,

    /// Flag set when `flag_on_stdout` matches.
    #[serde(default)]
    pub flag: Option<String>,

    #[serde(default)]
    pub online_only: bool,

    /// BOM components exported to the command's environment.
    #[serde(default)]
    pub components: Vec<String>,
}

/// `[bom.<component>."<cluster version>"]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BomEntry {
    pub version: String,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: '{s}'"))
}
