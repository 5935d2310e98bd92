// src/plan/bom.rs

//! Component version lookup ("bill of materials").

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{BomEntry, PlanFile};
use crate::errors::{HostdagError, Result};

/// A component pinned to a concrete version for one cluster version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedComponent {
    pub component: String,
    pub version: String,
    pub checksum: Option<String>,
}

impl ResolvedComponent {
    /// Environment variables exported to steps, e.g.
    /// `HOSTDAG_KUBEADM_VERSION` and `HOSTDAG_KUBEADM_CHECKSUM`.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let prefix = env_prefix(&self.component);
        let mut vars = vec![(format!("{prefix}_VERSION"), self.version.clone())];
        if let Some(checksum) = &self.checksum {
            vars.push((format!("{prefix}_CHECKSUM"), checksum.clone()));
        }
        vars
    }
}

fn env_prefix(component: &str) -> String {
    let upper: String = component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("HOSTDAG_{upper}")
}

/// Looks up which version of a component belongs to a cluster version.
pub trait VersionResolver: Send + Sync {
    fn resolve(&self, component: &str, cluster_version: &str) -> Result<ResolvedComponent>;
}

/// Table-driven resolver, usually loaded from a plan file's `[bom]`.
#[derive(Debug, Clone, Default)]
pub struct StaticBom {
    entries: BTreeMap<String, BTreeMap<String, BomEntry>>,
}

impl StaticBom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_plan(plan: &PlanFile) -> Self {
        Self {
            entries: plan.bom.clone(),
        }
    }

    pub fn with_entry(
        mut self,
        component: impl Into<String>,
        cluster_version: impl Into<String>,
        entry: BomEntry,
    ) -> Self {
        self.entries
            .entry(component.into())
            .or_default()
            .insert(cluster_version.into(), entry);
        self
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl VersionResolver for StaticBom {
    fn resolve(&self, component: &str, cluster_version: &str) -> Result<ResolvedComponent> {
        let entry = self
            .entries
            .get(component)
            .and_then(|versions| versions.get(cluster_version))
            .ok_or_else(|| {
                HostdagError::ConfigError(format!(
                    "no version of '{component}' recorded for cluster version '{cluster_version}'"
                ))
            })?;
        Ok(ResolvedComponent {
            component: component.to_string(),
            version: entry.version.clone(),
            checksum: entry.checksum.clone(),
        })
    }
}
