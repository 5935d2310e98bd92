// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::Result;

/// Read and deserialize a plan file without semantic validation.
///
/// Use [`load_and_validate`] unless you need the raw structure.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlanFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let plan: RawPlanFile = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        hosts = plan.host.len(),
        tasks = plan.task.len(),
        "plan file parsed"
    );

    Ok(plan)
}

/// Read, deserialize and validate a plan file.
///
/// Checks performed before anything can run:
/// - unknown `after` / host / role / component references,
/// - cycles between the steps of a task,
/// - regex and duration syntax,
/// - global limits and pipeline module coverage.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanFile> {
    let raw = load_from_path(&path)?;
    let plan = PlanFile::try_from(raw)?;
    Ok(plan)
}

/// Parse and validate a plan from a TOML string.
pub fn parse_str(contents: &str) -> Result<PlanFile> {
    let raw: RawPlanFile = toml::from_str(contents)?;
    PlanFile::try_from(raw)
}

/// `Hostdag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Hostdag.toml")
}
