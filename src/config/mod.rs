// src/config/mod.rs

//! Plan file loading and validation for hostdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a plan file from disk (`loader.rs`).
//! - Validate cross-references and per-task step DAGs (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{
    parse_duration, BomEntry, ConfigSection, HostConfig, PipelineSection, PlanFile, RawPlanFile,
    StepConfig, TaskConfig,
};
pub use validate::validate_raw_plan;
