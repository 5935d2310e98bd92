// src/plan/mod.rs

//! Planning layer: turning intent into fragments.
//!
//! - [`task`]: the [`Task`] trait and gate-aware [`plan_task`].
//! - [`module`] and [`pipeline`]: grouping and ordering of tasks.
//! - [`config_task`]: tasks described in the plan file.
//! - [`bom`]: component version lookup used while planning.

pub mod bom;
pub mod config_task;
pub mod module;
pub mod pipeline;
pub mod task;

pub use bom::{ResolvedComponent, StaticBom, VersionResolver};
pub use config_task::ConfigTask;
pub use module::Module;
pub use pipeline::Pipeline;
pub use task::{plan_task, Task};
