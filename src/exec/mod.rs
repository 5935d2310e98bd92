// src/exec/mod.rs

//! Step execution layer.
//!
//! - [`step`] defines the [`Step`] capability the engine dispatches, plus the
//!   no-op step used for barriers.
//! - [`retry`] wraps any step in a bounded retry-with-backoff policy.
//! - [`shell`] is the concrete shell-script step used by config-driven tasks.
//! - [`transport`] decides how a script reaches a host (local or ssh).

pub mod retry;
pub mod shell;
pub mod step;
pub mod transport;

pub use retry::{Retry, RetryPolicy};
pub use shell::ShellStep;
pub use step::{NoopStep, Step, StepFuture, StepMeta, StepOutput};
