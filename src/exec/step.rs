// src/exec/step.rs

//! The opaque unit of work executed against one host.

use std::future::Future;
use std::pin::Pin;

use crate::dag::Host;
use crate::engine::ExecutionContext;
use crate::errors::Result;

/// Boxed future returned by [`Step`] operations.
pub type StepFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Static description of a step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMeta {
    pub name: String,
    pub description: String,
    /// Dependents proceed even if this step fails.
    pub ignore_error: bool,
}

impl StepMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn ignore_error(mut self, ignore: bool) -> Self {
        self.ignore_error = ignore;
        self
    }
}

/// Captured outcome of running a step on one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl StepOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Something that can describe itself and run to completion on a host.
///
/// Returning `Err` from [`Step::run`] and returning a `StepOutput` with
/// `success = false` both end as a `Failed` host result; the former carries
/// the error message, the latter the captured output.
pub trait Step: Send + Sync {
    fn meta(&self) -> &StepMeta;

    /// Return `true` when the work is already done on `host`; the host is
    /// then recorded as `Skipped` and [`Step::run`] is not called.
    fn precheck<'a>(
        &'a self,
        _host: &'a Host,
        _ctx: &'a dyn ExecutionContext,
    ) -> StepFuture<'a, bool> {
        Box::pin(async { Ok(false) })
    }

    fn run<'a>(&'a self, host: &'a Host, ctx: &'a dyn ExecutionContext) -> StepFuture<'a, StepOutput>;
}

/// A step that does nothing and always succeeds. Used for barriers.
#[derive(Debug, Clone)]
pub struct NoopStep {
    meta: StepMeta,
}

impl NoopStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: StepMeta::new(name).with_description("join point"),
        }
    }
}

impl Step for NoopStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    fn run<'a>(&'a self, _host: &'a Host, _ctx: &'a dyn ExecutionContext) -> StepFuture<'a, StepOutput> {
        Box::pin(async { Ok(StepOutput::success("")) })
    }
}
