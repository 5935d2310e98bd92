// src/exec/retry.rs

use std::time::Duration;

use tracing::{debug, warn};

use crate::dag::Host;
use crate::engine::ExecutionContext;
use crate::errors::HostdagError;
use crate::exec::step::{Step, StepFuture, StepMeta, StepOutput};

/// Bounded attempts with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub attempts: u32,
    /// Delay before the second attempt; doubled before each further one.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before attempt number `attempt` (1-based; the first has none).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Wraps a step so that failed attempts are retried per a [`RetryPolicy`].
///
/// Retry belongs to the step: the engine only ever sees the final outcome.
pub struct Retry<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Step> Retry<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

impl<S: Step> Step for Retry<S> {
    fn meta(&self) -> &StepMeta {
        self.inner.meta()
    }

    fn precheck<'a>(&'a self, host: &'a Host, ctx: &'a dyn ExecutionContext) -> StepFuture<'a, bool> {
        self.inner.precheck(host, ctx)
    }

    fn run<'a>(&'a self, host: &'a Host, ctx: &'a dyn ExecutionContext) -> StepFuture<'a, StepOutput> {
        Box::pin(async move {
            let name = &self.inner.meta().name;
            let mut attempt = 1;
            loop {
                let outcome = self.inner.run(host, ctx).await;
                let succeeded = matches!(outcome, Ok(ref out) if out.success);
                let cancelled = matches!(outcome, Err(HostdagError::Cancelled));
                if succeeded || cancelled || attempt >= self.policy.attempts {
                    return outcome;
                }

                attempt += 1;
                let delay = self.policy.delay_before(attempt);
                match &outcome {
                    Ok(out) => warn!(step = %name, host = %host, attempt, stderr = %out.stderr.trim(), "step failed; retrying"),
                    Err(e) => warn!(step = %name, host = %host, attempt, error = %e, "step errored; retrying"),
                }
                debug!(step = %name, host = %host, ?delay, "waiting before next attempt");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancellation().cancelled() => return Err(HostdagError::Cancelled),
                }
            }
        })
    }
}
