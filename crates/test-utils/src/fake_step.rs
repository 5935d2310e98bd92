use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hostdag::dag::Host;
use hostdag::engine::cache::Flag;
use hostdag::engine::ExecutionContext;
use hostdag::errors::HostdagError;
use hostdag::exec::{Step, StepFuture, StepMeta, StepOutput};

/// What a [`ScriptedStep`] does on a given host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    /// Returns an unsuccessful `StepOutput`.
    Fail,
    /// Returns `Err(StepError)`.
    Error,
    /// Precheck reports the work as already done.
    AlreadyDone,
}

/// One recorded execution of a step on a host.
#[derive(Debug, Clone)]
pub struct Span {
    pub step: String,
    pub host: String,
    pub start: Instant,
    pub end: Option<Instant>,
}

/// Shared, ordered record of every scripted execution in a test.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    spans: Arc<Mutex<Vec<Span>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin(&self, step: &str, host: &str) -> usize {
        let mut spans = self.spans.lock().unwrap();
        spans.push(Span {
            step: step.to_string(),
            host: host.to_string(),
            start: Instant::now(),
            end: None,
        });
        spans.len() - 1
    }

    fn end(&self, idx: usize) {
        let mut spans = self.spans.lock().unwrap();
        if let Some(span) = spans.get_mut(idx) {
            span.end = Some(Instant::now());
        }
    }

    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().unwrap().clone()
    }

    pub fn spans_for(&self, step: &str) -> Vec<Span> {
        self.spans().into_iter().filter(|s| s.step == step).collect()
    }

    /// Names of every step that started at least once.
    pub fn started_steps(&self) -> BTreeSet<String> {
        self.spans().into_iter().map(|s| s.step).collect()
    }

    pub fn ran(&self, step: &str) -> bool {
        self.spans().iter().any(|s| s.step == step)
    }

    pub fn first_start(&self, step: &str) -> Option<Instant> {
        self.spans_for(step).iter().map(|s| s.start).min()
    }

    pub fn last_end(&self, step: &str) -> Option<Instant> {
        self.spans_for(step).iter().filter_map(|s| s.end).max()
    }

    /// Largest number of spans open at the same instant.
    pub fn max_concurrency(&self) -> usize {
        let mut points: Vec<(Instant, i32)> = Vec::new();
        for span in self.spans() {
            points.push((span.start, 1));
            if let Some(end) = span.end {
                points.push((end, -1));
            }
        }
        // Ends sort before starts at the same instant.
        points.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut open = 0i32;
        let mut max = 0i32;
        for (_, delta) in points {
            open += delta;
            max = max.max(open);
        }
        max as usize
    }
}

/// A [`Step`] whose behaviour per host is fixed up front.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    meta: StepMeta,
    default: Outcome,
    per_host: HashMap<String, Outcome>,
    delay: Duration,
    timeline: Option<Timeline>,
    sets_flag: Option<String>,
    hang: bool,
}

impl ScriptedStep {
    pub fn new(name: &str) -> Self {
        Self {
            meta: StepMeta::new(name),
            default: Outcome::Succeed,
            per_host: HashMap::new(),
            delay: Duration::ZERO,
            timeline: None,
            sets_flag: None,
            hang: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.default = Outcome::Fail;
        self
    }

    pub fn erroring(mut self) -> Self {
        self.default = Outcome::Error;
        self
    }

    pub fn on_host(mut self, host: &str, outcome: Outcome) -> Self {
        self.per_host.insert(host.to_string(), outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn record_into(mut self, timeline: &Timeline) -> Self {
        self.timeline = Some(timeline.clone());
        self
    }

    pub fn ignore_error(mut self) -> Self {
        self.meta = self.meta.ignore_error(true);
        self
    }

    /// Set a run-scoped flag when the step succeeds.
    pub fn sets_flag(mut self, flag: &str) -> Self {
        self.sets_flag = Some(flag.to_string());
        self
    }

    /// Block until the run is cancelled.
    pub fn hang_until_cancelled(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn into_arc(self) -> Arc<dyn Step> {
        Arc::new(self)
    }

    fn outcome_for(&self, host: &Host) -> Outcome {
        self.per_host.get(&host.name).copied().unwrap_or(self.default)
    }
}

impl Step for ScriptedStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    fn precheck<'a>(&'a self, host: &'a Host, _ctx: &'a dyn ExecutionContext) -> StepFuture<'a, bool> {
        let done = self.outcome_for(host) == Outcome::AlreadyDone;
        Box::pin(async move { Ok(done) })
    }

    fn run<'a>(&'a self, host: &'a Host, ctx: &'a dyn ExecutionContext) -> StepFuture<'a, StepOutput> {
        Box::pin(async move {
            let span = self
                .timeline
                .as_ref()
                .map(|t| (t, t.begin(&self.meta.name, &host.name)));

            if self.hang {
                ctx.cancellation().cancelled().await;
                if let Some((t, idx)) = span {
                    t.end(idx);
                }
                return Err(HostdagError::Cancelled);
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some((t, idx)) = span {
                t.end(idx);
            }

            match self.outcome_for(host) {
                Outcome::Succeed | Outcome::AlreadyDone => {
                    if let Some(flag) = &self.sets_flag {
                        ctx.caches().run().set(Flag::new(flag.clone()), true);
                    }
                    Ok(StepOutput::success(format!("{} ok on {}", self.meta.name, host.name)))
                }
                Outcome::Fail => Ok(StepOutput::failure(format!(
                    "{} failed on {}",
                    self.meta.name, host.name
                ))),
                Outcome::Error => Err(HostdagError::StepError(format!(
                    "{} errored on {}",
                    self.meta.name, host.name
                ))),
            }
        })
    }
}
