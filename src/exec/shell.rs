// src/exec/shell.rs

//! Shell-script step, run through [`transport::shell_command`].

use std::collections::BTreeMap;
use std::process::Stdio;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::Host;
use crate::engine::cache::Flag;
use crate::engine::ExecutionContext;
use crate::errors::{HostdagError, Result};
use crate::exec::step::{Step, StepFuture, StepMeta, StepOutput};
use crate::exec::transport::shell_command;

/// Runs a shell script on each host it is dispatched to.
///
/// The script sees `HOSTDAG_HOST`, `HOSTDAG_ADDRESS`, `HOSTDAG_RUN_ID`,
/// `HOSTDAG_OFFLINE` and any extra variables set with [`ShellStep::with_env`].
#[derive(Debug, Clone)]
pub struct ShellStep {
    meta: StepMeta,
    script: String,
    precheck: Option<String>,
    online_only: bool,
    flag_on_stdout: Option<(Regex, Flag)>,
    env: BTreeMap<String, String>,
}

impl ShellStep {
    pub fn new(meta: StepMeta, script: impl Into<String>) -> Self {
        Self {
            meta,
            script: script.into(),
            precheck: None,
            online_only: false,
            flag_on_stdout: None,
            env: BTreeMap::new(),
        }
    }

    /// Script whose zero exit status means "already done on this host".
    pub fn with_precheck(mut self, script: impl Into<String>) -> Self {
        self.precheck = Some(script.into());
        self
    }

    /// Skip every host when the run is offline.
    pub fn online_only(mut self, online_only: bool) -> Self {
        self.online_only = online_only;
        self
    }

    /// Set a run-scoped [`Flag`] when a line of stdout matches `pattern`.
    pub fn with_flag_on_stdout(mut self, pattern: Regex, flag: Flag) -> Self {
        self.flag_on_stdout = Some((pattern, flag));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    fn environment(&self, host: &Host, ctx: &dyn ExecutionContext) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.insert("HOSTDAG_HOST".into(), host.name.clone());
        env.insert(
            "HOSTDAG_ADDRESS".into(),
            host.address.clone().unwrap_or_else(|| host.name.clone()),
        );
        env.insert("HOSTDAG_RUN_ID".into(), ctx.run_id().to_string());
        env.insert("HOSTDAG_OFFLINE".into(), ctx.is_offline().to_string());
        env
    }

    async fn exec(&self, host: &Host, ctx: &dyn ExecutionContext, script: &str) -> Result<StepOutput> {
        let env = self.environment(host, ctx);

        let mut cmd = if host.is_local() {
            let mut c = shell_command(host, script);
            c.envs(&env);
            c
        } else {
            // Remote shells do not inherit our environment.
            shell_command(host, &with_exports(&env, script))
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            HostdagError::StepError(format!(
                "spawning '{}' for host '{}': {e}",
                self.meta.name, host.name
            ))
        })?;

        let stdout = collect_lines(child.stdout.take(), &self.meta.name, host, "stdout");
        let stderr = collect_lines(child.stderr.take(), &self.meta.name, host, "stderr");

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| {
                HostdagError::StepError(format!(
                    "waiting for '{}' on host '{}': {e}",
                    self.meta.name, host.name
                ))
            })?,
            _ = ctx.cancellation().cancelled() => {
                info!(step = %self.meta.name, host = %host, "cancellation requested; killing process");
                if let Err(e) = child.kill().await {
                    warn!(step = %self.meta.name, host = %host, error = %e, "failed to kill process on cancellation");
                }
                return Err(HostdagError::Cancelled);
            }
        };

        let stdout = join_output(stdout).await;
        let stderr = join_output(stderr).await;

        debug!(
            step = %self.meta.name,
            host = %host,
            exit_code = status.code().unwrap_or(-1),
            success = status.success(),
            "process exited"
        );

        Ok(StepOutput {
            success: status.success(),
            stdout,
            stderr,
        })
    }
}

impl Step for ShellStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    fn precheck<'a>(&'a self, host: &'a Host, ctx: &'a dyn ExecutionContext) -> StepFuture<'a, bool> {
        Box::pin(async move {
            if self.online_only && ctx.is_offline() {
                debug!(step = %self.meta.name, host = %host, "offline run; skipping online-only step");
                return Ok(true);
            }
            match &self.precheck {
                Some(script) => Ok(self.exec(host, ctx, script).await?.success),
                None => Ok(false),
            }
        })
    }

    fn run<'a>(&'a self, host: &'a Host, ctx: &'a dyn ExecutionContext) -> StepFuture<'a, StepOutput> {
        Box::pin(async move {
            info!(step = %self.meta.name, host = %host, "running shell step");
            let output = self.exec(host, ctx, &self.script).await?;

            if output.success {
                if let Some((pattern, flag)) = &self.flag_on_stdout {
                    if output.stdout.lines().any(|line| pattern.is_match(line)) {
                        debug!(step = %self.meta.name, host = %host, flag = %flag, "stdout matched; setting flag");
                        ctx.caches().run().set(flag.clone(), true);
                    }
                }
            }
            Ok(output)
        })
    }
}

fn with_exports(env: &BTreeMap<String, String>, script: &str) -> String {
    let mut out = String::new();
    for (key, value) in env {
        out.push_str(&format!("export {key}='{}'; ", value.replace('\'', r"'\''")));
    }
    out.push_str(script);
    out
}

/// Drain a child pipe line by line, logging at debug and keeping the text.
fn collect_lines<R>(pipe: Option<R>, step: &str, host: &Host, stream: &'static str) -> Option<JoinHandle<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let pipe = pipe?;
    let step = step.to_string();
    let host = host.name.clone();
    Some(tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        let mut collected = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(step = %step, host = %host, stream, "{}", line);
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    }))
}

async fn join_output(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(h) => h.await.unwrap_or_default(),
        None => String::new(),
    }
}
