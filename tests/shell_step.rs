#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use hostdag::dag::{Fragment, Host};
use hostdag::engine::{ExecutionContext, GraphExecutor, RunContext};
use hostdag::errors::HostdagError;
use hostdag::exec::{Retry, RetryPolicy, ShellStep, Step, StepMeta};
use hostdag::plan::{plan_task, ConfigTask};
use hostdag::types::Status;
use regex::Regex;

fn shell(name: &str, script: &str) -> ShellStep {
    ShellStep::new(StepMeta::new(name), script)
}

fn local() -> Host {
    Host::new("local-1")
}

#[tokio::test]
async fn captures_stdout_and_exports_host_variables() {
    let ctx = run_context(vec![local()]);
    let step = shell("echo", r#"echo "host=$HOSTDAG_HOST offline=$HOSTDAG_OFFLINE""#);

    assert!(step.script().starts_with("echo"));
    let out = step.run(&local(), &ctx).await.unwrap();
    assert!(out.success);
    assert_eq!(out.stdout, "host=local-1 offline=false\n");
}

#[tokio::test]
async fn non_zero_exit_is_a_failed_output_not_an_error() {
    let ctx = run_context(vec![local()]);
    let step = shell("broken", "echo boom >&2; exit 3");

    let out = step.run(&local(), &ctx).await.unwrap();
    assert!(!out.success);
    assert_eq!(out.stderr, "boom\n");
}

#[tokio::test]
async fn precheck_exit_status_decides_the_skip() {
    let ctx = run_context(vec![local()]);

    let done = shell("s", "true").with_precheck("exit 0");
    assert!(done.precheck(&local(), &ctx).await.unwrap());

    let todo = shell("s", "true").with_precheck("exit 1");
    assert!(!todo.precheck(&local(), &ctx).await.unwrap());

    assert!(!shell("s", "true").precheck(&local(), &ctx).await.unwrap());
}

#[tokio::test]
async fn online_only_steps_skip_when_offline() {
    let offline = RunContext::builder().host(local()).offline(true).build().unwrap();
    let online = run_context(vec![local()]);
    let step = shell("pull", "true").online_only(true);

    assert!(step.precheck(&local(), &offline).await.unwrap());
    assert!(!step.precheck(&local(), &online).await.unwrap());
}

#[tokio::test]
async fn matching_stdout_sets_a_run_flag() {
    let ctx = run_context(vec![local()]);
    let step = shell("inspect", "echo 'certificate expires in 3 days'").with_flag_on_stdout(
        Regex::new(r"expires in \d+ days").unwrap(),
        hostdag::engine::Flag::new("ca-expiring"),
    );

    step.run(&local(), &ctx).await.unwrap();
    assert!(ctx.caches().run().flag("ca-expiring"));
}

#[tokio::test]
async fn failed_output_does_not_set_the_flag() {
    let ctx = run_context(vec![local()]);
    let step = shell("inspect", "echo 'expiring'; exit 1").with_flag_on_stdout(
        Regex::new("expiring").unwrap(),
        hostdag::engine::Flag::new("ca-expiring"),
    );

    step.run(&local(), &ctx).await.unwrap();
    assert!(!ctx.caches().run().flag("ca-expiring"));
}

#[tokio::test]
async fn cancellation_kills_the_process() {
    let ctx = run_context(vec![local()]);
    let step = shell("sleepy", "sleep 30");

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = with_timeout(step.run(&local(), &ctx)).await.unwrap_err();
    assert!(matches!(err, HostdagError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn retry_runs_until_the_step_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("attempts");
    let script = format!(
        "echo x >> {path}; test $(wc -l < {path}) -ge 3",
        path = marker.display()
    );
    let ctx = run_context(vec![local()]);
    let step = Retry::new(
        shell("flaky", &script),
        RetryPolicy::new(4, Duration::from_millis(5)),
    );

    let out = step.run(&local(), &ctx).await.unwrap();
    assert!(out.success);
    let attempts = std::fs::read_to_string(&marker).unwrap().lines().count();
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn retry_gives_up_after_the_last_attempt() {
    let ctx = run_context(vec![local()]);
    let step = Retry::new(shell("never", "exit 1"), RetryPolicy::new(2, Duration::ZERO));

    let out = step.run(&local(), &ctx).await.unwrap();
    assert!(!out.success);
    assert_eq!(step.policy().attempts, 2);
}

#[test]
fn retry_backoff_doubles() {
    let policy = RetryPolicy::new(4, Duration::from_millis(100));
    assert_eq!(policy.delay_before(1), Duration::ZERO);
    assert_eq!(policy.delay_before(2), Duration::from_millis(100));
    assert_eq!(policy.delay_before(3), Duration::from_millis(200));
    assert_eq!(policy.delay_before(4), Duration::from_millis(400));
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
}

#[tokio::test]
async fn config_task_exports_bom_versions_to_its_script() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let out_file = dir.path().join("env");
    let plan = PlanFileBuilder::new()
        .cluster_version("1.29")
        .with_bom("kube-adm", "1.29", "1.29.3", Some("sha256:abc"))
        .with_task(
            "fetch",
            TaskConfigBuilder::new()
                .step(
                    StepConfigBuilder::new(
                        "download",
                        &format!(
                            "echo \"$HOSTDAG_KUBE_ADM_VERSION $HOSTDAG_KUBE_ADM_CHECKSUM\" > {}",
                            out_file.display()
                        ),
                    )
                    .components(&["kube-adm"])
                    .build(),
                )
                .build(),
        )
        .build();

    let ctx = RunContext::from_plan(&plan).unwrap();
    let task = ConfigTask::new("fetch", plan.task["fetch"].clone()).with_bom(
        plan.config.cluster_version.clone(),
        Arc::new(hostdag::plan::StaticBom::from_plan(&plan)),
    );
    let fragment = plan_task(&task, &ctx).unwrap();

    let shared: Arc<dyn ExecutionContext> = Arc::new(ctx);
    let result = with_timeout(GraphExecutor::default().execute(fragment, shared))
        .await
        .unwrap();

    assert_eq!(result.status, Status::Success);
    assert_eq!(
        std::fs::read_to_string(&out_file).unwrap(),
        "1.29.3 sha256:abc\n"
    );
}

#[tokio::test]
async fn config_task_precheck_and_failure_flow_through_results() {
    let task = ConfigTask::new(
        "t",
        TaskConfigBuilder::new()
            .step(StepConfigBuilder::new("done", "exit 1").precheck("true").build())
            .step(StepConfigBuilder::new("boom", "echo nope >&2; exit 1").build())
            .step(StepConfigBuilder::new("after-boom", "true").after(&["boom"]).build())
            .build(),
    );
    let ctx = run_context(Vec::new());
    let fragment: Fragment = plan_task(&task, &ctx).unwrap();

    let result = GraphExecutor::default()
        .execute(fragment, Arc::new(ctx))
        .await
        .unwrap();

    assert_eq!(result.status, Status::Failed);
    assert_eq!(status_of(&result, "t/done"), Status::Skipped);
    assert_eq!(status_of(&result, "t/after-boom"), Status::Skipped);

    let boom = result.node_by_name("t/boom").unwrap();
    assert_eq!(boom.status, Status::Failed);
    assert_eq!(boom.host_results["control"].stderr, "nope\n");
}
