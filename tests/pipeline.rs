mod common;

use std::sync::Arc;

use common::*;
use hostdag::dag::{ExecutionPlan, Fragment};
use hostdag::engine::cache::Flag;
use hostdag::engine::{ExecutionContext, GraphExecutor};
use hostdag::errors::{HostdagError, Result};
use hostdag::exec::Step;
use hostdag::plan::{plan_task, ConfigTask, Module, Pipeline, Task};
use hostdag::types::Status;

/// Single-node task, optionally gated on a run-scoped flag.
struct StepTask {
    name: String,
    step: Arc<dyn Step>,
    when_flag: Option<String>,
}

impl StepTask {
    fn new(name: &str, step: ScriptedStep) -> Self {
        Self {
            name: name.to_string(),
            step: step.into_arc(),
            when_flag: None,
        }
    }

    fn when_flag(mut self, flag: &str) -> Self {
        self.when_flag = Some(flag.to_string());
        self
    }
}

impl Task for StepTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_required(&self, ctx: &dyn ExecutionContext) -> Result<bool> {
        Ok(match &self.when_flag {
            Some(flag) => ctx.caches().run().flag(flag),
            None => true,
        })
    }

    fn plan(&self, ctx: &dyn ExecutionContext) -> Result<Fragment> {
        let mut f = Fragment::new(self.name.clone());
        f.add_node(node(&self.name, Arc::clone(&self.step), vec![ctx.control_host().clone()]))?;
        Ok(f)
    }
}

#[test]
fn plan_task_returns_empty_fragment_when_not_required() {
    let ctx = run_context(Vec::new());
    let task = StepTask::new("gated", ScriptedStep::new("gated")).when_flag("go");

    assert!(plan_task(&task, &ctx).unwrap().is_empty());

    ctx.caches().run().set(Flag::new("go"), true);
    assert_eq!(plan_task(&task, &ctx).unwrap().len(), 1);
}

#[test]
fn module_merges_tasks_side_by_side() {
    let ctx = run_context(Vec::new());
    let module = Module::new("m")
        .with_task(StepTask::new("a", ScriptedStep::new("a")))
        .with_task(StepTask::new("b", ScriptedStep::new("b")));

    let f = module.plan(&ctx).unwrap();
    assert_eq!(f.len(), 2);
    assert_eq!(f.edges().count(), 0);
}

#[test]
fn pipeline_plan_chains_modules() {
    let ctx = run_context(Vec::new());
    let pipeline = Pipeline::new("p")
        .with_module(
            Module::new("first")
                .with_task(StepTask::new("a", ScriptedStep::new("a")))
                .with_task(StepTask::new("b", ScriptedStep::new("b"))),
        )
        .with_module(Module::new("empty"))
        .with_module(Module::new("second").with_task(StepTask::new("c", ScriptedStep::new("c"))));

    let graph = pipeline.plan(&ctx).unwrap();
    let c = id_of(&graph, "c");
    assert_eq!(graph.dependencies_of(c).count(), 2);

    let plan = ExecutionPlan::new(graph).unwrap();
    assert_eq!(plan.layers().len(), 2);
}

#[tokio::test]
async fn later_modules_see_flags_set_by_earlier_steps() {
    init_tracing();
    let timeline = Timeline::new();
    let pipeline = Pipeline::new("p")
        .with_module(Module::new("check").with_task(StepTask::new(
            "inspect",
            ScriptedStep::new("inspect").sets_flag("ca-expiring").record_into(&timeline),
        )))
        .with_module(
            Module::new("renew")
                .with_task(
                    StepTask::new("renew-ca", ScriptedStep::new("renew-ca").record_into(&timeline))
                        .when_flag("ca-expiring"),
                )
                .with_task(
                    StepTask::new("rotate-keys", ScriptedStep::new("rotate-keys").record_into(&timeline))
                        .when_flag("keys-leaked"),
                ),
        );

    let ctx = shared_context(Vec::new());
    let result = with_timeout(pipeline.run(&GraphExecutor::default(), ctx)).await.unwrap();

    assert_eq!(result.status, Status::Success);
    assert_eq!(result.modules.len(), 2);
    assert!(timeline.ran("renew-ca"));
    assert!(!timeline.ran("rotate-keys"));
    assert_eq!(result.module("renew").unwrap().node_results.len(), 1);
}

#[tokio::test]
async fn pipeline_stops_after_failed_module() {
    let timeline = Timeline::new();
    let pipeline = Pipeline::new("p")
        .with_module(Module::new("one").with_task(StepTask::new(
            "broken",
            ScriptedStep::new("broken").failing().record_into(&timeline),
        )))
        .with_module(Module::new("two").with_task(StepTask::new(
            "never",
            ScriptedStep::new("never").record_into(&timeline),
        )));

    let result = pipeline
        .run(&GraphExecutor::default(), shared_context(Vec::new()))
        .await
        .unwrap();

    assert_eq!(result.status, Status::Failed);
    assert_eq!(result.modules.len(), 1);
    assert!(!timeline.ran("never"));
}

#[tokio::test]
async fn module_scope_is_cleared_between_modules() {
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Seen;
    impl hostdag::engine::CacheKey for Seen {
        type Value = u32;
    }

    struct Probe;
    impl Task for Probe {
        fn name(&self) -> &str {
            "probe"
        }
        fn plan(&self, ctx: &dyn ExecutionContext) -> Result<Fragment> {
            let previous = ctx.caches().module().set(Seen, 1);
            assert_eq!(previous, None, "module scope leaked between modules");
            Ok(Fragment::new("probe"))
        }
    }

    let pipeline = Pipeline::new("p")
        .with_module(Module::new("a").with_task(Probe))
        .with_module(Module::new("b").with_task(Probe));
    let result = pipeline
        .run(&GraphExecutor::default(), shared_context(Vec::new()))
        .await
        .unwrap();
    assert_eq!(result.status, Status::Success);
}

#[test]
fn retain_module_rejects_unknown_names() {
    let mut pipeline = Pipeline::new("p").with_module(Module::new("a")).with_module(Module::new("b"));
    pipeline.retain_module("b").unwrap();
    assert_eq!(pipeline.modules().len(), 1);
    assert!(matches!(
        pipeline.retain_module("zzz"),
        Err(HostdagError::ConfigError(_))
    ));
}

fn cluster_plan() -> hostdag::config::PlanFile {
    PlanFileBuilder::new()
        .name("cluster")
        .with_host("m1", &["master"])
        .with_host("w1", &["worker"])
        .with_host("w2", &["worker"])
        .with_modules(&["prepare", "upgrade"])
        .cluster_version("1.29")
        .with_bom("kubeadm", "1.29", "1.29.3", Some("sha256:abc"))
        .with_task(
            "fetch",
            TaskConfigBuilder::new()
                .module("prepare")
                .step(StepConfigBuilder::new("download", "true").components(&["kubeadm"]).build())
                .build(),
        )
        .with_task(
            "control-plane",
            TaskConfigBuilder::new()
                .module("upgrade")
                .barrier()
                .step(StepConfigBuilder::new("plan", "true").roles(&["master"]).build())
                .step(
                    StepConfigBuilder::new("apply", "true")
                        .roles(&["master"])
                        .after(&["plan"])
                        .retries(2, "10ms")
                        .build(),
                )
                .build(),
        )
        .with_task(
            "workers",
            TaskConfigBuilder::new()
                .module("upgrade")
                .rolling()
                .step(StepConfigBuilder::new("drain", "true").roles(&["worker"]).build())
                .step(
                    StepConfigBuilder::new("upgrade", "true")
                        .roles(&["worker"])
                        .after(&["drain"])
                        .build(),
                )
                .build(),
        )
        .with_task(
            "renew",
            TaskConfigBuilder::new()
                .module("upgrade")
                .unless_flag("certs-fresh")
                .step(StepConfigBuilder::new("renew", "true").hosts(&["m1", "w1"]).build())
                .build(),
        )
        .build()
}

#[test]
fn from_plan_groups_config_tasks_by_module() {
    let plan = cluster_plan();
    let pipeline = Pipeline::from_plan(&plan);
    assert_eq!(pipeline.name(), "cluster");

    let upgrade = &pipeline.modules()[1];
    let names: Vec<&str> = upgrade.tasks().map(|t| t.name()).collect();
    assert_eq!(names, vec!["control-plane", "renew", "workers"]);

    let workers = ConfigTask::new("workers", plan.task["workers"].clone());
    assert!(workers.config().rolling);
    assert_eq!(workers.config().steps.len(), 2);
}

#[test]
fn config_tasks_plan_fan_out_barriers_and_rolling_chains() {
    let plan = cluster_plan();
    let ctx = hostdag::engine::RunContext::from_plan(&plan).unwrap();
    let pipeline = Pipeline::from_plan(&plan);
    assert_eq!(
        pipeline.modules().iter().map(|m| m.name()).collect::<Vec<_>>(),
        vec!["prepare", "upgrade"]
    );

    let upgrade = pipeline.modules()[1].plan(&ctx).unwrap();

    // Fan-out step targets all masters in one node.
    let plan_step = upgrade.node(id_of(&upgrade, "control-plane/plan")).unwrap();
    assert_eq!(plan_step.hosts.len(), 1);
    let apply = id_of(&upgrade, "control-plane/apply");
    assert_eq!(
        upgrade.dependencies_of(apply).collect::<Vec<_>>(),
        vec![id_of(&upgrade, "control-plane/plan")]
    );

    // Barrier joins the task's exits on the control host.
    let barrier = id_of(&upgrade, "control-plane/barrier");
    assert_eq!(upgrade.dependencies_of(barrier).collect::<Vec<_>>(), vec![apply]);
    assert_eq!(upgrade.node(barrier).unwrap().hosts[0].name, "control");

    // Rolling: w1's chain finishes before w2's starts.
    let w1_upgrade = id_of(&upgrade, "workers/upgrade@w1");
    let w2_drain = id_of(&upgrade, "workers/drain@w2");
    assert_eq!(upgrade.dependencies_of(w2_drain).collect::<Vec<_>>(), vec![w1_upgrade]);

    // Explicit host names.
    let renew = upgrade.node(id_of(&upgrade, "renew/renew")).unwrap();
    let names: Vec<&str> = renew.hosts.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["m1", "w1"]);

    // Tasks inside a module stay independent of each other.
    let validated = ExecutionPlan::new(upgrade).unwrap();
    assert_eq!(validated.layers()[0].len(), 3);
}

#[test]
fn unless_flag_drops_the_task() {
    let plan = cluster_plan();
    let ctx = hostdag::engine::RunContext::from_plan(&plan).unwrap();
    ctx.caches().run().set(Flag::new("certs-fresh"), true);

    let upgrade = Pipeline::from_plan(&plan).modules()[1].plan(&ctx).unwrap();
    assert!(upgrade.find_by_name("renew/renew").is_none());
}

#[test]
fn config_task_with_unknown_role_fails_planning() {
    let task = ConfigTask::new(
        "t",
        TaskConfigBuilder::new()
            .step(StepConfigBuilder::new("s", "true").roles(&["etcd"]).build())
            .build(),
    );
    let ctx = run_context(hosts(&["h1"]));
    let err = plan_task(&task, &ctx).unwrap_err();
    assert!(matches!(err, HostdagError::UnknownRole(role) if role == "etcd"));
}

#[test]
fn steps_without_targets_run_on_the_control_host() {
    let task = ConfigTask::new(
        "t",
        TaskConfigBuilder::new()
            .step(StepConfigBuilder::new("s", "true").build())
            .build(),
    );
    let ctx = run_context(hosts(&["h1"]));
    let f = plan_task(&task, &ctx).unwrap();
    let node = f.node(id_of(&f, "t/s")).unwrap();
    assert_eq!(node.hosts, vec![ctx.control_host().clone()]);
}
