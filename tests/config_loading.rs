mod common;

use std::io::Write;
use std::time::Duration;

use common::*;
use hostdag::config::{load_and_validate, parse_duration, parse_str, PlanFile};
use hostdag::errors::HostdagError;
use tempfile::NamedTempFile;

const FULL_PLAN: &str = r#"
[config]
name = "upgrade"
max_parallel_nodes = 4
max_parallel_hosts = 2
cluster_version = "1.29"

[host.m1]
address = "10.0.0.11"
user = "root"
port = 2222
roles = ["master", "etcd"]

[host.w1]
address = "10.0.0.21"
roles = ["worker"]

[pipeline]
modules = ["prepare", "upgrade"]

[task.fetch]
module = "prepare"

[[task.fetch.step]]
name = "download"
cmd = "curl -fsSLO https://example.invalid/kubeadm-$HOSTDAG_KUBEADM_VERSION"
components = ["kubeadm"]
retries = 2
retry_delay = "500ms"
online_only = true

[task.nodes]
module = "upgrade"
rolling = true
barrier = true

[[task.nodes.step]]
name = "drain"
roles = ["worker"]
cmd = "kubectl drain $HOSTDAG_HOST"

[[task.nodes.step]]
name = "upgrade"
roles = ["worker"]
hosts = ["m1"]
cmd = "kubeadm upgrade node"
after = ["drain"]
flag_on_stdout = "^certificates renewed"
flag = "certs-renewed"

[bom.kubeadm."1.29"]
version = "1.29.3"
checksum = "sha256:abc"
"#;

fn write_plan(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn config_error(contents: &str) -> String {
    match parse_str(contents) {
        Err(HostdagError::ConfigError(msg)) => msg,
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn loads_full_plan_from_disk() {
    let file = write_plan(FULL_PLAN);
    let plan: PlanFile = load_and_validate(file.path()).unwrap();

    assert_eq!(plan.config.name, "upgrade");
    assert_eq!(plan.config.max_parallel_nodes, 4);
    assert_eq!(plan.config.max_parallel_hosts, 2);
    assert_eq!(plan.module_order(), vec!["prepare", "upgrade"]);

    let hosts = plan.hosts();
    assert_eq!(hosts.len(), 2);
    let m1 = &hosts[0];
    assert_eq!(m1.name, "m1");
    assert_eq!(m1.address.as_deref(), Some("10.0.0.11"));
    assert_eq!(m1.port, Some(2222));
    assert!(m1.has_role("etcd"));
    assert!(!m1.is_local());

    let nodes = &plan.task["nodes"];
    assert!(nodes.rolling && nodes.barrier);
    assert_eq!(nodes.steps[1].after, vec!["drain"]);
    assert_eq!(plan.bom["kubeadm"]["1.29"].version, "1.29.3");
}

#[test]
fn defaults_apply_when_sections_are_omitted() {
    let plan = parse_str(
        r#"
        [[task.hello.step]]
        name = "say"
        cmd = "echo hi"
        "#,
    )
    .unwrap();

    assert_eq!(plan.config.name, "hostdag");
    assert_eq!(plan.config.max_parallel_nodes, 8);
    assert_eq!(plan.config.max_parallel_hosts, 16);
    assert!(!plan.config.offline);
    assert_eq!(plan.task["hello"].module, "default");
    assert_eq!(plan.module_order(), vec!["default"]);
}

#[test]
fn module_order_defaults_to_sorted_task_modules() {
    let plan = PlanFileBuilder::new()
        .with_task(
            "b",
            TaskConfigBuilder::new().module("zeta").step(StepConfigBuilder::new("s", "true").build()).build(),
        )
        .with_task(
            "a",
            TaskConfigBuilder::new().module("alpha").step(StepConfigBuilder::new("s", "true").build()).build(),
        )
        .build();
    assert_eq!(plan.module_order(), vec!["alpha", "zeta"]);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Hostdag.toml").unwrap_err();
    assert!(matches!(err, HostdagError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let err = parse_str("[task.a\ncmd = ").unwrap_err();
    assert!(matches!(err, HostdagError::TomlError(_)));
}

#[test]
fn unknown_fields_are_rejected() {
    let err = parse_str(
        r#"
        [[task.a.step]]
        name = "s"
        cmd = "true"
        comand = "typo"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, HostdagError::TomlError(_)));
}

#[test]
fn plan_without_tasks_is_rejected() {
    let msg = config_error("[config]\nname = \"empty\"\n");
    assert!(msg.contains("at least one [task.<name>]"));
}

#[test]
fn zero_limits_are_rejected() {
    let msg = config_error(
        r#"
        [config]
        max_parallel_hosts = 0
        [[task.a.step]]
        name = "s"
        cmd = "true"
        "#,
    );
    assert!(msg.contains("max_parallel_hosts"));
}

#[test]
fn unknown_control_host_is_rejected() {
    let msg = config_error(
        r#"
        [config]
        control_host = "ghost"
        [[task.a.step]]
        name = "s"
        cmd = "true"
        "#,
    );
    assert!(msg.contains("ghost"));
}

#[test]
fn step_reference_errors_are_reported() {
    let cases = [
        (
            r#"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            "#,
            "duplicate step name",
        ),
        (
            r#"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            after = ["nope"]
            "#,
            "unknown step 'nope'",
        ),
        (
            r#"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            after = ["s"]
            "#,
            "cannot depend on itself",
        ),
        (
            r#"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            hosts = ["ghost"]
            "#,
            "unknown host 'ghost'",
        ),
        (
            r#"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            roles = ["etcd"]
            "#,
            "role 'etcd'",
        ),
        (
            r#"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            retry_delay = "3 weeks"
            "#,
            "invalid retry_delay",
        ),
        (
            r#"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            flag_on_stdout = "(unclosed"
            flag = "f"
            "#,
            "invalid flag_on_stdout regex",
        ),
        (
            r#"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            flag_on_stdout = "^ok"
            "#,
            "must be given together",
        ),
        (
            r#"
            [[task.a.step]]
            name = "s"
            cmd = "true"
            components = ["kubeadm"]
            "#,
            "no [bom] entry",
        ),
        (
            r#"
            [task.a]
            module = "late"
            [pipeline]
            modules = ["early"]
            [[task.a.step]]
            name = "s"
            cmd = "true"
            "#,
            "missing from [pipeline].modules",
        ),
    ];

    for (plan, expected) in cases {
        let msg = config_error(plan);
        assert!(msg.contains(expected), "expected '{expected}' in '{msg}'");
    }
}

#[test]
fn control_role_needs_no_declaring_host() {
    parse_str(
        r#"
        [[task.a.step]]
        name = "s"
        cmd = "true"
        roles = ["control"]
        "#,
    )
    .unwrap();
}

#[test]
fn step_cycle_is_a_dag_cycle() {
    let err = parse_str(
        r#"
        [[task.a.step]]
        name = "x"
        cmd = "true"
        after = ["y"]
        [[task.a.step]]
        name = "y"
        cmd = "true"
        after = ["x"]
        "#,
    )
    .unwrap_err();

    match err {
        HostdagError::DagCycle(names) => {
            assert_eq!(names, vec!["a/x", "a/y", "a/x"]);
        }
        other => panic!("expected DagCycle, got {other:?}"),
    }
}

#[test]
fn durations_parse() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
    assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("5d").is_err());
}

#[test]
fn oversized_durations_are_errors_not_overflows() {
    let err = parse_duration("99999999999999999h").unwrap_err();
    assert!(err.contains("too large"), "error: {err}");
    assert!(parse_duration("999999999999999999m").is_err());
    assert_eq!(
        parse_duration("99999999999999999s").unwrap(),
        Duration::from_secs(99_999_999_999_999_999)
    );

    let msg = config_error(
        r#"
        [[task.a.step]]
        name = "s"
        cmd = "true"
        retry_delay = "99999999999999999h"
        "#,
    );
    assert!(msg.contains("invalid retry_delay"), "message: {msg}");
    assert!(msg.contains("too large"), "message: {msg}");
}
