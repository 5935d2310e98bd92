mod common;

use common::*;
use hostdag::dag::{ExecutionNode, Fragment, NodeId};
use hostdag::errors::HostdagError;

#[test]
fn entry_and_exit_nodes_follow_edges() {
    let mut f = Fragment::new("chain");
    let a = f.add_node(node("A", ScriptedStep::new("A").into_arc(), hosts(&["h1"]))).unwrap();
    let b = f.add_node(node("B", ScriptedStep::new("B").into_arc(), hosts(&["h1"]))).unwrap();
    let c = f.add_node(node("C", ScriptedStep::new("C").into_arc(), hosts(&["h1"]))).unwrap();

    f.add_dependency(a, b).unwrap();
    f.add_dependency(b, c).unwrap();
    f.calculate_entry_and_exit_nodes();

    assert_eq!(f.entry_nodes(), &[a]);
    assert_eq!(f.exit_nodes(), &[c]);
    assert_eq!(f.dependencies_of(c).collect::<Vec<_>>(), vec![b]);
    assert_eq!(f.dependents_of(a).collect::<Vec<_>>(), vec![b]);
}

#[test]
fn isolated_node_is_both_entry_and_exit() {
    let mut f = Fragment::new("single");
    let a = f.add_node(node("A", ScriptedStep::new("A").into_arc(), hosts(&["h1"]))).unwrap();
    f.calculate_entry_and_exit_nodes();

    assert_eq!(f.entry_nodes(), &[a]);
    assert_eq!(f.exit_nodes(), &[a]);
}

#[test]
fn empty_fragment_has_no_entries_or_exits() {
    let mut f = Fragment::new("empty");
    f.calculate_entry_and_exit_nodes();
    assert!(f.is_empty());
    assert!(f.entry_nodes().is_empty());
    assert!(f.exit_nodes().is_empty());
}

#[test]
fn add_dependency_accepts_node_sets() {
    let mut f = Fragment::new("fan");
    let a = f.add_node(node("A", ScriptedStep::new("A").into_arc(), hosts(&["h1"]))).unwrap();
    let b = f.add_node(node("B", ScriptedStep::new("B").into_arc(), hosts(&["h1"]))).unwrap();
    let c = f.add_node(node("C", ScriptedStep::new("C").into_arc(), hosts(&["h1"]))).unwrap();
    let d = f.add_node(node("D", ScriptedStep::new("D").into_arc(), hosts(&["h1"]))).unwrap();

    f.add_dependency([a, b], vec![c, d]).unwrap();
    f.calculate_entry_and_exit_nodes();

    assert_eq!(f.edges().count(), 4);
    let mut entries = f.entry_nodes().to_vec();
    entries.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(entries, expected);
}

#[test]
fn unknown_node_in_dependency_is_rejected_without_partial_edges() {
    let mut f = Fragment::new("f");
    let a = f.add_node(node("A", ScriptedStep::new("A").into_arc(), hosts(&["h1"]))).unwrap();
    let b = f.add_node(node("B", ScriptedStep::new("B").into_arc(), hosts(&["h1"]))).unwrap();
    let ghost = NodeId::new();

    let err = f.add_dependency(a, vec![b, ghost]).unwrap_err();
    assert!(matches!(err, HostdagError::UnknownNode(id) if id == ghost));
    assert_eq!(f.edges().count(), 0);
}

#[test]
fn self_dependency_is_a_cycle() {
    let mut f = Fragment::new("f");
    let a = f.add_node(node("A", ScriptedStep::new("A").into_arc(), hosts(&["h1"]))).unwrap();

    let err = f.add_dependency(a, a).unwrap_err();
    match err {
        HostdagError::DagCycle(names) => assert_eq!(names, vec!["A", "A"]),
        other => panic!("expected DagCycle, got {other:?}"),
    }
}

#[test]
fn node_without_hosts_is_rejected() {
    let mut f = Fragment::new("f");
    let err = f
        .add_node(node("lonely", ScriptedStep::new("lonely").into_arc(), Vec::new()))
        .unwrap_err();
    assert!(matches!(err, HostdagError::EmptyHosts(name) if name == "lonely"));
}

#[test]
fn explicit_duplicate_id_is_rejected() {
    let mut f = Fragment::new("f");
    let id = NodeId::new();
    let step = ScriptedStep::new("A").into_arc();

    f.add_node(ExecutionNode::new("A", step.clone(), hosts(&["h1"])).with_id(id))
        .unwrap();
    let err = f
        .add_node(ExecutionNode::new("A2", step, hosts(&["h1"])).with_id(id))
        .unwrap_err();
    assert!(matches!(err, HostdagError::DuplicateNode(dup) if dup == id));
}

#[test]
fn node_hosts_are_sorted_and_deduplicated() {
    let n = ExecutionNode::new(
        "A",
        ScriptedStep::new("A").into_arc(),
        hosts(&["h2", "h1", "h2"]),
    );
    let names: Vec<&str> = n.hosts.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["h1", "h2"]);
}

#[test]
fn tolerance_comes_from_step_metadata() {
    let strict = ExecutionNode::new("A", ScriptedStep::new("A").into_arc(), hosts(&["h1"]));
    let tolerant = ExecutionNode::new(
        "B",
        ScriptedStep::new("B").ignore_error().into_arc(),
        hosts(&["h1"]),
    );
    assert!(!strict.tolerates_failure());
    assert!(tolerant.tolerates_failure());
}
