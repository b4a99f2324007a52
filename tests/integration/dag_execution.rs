//! Executor behaviour on hand-built graphs.

use tokio::sync::mpsc;

use scout::core::{NodeState, TaskNode};
use scout::orchestration::{ExecutorConfig, ExecutorEvent};
use scout::schema::SchemaRef;
use scout::Error;

use crate::fixtures::{stack_json, stack_node, static_executor, StaticAgent};

/// a -> (b, c) -> d
fn diamond() -> Vec<TaskNode> {
    let a = stack_node("a");
    let b = stack_node("b").with_context_node("a", a.id);
    let c = stack_node("c").with_context_node("a", a.id);
    let d = stack_node("d")
        .with_context_node("b", b.id)
        .with_context_node("c", c.id);
    // Insertion order deliberately puts the sink first.
    vec![d, c, b, a]
}

fn diamond_agent() -> std::sync::Arc<StaticAgent> {
    let reply = stack_json(&[("python", 4)]);
    StaticAgent::new(&[
        ("a", reply.clone()),
        ("b", reply.clone()),
        ("c", reply.clone()),
        ("d", reply),
    ])
}

/// Test: dependencies resolve before dependents
/// Given a diamond graph listed sink-first
/// When the executor runs it
/// Then every node runs exactly once and after all of its dependencies
#[tokio::test]
async fn test_diamond_runs_in_dependency_order_once() {
    let agent = diamond_agent();
    let report = static_executor(agent.clone()).run(diamond()).await.unwrap();

    assert!(report.is_success());
    let calls = agent.calls();
    assert_eq!(calls.len(), 4, "each node runs exactly once: {:?}", calls);

    let pos = |name: &str| calls.iter().position(|c| c == name).unwrap();
    assert_eq!(pos("a"), 0);
    assert!(pos("b") < pos("d"));
    assert!(pos("c") < pos("d"));
    assert_eq!(pos("d"), 3);

    // Report lists dependencies before dependents.
    let names: Vec<&str> = report.nodes().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names.first(), Some(&"a"));
    assert_eq!(names.last(), Some(&"d"));
}

#[tokio::test]
async fn test_sequential_run_with_single_worker() {
    let agent = diamond_agent();
    let executor = static_executor(agent.clone()).with_config(ExecutorConfig {
        max_concurrency: 1,
        schema_retries: 1,
    });
    let report = executor.run(diamond()).await.unwrap();
    assert_eq!(report.resolved_count(), 4);
    assert_eq!(agent.calls().len(), 4);
}

#[tokio::test]
async fn test_events_follow_execution() {
    let (tx, mut rx) = mpsc::channel(64);
    let executor = static_executor(diamond_agent()).with_events(tx);
    executor.run(diamond()).await.unwrap();
    drop(executor);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let started = events
        .iter()
        .filter(|e| matches!(e, ExecutorEvent::NodeStarted { .. }))
        .count();
    let resolved = events
        .iter()
        .filter(|e| matches!(e, ExecutorEvent::NodeResolved { .. }))
        .count();
    assert_eq!(started, 4);
    assert_eq!(resolved, 4);
    assert_eq!(
        events.last(),
        Some(&ExecutorEvent::RunComplete {
            resolved: 4,
            failed: 0
        })
    );
}

/// Test: cycles abort before anything runs
#[tokio::test]
async fn test_cycle_rejected_before_execution() {
    let mut x = stack_node("x");
    let y = stack_node("y").with_context_node("x", x.id);
    x = x.with_context_node("y", y.id);

    let agent = StaticAgent::new(&[("x", stack_json(&[])), ("y", stack_json(&[]))]);
    let err = static_executor(agent.clone())
        .run(vec![x, y])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CyclicDependency { .. }));
    assert!(err.is_fatal_to_pipeline());
    assert!(agent.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_reference_rejected() {
    let ghost = stack_node("ghost");
    let node = stack_node("orphan").with_context_node("ghost", ghost.id);

    let agent = StaticAgent::new(&[("orphan", stack_json(&[]))]);
    let err = static_executor(agent.clone())
        .run(vec![node])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownNode(ref m) if m.contains("orphan")));
    assert!(agent.calls().is_empty());
}

#[tokio::test]
async fn test_wrong_schema_reply_fails_node() {
    let node = TaskNode::new("count", "count staff", SchemaRef::EmployeeCount);
    let agent = StaticAgent::new(&[("count", stack_json(&[("python", 4)]))]);

    let report = static_executor(agent.clone()).run(vec![node]).await.unwrap();
    let node = report.node_by_name("count").unwrap();
    match &node.state {
        NodeState::Failed { cause } => {
            assert!(cause.to_error().is_retryable(), "got {}", cause);
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
    // The single re-prompt was used.
    assert_eq!(agent.calls().len(), 2);
    assert_eq!(node.attempts, 2);
}
