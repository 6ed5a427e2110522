//! Integration tests for the execution engine, driven entirely through mock
//! plugins — no persistence involved. Terminal outcomes are observed on the
//! completion-report channel exactly the way the execution service consumes
//! them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nodes::mock::MockNode;
use nodes::{NodeRegistry, ValueMap};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::models::{
    Edge, Execution, ExecutionStatus, Node, NodeConfig, NodeRunStatus, NodeType, Workflow,
};
use crate::{EngineConfig, EngineError, ExecutionReport, WorkflowEngine};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn make_node(id: &str, plugin: &str) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        kind: NodeType::Transform,
        plugin: plugin.to_string(),
        dependencies: Vec::new(),
        config: None,
        ui_config: None,
    }
}

fn make_workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
    let mut workflow = Workflow::new("engine-test");
    for node in nodes {
        workflow.nodes.insert(node.id.clone(), node);
    }
    workflow.edges = edges;
    workflow
}

fn data(pairs: &[(&str, serde_json::Value)]) -> ValueMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

struct Harness {
    engine: WorkflowEngine,
    reports: mpsc::UnboundedReceiver<ExecutionReport>,
    registry: Arc<NodeRegistry>,
}

fn harness(config: EngineConfig) -> Harness {
    let registry = Arc::new(NodeRegistry::new());
    let (engine, reports) = WorkflowEngine::new(Arc::clone(&registry), config);
    engine.start().expect("engine should start");
    Harness {
        engine,
        reports,
        registry,
    }
}

async fn next_report(reports: &mut mpsc::UnboundedReceiver<ExecutionReport>) -> ExecutionReport {
    timeout(Duration::from_secs(5), reports.recv())
        .await
        .expect("report should arrive in time")
        .expect("report channel should stay open")
}

fn record_status(report: &ExecutionReport, node_id: &str) -> Option<NodeRunStatus> {
    report
        .node_records
        .iter()
        .find(|r| r.node_id == node_id)
        .map(|r| r.status)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_twice_is_rejected() {
    let h = harness(EngineConfig::default());
    assert!(matches!(
        h.engine.start(),
        Err(EngineError::EngineAlreadyRunning)
    ));
    h.engine.stop().await.unwrap();
}

#[tokio::test]
async fn execute_before_start_is_rejected() {
    let registry = Arc::new(NodeRegistry::new());
    let (engine, _reports) = WorkflowEngine::new(registry, EngineConfig::default());
    let workflow = make_workflow(vec![make_node("a", "mock")], vec![]);
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    assert!(matches!(
        engine.execute_workflow(workflow, &execution),
        Err(EngineError::EngineNotRunning)
    ));
}

// ---------------------------------------------------------------------------
// Graph admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_workflow_is_rejected() {
    let h = harness(EngineConfig::default());
    let workflow = make_workflow(vec![], vec![]);
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    assert!(matches!(
        h.engine.execute_workflow(workflow, &execution),
        Err(EngineError::EmptyWorkflow)
    ));
}

#[tokio::test]
async fn all_nodes_with_dependencies_means_no_start_node() {
    let h = harness(EngineConfig::default());
    // a ⇄ b: both have an upstream, nothing can start.
    let workflow = make_workflow(
        vec![make_node("a", "mock"), make_node("b", "mock")],
        vec![Edge::normal("e1", "a", "b"), Edge::normal("e2", "b", "a")],
    );
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    assert!(matches!(
        h.engine.execute_workflow(workflow, &execution),
        Err(EngineError::NoStartNode)
    ));
}

#[tokio::test]
async fn capacity_cap_rejects_admission() {
    let mut h = harness(EngineConfig {
        max_concurrent_executions: 1,
        ..EngineConfig::default()
    });
    let slow = Arc::new(MockNode::sleeping(
        "slow",
        Duration::from_secs(5),
        ValueMap::new(),
    ));
    h.registry.register(slow).unwrap();

    let workflow = make_workflow(vec![make_node("a", "slow")], vec![]);
    let first = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow.clone(), &first).unwrap();

    let second = Execution::new(workflow.id.clone(), "1.0.0");
    assert!(matches!(
        h.engine.execute_workflow(workflow, &second),
        Err(EngineError::CapacityExceeded(1))
    ));

    h.engine.cancel_execution(&first.id).unwrap();
    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Cancelled);
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn linear_pipeline_completes_in_dependency_order() {
    let mut h = harness(EngineConfig::default());
    let src = Arc::new(MockNode::returning("src", data(&[("value", json!(1))])));
    let mid = Arc::new(MockNode::returning("mid", data(&[("value", json!(2))])));
    let sink = Arc::new(MockNode::returning("sink", data(&[("value", json!(3))])));
    h.registry.register(src.clone()).unwrap();
    h.registry.register(mid.clone()).unwrap();
    h.registry.register(sink.clone()).unwrap();

    let workflow = make_workflow(
        vec![
            make_node("a", "src"),
            make_node("b", "mid"),
            make_node("c", "sink"),
        ],
        vec![Edge::normal("e1", "a", "b"), Edge::normal("e2", "b", "c")],
    );
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.metrics.total_nodes, 3);
    assert_eq!(report.metrics.completed_nodes, 3);
    assert_eq!(report.metrics.failed_nodes, 0);

    // Each plugin ran exactly once.
    assert_eq!(src.call_count(), 1);
    assert_eq!(mid.call_count(), 1);
    assert_eq!(sink.call_count(), 1);

    // Data propagated through the namespaced variables bus.
    assert_eq!(report.output["a_value"], json!(1));
    assert_eq!(report.output["b_value"], json!(2));
    assert_eq!(report.output["c_value"], json!(3));
    assert!(report.output.contains_key("a_output"));

    // A node never starts before its upstream completed.
    let find = |id: &str| {
        report
            .node_records
            .iter()
            .find(|r| r.node_id == id)
            .unwrap()
            .clone()
    };
    let (a, b, c) = (find("a"), find("b"), find("c"));
    assert!(a.end_time.unwrap() <= b.start_time.unwrap());
    assert!(b.end_time.unwrap() <= c.start_time.unwrap());

    // Downstream nodes saw the upstream output in their prepared input.
    let mid_input = &mid.calls()[0];
    assert_eq!(mid_input.data["a_value"], json!(1));
}

#[tokio::test]
async fn diamond_join_runs_the_join_exactly_once() {
    let mut h = harness(EngineConfig::default());
    let step = Arc::new(MockNode::returning("step", ValueMap::new()));
    let join = Arc::new(MockNode::returning("join", ValueMap::new()));
    h.registry.register(step.clone()).unwrap();
    h.registry.register(join.clone()).unwrap();

    let workflow = make_workflow(
        vec![
            make_node("a", "step"),
            make_node("b", "step"),
            make_node("c", "step"),
            make_node("d", "join"),
        ],
        vec![
            Edge::normal("e1", "a", "b"),
            Edge::normal("e2", "a", "c"),
            Edge::normal("e3", "b", "d"),
            Edge::normal("e4", "c", "d"),
        ],
    );
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.metrics.completed_nodes, 4);
    assert_eq!(join.call_count(), 1, "join must run exactly once");
}

#[tokio::test]
async fn input_mapping_and_defaults_are_applied() {
    let mut h = harness(EngineConfig::default());
    let probe = Arc::new(MockNode::returning("probe", ValueMap::new()));
    h.registry.register(probe.clone()).unwrap();

    let mut node = make_node("a", "probe");
    node.config = Some(NodeConfig {
        input: Some(crate::models::InputConfig {
            mapping: HashMap::from([("renamed".to_string(), "seed".to_string())]),
            defaults: data(&[("fallback", json!("present"))]),
            required: Vec::new(),
        }),
        ..NodeConfig::default()
    });
    let workflow = make_workflow(vec![node], vec![]);

    let mut execution = Execution::new(workflow.id.clone(), "1.0.0");
    execution
        .context
        .variables
        .insert("seed".to_string(), json!(42));
    h.engine.execute_workflow(workflow, &execution).unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Completed);
    let input = &probe.calls()[0];
    assert_eq!(input.data["renamed"], json!(42));
    assert_eq!(input.data["seed"], json!(42));
    assert_eq!(input.data["fallback"], json!("present"));
}

// ---------------------------------------------------------------------------
// Conditional edges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conditional_branch_takes_only_the_true_edge() {
    let mut h = harness(EngineConfig::default());
    let src = Arc::new(MockNode::returning("src", data(&[("flag", json!(1))])));
    let taken = Arc::new(MockNode::returning("taken", ValueMap::new()));
    let not_taken = Arc::new(MockNode::returning("not_taken", ValueMap::new()));
    h.registry.register(src).unwrap();
    h.registry.register(taken.clone()).unwrap();
    h.registry.register(not_taken.clone()).unwrap();

    let workflow = make_workflow(
        vec![
            make_node("a", "src"),
            make_node("b1", "taken"),
            make_node("b2", "not_taken"),
            make_node("c1", "taken"),
            make_node("c2", "not_taken"),
        ],
        vec![
            Edge::conditional("e1", "a", "b1", "a_flag > 0"),
            Edge::conditional("e2", "a", "b2", "a_flag < 0"),
            Edge::normal("e3", "b1", "c1"),
            Edge::normal("e4", "b2", "c2"),
        ],
    );
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.metrics.completed_nodes, 3);
    assert_eq!(report.metrics.skipped_nodes, 2);
    assert_eq!(record_status(&report, "b2"), Some(NodeRunStatus::Skipped));
    assert_eq!(record_status(&report, "c2"), Some(NodeRunStatus::Skipped));
    assert_eq!(not_taken.call_count(), 0, "false branch must never execute");
    assert_eq!(taken.call_count(), 2);
}

#[tokio::test]
async fn join_behind_a_false_branch_is_skipped_and_the_run_still_completes() {
    let mut h = harness(EngineConfig::default());
    let step = Arc::new(MockNode::returning("step", data(&[("flag", json!(-1))])));
    h.registry.register(step.clone()).unwrap();

    // a → b (condition never true), a → c, b → d, c → d.
    // d's join can never be satisfied, so b and d are skipped.
    let workflow = make_workflow(
        vec![
            make_node("a", "step"),
            make_node("b", "step"),
            make_node("c", "step"),
            make_node("d", "step"),
        ],
        vec![
            Edge::conditional("e1", "a", "b", "a_flag > 0"),
            Edge::normal("e2", "a", "c"),
            Edge::normal("e3", "b", "d"),
            Edge::normal("e4", "c", "d"),
        ],
    );
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.metrics.completed_nodes, 2);
    assert_eq!(report.metrics.skipped_nodes, 2);
    assert_eq!(record_status(&report, "b"), Some(NodeRunStatus::Skipped));
    assert_eq!(record_status(&report, "d"), Some(NodeRunStatus::Skipped));
}

#[tokio::test]
async fn condition_evaluation_error_skips_the_target() {
    let mut h = harness(EngineConfig::default());
    let step = Arc::new(MockNode::returning("step", ValueMap::new()));
    h.registry.register(step.clone()).unwrap();

    let workflow = make_workflow(
        vec![make_node("a", "step"), make_node("b", "step")],
        vec![Edge::conditional("e1", "a", "b", "not a valid expression")],
    );
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(record_status(&report, "b"), Some(NodeRunStatus::Skipped));
    assert_eq!(step.call_count(), 1);
}

// ---------------------------------------------------------------------------
// Failures, timeouts, cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plugin_failure_aborts_the_graph() {
    let mut h = harness(EngineConfig::default());
    let src = Arc::new(MockNode::returning("src", ValueMap::new()));
    let boom = Arc::new(MockNode::failing("boom", "boom"));
    let sink = Arc::new(MockNode::returning("sink", ValueMap::new()));
    h.registry.register(src).unwrap();
    h.registry.register(boom).unwrap();
    h.registry.register(sink.clone()).unwrap();

    let workflow = make_workflow(
        vec![
            make_node("a", "src"),
            make_node("b", "boom"),
            make_node("c", "sink"),
        ],
        vec![Edge::normal("e1", "a", "b"), Edge::normal("e2", "b", "c")],
    );
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Failed);
    assert!(report.error_msg.as_deref().unwrap().contains("boom"));
    assert_eq!(report.error_code.as_deref(), Some("plugin_error"));
    assert_eq!(record_status(&report, "b"), Some(NodeRunStatus::Failed));
    assert_eq!(record_status(&report, "c"), None, "c has no node record");
    assert_eq!(sink.call_count(), 0);
    assert!(
        report.metrics.completed_nodes + report.metrics.failed_nodes
            + report.metrics.skipped_nodes
            <= report.metrics.total_nodes
    );
}

#[tokio::test]
async fn missing_plugin_fails_the_execution() {
    let mut h = harness(EngineConfig::default());
    let workflow = make_workflow(vec![make_node("a", "nowhere")], vec![]);
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(report.error_code.as_deref(), Some("plugin_not_found"));
}

#[tokio::test]
async fn node_timeout_fails_with_a_timeout_code() {
    let mut h = harness(EngineConfig::default());
    let slow = Arc::new(MockNode::sleeping(
        "slow",
        Duration::from_secs(10),
        ValueMap::new(),
    ));
    h.registry.register(slow).unwrap();

    let mut node = make_node("a", "slow");
    node.config = Some(NodeConfig {
        timeout_ms: Some(50),
        ..NodeConfig::default()
    });
    let workflow = make_workflow(vec![node], vec![]);
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(report.error_code.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn cancellation_stops_in_flight_nodes_and_blocks_downstream() {
    let mut h = harness(EngineConfig::default());
    let src = Arc::new(MockNode::returning("src", ValueMap::new()));
    let slow = Arc::new(MockNode::sleeping(
        "slow",
        Duration::from_secs(10),
        ValueMap::new(),
    ));
    let sink = Arc::new(MockNode::returning("sink", ValueMap::new()));
    h.registry.register(src).unwrap();
    h.registry.register(slow).unwrap();
    h.registry.register(sink.clone()).unwrap();

    let workflow = make_workflow(
        vec![
            make_node("a", "src"),
            make_node("b", "slow"),
            make_node("c", "sink"),
        ],
        vec![Edge::normal("e1", "a", "b"), Edge::normal("e2", "b", "c")],
    );
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    // Let 'a' finish and 'b' get in flight, then cancel.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = h.engine.execution_status(&execution.id).unwrap();
    assert_eq!(snapshot.node_states["b"], NodeRunStatus::Running);
    assert!(h.engine.active_executions().contains(&execution.id));

    h.engine.cancel_execution(&execution.id).unwrap();
    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Cancelled);
    assert_eq!(record_status(&report, "b"), Some(NodeRunStatus::Cancelled));
    assert_eq!(record_status(&report, "c"), None);
    assert_eq!(sink.call_count(), 0);

    // Deregistered after termination.
    assert!(h.engine.active_executions().is_empty());
    assert!(matches!(
        h.engine.cancel_execution(&execution.id),
        Err(EngineError::ExecutionNotFound(_))
    ));
}

#[tokio::test]
async fn engine_stop_cancels_all_executions_and_drains() {
    let mut h = harness(EngineConfig::default());
    let slow = Arc::new(MockNode::sleeping(
        "slow",
        Duration::from_secs(10),
        ValueMap::new(),
    ));
    h.registry.register(slow).unwrap();

    let workflow = make_workflow(vec![make_node("a", "slow")], vec![]);
    let execution = Execution::new(workflow.id.clone(), "1.0.0");
    h.engine.execute_workflow(workflow, &execution).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.engine.stop().await.unwrap();

    let report = next_report(&mut h.reports).await;
    assert_eq!(report.status, ExecutionStatus::Cancelled);
    assert!(h.engine.active_executions().is_empty());
}
