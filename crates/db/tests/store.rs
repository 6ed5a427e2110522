//! Store integration tests against a real on-disk SQLite database.

use chrono::{Duration, Utc};
use engine::models::{
    Edge, Execution, ExecutionNodeRecord, ExecutionStatus, MissedRunPolicy, Node, NodeRunStatus,
    NodeType, ScheduleType, TriggerType, Workflow, WorkflowConfig, WorkflowSchedule,
    WorkflowStatistics, WorkflowStatus,
};
use serde_json::json;

use db::repository::{executions as exec_repo, workflows as wf_repo};
use db::{DbError, DbPool};

async fn test_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let pool = db::pool::create_pool(&url, 4).await.expect("pool");
    db::pool::run_migrations(&pool).await.expect("migrations");
    (dir, pool)
}

fn sample_workflow() -> Workflow {
    let mut workflow = Workflow::new("etl-pipeline");
    workflow.description = "loads, filters, logs".into();
    workflow.tags = vec!["etl".into(), "demo".into()];
    workflow.priority = 5;

    let node = Node {
        id: "extract".into(),
        name: "Extract".into(),
        description: "static source".into(),
        kind: NodeType::Datasource,
        plugin: "static_data".into(),
        dependencies: Vec::new(),
        config: None,
        ui_config: Some(json!({"x": 10, "y": 20})),
    };
    let sink = Node {
        id: "log".into(),
        name: "Log".into(),
        description: String::new(),
        kind: NodeType::Output,
        plugin: "logger".into(),
        dependencies: Vec::new(),
        config: None,
        ui_config: None,
    };
    workflow.nodes.insert(node.id.clone(), node);
    workflow.nodes.insert(sink.id.clone(), sink);
    workflow.edges = vec![Edge::conditional("e1", "extract", "log", "extract_count > 0")];

    workflow.schedule = Some(WorkflowSchedule {
        kind: ScheduleType::Interval,
        cron_expression: String::new(),
        timezone: "UTC".into(),
        interval_ms: Some(60_000),
        execute_at: None,
        enabled: true,
        start_time: None,
        end_time: None,
        max_instances: 2,
        missed_run_policy: MissedRunPolicy::RunOnce,
    });
    workflow.config = Some(WorkflowConfig {
        task_timeout_ms: Some(5_000),
        variables: [("env".to_string(), json!("test"))].into(),
        ..WorkflowConfig::default()
    });
    workflow.statistics = Some(WorkflowStatistics {
        total_executions: 4,
        successful_runs: 3,
        failed_runs: 1,
        success_rate: 0.75,
        average_exec_time_ms: 120,
        last_execution_time: None,
        next_execution_time: None,
    });
    workflow
}

fn sample_execution(workflow_id: &str) -> Execution {
    let mut execution = Execution::new(workflow_id, "1.0.0");
    execution.name = "nightly run".into();
    execution.trigger_type = TriggerType::Api;
    execution.trigger_by = "tester".into();
    execution.trigger.insert("reason".into(), json!("smoke"));
    execution
        .context
        .variables
        .insert("seed".into(), json!(7));
    execution.context.input.insert("limit".into(), json!(10));
    execution
        .context
        .environment
        .insert("REGION".into(), "eu".into());
    let mut record = ExecutionNodeRecord::new("extract", "Extract", NodeRunStatus::Completed);
    record.duration_ms = 42;
    record.output.insert("count".into(), json!(3));
    record.logs.push("emitted 3 records".into());
    execution.nodes.push(record);
    execution.metrics.total_nodes = 2;
    execution.metrics.completed_nodes = 1;
    execution.tags = vec!["smoke".into()];
    execution
}

// ---------------------------------------------------------------------------
// Round-trip laws
// ---------------------------------------------------------------------------

#[tokio::test]
async fn workflow_round_trips_through_the_store() {
    let (_dir, pool) = test_pool().await;
    let workflow = sample_workflow();
    wf_repo::create_workflow(&pool, &workflow).await.unwrap();

    let loaded = wf_repo::get_workflow(&pool, &workflow.id).await.unwrap();
    assert_eq!(loaded.id, workflow.id);
    assert_eq!(loaded.name, workflow.name);
    assert_eq!(loaded.status, workflow.status);
    assert_eq!(loaded.tags, workflow.tags);
    assert_eq!(
        serde_json::to_value(&loaded.nodes).unwrap(),
        serde_json::to_value(&workflow.nodes).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&loaded.edges).unwrap(),
        serde_json::to_value(&workflow.edges).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&loaded.schedule).unwrap(),
        serde_json::to_value(&workflow.schedule).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&loaded.config).unwrap(),
        serde_json::to_value(&workflow.config).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&loaded.statistics).unwrap(),
        serde_json::to_value(&workflow.statistics).unwrap()
    );
}

#[tokio::test]
async fn execution_round_trips_through_the_store() {
    let (_dir, pool) = test_pool().await;
    let workflow = sample_workflow();
    wf_repo::create_workflow(&pool, &workflow).await.unwrap();
    let execution = sample_execution(&workflow.id);
    exec_repo::create_execution(&pool, &execution).await.unwrap();

    let loaded = exec_repo::get_execution(&pool, &execution.id).await.unwrap();
    assert_eq!(loaded.workflow_id, execution.workflow_id);
    assert_eq!(loaded.workflow_version, execution.workflow_version);
    assert_eq!(loaded.trigger_type, execution.trigger_type);
    assert_eq!(loaded.tags, execution.tags);
    assert_eq!(
        serde_json::to_value(&loaded.trigger).unwrap(),
        serde_json::to_value(&execution.trigger).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&loaded.context).unwrap(),
        serde_json::to_value(&execution.context).unwrap()
    );
    assert_eq!(
        serde_json::to_value(&loaded.nodes).unwrap(),
        serde_json::to_value(&execution.nodes).unwrap()
    );
    assert_eq!(loaded.metrics, execution.metrics);
}

// ---------------------------------------------------------------------------
// Status handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_status_is_coerced_on_read() {
    let (_dir, pool) = test_pool().await;
    let workflow = sample_workflow();
    wf_repo::create_workflow(&pool, &workflow).await.unwrap();
    let execution = sample_execution(&workflow.id);
    exec_repo::create_execution(&pool, &execution).await.unwrap();

    sqlx::query("UPDATE workflows SET status = '' WHERE id = ?")
        .bind(&workflow.id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE executions SET status = '' WHERE id = ?")
        .bind(&execution.id)
        .execute(&pool)
        .await
        .unwrap();

    let loaded = wf_repo::get_workflow(&pool, &workflow.id).await.unwrap();
    assert_eq!(loaded.status, WorkflowStatus::Inactive);
    let loaded = exec_repo::get_execution(&pool, &execution.id).await.unwrap();
    assert_eq!(loaded.status, ExecutionStatus::Pending);
}

#[tokio::test]
async fn status_update_leaves_blobs_untouched() {
    let (_dir, pool) = test_pool().await;
    let workflow = sample_workflow();
    wf_repo::create_workflow(&pool, &workflow).await.unwrap();

    wf_repo::update_workflow_status(&pool, &workflow.id, WorkflowStatus::Active)
        .await
        .unwrap();

    let loaded = wf_repo::get_workflow(&pool, &workflow.id).await.unwrap();
    assert_eq!(loaded.status, WorkflowStatus::Active);
    assert_eq!(loaded.nodes.len(), 2, "nodes blob untouched");
    assert_eq!(loaded.edges.len(), 1, "edges blob untouched");
}

// ---------------------------------------------------------------------------
// Delete, list, cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_workflow_removes_child_executions_transactionally() {
    let (_dir, pool) = test_pool().await;
    let workflow = sample_workflow();
    wf_repo::create_workflow(&pool, &workflow).await.unwrap();
    for _ in 0..2 {
        let execution = sample_execution(&workflow.id);
        exec_repo::create_execution(&pool, &execution).await.unwrap();
    }

    wf_repo::delete_workflow(&pool, &workflow.id).await.unwrap();

    assert!(matches!(
        wf_repo::get_workflow(&pool, &workflow.id).await,
        Err(DbError::NotFound)
    ));
    let remaining = exec_repo::list_executions(&pool, Some(workflow.id.as_str()), None, 0, 10)
        .await
        .unwrap();
    assert!(remaining.is_empty());

    // Deleting again reports not-found.
    assert!(matches!(
        wf_repo::delete_workflow(&pool, &workflow.id).await,
        Err(DbError::NotFound)
    ));
}

#[tokio::test]
async fn list_executions_filters_orders_and_paginates() {
    let (_dir, pool) = test_pool().await;
    let workflow = sample_workflow();
    wf_repo::create_workflow(&pool, &workflow).await.unwrap();

    let base = Utc::now();
    for (i, status) in [
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Completed,
    ]
    .into_iter()
    .enumerate()
    {
        let mut execution = sample_execution(&workflow.id);
        execution.status = status;
        execution.created_at = base + Duration::seconds(i as i64);
        exec_repo::create_execution(&pool, &execution).await.unwrap();
    }

    let all = exec_repo::list_executions(&pool, Some(workflow.id.as_str()), None, 0, 10)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    // Newest first.
    assert!(all[0].created_at >= all[1].created_at);
    assert!(all[1].created_at >= all[2].created_at);

    let completed =
        exec_repo::list_executions(&pool, Some(workflow.id.as_str()), Some(ExecutionStatus::Completed), 0, 10)
            .await
            .unwrap();
    assert_eq!(completed.len(), 2);

    let page = exec_repo::list_executions(&pool, Some(workflow.id.as_str()), None, 1, 1)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, all[1].id);

    let total = exec_repo::count_executions(&pool, Some(workflow.id.as_str()), None)
        .await
        .unwrap();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn cleanup_removes_old_terminal_executions_up_to_the_cap() {
    let (_dir, pool) = test_pool().await;
    let workflow = sample_workflow();
    wf_repo::create_workflow(&pool, &workflow).await.unwrap();

    let old = Utc::now() - Duration::days(30);
    for status in [
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
        // Still live: must survive any cleanup.
        ExecutionStatus::Running,
    ] {
        let mut execution = sample_execution(&workflow.id);
        execution.status = status;
        execution.created_at = old;
        exec_repo::create_execution(&pool, &execution).await.unwrap();
    }

    let removed = exec_repo::cleanup_executions(&pool, Utc::now() - Duration::days(7), 2)
        .await
        .unwrap();
    assert_eq!(removed, 2, "capped at two rows");

    let removed = exec_repo::cleanup_executions(&pool, Utc::now() - Duration::days(7), 10)
        .await
        .unwrap();
    assert_eq!(removed, 1, "one terminal row left");

    let survivors = exec_repo::list_executions(&pool, Some(workflow.id.as_str()), None, 0, 10)
        .await
        .unwrap();
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].status, ExecutionStatus::Running);
}

#[tokio::test]
async fn count_active_executions_sees_pending_and_running_only() {
    let (_dir, pool) = test_pool().await;
    let workflow = sample_workflow();
    wf_repo::create_workflow(&pool, &workflow).await.unwrap();

    for status in [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Completed,
    ] {
        let mut execution = sample_execution(&workflow.id);
        execution.status = status;
        exec_repo::create_execution(&pool, &execution).await.unwrap();
    }

    let active = exec_repo::count_active_executions(&pool, &workflow.id)
        .await
        .unwrap();
    assert_eq!(active, 2);
}
