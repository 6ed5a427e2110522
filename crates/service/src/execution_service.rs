//! Execution service: trigger, cancel, retry, progress, logs, cleanup, and
//! the completion loop that folds engine reports back into the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use db::repository::executions as exec_repo;
use db::{DbError, DbPool};
use engine::models::{
    Execution, ExecutionStatus, TriggerType, Workflow,
};
use engine::{EngineError, ExecutionReport, StateManager, WorkflowEngine};
use nodes::ValueMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{ServiceError, WorkflowService};

/// Parameters of a trigger request (manual, API, or scheduler-issued).
#[derive(Debug, Clone, Default)]
pub struct TriggerRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger_type: Option<TriggerType>,
    pub trigger_by: Option<String>,
    pub trigger: ValueMap,
    pub variables: ValueMap,
    pub input: ValueMap,
    pub priority: Option<i32>,
}

pub struct ExecutionService {
    pool: DbPool,
    state: Arc<StateManager>,
    engine: WorkflowEngine,
    workflows: Arc<WorkflowService>,
}

impl ExecutionService {
    pub fn new(
        pool: DbPool,
        state: Arc<StateManager>,
        engine: WorkflowEngine,
        workflows: Arc<WorkflowService>,
    ) -> Self {
        Self {
            pool,
            state,
            engine,
            workflows,
        }
    }

    // ------ Triggering ------

    /// Create a pending execution pinned to the workflow's current version
    /// and hand it to the engine.
    pub async fn trigger_execution(
        &self,
        workflow_id: &str,
        request: TriggerRequest,
    ) -> Result<Execution, ServiceError> {
        let workflow = self.workflows.get_workflow(workflow_id).await?;
        if !workflow.is_active() {
            return Err(ServiceError::WorkflowNotActive(workflow_id.to_string()));
        }

        // Per-workflow instance cap, checked when issuing the trigger.
        if let Some(max_instances) = workflow.schedule.as_ref().map(|s| s.max_instances) {
            if max_instances > 0 {
                let active = exec_repo::count_active_executions(&self.pool, workflow_id).await?;
                if active >= i64::from(max_instances) {
                    return Err(ServiceError::MaxInstancesReached(workflow_id.to_string()));
                }
            }
        }

        let mut execution = Execution::new(workflow_id, &workflow.version);
        execution.name = request
            .name
            .unwrap_or_else(|| format!("{}-{}", workflow.name, &execution.id[..8]));
        execution.description = request.description.unwrap_or_default();
        execution.trigger_type = request.trigger_type.unwrap_or_default();
        execution.trigger_by = request.trigger_by.unwrap_or_else(|| "api".to_string());
        execution.trigger = request.trigger;
        execution.priority = request.priority.unwrap_or(workflow.priority);
        execution.scheduled_at = Some(Utc::now());

        // Workflow-level defaults first, then the request's overrides.
        if let Some(config) = &workflow.config {
            execution.max_retries = config.max_retries;
            execution.context.variables.extend(config.variables.clone());
        }
        execution.context.variables.extend(request.variables);
        execution.context.input = request.input;
        execution.validate()?;

        exec_repo::create_execution(&self.pool, &execution).await?;
        info!(
            execution_id = %execution.id,
            workflow_id,
            trigger_type = %execution.trigger_type,
            "execution created"
        );

        self.start_execution(workflow, execution).await
    }

    /// Move pending → running and admit the execution into the engine.
    async fn start_execution(
        &self,
        workflow: Workflow,
        mut execution: Execution,
    ) -> Result<Execution, ServiceError> {
        // Cheap admission pre-check so a full engine leaves the row pending.
        if !self.engine.has_capacity() {
            return Err(EngineError::CapacityExceeded(self.engine.capacity()).into());
        }

        self.state
            .validate_execution_transition(execution.status, ExecutionStatus::Running)?;
        let old_status = execution.status;
        execution.start();
        execution.metrics.queue_time_ms = execution
            .started_at
            .map(|started| (started - execution.created_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        exec_repo::update_execution(&self.pool, &execution).await?;
        self.record_transition(&execution.id, old_status, ExecutionStatus::Running, "started");

        if let Err(e) = self.engine.execute_workflow(workflow, &execution) {
            // Admission failed after the row went running: fail it properly.
            self.state
                .validate_execution_transition(execution.status, ExecutionStatus::Failed)?;
            execution.fail(e.to_string(), "engine_error");
            exec_repo::update_execution(&self.pool, &execution).await?;
            self.record_transition(
                &execution.id,
                ExecutionStatus::Running,
                ExecutionStatus::Failed,
                "engine admission failed",
            );
            return Err(e.into());
        }

        Ok(execution)
    }

    // ------ Queries ------

    pub async fn get_execution(&self, id: &str) -> Result<Execution, ServiceError> {
        exec_repo::get_execution(&self.pool, id)
            .await
            .map_err(|e| not_found(e, || ServiceError::ExecutionNotFound(id.to_string())))
    }

    pub async fn list_executions(
        &self,
        workflow_id: Option<&str>,
        status: Option<ExecutionStatus>,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Execution>, i64), ServiceError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let total = exec_repo::count_executions(&self.pool, workflow_id, status).await?;
        let executions =
            exec_repo::list_executions(&self.pool, workflow_id, status, offset, page_size).await?;
        Ok((executions, total))
    }

    /// Completion percentage of an execution.
    pub async fn get_progress(&self, id: &str) -> Result<f64, ServiceError> {
        Ok(self.get_execution(id).await?.progress())
    }

    /// Log lines of one node, or of every node when `node_id` is `None`.
    pub async fn get_logs(
        &self,
        id: &str,
        node_id: Option<&str>,
    ) -> Result<Vec<String>, ServiceError> {
        let execution = self.get_execution(id).await?;
        match node_id {
            Some(node_id) => execution
                .nodes
                .iter()
                .find(|record| record.node_id == node_id)
                .map(|record| record.logs.clone())
                .ok_or_else(|| ServiceError::ExecutionNotFound(format!("{id}/{node_id}"))),
            None => Ok(execution
                .nodes
                .iter()
                .flat_map(|record| record.logs.clone())
                .collect()),
        }
    }

    // ------ Cancel / retry / cleanup ------

    /// Cancel an execution. A no-op returning the stored row when it is
    /// already terminal.
    pub async fn cancel_execution(&self, id: &str) -> Result<Execution, ServiceError> {
        let mut execution = self.get_execution(id).await?;
        if execution.is_finished() {
            return Ok(execution);
        }

        self.state
            .validate_execution_transition(execution.status, ExecutionStatus::Cancelled)?;
        let old_status = execution.status;
        execution.cancel();
        exec_repo::update_execution(&self.pool, &execution).await?;
        self.record_transition(id, old_status, ExecutionStatus::Cancelled, "cancelled by user");

        // The engine drops it cooperatively; gone already is fine.
        if let Err(EngineError::ExecutionNotFound(_)) = self.engine.cancel_execution(id) {}
        Ok(execution)
    }

    /// Retry a failed execution: failed → pending with the retry counter
    /// bumped and the error cleared, then a fresh engine run.
    pub async fn retry_execution(&self, id: &str) -> Result<Execution, ServiceError> {
        let mut execution = self.get_execution(id).await?;
        if !execution.can_retry() {
            return Err(EngineError::Validation(format!(
                "execution '{id}' cannot be retried (status {}, retry {}/{})",
                execution.status, execution.retry_count, execution.max_retries
            ))
            .into());
        }

        self.state
            .validate_execution_transition(execution.status, ExecutionStatus::Pending)?;
        let old_status = execution.status;
        execution.reset_for_retry();
        exec_repo::update_execution(&self.pool, &execution).await?;
        self.record_transition(id, old_status, ExecutionStatus::Pending, "retry requested");
        info!(execution_id = %id, retry_count = execution.retry_count, "execution retrying");

        let workflow = self.workflows.get_workflow(&execution.workflow_id).await?;
        self.start_execution(workflow, execution).await
    }

    /// Purge terminal executions created before the cutoff, capped.
    pub async fn cleanup_executions(
        &self,
        before: DateTime<Utc>,
        max_rows: u32,
    ) -> Result<u64, ServiceError> {
        Ok(exec_repo::cleanup_executions(&self.pool, before, max_rows).await?)
    }

    // ------ Completion loop ------

    /// Consume engine reports until the engine drops the channel.
    pub fn spawn_completion_loop(
        self: Arc<Self>,
        mut reports: mpsc::UnboundedReceiver<ExecutionReport>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(report) = reports.recv().await {
                if let Err(e) = self.handle_report(report).await {
                    error!(error = %e, "failed to apply execution report");
                }
            }
        })
    }

    /// Fold one terminal engine report into the store: status transition,
    /// node records, metrics, collected output, workflow statistics.
    pub async fn handle_report(&self, report: ExecutionReport) -> Result<(), ServiceError> {
        let mut execution = match self.get_execution(&report.execution_id).await {
            Ok(execution) => execution,
            Err(ServiceError::ExecutionNotFound(_)) => {
                warn!(execution_id = %report.execution_id, "report for unknown execution");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if execution.is_finished() {
            // Cancelled through the API while the engine was still winding
            // down: the stored row already has its terminal status, but the
            // report still carries the node records of the aborted run.
            if execution.status == ExecutionStatus::Cancelled && execution.nodes.is_empty() {
                execution.nodes = report.node_records;
                execution.metrics.total_nodes = report.metrics.total_nodes;
                execution.metrics.completed_nodes = report.metrics.completed_nodes;
                execution.metrics.failed_nodes = report.metrics.failed_nodes;
                execution.metrics.skipped_nodes = report.metrics.skipped_nodes;
                execution.context.output = report.output;
                exec_repo::update_execution(&self.pool, &execution).await?;
            }
            return Ok(());
        }

        self.state
            .validate_execution_transition(execution.status, report.status)?;
        let old_status = execution.status;
        match report.status {
            ExecutionStatus::Completed => execution.complete(),
            ExecutionStatus::Cancelled => execution.cancel(),
            _ => execution.fail(
                report.error_msg.clone().unwrap_or_default(),
                report.error_code.clone().unwrap_or_else(|| "error".into()),
            ),
        }

        execution.nodes = report.node_records;
        execution.metrics.total_nodes = report.metrics.total_nodes;
        execution.metrics.completed_nodes = report.metrics.completed_nodes;
        execution.metrics.failed_nodes = report.metrics.failed_nodes;
        execution.metrics.skipped_nodes = report.metrics.skipped_nodes;
        execution.context.output = report.output;

        exec_repo::update_execution(&self.pool, &execution).await?;
        let reason = match report.status {
            ExecutionStatus::Completed => "execution completed".to_string(),
            ExecutionStatus::Cancelled => "execution cancelled".to_string(),
            _ => format!(
                "execution failed: {}",
                execution.error_msg.as_deref().unwrap_or("")
            ),
        };
        self.record_transition(&execution.id, old_status, report.status, &reason);

        // Cancelled runs don't count towards success/failure statistics.
        if matches!(
            report.status,
            ExecutionStatus::Completed | ExecutionStatus::Failed
        ) {
            let duration_ms = execution.metrics.execution_time_ms;
            let success = report.status == ExecutionStatus::Completed;
            if let Err(e) = self
                .workflows
                .record_run_statistics(&execution.workflow_id, duration_ms, success)
                .await
            {
                warn!(workflow_id = %execution.workflow_id, error = %e, "failed to update workflow statistics");
            }
        }
        Ok(())
    }

    fn record_transition(
        &self,
        execution_id: &str,
        from: ExecutionStatus,
        to: ExecutionStatus,
        reason: &str,
    ) {
        if let Err(e) =
            self.state
                .record_execution_transition(execution_id, from, to, reason, "system")
        {
            warn!(execution_id, error = %e, "failed to record state transition");
        }
    }
}

fn not_found(e: DbError, to: impl FnOnce() -> ServiceError) -> ServiceError {
    match e {
        DbError::NotFound => to(),
        other => ServiceError::Db(other),
    }
}
