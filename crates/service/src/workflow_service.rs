//! Workflow service: CRUD, status controls, graph validation on activation,
//! scheduler binding, and statistics.
//!
//! Every status change follows the same discipline: read the entity, propose
//! the transition to the state manager, mutate, persist, record in the
//! transition log.

use std::sync::Arc;

use chrono::Utc;
use db::repository::workflows as wf_repo;
use db::{DbError, DbPool};
use engine::models::{
    ScheduleType, Workflow, WorkflowSchedule, WorkflowStatistics, WorkflowStatus,
};
use engine::scheduler::parse_cron;
use engine::{validate_dag, EngineError, Scheduler, StateManager};
use tracing::{info, warn};

use crate::ServiceError;

pub struct WorkflowService {
    pool: DbPool,
    state: Arc<StateManager>,
    scheduler: Scheduler,
}

impl WorkflowService {
    pub fn new(pool: DbPool, state: Arc<StateManager>, scheduler: Scheduler) -> Self {
        Self {
            pool,
            state,
            scheduler,
        }
    }

    // ------ CRUD ------

    /// Create a workflow. Missing id/version/statistics get defaults; status
    /// starts `inactive`.
    pub async fn create_workflow(&self, mut workflow: Workflow) -> Result<Workflow, ServiceError> {
        if workflow.id.is_empty() {
            workflow.id = uuid::Uuid::new_v4().to_string();
        }
        if workflow.version.is_empty() {
            workflow.version = "1.0.0".to_string();
        }
        workflow.status = WorkflowStatus::Inactive;
        if workflow.statistics.is_none() {
            workflow.statistics = Some(WorkflowStatistics::default());
        }
        if let Some(schedule) = &workflow.schedule {
            validate_schedule(schedule)?;
        }
        workflow.validate()?;

        let now = Utc::now();
        workflow.created_at = now;
        workflow.updated_at = now;

        wf_repo::create_workflow(&self.pool, &workflow).await?;
        info!(workflow_id = %workflow.id, name = %workflow.name, "workflow created");
        Ok(workflow)
    }

    pub async fn get_workflow(&self, id: &str) -> Result<Workflow, ServiceError> {
        wf_repo::get_workflow(&self.pool, id)
            .await
            .map_err(|e| not_found(e, || ServiceError::WorkflowNotFound(id.to_string())))
    }

    /// Merge the provided fields into the stored workflow, the way a partial
    /// update behaves: empty strings and `None`s leave the stored value
    /// untouched.
    pub async fn update_workflow(&self, incoming: Workflow) -> Result<Workflow, ServiceError> {
        let mut workflow = self.get_workflow(&incoming.id).await?;

        if !incoming.name.is_empty() {
            workflow.name = incoming.name;
        }
        if !incoming.description.is_empty() {
            workflow.description = incoming.description;
        }
        if !incoming.version.is_empty() {
            workflow.version = incoming.version;
        }
        if !incoming.nodes.is_empty() {
            workflow.nodes = incoming.nodes;
        }
        if !incoming.edges.is_empty() {
            workflow.edges = incoming.edges;
        }
        if let Some(schedule) = incoming.schedule {
            validate_schedule(&schedule)?;
            workflow.schedule = Some(schedule);
        }
        if incoming.config.is_some() {
            workflow.config = incoming.config;
        }
        if !incoming.tags.is_empty() {
            workflow.tags = incoming.tags;
        }
        if incoming.priority != 0 {
            workflow.priority = incoming.priority;
        }
        workflow.validate()?;
        workflow.updated_at = Utc::now();

        wf_repo::update_workflow(&self.pool, &workflow).await?;

        // An active workflow with a live schedule gets re-registered so the
        // scheduler sees the new configuration; one whose schedule went away
        // gets unregistered.
        if workflow.can_schedule() {
            self.scheduler.add_task(&workflow)?;
        } else if workflow.is_active() {
            self.unschedule(&workflow.id);
        }

        Ok(workflow)
    }

    /// Soft-delete the workflow and its executions. An active workflow is
    /// deactivated (and unscheduled) first.
    pub async fn delete_workflow(&self, id: &str) -> Result<(), ServiceError> {
        let workflow = self.get_workflow(id).await?;
        if workflow.is_active() {
            self.deactivate_workflow(id).await?;
        }
        self.unschedule(id);

        wf_repo::delete_workflow(&self.pool, id)
            .await
            .map_err(|e| not_found(e, || ServiceError::WorkflowNotFound(id.to_string())))?;
        info!(workflow_id = %id, "workflow deleted");
        Ok(())
    }

    /// Page through workflows; returns the page and the total count.
    pub async fn list_workflows(
        &self,
        status: Option<WorkflowStatus>,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Workflow>, i64), ServiceError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let total = wf_repo::count_workflows(&self.pool, status).await?;
        let workflows = wf_repo::list_workflows(&self.pool, status, offset, page_size).await?;
        Ok((workflows, total))
    }

    // ------ Status controls ------

    /// Activate: graph validation first, then the state transition, then the
    /// scheduler binding.
    pub async fn activate_workflow(&self, id: &str) -> Result<Workflow, ServiceError> {
        let workflow = self.get_workflow(id).await?;
        workflow.validate()?;
        validate_dag(&workflow)?;

        let workflow = self
            .transition(workflow, WorkflowStatus::Active, "manually activated")
            .await?;

        if workflow.can_schedule() {
            self.scheduler.add_task(&workflow)?;
        }
        Ok(workflow)
    }

    pub async fn deactivate_workflow(&self, id: &str) -> Result<Workflow, ServiceError> {
        let workflow = self.get_workflow(id).await?;
        let workflow = self
            .transition(workflow, WorkflowStatus::Inactive, "manually deactivated")
            .await?;
        self.unschedule(id);
        Ok(workflow)
    }

    pub async fn pause_workflow(&self, id: &str) -> Result<Workflow, ServiceError> {
        let workflow = self.get_workflow(id).await?;
        let workflow = self
            .transition(workflow, WorkflowStatus::Paused, "manually paused")
            .await?;
        self.unschedule(id);
        Ok(workflow)
    }

    pub async fn resume_workflow(&self, id: &str) -> Result<Workflow, ServiceError> {
        let workflow = self.get_workflow(id).await?;
        let workflow = self
            .transition(workflow, WorkflowStatus::Active, "manually resumed")
            .await?;
        if workflow.can_schedule() {
            self.scheduler.add_task(&workflow)?;
        }
        Ok(workflow)
    }

    /// Replace the schedule configuration, rebinding the scheduler when the
    /// workflow is active.
    pub async fn update_schedule(
        &self,
        id: &str,
        schedule: WorkflowSchedule,
    ) -> Result<Workflow, ServiceError> {
        validate_schedule(&schedule)?;
        let mut workflow = self.get_workflow(id).await?;

        if workflow.is_active() {
            self.unschedule(id);
        }
        workflow.schedule = Some(schedule);
        workflow.updated_at = Utc::now();
        wf_repo::update_workflow(&self.pool, &workflow).await?;

        if workflow.can_schedule() {
            self.scheduler.add_task(&workflow)?;
        }
        Ok(workflow)
    }

    // ------ Statistics ------

    /// Fold a finished run into the workflow statistics (counters, success
    /// rate, moving-average duration).
    pub async fn record_run_statistics(
        &self,
        workflow_id: &str,
        duration_ms: u64,
        success: bool,
    ) -> Result<(), ServiceError> {
        let mut workflow = self.get_workflow(workflow_id).await?;
        workflow.record_run(duration_ms, success);
        wf_repo::update_workflow(&self.pool, &workflow).await?;
        Ok(())
    }

    pub async fn get_statistics(&self, id: &str) -> Result<WorkflowStatistics, ServiceError> {
        let workflow = self.get_workflow(id).await?;
        Ok(workflow.statistics.unwrap_or_default())
    }

    // ------ Internals ------

    /// The state-change wrapper: propose to the state manager, persist the
    /// status column, record the transition.
    async fn transition(
        &self,
        mut workflow: Workflow,
        target: WorkflowStatus,
        reason: &str,
    ) -> Result<Workflow, ServiceError> {
        self.state
            .validate_workflow_transition(workflow.status, target)?;

        let old_status = workflow.status;
        workflow.status = target;
        workflow.updated_at = Utc::now();
        wf_repo::update_workflow_status(&self.pool, &workflow.id, target).await?;

        if let Err(e) =
            self.state
                .record_workflow_transition(&workflow.id, old_status, target, reason, "system")
        {
            // Already validated above; a failure here is log-only.
            warn!(workflow_id = %workflow.id, error = %e, "failed to record state transition");
        }
        info!(workflow_id = %workflow.id, from = %old_status, to = %target, "workflow transitioned");
        Ok(workflow)
    }

    fn unschedule(&self, workflow_id: &str) {
        if let Err(EngineError::TaskNotFound(_)) = self.scheduler.remove_task(workflow_id) {
            // Nothing was registered; fine.
        }
    }
}

/// Validate a schedule configuration before accepting it.
fn validate_schedule(schedule: &WorkflowSchedule) -> Result<(), ServiceError> {
    match schedule.kind {
        ScheduleType::Cron => {
            if schedule.cron_expression.is_empty() {
                return Err(EngineError::EmptyCron.into());
            }
            parse_cron(&schedule.cron_expression)?;
        }
        ScheduleType::Interval => {
            if schedule.interval().filter(|d| !d.is_zero()).is_none() {
                return Err(
                    EngineError::InvalidSchedule("interval must be positive".into()).into(),
                );
            }
        }
        ScheduleType::Once => {
            let execute_at = schedule
                .execute_at
                .ok_or_else(|| EngineError::InvalidSchedule("execute_at is required".into()))?;
            if execute_at <= Utc::now() {
                return Err(
                    EngineError::InvalidSchedule("execute_at must be in the future".into()).into(),
                );
            }
        }
        ScheduleType::Manual => {}
    }

    if schedule.max_instances == 0 {
        return Err(EngineError::InvalidSchedule("max_instances must be positive".into()).into());
    }
    if let (Some(start), Some(end)) = (schedule.start_time, schedule.end_time) {
        if end < start {
            return Err(
                EngineError::InvalidSchedule("end_time must be after start_time".into()).into(),
            );
        }
    }
    Ok(())
}

fn not_found(e: DbError, to: impl FnOnce() -> ServiceError) -> ServiceError {
    match e {
        DbError::NotFound => to(),
        other => ServiceError::Db(other),
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use engine::models::MissedRunPolicy;

    fn schedule(kind: ScheduleType) -> WorkflowSchedule {
        WorkflowSchedule {
            kind,
            cron_expression: String::new(),
            timezone: "UTC".into(),
            interval_ms: None,
            execute_at: None,
            enabled: true,
            start_time: None,
            end_time: None,
            max_instances: 1,
            missed_run_policy: MissedRunPolicy::Skip,
        }
    }

    #[test]
    fn cron_schedules_must_parse() {
        let mut s = schedule(ScheduleType::Cron);
        assert!(validate_schedule(&s).is_err(), "empty expression");
        s.cron_expression = "*/5 * * * *".into();
        assert!(validate_schedule(&s).is_ok());
        s.cron_expression = "not a cron".into();
        assert!(validate_schedule(&s).is_err());
    }

    #[test]
    fn interval_must_be_positive() {
        let mut s = schedule(ScheduleType::Interval);
        assert!(validate_schedule(&s).is_err());
        s.interval_ms = Some(0);
        assert!(validate_schedule(&s).is_err());
        s.interval_ms = Some(1000);
        assert!(validate_schedule(&s).is_ok());
    }

    #[test]
    fn once_must_be_in_the_future() {
        let mut s = schedule(ScheduleType::Once);
        assert!(validate_schedule(&s).is_err(), "execute_at missing");
        s.execute_at = Some(Utc::now() - chrono::Duration::seconds(10));
        assert!(validate_schedule(&s).is_err(), "in the past");
        s.execute_at = Some(Utc::now() + chrono::Duration::seconds(60));
        assert!(validate_schedule(&s).is_ok());
    }

    #[test]
    fn window_and_instance_bounds() {
        let mut s = schedule(ScheduleType::Manual);
        s.max_instances = 0;
        assert!(validate_schedule(&s).is_err());

        s.max_instances = 1;
        let now = Utc::now();
        s.start_time = Some(now);
        s.end_time = Some(now - chrono::Duration::seconds(1));
        assert!(validate_schedule(&s).is_err(), "end before start");
    }
}
