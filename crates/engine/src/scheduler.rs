//! Ticked workflow scheduler.
//!
//! A single loop wakes every `tick_interval`, snapshots the registered tasks
//! under a read lock, and fires every task whose next-run time has passed.
//! A fire emits a [`ScheduleFire`] event on an unbounded channel; the service
//! layer consumes those and invokes the manual-trigger path with
//! `TriggerType::Schedule`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::{MissedRunPolicy, ScheduleType, Workflow, WorkflowSchedule};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the loop checks for due tasks.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Stopped,
    Running,
    Stopping,
}

/// Emitted when a scheduled task fires.
#[derive(Debug, Clone)]
pub struct ScheduleFire {
    pub workflow_id: String,
    pub fired_at: DateTime<Utc>,
    pub run_count: i64,
}

/// One registered task, keyed by workflow id.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub workflow_id: String,
    pub workflow_name: String,
    pub schedule: WorkflowSchedule,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: i64,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Next-run computation
// ---------------------------------------------------------------------------

/// Result of a next-run computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRun {
    At(DateTime<Utc>),
    /// Manual schedules: the task never fires on its own.
    Never,
    /// The task is done (once fired, or past its end time).
    Disable,
}

/// Compute when a schedule fires next.
///
/// `previous` is the slot that just fired (None when the task is first
/// registered); under the `run_once` missed-run policy the next slot advances
/// from it, so a backlog refires on subsequent ticks, while `skip` always
/// advances past `now`.
pub fn compute_next_run(
    schedule: &WorkflowSchedule,
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<NextRun, EngineError> {
    let base = match (schedule.missed_run_policy, previous) {
        (MissedRunPolicy::RunOnce, Some(prev)) => prev,
        _ => now,
    };

    let next = match schedule.kind {
        ScheduleType::Cron => {
            if schedule.cron_expression.is_empty() {
                return Err(EngineError::EmptyCron);
            }
            let cron = parse_cron(&schedule.cron_expression)?;
            match cron.after(&base).next() {
                Some(next) => next,
                None => return Ok(NextRun::Disable),
            }
        }
        ScheduleType::Interval => {
            let interval = schedule
                .interval()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| EngineError::InvalidSchedule("interval must be positive".into()))?;
            base + chrono::Duration::from_std(interval)
                .map_err(|e| EngineError::InvalidSchedule(e.to_string()))?
        }
        ScheduleType::Once => {
            if previous.is_some() {
                // A once task is done after its single fire.
                return Ok(NextRun::Disable);
            }
            schedule
                .execute_at
                .ok_or_else(|| EngineError::InvalidSchedule("execute_at is required".into()))?
        }
        ScheduleType::Manual => return Ok(NextRun::Never),
    };

    // Time-window clamp.
    let next = match schedule.start_time {
        Some(start) if next < start => start,
        _ => next,
    };
    if let Some(end) = schedule.end_time {
        if next > end {
            return Ok(NextRun::Disable);
        }
    }

    Ok(NextRun::At(next))
}

/// Parse a cron expression, accepting the standard 5-field form by
/// prepending a seconds field.
pub fn parse_cron(expression: &str) -> Result<CronSchedule, EngineError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(EngineError::EmptyCron);
    }
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    CronSchedule::from_str(&normalized)
        .map_err(|e| EngineError::InvalidSchedule(format!("bad cron expression: {e}")))
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct SchedulerInner {
    status: Mutex<SchedulerStatus>,
    tasks: RwLock<HashMap<String, Arc<Mutex<ScheduledTask>>>>,
    tick_interval: Duration,
    fire_tx: mpsc::UnboundedSender<ScheduleFire>,
    stop_token: Mutex<CancellationToken>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

/// The ticked scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Build a scheduler and hand back the fire-event receiver the service
    /// layer consumes.
    pub fn new(config: SchedulerConfig) -> (Self, mpsc::UnboundedReceiver<ScheduleFire>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            inner: Arc::new(SchedulerInner {
                status: Mutex::new(SchedulerStatus::Stopped),
                tasks: RwLock::new(HashMap::new()),
                tick_interval: config.tick_interval,
                fire_tx,
                stop_token: Mutex::new(CancellationToken::new()),
                loop_handle: Mutex::new(None),
            }),
        };
        (scheduler, fire_rx)
    }

    pub fn status(&self) -> SchedulerStatus {
        *self.inner.status.lock().unwrap()
    }

    /// Arm the ticker and launch the scheduling loop.
    pub fn start(&self) -> Result<(), EngineError> {
        {
            let mut status = self.inner.status.lock().unwrap();
            if *status == SchedulerStatus::Running {
                return Err(EngineError::SchedulerAlreadyRunning);
            }
            *status = SchedulerStatus::Running;
        }

        let token = CancellationToken::new();
        *self.inner.stop_token.lock().unwrap() = token.clone();

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + inner.tick_interval;
            let mut ticker = tokio::time::interval_at(start, inner.tick_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => check_and_fire(&inner),
                }
            }
        });
        *self.inner.loop_handle.lock().unwrap() = Some(handle);

        info!("scheduler started");
        Ok(())
    }

    /// Stop the loop and wait for it to drain.
    pub async fn stop(&self) -> Result<(), EngineError> {
        {
            let mut status = self.inner.status.lock().unwrap();
            if *status != SchedulerStatus::Running {
                return Err(EngineError::SchedulerNotRunning);
            }
            *status = SchedulerStatus::Stopping;
        }

        self.inner.stop_token.lock().unwrap().cancel();
        let handle = self.inner.loop_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        *self.inner.status.lock().unwrap() = SchedulerStatus::Stopped;
        info!("scheduler stopped");
        Ok(())
    }

    /// Register (or replace) the task for a workflow. The workflow must
    /// carry an enabled schedule.
    pub fn add_task(&self, workflow: &Workflow) -> Result<(), EngineError> {
        let schedule = workflow
            .schedule
            .as_ref()
            .filter(|s| s.enabled)
            .ok_or_else(|| EngineError::ScheduleNotEnabled(workflow.id.clone()))?;

        let now = Utc::now();
        let (next_run, enabled) = match compute_next_run(schedule, None, now)? {
            NextRun::At(at) => (Some(at), true),
            NextRun::Never => (None, true),
            NextRun::Disable => (None, false),
        };

        let task = ScheduledTask {
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            schedule: schedule.clone(),
            next_run,
            last_run: None,
            run_count: 0,
            enabled,
        };

        self.inner
            .tasks
            .write()
            .unwrap()
            .insert(workflow.id.clone(), Arc::new(Mutex::new(task)));
        info!(workflow_id = %workflow.id, next_run = ?next_run, "scheduled task registered");
        Ok(())
    }

    /// Deregister a workflow's task.
    pub fn remove_task(&self, workflow_id: &str) -> Result<(), EngineError> {
        let removed = self.inner.tasks.write().unwrap().remove(workflow_id);
        match removed {
            Some(_) => {
                info!(workflow_id, "scheduled task removed");
                Ok(())
            }
            None => Err(EngineError::TaskNotFound(workflow_id.to_string())),
        }
    }

    pub fn has_task(&self, workflow_id: &str) -> bool {
        self.inner.tasks.read().unwrap().contains_key(workflow_id)
    }

    /// Snapshot of every registered task.
    pub fn tasks(&self) -> Vec<ScheduledTask> {
        self.inner
            .tasks
            .read()
            .unwrap()
            .values()
            .map(|task| task.lock().unwrap().clone())
            .collect()
    }

    /// Run one tick by hand. Tests use this to avoid real timers.
    pub fn tick_once(&self) {
        check_and_fire(&self.inner);
    }
}

/// One tick: snapshot due tasks under the read lock, then fire each outside
/// it.
fn check_and_fire(inner: &SchedulerInner) {
    let now = Utc::now();
    let due: Vec<Arc<Mutex<ScheduledTask>>> = {
        let tasks = inner.tasks.read().unwrap();
        tasks
            .values()
            .filter(|task| {
                let task = task.lock().unwrap();
                task.enabled && task.next_run.map(|next| next <= now).unwrap_or(false)
            })
            .cloned()
            .collect()
    };

    for task in due {
        fire_task(inner, &task, now);
    }
}

fn fire_task(inner: &SchedulerInner, task: &Arc<Mutex<ScheduledTask>>, now: DateTime<Utc>) {
    let mut task = task.lock().unwrap();

    // Re-check under the task lock; another tick may have advanced it.
    let due = task.enabled && task.next_run.map(|next| next <= now).unwrap_or(false);
    if !due {
        return;
    }

    let fired_slot = task.next_run;
    task.last_run = Some(now);
    task.run_count += 1;

    match compute_next_run(&task.schedule, fired_slot, now) {
        Ok(NextRun::At(next)) => task.next_run = Some(next),
        Ok(NextRun::Never) => task.next_run = None,
        Ok(NextRun::Disable) => {
            task.next_run = None;
            task.enabled = false;
        }
        Err(e) => {
            warn!(workflow_id = %task.workflow_id, error = %e, "failed to compute next run, disabling task");
            task.next_run = None;
            task.enabled = false;
        }
    }

    info!(workflow_id = %task.workflow_id, run_count = task.run_count, "schedule fired");
    let _ = inner.fire_tx.send(ScheduleFire {
        workflow_id: task.workflow_id.clone(),
        fired_at: now,
        run_count: task.run_count,
    });
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Workflow;

    fn interval_schedule(interval_ms: u64) -> WorkflowSchedule {
        WorkflowSchedule {
            kind: ScheduleType::Interval,
            cron_expression: String::new(),
            timezone: "UTC".into(),
            interval_ms: Some(interval_ms),
            execute_at: None,
            enabled: true,
            start_time: None,
            end_time: None,
            max_instances: 1,
            missed_run_policy: MissedRunPolicy::Skip,
        }
    }

    fn scheduled_workflow(interval_ms: u64) -> Workflow {
        let mut workflow = Workflow::new("ticker");
        workflow.schedule = Some(interval_schedule(interval_ms));
        workflow
    }

    #[test]
    fn interval_next_run_advances_from_now() {
        let now = Utc::now();
        let schedule = interval_schedule(1000);
        match compute_next_run(&schedule, None, now).unwrap() {
            NextRun::At(next) => assert_eq!(next, now + chrono::Duration::milliseconds(1000)),
            other => panic!("expected a fire time, got {other:?}"),
        }
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        let mut schedule = interval_schedule(0);
        assert!(compute_next_run(&schedule, None, Utc::now()).is_err());
        schedule.interval_ms = None;
        assert!(compute_next_run(&schedule, None, Utc::now()).is_err());
    }

    #[test]
    fn run_once_policy_advances_from_the_missed_slot() {
        let now = Utc::now();
        let mut schedule = interval_schedule(1000);
        schedule.missed_run_policy = MissedRunPolicy::RunOnce;

        // The fired slot is five intervals in the past: the next run is one
        // interval after it, still behind now, so the task refires next tick.
        let missed = now - chrono::Duration::milliseconds(5000);
        match compute_next_run(&schedule, Some(missed), now).unwrap() {
            NextRun::At(next) => {
                assert_eq!(next, missed + chrono::Duration::milliseconds(1000));
                assert!(next < now);
            }
            other => panic!("expected a fire time, got {other:?}"),
        }
    }

    #[test]
    fn skip_policy_advances_past_now() {
        let now = Utc::now();
        let schedule = interval_schedule(1000);
        let missed = now - chrono::Duration::milliseconds(5000);
        match compute_next_run(&schedule, Some(missed), now).unwrap() {
            NextRun::At(next) => assert!(next > now),
            other => panic!("expected a fire time, got {other:?}"),
        }
    }

    #[test]
    fn cron_five_field_is_normalized() {
        let schedule = WorkflowSchedule {
            kind: ScheduleType::Cron,
            cron_expression: "*/5 * * * *".into(),
            ..interval_schedule(0)
        };
        let now = Utc::now();
        match compute_next_run(&schedule, None, now).unwrap() {
            NextRun::At(next) => {
                assert!(next > now);
                assert_eq!(next.timestamp() % 300, 0, "five-minute boundary");
            }
            other => panic!("expected a fire time, got {other:?}"),
        }
    }

    #[test]
    fn empty_cron_is_rejected() {
        let schedule = WorkflowSchedule {
            kind: ScheduleType::Cron,
            cron_expression: String::new(),
            ..interval_schedule(0)
        };
        assert!(matches!(
            compute_next_run(&schedule, None, Utc::now()),
            Err(EngineError::EmptyCron)
        ));
    }

    #[test]
    fn once_fires_a_single_time() {
        let at = Utc::now() + chrono::Duration::seconds(60);
        let schedule = WorkflowSchedule {
            kind: ScheduleType::Once,
            execute_at: Some(at),
            ..interval_schedule(0)
        };
        assert_eq!(
            compute_next_run(&schedule, None, Utc::now()).unwrap(),
            NextRun::At(at)
        );
        assert_eq!(
            compute_next_run(&schedule, Some(at), Utc::now()).unwrap(),
            NextRun::Disable
        );
    }

    #[test]
    fn manual_never_fires() {
        let schedule = WorkflowSchedule {
            kind: ScheduleType::Manual,
            ..interval_schedule(0)
        };
        assert_eq!(
            compute_next_run(&schedule, None, Utc::now()).unwrap(),
            NextRun::Never
        );
    }

    #[test]
    fn window_clamps_to_start_and_disables_past_end() {
        let now = Utc::now();
        let mut schedule = interval_schedule(1000);
        schedule.start_time = Some(now + chrono::Duration::seconds(3600));
        match compute_next_run(&schedule, None, now).unwrap() {
            NextRun::At(next) => assert_eq!(next, schedule.start_time.unwrap()),
            other => panic!("expected a fire time, got {other:?}"),
        }

        let mut schedule = interval_schedule(1000);
        schedule.end_time = Some(now - chrono::Duration::seconds(1));
        assert_eq!(
            compute_next_run(&schedule, None, now).unwrap(),
            NextRun::Disable
        );
    }

    #[tokio::test]
    async fn add_task_requires_enabled_schedule() {
        let (scheduler, _fires) = Scheduler::new(SchedulerConfig::default());
        let workflow = Workflow::new("bare");
        assert!(matches!(
            scheduler.add_task(&workflow),
            Err(EngineError::ScheduleNotEnabled(_))
        ));

        let mut workflow = scheduled_workflow(1000);
        workflow.schedule.as_mut().unwrap().enabled = false;
        assert!(scheduler.add_task(&workflow).is_err());
    }

    #[tokio::test]
    async fn remove_task_on_unknown_id_is_not_found() {
        let (scheduler, _fires) = Scheduler::new(SchedulerConfig::default());
        assert!(matches!(
            scheduler.remove_task("ghost"),
            Err(EngineError::TaskNotFound(_))
        ));

        let workflow = scheduled_workflow(1000);
        scheduler.add_task(&workflow).unwrap();
        assert!(scheduler.has_task(&workflow.id));
        scheduler.remove_task(&workflow.id).unwrap();
        assert!(!scheduler.has_task(&workflow.id));
    }

    #[tokio::test]
    async fn due_tasks_fire_and_advance() {
        let (scheduler, mut fires) = Scheduler::new(SchedulerConfig {
            tick_interval: Duration::from_millis(10),
        });
        let mut workflow = scheduled_workflow(30);
        scheduler.add_task(&workflow).unwrap();

        // Not due yet.
        scheduler.tick_once();
        assert!(fires.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.tick_once();
        let fire = fires.try_recv().expect("task should have fired");
        assert_eq!(fire.workflow_id, workflow.id);
        assert_eq!(fire.run_count, 1);

        // Immediately after firing the task is no longer due.
        scheduler.tick_once();
        assert!(fires.try_recv().is_err());

        // Re-registering replaces the task.
        workflow.schedule.as_mut().unwrap().interval_ms = Some(60_000);
        scheduler.add_task(&workflow).unwrap();
        let tasks = scheduler.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].run_count, 0);
    }

    #[tokio::test]
    async fn ticker_fires_repeatedly_at_interval_pace() {
        let (scheduler, mut fires) = Scheduler::new(SchedulerConfig {
            tick_interval: Duration::from_millis(25),
        });
        scheduler.start().unwrap();
        scheduler.add_task(&scheduled_workflow(100)).unwrap();

        tokio::time::sleep(Duration::from_millis(520)).await;
        scheduler.stop().await.unwrap();

        let mut count = 0;
        while fires.try_recv().is_ok() {
            count += 1;
        }
        // ~5 intervals in the window; allow generous jitter.
        assert!((2..=7).contains(&count), "fired {count} times");
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (scheduler, _fires) = Scheduler::new(SchedulerConfig::default());
        scheduler.start().unwrap();
        assert!(matches!(
            scheduler.start(),
            Err(EngineError::SchedulerAlreadyRunning)
        ));
        scheduler.stop().await.unwrap();
        assert_eq!(scheduler.status(), SchedulerStatus::Stopped);
    }
}
