//! The workflow model: a named, versioned DAG definition plus its schedule,
//! execution defaults, and rolling statistics.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nodes::ValueMap;
use serde::{Deserialize, Serialize};

use crate::models::{Edge, Node};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Inactive,
    Active,
    Paused,
    Disabled,
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::Inactive
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WorkflowStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(Self::Inactive),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "disabled" => Ok(Self::Disabled),
            other => Err(EngineError::Validation(format!(
                "unknown workflow status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Cron,
    Interval,
    Once,
    Manual,
}

/// What to do when a tick finds the next-run several slots in the past.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedRunPolicy {
    /// Fire once and advance to the next slot after now.
    Skip,
    /// Fire once and advance by a single slot; may refire on the next tick.
    RunOnce,
}

impl Default for MissedRunPolicy {
    fn default() -> Self {
        Self::Skip
    }
}

/// When a workflow fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSchedule {
    #[serde(rename = "type")]
    pub kind: ScheduleType,

    /// Cron expression (5-field; a seconds field is prepended internally).
    #[serde(default)]
    pub cron_expression: String,
    /// Informational; next-run computation is UTC.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Interval between runs, for `interval` schedules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,

    /// Fire time for `once` schedules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Concurrent executions allowed for this workflow.
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,

    #[serde(default)]
    pub missed_run_policy: MissedRunPolicy,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_max_instances() -> u32 {
    1
}

impl WorkflowSchedule {
    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub on_success: bool,
    #[serde(default)]
    pub on_failure: bool,
    #[serde(default)]
    pub on_retry: bool,
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Execution defaults applying to every run of the workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Overall time limit for a whole execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Per-node cap; combined with the node's own timeout and the engine
    /// default when deriving a node deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timeout_ms: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default)]
    pub variables: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationConfig>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub description: String,
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_concurrency() -> u32 {
    10
}

impl WorkflowConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    pub total_executions: i64,
    pub successful_runs: i64,
    pub failed_runs: i64,
    pub success_rate: f64,
    pub average_exec_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_execution_time: Option<DateTime<Utc>>,
}

impl WorkflowStatistics {
    /// Fold one finished run into the counters.
    ///
    /// The average uses the moving mean
    /// `avg_new = (avg_old * (n - 1) + d) / n` with n the count after this
    /// observation.
    pub fn record_run(&mut self, duration_ms: u64, success: bool) {
        self.total_executions += 1;
        if success {
            self.successful_runs += 1;
        } else {
            self.failed_runs += 1;
        }
        self.success_rate = self.successful_runs as f64 / self.total_executions as f64;

        let n = self.total_executions as u64;
        if n == 1 {
            self.average_exec_time_ms = duration_ms;
        } else {
            self.average_exec_time_ms =
                (self.average_exec_time_ms * (n - 1) + duration_ms) / n;
        }
        self.last_execution_time = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Assigned by the service when a client payload omits it.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,

    /// Node-id → node. The canonical dependency set is derived from edges.
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<WorkflowSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<WorkflowConfig>,

    #[serde(default)]
    pub status: WorkflowStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<WorkflowStatistics>,

    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Minimal constructor used by the service layer and tests.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            schedule: None,
            config: None,
            status: WorkflowStatus::default(),
            statistics: None,
            tags: Vec::new(),
            priority: 0,
            created_by: String::new(),
            updated_by: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Validate the definition itself: names, nodes, and edges.
    /// Graph-level checks (cycles, endpoint existence) live in [`crate::dag`].
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.is_empty() {
            return Err(EngineError::Validation("workflow name is required".into()));
        }
        if self.version.is_empty() {
            return Err(EngineError::Validation(
                "workflow version is required".into(),
            ));
        }
        for (id, node) in &self.nodes {
            if id != &node.id {
                return Err(EngineError::Validation(format!(
                    "node map key '{id}' does not match node id '{}'",
                    node.id
                )));
            }
            node.validate()?;
        }
        for edge in &self.edges {
            edge.validate()?;
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkflowStatus::Active
    }

    /// Whether the scheduler should pick this workflow up.
    pub fn can_schedule(&self) -> bool {
        self.is_active()
            && self
                .schedule
                .as_ref()
                .map(|s| s.enabled)
                .unwrap_or(false)
    }

    /// Fold one finished run into the statistics block.
    pub fn record_run(&mut self, duration_ms: u64, success: bool) {
        self.statistics
            .get_or_insert_with(WorkflowStatistics::default)
            .record_run(duration_ms, success);
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_is_exact() {
        let mut stats = WorkflowStatistics::default();
        stats.record_run(100, true);
        assert_eq!(stats.average_exec_time_ms, 100);
        stats.record_run(200, true);
        // (100 * 1 + 200) / 2
        assert_eq!(stats.average_exec_time_ms, 150);
        stats.record_run(300, false);
        // (150 * 2 + 300) / 3
        assert_eq!(stats.average_exec_time_ms, 200);
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_runs, 2);
        assert_eq!(stats.failed_runs, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_name_fails_validation() {
        let mut workflow = Workflow::new("ok");
        assert!(workflow.validate().is_ok());
        workflow.name.clear();
        assert!(workflow.validate().is_err());
    }

    #[test]
    fn can_schedule_requires_active_and_enabled() {
        let mut workflow = Workflow::new("scheduled");
        assert!(!workflow.can_schedule());

        workflow.schedule = Some(WorkflowSchedule {
            kind: ScheduleType::Interval,
            cron_expression: String::new(),
            timezone: "UTC".into(),
            interval_ms: Some(1000),
            execute_at: None,
            enabled: true,
            start_time: None,
            end_time: None,
            max_instances: 1,
            missed_run_policy: MissedRunPolicy::Skip,
        });
        assert!(!workflow.can_schedule(), "still inactive");

        workflow.status = WorkflowStatus::Active;
        assert!(workflow.can_schedule());
    }
}
