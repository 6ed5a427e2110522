//! The execution model: one run of a workflow at a pinned version, with its
//! per-node records, metrics, retry bookkeeping, and error details.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nodes::ValueMap;
use serde::{Deserialize, Serialize};

use crate::EngineError;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Archived,
}

impl ExecutionStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ExecutionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "timeout" => Ok(Self::Timeout),
            "archived" => Ok(Self::Archived),
            other => Err(EngineError::Validation(format!(
                "unknown execution status: {other}"
            ))),
        }
    }
}

/// Status of a single node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Schedule,
    Manual,
    Api,
    Event,
}

impl Default for TriggerType {
    fn default() -> Self {
        Self::Manual
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Schedule => "schedule",
            Self::Manual => "manual",
            Self::Api => "api",
            Self::Event => "event",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TriggerType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schedule" => Ok(Self::Schedule),
            "manual" => Ok(Self::Manual),
            "api" => Ok(Self::Api),
            "event" => Ok(Self::Event),
            other => Err(EngineError::Validation(format!(
                "unknown trigger type: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Nested structures
// ---------------------------------------------------------------------------

/// Execution-scoped variables, input, collected output, and environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(default)]
    pub variables: ValueMap,
    #[serde(default)]
    pub input: ValueMap,
    #[serde(default)]
    pub output: ValueMap,
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

/// Record of one node touched by an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionNodeRecord {
    pub node_id: String,
    #[serde(default)]
    pub node_name: String,
    pub status: NodeRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub input: ValueMap,
    #[serde(default)]
    pub output: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl ExecutionNodeRecord {
    pub fn new(node_id: impl Into<String>, node_name: impl Into<String>, status: NodeRunStatus) -> Self {
        Self {
            node_id: node_id.into(),
            node_name: node_name.into(),
            status,
            start_time: None,
            end_time: None,
            duration_ms: 0,
            retry_count: 0,
            input: ValueMap::new(),
            output: ValueMap::new(),
            error_msg: None,
            logs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub total_nodes: u32,
    pub completed_nodes: u32,
    pub failed_nodes: u32,
    pub skipped_nodes: u32,
    pub execution_time_ms: u64,
    pub queue_time_ms: u64,
    pub wait_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One run of a workflow at a pinned version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub workflow_version: String,

    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ExecutionStatus,

    #[serde(default)]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_by: String,
    /// Arbitrary trigger payload.
    #[serde(default)]
    pub trigger: ValueMap,

    #[serde(default)]
    pub context: ExecutionContext,
    #[serde(default)]
    pub nodes: Vec<ExecutionNodeRecord>,
    #[serde(default)]
    pub metrics: ExecutionMetrics,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_strategy")]
    pub retry_strategy: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_strategy() -> String {
    "exponential".to_string()
}

impl Execution {
    /// A fresh pending execution for the given workflow.
    pub fn new(workflow_id: impl Into<String>, workflow_version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            workflow_version: workflow_version.into(),
            name: String::new(),
            description: String::new(),
            status: ExecutionStatus::Pending,
            trigger_type: TriggerType::default(),
            trigger_by: String::new(),
            trigger: ValueMap::new(),
            context: ExecutionContext::default(),
            nodes: Vec::new(),
            metrics: ExecutionMetrics::default(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            retry_strategy: default_retry_strategy(),
            error_msg: None,
            error_code: None,
            stack_trace: None,
            priority: 0,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.workflow_id.is_empty() {
            return Err(EngineError::Validation("workflow_id is required".into()));
        }
        if self.workflow_version.is_empty() {
            return Err(EngineError::Validation(
                "workflow_version is required".into(),
            ));
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    pub fn can_retry(&self) -> bool {
        self.status == ExecutionStatus::Failed && self.retry_count < self.max_retries
    }

    /// Mark the execution running. The caller validates the transition with
    /// the state manager first.
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.finish();
    }

    pub fn fail(&mut self, error_msg: impl Into<String>, error_code: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error_msg = Some(error_msg.into());
        self.error_code = Some(error_code.into());
        self.finish();
    }

    pub fn cancel(&mut self) {
        self.status = ExecutionStatus::Cancelled;
        self.finish();
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.metrics.execution_time_ms = (now - started).num_milliseconds().max(0) as u64;
        }
    }

    /// Reset for a retry: failed → pending, retry counter bumped, error and
    /// timing cleared.
    pub fn reset_for_retry(&mut self) {
        self.retry_count += 1;
        self.status = ExecutionStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error_msg = None;
        self.error_code = None;
        self.stack_trace = None;
        self.nodes.clear();
        self.metrics = ExecutionMetrics::default();
    }

    /// Completion percentage; 0 when no nodes were counted yet.
    pub fn progress(&self) -> f64 {
        if self.metrics.total_nodes == 0 {
            return 0.0;
        }
        f64::from(self.metrics.completed_nodes) / f64::from(self.metrics.total_nodes) * 100.0
    }

    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - started).to_std().ok()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_zero_without_nodes() {
        let execution = Execution::new("wf", "1.0.0");
        assert_eq!(execution.progress(), 0.0);
    }

    #[test]
    fn progress_is_percentage() {
        let mut execution = Execution::new("wf", "1.0.0");
        execution.metrics.total_nodes = 4;
        execution.metrics.completed_nodes = 3;
        assert_eq!(execution.progress(), 75.0);
    }

    #[test]
    fn retry_resets_error_state_and_bumps_counter() {
        let mut execution = Execution::new("wf", "1.0.0");
        execution.start();
        execution.fail("boom", "plugin_error");
        assert!(execution.can_retry());

        execution.reset_for_retry();
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert_eq!(execution.retry_count, 1);
        assert!(execution.error_msg.is_none());
        assert!(execution.started_at.is_none());
        assert!(execution.completed_at.is_none());
    }

    #[test]
    fn retry_is_exhausted_at_max() {
        let mut execution = Execution::new("wf", "1.0.0");
        execution.max_retries = 1;
        execution.start();
        execution.fail("boom", "plugin_error");
        execution.reset_for_retry();
        execution.start();
        execution.fail("boom again", "plugin_error");
        assert!(!execution.can_retry());
    }
}
