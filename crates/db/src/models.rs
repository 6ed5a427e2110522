//! Row structs that map 1-to-1 onto database tables, plus the conversions
//! between rows and domain types.
//!
//! Serialization policy: nested structures are serialized to JSON text
//! columns on write and deserialized on read. After a read, a missing or
//! empty status column is coerced to the default (`inactive` for workflows,
//! `pending` for executions).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use engine::models::{
    Execution, ExecutionStatus, TriggerType, Workflow, WorkflowStatus,
};
use sqlx::FromRow;

use crate::DbError;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    /// JSON: node-id → node.
    pub nodes: String,
    /// JSON: edge list.
    pub edges: String,
    pub schedule: Option<String>,
    pub config: Option<String>,
    pub statistics: Option<String>,
    /// JSON: string list.
    pub tags: String,
    pub status: String,
    pub priority: i64,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WorkflowRow {
    pub fn from_domain(workflow: &Workflow) -> Result<Self, DbError> {
        Ok(Self {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            version: workflow.version.clone(),
            nodes: serde_json::to_string(&workflow.nodes)?,
            edges: serde_json::to_string(&workflow.edges)?,
            schedule: workflow
                .schedule
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            config: workflow
                .config
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            statistics: workflow
                .statistics
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            tags: serde_json::to_string(&workflow.tags)?,
            status: workflow.status.to_string(),
            priority: i64::from(workflow.priority),
            created_by: workflow.created_by.clone(),
            updated_by: workflow.updated_by.clone(),
            created_at: workflow.created_at,
            updated_at: workflow.updated_at,
            deleted_at: workflow.deleted_at,
        })
    }

    pub fn into_domain(self) -> Result<Workflow, DbError> {
        let status = if self.status.is_empty() {
            WorkflowStatus::default()
        } else {
            WorkflowStatus::from_str(&self.status)
                .map_err(|e| DbError::Corrupt(e.to_string()))?
        };

        Ok(Workflow {
            id: self.id,
            name: self.name,
            description: self.description,
            version: self.version,
            nodes: serde_json::from_str(&self.nodes)?,
            edges: serde_json::from_str(&self.edges)?,
            schedule: self.schedule.as_deref().map(serde_json::from_str).transpose()?,
            config: self.config.as_deref().map(serde_json::from_str).transpose()?,
            statistics: self
                .statistics
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            tags: serde_json::from_str(&self.tags)?,
            status,
            priority: self.priority as i32,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

// ---------------------------------------------------------------------------
// executions
// ---------------------------------------------------------------------------

/// A persisted execution row.
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRow {
    pub id: String,
    pub workflow_id: String,
    pub workflow_version: String,
    pub name: String,
    pub description: String,
    pub status: String,
    pub trigger_type: String,
    pub trigger_by: String,
    /// JSON: arbitrary trigger payload.
    pub trigger_data: Option<String>,
    /// JSON: execution context (variables, input, output, environment).
    pub context: Option<String>,
    /// JSON: per-node records.
    pub nodes: Option<String>,
    /// JSON: execution metrics.
    pub metrics: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub retry_strategy: String,
    pub error_msg: Option<String>,
    pub error_code: Option<String>,
    pub stack_trace: Option<String>,
    pub priority: i64,
    pub tags: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ExecutionRow {
    pub fn from_domain(execution: &Execution) -> Result<Self, DbError> {
        Ok(Self {
            id: execution.id.clone(),
            workflow_id: execution.workflow_id.clone(),
            workflow_version: execution.workflow_version.clone(),
            name: execution.name.clone(),
            description: execution.description.clone(),
            status: execution.status.to_string(),
            trigger_type: execution.trigger_type.to_string(),
            trigger_by: execution.trigger_by.clone(),
            trigger_data: Some(serde_json::to_string(&execution.trigger)?),
            context: Some(serde_json::to_string(&execution.context)?),
            nodes: Some(serde_json::to_string(&execution.nodes)?),
            metrics: Some(serde_json::to_string(&execution.metrics)?),
            scheduled_at: execution.scheduled_at,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            retry_count: i64::from(execution.retry_count),
            max_retries: i64::from(execution.max_retries),
            retry_strategy: execution.retry_strategy.clone(),
            error_msg: execution.error_msg.clone(),
            error_code: execution.error_code.clone(),
            stack_trace: execution.stack_trace.clone(),
            priority: i64::from(execution.priority),
            tags: serde_json::to_string(&execution.tags)?,
            created_at: execution.created_at,
            updated_at: execution.updated_at,
            deleted_at: execution.deleted_at,
        })
    }

    pub fn into_domain(self) -> Result<Execution, DbError> {
        let status = if self.status.is_empty() {
            ExecutionStatus::default()
        } else {
            ExecutionStatus::from_str(&self.status)
                .map_err(|e| DbError::Corrupt(e.to_string()))?
        };
        let trigger_type = if self.trigger_type.is_empty() {
            TriggerType::default()
        } else {
            TriggerType::from_str(&self.trigger_type)
                .map_err(|e| DbError::Corrupt(e.to_string()))?
        };

        Ok(Execution {
            id: self.id,
            workflow_id: self.workflow_id,
            workflow_version: self.workflow_version,
            name: self.name,
            description: self.description,
            status,
            trigger_type,
            trigger_by: self.trigger_by,
            trigger: self
                .trigger_data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default(),
            context: self
                .context
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default(),
            nodes: self
                .nodes
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default(),
            metrics: self
                .metrics
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default(),
            scheduled_at: self.scheduled_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            retry_strategy: self.retry_strategy,
            error_msg: self.error_msg,
            error_code: self.error_code,
            stack_trace: self.stack_trace,
            priority: self.priority as i32,
            tags: serde_json::from_str(&self.tags)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}
