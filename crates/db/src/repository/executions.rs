//! Execution repository functions.

use chrono::{DateTime, Utc};
use engine::models::{Execution, ExecutionStatus};
use sqlx::SqlitePool;

use crate::models::ExecutionRow;
use crate::DbError;

const EXECUTION_COLUMNS: &str = "id, workflow_id, workflow_version, name, description, status, \
     trigger_type, trigger_by, trigger_data, context, nodes, metrics, scheduled_at, started_at, \
     completed_at, retry_count, max_retries, retry_strategy, error_msg, error_code, stack_trace, \
     priority, tags, created_at, updated_at, deleted_at";

/// Insert a new execution row.
pub async fn create_execution(pool: &SqlitePool, execution: &Execution) -> Result<(), DbError> {
    let row = ExecutionRow::from_domain(execution)?;
    sqlx::query(
        "INSERT INTO executions (id, workflow_id, workflow_version, name, description, status, \
         trigger_type, trigger_by, trigger_data, context, nodes, metrics, scheduled_at, started_at, \
         completed_at, retry_count, max_retries, retry_strategy, error_msg, error_code, stack_trace, \
         priority, tags, created_at, updated_at, deleted_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(&row.workflow_id)
    .bind(&row.workflow_version)
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.status)
    .bind(&row.trigger_type)
    .bind(&row.trigger_by)
    .bind(&row.trigger_data)
    .bind(&row.context)
    .bind(&row.nodes)
    .bind(&row.metrics)
    .bind(row.scheduled_at)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(row.retry_count)
    .bind(row.max_retries)
    .bind(&row.retry_strategy)
    .bind(&row.error_msg)
    .bind(&row.error_code)
    .bind(&row.stack_trace)
    .bind(row.priority)
    .bind(&row.tags)
    .bind(row.created_at)
    .bind(row.updated_at)
    .bind(row.deleted_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a single live execution by id.
pub async fn get_execution(pool: &SqlitePool, id: &str) -> Result<Execution, DbError> {
    let sql =
        format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ? AND deleted_at IS NULL");
    let row: Option<ExecutionRow> = sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?;
    row.ok_or(DbError::NotFound)?.into_domain()
}

/// Overwrite every column of an existing execution row.
pub async fn update_execution(pool: &SqlitePool, execution: &Execution) -> Result<(), DbError> {
    let row = ExecutionRow::from_domain(execution)?;
    let result = sqlx::query(
        "UPDATE executions SET workflow_id = ?, workflow_version = ?, name = ?, description = ?, \
         status = ?, trigger_type = ?, trigger_by = ?, trigger_data = ?, context = ?, nodes = ?, \
         metrics = ?, scheduled_at = ?, started_at = ?, completed_at = ?, retry_count = ?, \
         max_retries = ?, retry_strategy = ?, error_msg = ?, error_code = ?, stack_trace = ?, \
         priority = ?, tags = ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&row.workflow_id)
    .bind(&row.workflow_version)
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.status)
    .bind(&row.trigger_type)
    .bind(&row.trigger_by)
    .bind(&row.trigger_data)
    .bind(&row.context)
    .bind(&row.nodes)
    .bind(&row.metrics)
    .bind(row.scheduled_at)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(row.retry_count)
    .bind(row.max_retries)
    .bind(&row.retry_strategy)
    .bind(&row.error_msg)
    .bind(&row.error_code)
    .bind(&row.stack_trace)
    .bind(row.priority)
    .bind(&row.tags)
    .bind(Utc::now())
    .bind(&row.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Update only the status column, leaving the JSON blobs untouched.
pub async fn update_execution_status(
    pool: &SqlitePool,
    id: &str,
    status: ExecutionStatus,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE executions SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(status.to_string())
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// List live executions, optionally filtered by workflow and status,
/// ordered by creation time descending, paginated by offset + limit.
pub async fn list_executions(
    pool: &SqlitePool,
    workflow_id: Option<&str>,
    status: Option<ExecutionStatus>,
    offset: u32,
    limit: u32,
) -> Result<Vec<Execution>, DbError> {
    let mut sql = format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE deleted_at IS NULL");
    if workflow_id.is_some() {
        sql.push_str(" AND workflow_id = ?");
    }
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, ExecutionRow>(&sql);
    if let Some(workflow_id) = workflow_id {
        query = query.bind(workflow_id.to_string());
    }
    if let Some(status) = status {
        query = query.bind(status.to_string());
    }
    let rows = query
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(ExecutionRow::into_domain).collect()
}

/// Count live executions, optionally filtered by workflow and status.
pub async fn count_executions(
    pool: &SqlitePool,
    workflow_id: Option<&str>,
    status: Option<ExecutionStatus>,
) -> Result<i64, DbError> {
    let mut sql = String::from("SELECT COUNT(*) FROM executions WHERE deleted_at IS NULL");
    if workflow_id.is_some() {
        sql.push_str(" AND workflow_id = ?");
    }
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(workflow_id) = workflow_id {
        query = query.bind(workflow_id.to_string());
    }
    if let Some(status) = status {
        query = query.bind(status.to_string());
    }
    Ok(query.fetch_one(pool).await?)
}

/// Count live executions of one workflow whose status is `pending` or
/// `running`. Used by the service to enforce `max_instances`.
pub async fn count_active_executions(pool: &SqlitePool, workflow_id: &str) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM executions \
         WHERE workflow_id = ? AND deleted_at IS NULL AND status IN ('pending', 'running')",
    )
    .bind(workflow_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Hard-delete terminal executions created before the cutoff, capped at
/// `max_rows`. Returns how many rows were removed.
pub async fn cleanup_executions(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
    max_rows: u32,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM executions WHERE id IN ( \
             SELECT id FROM executions \
             WHERE status IN ('completed', 'failed', 'cancelled', 'timeout') AND created_at < ? \
             ORDER BY created_at ASC LIMIT ?)",
    )
    .bind(cutoff)
    .bind(i64::from(max_rows))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
