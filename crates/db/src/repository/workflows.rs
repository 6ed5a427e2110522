//! Workflow CRUD operations.

use chrono::Utc;
use engine::models::{Workflow, WorkflowStatus};
use sqlx::SqlitePool;

use crate::models::WorkflowRow;
use crate::DbError;

const WORKFLOW_COLUMNS: &str = "id, name, description, version, nodes, edges, schedule, config, \
     statistics, tags, status, priority, created_by, updated_by, created_at, updated_at, deleted_at";

/// Insert a new workflow row.
pub async fn create_workflow(pool: &SqlitePool, workflow: &Workflow) -> Result<(), DbError> {
    let row = WorkflowRow::from_domain(workflow)?;
    sqlx::query(
        "INSERT INTO workflows (id, name, description, version, nodes, edges, schedule, config, \
         statistics, tags, status, priority, created_by, updated_by, created_at, updated_at, deleted_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.version)
    .bind(&row.nodes)
    .bind(&row.edges)
    .bind(&row.schedule)
    .bind(&row.config)
    .bind(&row.statistics)
    .bind(&row.tags)
    .bind(&row.status)
    .bind(row.priority)
    .bind(&row.created_by)
    .bind(&row.updated_by)
    .bind(row.created_at)
    .bind(row.updated_at)
    .bind(row.deleted_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a single live workflow by id.
pub async fn get_workflow(pool: &SqlitePool, id: &str) -> Result<Workflow, DbError> {
    let sql = format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = ? AND deleted_at IS NULL");
    let row: Option<WorkflowRow> = sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?;
    row.ok_or(DbError::NotFound)?.into_domain()
}

/// Overwrite every column of an existing workflow row.
pub async fn update_workflow(pool: &SqlitePool, workflow: &Workflow) -> Result<(), DbError> {
    let row = WorkflowRow::from_domain(workflow)?;
    let result = sqlx::query(
        "UPDATE workflows SET name = ?, description = ?, version = ?, nodes = ?, edges = ?, \
         schedule = ?, config = ?, statistics = ?, tags = ?, status = ?, priority = ?, \
         created_by = ?, updated_by = ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.version)
    .bind(&row.nodes)
    .bind(&row.edges)
    .bind(&row.schedule)
    .bind(&row.config)
    .bind(&row.statistics)
    .bind(&row.tags)
    .bind(&row.status)
    .bind(row.priority)
    .bind(&row.created_by)
    .bind(&row.updated_by)
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
pub async fn update_workflow_status(
    pool: &SqlitePool,
    id: &str,
    status: WorkflowStatus,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE workflows SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
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

/// List live workflows, optionally filtered by status, newest first.
pub async fn list_workflows(
    pool: &SqlitePool,
    status: Option<WorkflowStatus>,
    offset: u32,
    limit: u32,
) -> Result<Vec<Workflow>, DbError> {
    let mut sql = format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE deleted_at IS NULL");
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, WorkflowRow>(&sql);
    if let Some(status) = status {
        query = query.bind(status.to_string());
    }
    let rows = query
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(WorkflowRow::into_domain).collect()
}

/// Count live workflows, optionally filtered by status.
pub async fn count_workflows(
    pool: &SqlitePool,
    status: Option<WorkflowStatus>,
) -> Result<i64, DbError> {
    let mut sql = String::from("SELECT COUNT(*) FROM workflows WHERE deleted_at IS NULL");
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(status) = status {
        query = query.bind(status.to_string());
    }
    Ok(query.fetch_one(pool).await?)
}

/// Soft-delete a workflow and all its executions in one transaction:
/// child executions first, then the workflow row.
pub async fn delete_workflow(pool: &SqlitePool, id: &str) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    sqlx::query(
        "UPDATE executions SET deleted_at = ?, updated_at = ? \
         WHERE workflow_id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query(
        "UPDATE workflows SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(())
}
