//! Workflow CRUD and status-control handlers.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use engine::models::{Workflow, WorkflowStatus};
use serde::Deserialize;

use crate::response::{success, success_empty, ApiError, Page};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub status: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

fn parse_status(status: Option<&str>) -> Result<Option<WorkflowStatus>, ApiError> {
    status
        .map(WorkflowStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

pub async fn create(
    State(state): State<AppState>,
    Json(workflow): Json<Workflow>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.ctx.workflows.create_workflow(workflow).await?;
    Ok(success("workflow created", workflow))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.ctx.workflows.get_workflow(&id).await?;
    Ok(success("ok", workflow))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut workflow): Json<Workflow>,
) -> Result<impl IntoResponse, ApiError> {
    workflow.id = id;
    let workflow = state.ctx.workflows.update_workflow(workflow).await?;
    Ok(success("workflow updated", workflow))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.ctx.workflows.delete_workflow(&id).await?;
    Ok(success_empty("workflow deleted"))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = parse_status(query.status.as_deref())?;
    let (items, total) = state
        .ctx
        .workflows
        .list_workflows(status, query.page, query.page_size)
        .await?;
    Ok(success(
        "ok",
        Page {
            items,
            total,
            page: query.page,
            page_size: query.page_size,
        },
    ))
}

pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.ctx.workflows.activate_workflow(&id).await?;
    Ok(success("workflow activated", workflow))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.ctx.workflows.deactivate_workflow(&id).await?;
    Ok(success("workflow deactivated", workflow))
}

pub async fn pause(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.ctx.workflows.pause_workflow(&id).await?;
    Ok(success("workflow paused", workflow))
}

pub async fn resume(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.ctx.workflows.resume_workflow(&id).await?;
    Ok(success("workflow resumed", workflow))
}

pub async fn statistics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.ctx.workflows.get_statistics(&id).await?;
    Ok(success("ok", stats))
}
