//! Execution trigger, query, cancel, retry, and progress handlers.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use engine::models::{ExecutionStatus, TriggerType};
use nodes::ValueMap;
use serde::Deserialize;
use serde_json::json;
use service::TriggerRequest;

use crate::response::{success, ApiError, Page};
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct TriggerPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger_by: Option<String>,
    #[serde(default)]
    pub variables: ValueMap,
    #[serde(default)]
    pub input: ValueMap,
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub workflow_id: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

fn parse_status(status: Option<&str>) -> Result<Option<ExecutionStatus>, ApiError> {
    status
        .map(ExecutionStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

/// Manual trigger through the API surface.
pub async fn trigger(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    payload: Option<Json<TriggerPayload>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let request = TriggerRequest {
        name: payload.name,
        description: payload.description,
        trigger_type: Some(TriggerType::Manual),
        trigger_by: payload.trigger_by,
        trigger: ValueMap::new(),
        variables: payload.variables,
        input: payload.input,
        priority: payload.priority,
    };
    let execution = state
        .ctx
        .executions
        .trigger_execution(&workflow_id, request)
        .await?;
    Ok(success("execution triggered", execution))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let execution = state.ctx.executions.get_execution(&id).await?;
    Ok(success("ok", execution))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = parse_status(query.status.as_deref())?;
    let (items, total) = state
        .ctx
        .executions
        .list_executions(query.workflow_id.as_deref(), status, query.page, query.page_size)
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

pub async fn list_for_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = parse_status(query.status.as_deref())?;
    let (items, total) = state
        .ctx
        .executions
        .list_executions(Some(workflow_id.as_str()), status, query.page, query.page_size)
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

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let execution = state.ctx.executions.cancel_execution(&id).await?;
    Ok(success("execution cancelled", execution))
}

pub async fn retry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let execution = state.ctx.executions.retry_execution(&id).await?;
    Ok(success("execution retrying", execution))
}

pub async fn progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let progress = state.ctx.executions.get_progress(&id).await?;
    Ok(success("ok", json!({ "progress": progress })))
}
