//! Node catalog handlers: plugin metadata, config validation, dynamic data.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use nodes::ValueMap;
use serde::Deserialize;
use serde_json::json;
use service::ServiceError;

use crate::response::{success, ApiError};
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct NodesQuery {
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidatePayload {
    #[serde(default)]
    pub config: ValueMap,
}

#[derive(Debug, Deserialize)]
pub struct DynamicDataPayload {
    pub method: String,
    #[serde(default)]
    pub params: ValueMap,
}

/// List registered plugins (full metadata, including the config schema),
/// optionally narrowed by category, type, or a search query.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<NodesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = &state.ctx.registry;
    let metadata = if let Some(q) = query.q.as_deref() {
        registry.search(q)
    } else if let Some(category) = query.category.as_deref() {
        registry.list_by_category(category)
    } else if let Some(kind) = query.kind.as_deref() {
        registry.list_by_type(kind)
    } else {
        registry.all_metadata()
    };
    Ok(success("ok", metadata))
}

/// Statically validate a user-supplied config blob against a plugin.
pub async fn validate_config(
    State(state): State<AppState>,
    Path(plugin_id): Path<String>,
    Json(payload): Json<ValidatePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let plugin = state
        .ctx
        .registry
        .get(&plugin_id)
        .map_err(ServiceError::from)?;
    plugin.validate(&payload.config).map_err(ServiceError::from)?;
    Ok(success("config is valid", json!({ "valid": true })))
}

/// UI-side helper: ask a plugin for dynamic suggestions (table names, …).
pub async fn dynamic_data(
    State(state): State<AppState>,
    Path(plugin_id): Path<String>,
    Json(payload): Json<DynamicDataPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let plugin = state
        .ctx
        .registry
        .get(&plugin_id)
        .map_err(ServiceError::from)?;
    let data = plugin
        .dynamic_data(&payload.method, &payload.params)
        .map_err(ServiceError::from)?;
    Ok(success("ok", data))
}
