//! Request handlers.

pub mod executions;
pub mod nodes;
pub mod workflows;

use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use crate::response::success;
use crate::AppState;

/// Liveness probe with a couple of runtime facts.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    success(
        "ok",
        json!({
            "service": "flowmill",
            "version": env!("CARGO_PKG_VERSION"),
            "active_executions": state.ctx.engine.active_executions().len(),
            "registered_plugins": state.ctx.registry.count(),
        }),
    )
}
