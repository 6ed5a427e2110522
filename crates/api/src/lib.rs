//! `api` crate — the HTTP REST surface.
//!
//! Routes (optionally nested under `BASE_CONTEXT`):
//!
//!   GET    /health
//!   POST   /workflows                       GET /workflows
//!   GET    /workflows/:id                   PUT /workflows/:id
//!   DELETE /workflows/:id
//!   POST   /workflows/:id/activate          POST /workflows/:id/deactivate
//!   POST   /workflows/:id/pause             POST /workflows/:id/resume
//!   POST   /workflows/:id/trigger
//!   GET    /workflows/:id/executions        GET /workflows/:id/statistics
//!   GET    /executions                      GET /executions/:id
//!   POST   /executions/:id/cancel           POST /executions/:id/retry
//!   GET    /executions/:id/progress
//!   GET    /nodes
//!   POST   /nodes/:id/validate              POST /nodes/:id/dynamic-data
//!
//! Every response uses the `{status, msg, data}` envelope from
//! [`response`], with `status = 0` on success and an HTTP-aligned code
//! otherwise.

pub mod handlers;
pub mod response;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use service::AppContext;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
}

/// Build the full application router.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let state = AppState { ctx: Arc::clone(&ctx) };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/workflows",
            get(handlers::workflows::list).post(handlers::workflows::create),
        )
        .route(
            "/workflows/:id",
            get(handlers::workflows::get_one)
                .put(handlers::workflows::update)
                .delete(handlers::workflows::delete),
        )
        .route("/workflows/:id/activate", post(handlers::workflows::activate))
        .route("/workflows/:id/deactivate", post(handlers::workflows::deactivate))
        .route("/workflows/:id/pause", post(handlers::workflows::pause))
        .route("/workflows/:id/resume", post(handlers::workflows::resume))
        .route("/workflows/:id/trigger", post(handlers::executions::trigger))
        .route(
            "/workflows/:id/executions",
            get(handlers::executions::list_for_workflow),
        )
        .route(
            "/workflows/:id/statistics",
            get(handlers::workflows::statistics),
        )
        .route("/executions", get(handlers::executions::list))
        .route("/executions/:id", get(handlers::executions::get_one))
        .route("/executions/:id/cancel", post(handlers::executions::cancel))
        .route("/executions/:id/retry", post(handlers::executions::retry))
        .route("/executions/:id/progress", get(handlers::executions::progress))
        .route("/nodes", get(handlers::nodes::list))
        .route("/nodes/:id/validate", post(handlers::nodes::validate_config))
        .route("/nodes/:id/dynamic-data", post(handlers::nodes::dynamic_data));

    let base_context = ctx.config.base_context.trim_end_matches('/').to_string();
    let app = if base_context.is_empty() {
        routes
    } else {
        Router::new().nest(&base_context, routes)
    };

    app.layer(cors).layer(TraceLayer::new_for_http()).with_state(state)
}

/// Bind and serve until the process is asked to stop.
pub async fn serve(ctx: Arc<AppContext>) -> Result<(), std::io::Error> {
    let bind = format!("0.0.0.0:{}", ctx.config.listen_port);
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
