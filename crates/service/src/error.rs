//! Service-level error type, the one surfaced to the API layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("workflow '{0}' is not active")]
    WorkflowNotActive(String),

    /// The workflow's `max_instances` limit is reached. Retry later.
    #[error("maximum concurrent instances reached for workflow '{0}'")]
    MaxInstancesReached(String),

    /// Validation, state-transition, capacity, and scheduling errors from
    /// the engine crate.
    #[error(transparent)]
    Engine(#[from] engine::EngineError),

    #[error(transparent)]
    Registry(#[from] nodes::RegistryError),

    #[error(transparent)]
    Node(#[from] nodes::NodeError),

    #[error(transparent)]
    Db(#[from] db::DbError),
}
