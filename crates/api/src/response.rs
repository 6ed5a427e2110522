//! Uniform API response envelope and the service-error → HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use service::ServiceError;

/// `{status, msg, data?}` with `status = 0` on success.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Payload shape for paginated lists.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

pub fn success<T: Serialize>(msg: &str, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        status: 0,
        msg: msg.to_string(),
        data: Some(data),
    })
}

pub fn success_empty(msg: &str) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        status: 0,
        msg: msg.to_string(),
        data: None,
    })
}

/// An error response carrying an HTTP-aligned integer code.
#[derive(Debug)]
pub struct ApiError {
    pub code: StatusCode,
    pub msg: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::BAD_REQUEST,
            msg: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": self.code.as_u16(),
            "msg": self.msg,
        });
        (self.code, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        use engine::EngineError;
        use nodes::RegistryError;

        let code = match &e {
            ServiceError::WorkflowNotFound(_) | ServiceError::ExecutionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ServiceError::WorkflowNotActive(_) => StatusCode::CONFLICT,
            ServiceError::MaxInstancesReached(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Engine(engine_error) => match engine_error {
                EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
                EngineError::CapacityExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
                EngineError::ExecutionNotFound(_) | EngineError::TaskNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                EngineError::EngineNotRunning
                | EngineError::EngineAlreadyRunning
                | EngineError::SchedulerNotRunning
                | EngineError::SchedulerAlreadyRunning => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            },
            ServiceError::Registry(RegistryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Registry(_) => StatusCode::BAD_REQUEST,
            ServiceError::Node(_) => StatusCode::BAD_REQUEST,
            ServiceError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            code,
            msg: e.to_string(),
        }
    }
}
