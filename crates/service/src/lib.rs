//! `service` crate — the orchestration façade over the state manager, store,
//! engine, and scheduler, plus the application context wiring everything
//! together at startup.

pub mod app;
pub mod error;
pub mod execution_service;
pub mod workflow_service;

pub use app::{AppConfig, AppContext};
pub use error::ServiceError;
pub use execution_service::{ExecutionService, TriggerRequest};
pub use workflow_service::WorkflowService;
