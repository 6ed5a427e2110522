//! `engine` crate — domain models, the workflow/execution state machine, DAG
//! validation, the condition evaluator, the concurrent execution engine, and
//! the ticked scheduler.

pub mod condition;
pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
pub mod scheduler;
pub mod state;

pub use dag::validate_dag;
pub use error::EngineError;
pub use executor::{
    EngineConfig, EngineStatus, ExecutionReport, ExecutionSnapshot, WorkflowEngine,
};
pub use scheduler::{ScheduleFire, Scheduler, SchedulerConfig, SchedulerStatus};
pub use state::{EntityKind, StateManager, StateTransition};

#[cfg(test)]
mod executor_tests;
