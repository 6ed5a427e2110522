//! Engine-level error type covering validation, state transitions, execution
//! admission, scheduling, and condition evaluation.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Workflow / graph validation ------

    /// A domain object failed validation (empty name, bad status, …).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An edge references a node id that doesn't exist in the workflow.
    #[error("edge '{edge_id}' references unknown node '{node_id}'")]
    UnknownNodeReference { edge_id: String, node_id: String },

    /// An edge connects a node to itself.
    #[error("edge '{0}' connects a node to itself")]
    SelfLoop(String),

    /// The enabled-edge subgraph contains a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// A conditional edge carries no condition expression.
    #[error("conditional edge '{0}' has no condition expression")]
    MissingConditionExpression(String),

    /// The workflow defines no nodes at all.
    #[error("workflow has no nodes")]
    EmptyWorkflow,

    /// Every node has at least one dependency, so nothing can start.
    #[error("no start nodes found in workflow")]
    NoStartNode,

    // ------ State machine ------

    /// A state transition outside the transition table was proposed.
    #[error("invalid {entity} state transition from '{from}' to '{to}'")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    // ------ Engine lifecycle / admission ------

    #[error("engine is already running")]
    EngineAlreadyRunning,

    #[error("engine is not running")]
    EngineNotRunning,

    /// The configured concurrent-execution cap is reached. Retry later.
    #[error("maximum concurrent executions reached: {0}")]
    CapacityExceeded(usize),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// A node references a plugin id the registry doesn't know.
    #[error(transparent)]
    Registry(#[from] nodes::RegistryError),

    /// A node exceeded its derived timeout.
    #[error("node '{node_id}' timed out after {timeout:?}")]
    NodeTimeout { node_id: String, timeout: Duration },

    // ------ Condition evaluation ------

    /// The condition expression is not `true`, `false`, or `field OP value`.
    #[error("invalid condition expression: '{0}'")]
    InvalidExpression(String),

    // ------ Scheduling ------

    /// A cron schedule with an empty expression.
    #[error("cron expression is empty")]
    EmptyCron,

    /// The schedule configuration is unusable.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// `add_task` on a workflow without an enabled schedule.
    #[error("workflow '{0}' has no enabled schedule")]
    ScheduleNotEnabled(String),

    #[error("scheduled task not found for workflow '{0}'")]
    TaskNotFound(String),

    #[error("scheduler is already running")]
    SchedulerAlreadyRunning,

    #[error("scheduler is not running")]
    SchedulerNotRunning,
}
