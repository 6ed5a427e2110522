//! Core domain models.
//!
//! These types are the source of truth for what a workflow and an execution
//! look like in memory. Nested structures (nodes, edges, schedule, config,
//! statistics, context, node records, metrics) are serialized to JSON text
//! columns by the `db` crate on write and deserialized on read.

pub mod edge;
pub mod execution;
pub mod node;
pub mod workflow;

pub use edge::{Edge, EdgeCondition, EdgeConfig, EdgeDataMapping, EdgeStats, EdgeType};
pub use execution::{
    Execution, ExecutionContext, ExecutionMetrics, ExecutionNodeRecord, ExecutionStatus,
    NodeRunStatus, TriggerType,
};
pub use node::{InputConfig, Node, NodeConfig, NodeType};
pub use workflow::{
    MissedRunPolicy, ScheduleType, Workflow, WorkflowConfig, WorkflowSchedule, WorkflowStatistics,
    WorkflowStatus,
};
