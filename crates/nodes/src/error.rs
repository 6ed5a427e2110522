//! Node and registry error types.

use thiserror::Error;

/// Errors returned by a plugin's `validate`, `execute`, or `dynamic_data`
/// methods.
///
/// A *business* failure during execution (bad input data, unparsable config
/// value, …) is reported inside [`NodeOutput`](crate::NodeOutput) with
/// `success = false`; an `Err(NodeError)` from `execute` means the plugin
/// could not run at all.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// The user-supplied config blob failed static validation.
    #[error("invalid node config: {0}")]
    InvalidConfig(String),

    /// Transport-level execution failure (the plugin could not run).
    #[error("node execution error: {0}")]
    Execution(String),

    /// The plugin does not implement the requested dynamic-data method.
    #[error("unsupported dynamic data method: {0}")]
    UnsupportedMethod(String),
}

/// Errors returned by [`NodeRegistry`](crate::NodeRegistry) operations.
#[derive(Debug, Error, Clone)]
pub enum RegistryError {
    /// A plugin with the same id is already registered.
    #[error("plugin '{0}' is already registered")]
    DuplicateId(String),

    /// The plugin's metadata is unusable (empty id, missing schema, …).
    #[error("invalid plugin metadata: {0}")]
    InvalidMetadata(String),

    /// No plugin with the given id is registered.
    #[error("plugin '{0}' not found")]
    NotFound(String),
}
