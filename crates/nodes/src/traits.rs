//! The `NodePlugin` trait — the contract every node must fulfil — plus the
//! metadata and input/output types exchanged with the engine.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NodeError;

/// String-keyed JSON map, the lingua franca between engine and plugins.
pub type ValueMap = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Describes a plugin to the registry, the API surface, and UI builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    /// Coarse grouping used by the catalog UI ("datasource", "transform", …).
    pub category: String,
    /// Concrete plugin type within the category.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub input_ports: Vec<PortDefinition>,
    #[serde(default)]
    pub output_ports: Vec<PortDefinition>,

    /// Schema describing the plugin's config blob. Required for registration.
    pub config_schema: Option<ConfigSchema>,

    #[serde(default)]
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single named input or output port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub data_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub multiple: bool,
}

/// Schema of a plugin's config blob, consumed by UI form builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Vec<ConfigField>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// One field in a config schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Nested fields when `kind` is "object".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<ConfigField>,
    /// Element schema when `kind` is "array".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ConfigField>>,
    /// Required nested property names when `kind` is "object".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// Everything a plugin receives for one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInput {
    /// Data prepared by the engine: global variables plus the node's input
    /// mapping and defaults.
    pub data: ValueMap,
    /// The node's plugin-specific config blob.
    pub config: ValueMap,
    /// Execution-scoped context values.
    pub context: ValueMap,
    /// Snapshot of the execution's global variables bus.
    pub variables: ValueMap,
}

/// Structured result of one plugin execution.
///
/// Plugins never "throw" for business failures: they set `success = false`
/// and fill `error`. The engine converts that into an execution failure with
/// the error string preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOutput {
    pub data: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub metrics: ValueMap,
    pub success: bool,
    /// Wall-clock execution time in milliseconds.
    pub duration_ms: u64,
}

impl NodeOutput {
    /// A failed output carrying the given error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            success: false,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// The plugin trait
// ---------------------------------------------------------------------------

/// The core plugin contract.
///
/// Cancellation and deadlines are enforced by the engine racing the future
/// returned by [`execute`](NodePlugin::execute) against a timeout and the
/// execution's cancellation token — a plugin that is cancelled is dropped
/// mid-await, so implementations must not hold work that outlives the future.
#[async_trait]
pub trait NodePlugin: Send + Sync {
    /// Metadata describing this plugin (id, ports, config schema, …).
    fn metadata(&self) -> NodeMetadata;

    /// Statically validate a user-supplied config blob.
    fn validate(&self, config: &ValueMap) -> Result<(), NodeError>;

    /// Execute the node.
    async fn execute(&self, input: NodeInput) -> Result<NodeOutput, NodeError>;

    /// Optional helper for UI-side suggestions (enumerate tables, …).
    /// Never invoked by the engine.
    fn dynamic_data(&self, method: &str, _params: &ValueMap) -> Result<Value, NodeError> {
        Err(NodeError::UnsupportedMethod(method.to_string()))
    }
}
