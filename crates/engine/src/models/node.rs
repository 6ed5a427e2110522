//! The node model: a single step of the workflow graph, stored as JSON inside
//! the workflow definition.

use std::collections::HashMap;
use std::time::Duration;

use nodes::ValueMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Datasource,
    Transform,
    Output,
    Control,
    Condition,
    Loop,
    Script,
    Api,
    Timer,
}

/// Maps plugin input keys onto variables-bus keys, with defaults for unset
/// entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    /// target-field ← source-field lookups against the variables bus.
    #[serde(default)]
    pub mapping: HashMap<String, String>,
    /// Values applied when the key is still unset after mapping.
    #[serde(default)]
    pub defaults: ValueMap,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub mapping: HashMap<String, String>,
    #[serde(default)]
    pub filter: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeRetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_interval_ms: u64,
    #[serde(default)]
    pub backoff_strategy: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Opaque blob handed to the plugin.
    #[serde(default)]
    pub plugin_config: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<NodeRetryConfig>,
    /// Per-node execution timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceConfig>,
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the workflow; referenced by edges.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,

    #[serde(rename = "type")]
    pub kind: NodeType,
    /// Id of the registered plugin that executes this node.
    pub plugin: String,

    /// Explicit dependency list is permitted, but the canonical dependency
    /// set is derived from enabled edges at execution time.
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<NodeConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_config: Option<Value>,
}

impl Node {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.is_empty() {
            return Err(EngineError::Validation("node id is required".into()));
        }
        if self.name.is_empty() {
            return Err(EngineError::Validation(format!(
                "node '{}' has no name",
                self.id
            )));
        }
        if self.plugin.is_empty() {
            return Err(EngineError::Validation(format!(
                "node '{}' has no plugin",
                self.id
            )));
        }
        if self.dependencies.iter().any(|dep| dep == &self.id) {
            return Err(EngineError::Validation(format!(
                "node '{}' lists itself as a dependency",
                self.id
            )));
        }
        Ok(())
    }

    /// The node's own execution timeout, if configured.
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.config
            .as_ref()
            .and_then(|c| c.timeout_ms)
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }

    /// The plugin config blob (empty map when unset).
    pub fn plugin_config(&self) -> ValueMap {
        self.config
            .as_ref()
            .map(|c| c.plugin_config.clone())
            .unwrap_or_default()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> Node {
        Node {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            kind: NodeType::Transform,
            plugin: "mock".into(),
            dependencies: Vec::new(),
            config: None,
            ui_config: None,
        }
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut n = node("a");
        assert!(n.validate().is_ok());
        n.dependencies.push("a".into());
        assert!(n.validate().is_err());
    }

    #[test]
    fn zero_timeout_means_unset() {
        let mut n = node("a");
        n.config = Some(NodeConfig {
            timeout_ms: Some(0),
            ..NodeConfig::default()
        });
        assert_eq!(n.execution_timeout(), None);

        n.config.as_mut().unwrap().timeout_ms = Some(1500);
        assert_eq!(n.execution_timeout(), Some(Duration::from_millis(1500)));
    }
}
