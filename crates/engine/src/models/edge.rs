//! The edge model: a directed connection between two nodes, stored as JSON
//! inside the workflow definition.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Normal,
    Conditional,
    Loop,
    Error,
    Timeout,
    Skip,
}

/// Condition attached to a conditional edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeCondition {
    /// Expression evaluated against the variables bus, see
    /// [`crate::condition`].
    pub expression: String,
    #[serde(rename = "type", default = "default_condition_type")]
    pub kind: String,
    /// Result used when the condition is disabled.
    #[serde(default)]
    pub default_value: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_condition_type() -> String {
    "simple".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformRule {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub expression: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRule {
    pub field: String,
    pub operator: String,
    pub value: Value,
    #[serde(default)]
    pub logic: String,
}

/// Field renames and transform/filter rules applied to data crossing the
/// edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeDataMapping {
    #[serde(default)]
    pub source_mapping: HashMap<String, String>,
    #[serde(default)]
    pub target_mapping: HashMap<String, String>,
    #[serde(default)]
    pub transform_rules: Vec<TransformRule>,
    #[serde(default)]
    pub filter_rules: Vec<FilterRule>,
    #[serde(default)]
    pub pass_through: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeRetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_interval_ms: u64,
    #[serde(default)]
    pub backoff_strategy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EdgeCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_mapping: Option<EdgeDataMapping>,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<EdgeRetryConfig>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_weight() -> u32 {
    1
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            condition: None,
            data_mapping: None,
            weight: default_weight(),
            priority: 0,
            delay_ms: 0,
            retry: None,
            enabled: true,
        }
    }
}

/// Per-edge execution counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeStats {
    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_time: Option<DateTime<Utc>>,
    pub average_execution_time_ms: u64,
}

/// Directed edge from one node to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,

    pub from_node_id: String,
    pub to_node_id: String,

    #[serde(rename = "type")]
    pub kind: EdgeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EdgeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<EdgeStats>,
}

impl Edge {
    /// A plain enabled edge between two nodes.
    pub fn normal(id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            from_node_id: from.into(),
            to_node_id: to.into(),
            kind: EdgeType::Normal,
            config: None,
            stats: None,
        }
    }

    /// A conditional edge carrying the given expression.
    pub fn conditional(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            kind: EdgeType::Conditional,
            config: Some(EdgeConfig {
                condition: Some(EdgeCondition {
                    expression: expression.into(),
                    kind: default_condition_type(),
                    default_value: false,
                    enabled: true,
                }),
                ..EdgeConfig::default()
            }),
            ..Self::normal(id, from, to)
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.is_empty() {
            return Err(EngineError::Validation("edge id is required".into()));
        }
        if self.from_node_id.is_empty() || self.to_node_id.is_empty() {
            return Err(EngineError::Validation(format!(
                "edge '{}' is missing an endpoint",
                self.id
            )));
        }
        if self.from_node_id == self.to_node_id {
            return Err(EngineError::SelfLoop(self.id.clone()));
        }
        if self.kind == EdgeType::Conditional && self.condition_expression().is_none() {
            return Err(EngineError::MissingConditionExpression(self.id.clone()));
        }
        Ok(())
    }

    pub fn is_conditional(&self) -> bool {
        self.kind == EdgeType::Conditional
    }

    /// Disabled edges take no part in dependency derivation or activation.
    pub fn is_enabled(&self) -> bool {
        self.config.as_ref().map(|c| c.enabled).unwrap_or(true)
    }

    /// The condition expression, when present and non-empty.
    pub fn condition_expression(&self) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|c| c.condition.as_ref())
            .map(|c| c.expression.as_str())
            .filter(|expr| !expr.is_empty())
    }

    /// The condition block itself (for enabled/default_value handling).
    pub fn condition(&self) -> Option<&EdgeCondition> {
        self.config.as_ref().and_then(|c| c.condition.as_ref())
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_loop_is_rejected() {
        let edge = Edge::normal("e1", "a", "a");
        assert!(matches!(edge.validate(), Err(EngineError::SelfLoop(_))));
    }

    #[test]
    fn conditional_edge_requires_expression() {
        let mut edge = Edge::conditional("e1", "a", "b", "x > 1");
        assert!(edge.validate().is_ok());

        edge.config.as_mut().unwrap().condition.as_mut().unwrap().expression = String::new();
        assert!(matches!(
            edge.validate(),
            Err(EngineError::MissingConditionExpression(_))
        ));
    }

    #[test]
    fn enabled_defaults_to_true() {
        let edge = Edge::normal("e1", "a", "b");
        assert!(edge.is_enabled());

        let disabled = Edge {
            config: Some(EdgeConfig {
                enabled: false,
                ..EdgeConfig::default()
            }),
            ..Edge::normal("e2", "a", "b")
        };
        assert!(!disabled.is_enabled());
    }
}
