//! Logger output node — records the incoming data in the node's log lines
//! (and the service log) and passes the data through unchanged.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::traits::{ConfigField, ConfigSchema, NodeInput, NodeMetadata, NodeOutput, PortDefinition, ValueMap};
use crate::{NodeError, NodePlugin};

pub struct LoggerNode;

impl LoggerNode {
    fn level(config: &ValueMap) -> &str {
        match config.get("level").and_then(Value::as_str) {
            Some(level @ ("debug" | "info" | "warn")) => level,
            _ => "info",
        }
    }

    fn prefix(config: &ValueMap) -> String {
        config
            .get("prefix")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    }
}

#[async_trait]
impl NodePlugin for LoggerNode {
    fn metadata(&self) -> NodeMetadata {
        let now = Utc::now();
        NodeMetadata {
            id: "logger".into(),
            name: "Logger".into(),
            description: "Logs incoming data and passes it through".into(),
            version: "1.0.0".into(),
            category: "output".into(),
            kind: "logger".into(),
            icon: "log".into(),
            tags: vec!["log".into(), "output".into(), "debug".into()],
            input_ports: vec![PortDefinition {
                id: "data".into(),
                name: "Data".into(),
                description: "Data to log".into(),
                data_type: "any".into(),
                required: false,
                multiple: false,
            }],
            output_ports: vec![PortDefinition {
                id: "data".into(),
                name: "Data".into(),
                description: "The input data, unchanged".into(),
                data_type: "any".into(),
                required: false,
                multiple: false,
            }],
            config_schema: Some(ConfigSchema {
                kind: "object".into(),
                properties: vec![
                    ConfigField {
                        name: "level".into(),
                        kind: "string".into(),
                        title: "Log level".into(),
                        default: Some(json!("info")),
                        enum_values: Some(vec![json!("debug"), json!("info"), json!("warn")]),
                        ..ConfigField::default()
                    },
                    ConfigField {
                        name: "prefix".into(),
                        kind: "string".into(),
                        title: "Message prefix".into(),
                        ..ConfigField::default()
                    },
                ],
                required: Vec::new(),
            }),
            author: "flowmill".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn validate(&self, config: &ValueMap) -> Result<(), NodeError> {
        if let Some(level) = config.get("level") {
            match level.as_str() {
                Some("debug" | "info" | "warn") => {}
                _ => {
                    return Err(NodeError::InvalidConfig(format!(
                        "unsupported log level: {level}"
                    )))
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, input: NodeInput) -> Result<NodeOutput, NodeError> {
        let started = Instant::now();
        let mut output = NodeOutput::default();

        let level = Self::level(&input.config);
        let prefix = Self::prefix(&input.config);

        let item_count = input
            .data
            .get("data")
            .and_then(Value::as_array)
            .map(|records| records.len());

        for (key, value) in &input.data {
            let line = if prefix.is_empty() {
                format!("{key} = {value}")
            } else {
                format!("{prefix}: {key} = {value}")
            };
            match level {
                "debug" => debug!("{line}"),
                "warn" => warn!("{line}"),
                _ => info!("{line}"),
            }
            output.logs.push(line);
        }

        if let Some(count) = item_count {
            output.logs.push(format!("logged {count} items"));
            output.metrics.insert("item_count".into(), json!(count));
        }
        output.metrics.insert("key_count".into(), json!(input.data.len()));

        // Pass-through so downstream nodes can keep consuming the data.
        output.data = input.data;
        output.success = true;
        output.duration_ms = started.elapsed().as_millis() as u64;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_data_through_and_counts_items() {
        let input = NodeInput {
            data: ValueMap::from([("data".to_string(), json!([{"x": 2}, {"x": 3}]))]),
            ..NodeInput::default()
        };
        let output = LoggerNode.execute(input).await.unwrap();
        assert!(output.success);
        assert_eq!(output.metrics["item_count"], json!(2));
        assert_eq!(output.data["data"], json!([{"x": 2}, {"x": 3}]));
    }

    #[test]
    fn validate_rejects_unknown_level() {
        let config = ValueMap::from([("level".to_string(), json!("fatal"))]);
        assert!(LoggerNode.validate(&config).is_err());
        let config = ValueMap::from([("level".to_string(), json!("warn"))]);
        assert!(LoggerNode.validate(&config).is_ok());
    }
}
