//! Static data source — emits a configured JSON array.
//!
//! Mostly used as the entry node of test and demo pipelines: the `json_data`
//! config holds a JSON array of records which becomes the node's `data`
//! output.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::traits::{ConfigField, ConfigSchema, NodeInput, NodeMetadata, NodeOutput, PortDefinition, ValueMap};
use crate::{NodeError, NodePlugin};

pub struct StaticDataNode;

impl StaticDataNode {
    fn parse_records(config: &ValueMap) -> Result<Vec<Value>, String> {
        let raw = match config.get("json_data") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => return Err("missing or invalid json_data".into()),
        };
        serde_json::from_str::<Vec<Value>>(raw).map_err(|e| format!("invalid JSON array: {e}"))
    }
}

#[async_trait]
impl NodePlugin for StaticDataNode {
    fn metadata(&self) -> NodeMetadata {
        let now = Utc::now();
        NodeMetadata {
            id: "static_data".into(),
            name: "Static data".into(),
            description: "Emits a configured static JSON array".into(),
            version: "1.0.0".into(),
            category: "datasource".into(),
            kind: "static".into(),
            icon: "data".into(),
            tags: vec!["static".into(), "json".into(), "test".into()],
            input_ports: Vec::new(),
            output_ports: vec![PortDefinition {
                id: "data".into(),
                name: "Data".into(),
                description: "The configured records".into(),
                data_type: "array".into(),
                required: true,
                multiple: false,
            }],
            config_schema: Some(ConfigSchema {
                kind: "object".into(),
                properties: vec![
                    ConfigField {
                        name: "json_data".into(),
                        kind: "string".into(),
                        title: "JSON data".into(),
                        description: "A JSON array of records".into(),
                        widget: Some("code".into()),
                        placeholder: Some(r#"[{"id": 1}, {"id": 2}]"#.into()),
                        ..ConfigField::default()
                    },
                    ConfigField {
                        name: "data_name".into(),
                        kind: "string".into(),
                        title: "Data set name".into(),
                        default: Some(json!("static data")),
                        widget: Some("text".into()),
                        ..ConfigField::default()
                    },
                ],
                required: vec!["json_data".into()],
            }),
            author: "flowmill".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn validate(&self, config: &ValueMap) -> Result<(), NodeError> {
        Self::parse_records(config).map(|_| ()).map_err(NodeError::InvalidConfig)
    }

    async fn execute(&self, input: NodeInput) -> Result<NodeOutput, NodeError> {
        let started = Instant::now();
        let mut output = NodeOutput::default();

        let records = match Self::parse_records(&input.config) {
            Ok(records) => records,
            Err(msg) => {
                output.error = Some(msg);
                output.duration_ms = started.elapsed().as_millis() as u64;
                return Ok(output);
            }
        };

        output
            .logs
            .push(format!("emitting {} static records", records.len()));
        output
            .metrics
            .insert("record_count".into(), json!(records.len()));
        output.data.insert("data".into(), Value::Array(records));
        output.success = true;
        output.duration_ms = started.elapsed().as_millis() as u64;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json_data: &str) -> ValueMap {
        ValueMap::from([("json_data".to_string(), json!(json_data))])
    }

    #[tokio::test]
    async fn emits_configured_records() {
        let input = NodeInput {
            config: config(r#"[{"x": 1}, {"x": 2}]"#),
            ..NodeInput::default()
        };
        let output = StaticDataNode.execute(input).await.unwrap();
        assert!(output.success);
        assert_eq!(output.data["data"], json!([{"x": 1}, {"x": 2}]));
    }

    #[tokio::test]
    async fn malformed_json_fails_softly() {
        let input = NodeInput {
            config: config("not json"),
            ..NodeInput::default()
        };
        let output = StaticDataNode.execute(input).await.unwrap();
        assert!(!output.success);
        assert!(output.error.is_some());
    }

    #[test]
    fn validate_rejects_missing_data() {
        assert!(StaticDataNode.validate(&ValueMap::new()).is_err());
        assert!(StaticDataNode.validate(&config("[]")).is_ok());
    }
}
