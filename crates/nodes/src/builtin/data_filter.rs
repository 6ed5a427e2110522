//! Data filter — keeps records from an input array that match a set of
//! field/operator/value conditions combined with and/or logic.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::traits::{ConfigField, ConfigSchema, NodeInput, NodeMetadata, NodeOutput, PortDefinition, ValueMap};
use crate::{NodeError, NodePlugin};

pub struct DataFilterNode;

struct FilterOptions {
    logic_or: bool,
    include_excluded: bool,
    include_stats: bool,
    limit: usize,
}

impl DataFilterNode {
    fn conditions(config: &ValueMap) -> Result<Vec<Value>, String> {
        match config.get("conditions") {
            Some(Value::Array(conditions)) if !conditions.is_empty() => Ok(conditions.clone()),
            _ => Err("missing or empty conditions".into()),
        }
    }

    fn options(config: &ValueMap) -> FilterOptions {
        FilterOptions {
            logic_or: config.get("logic").and_then(Value::as_str) == Some("or"),
            include_excluded: config
                .get("include_excluded")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            include_stats: config
                .get("include_stats")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            limit: config
                .get("limit")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
        }
    }

    fn matches(record: &Value, conditions: &[Value], logic_or: bool) -> bool {
        let record = match record.as_object() {
            Some(map) => map,
            None => return false,
        };

        let mut any = false;
        for condition in conditions {
            let hit = Self::matches_one(record, condition);
            if logic_or && hit {
                return true;
            }
            if !logic_or && !hit {
                return false;
            }
            any |= hit;
        }
        if logic_or {
            any
        } else {
            true
        }
    }

    fn matches_one(record: &serde_json::Map<String, Value>, condition: &Value) -> bool {
        let field = condition.get("field").and_then(Value::as_str).unwrap_or("");
        let operator = condition
            .get("operator")
            .and_then(Value::as_str)
            .unwrap_or("equals");
        let expected = condition.get("value").cloned().unwrap_or(Value::Null);
        let numeric = condition.get("data_type").and_then(Value::as_str) == Some("number");

        let actual = match record.get(field) {
            Some(v) => v,
            None => return false,
        };

        match operator {
            "equals" => Self::equals(actual, &expected, numeric),
            "not_equals" => !Self::equals(actual, &expected, numeric),
            "greater" => Self::compare(actual, &expected).map(|o| o.is_gt()).unwrap_or(false),
            "greater_equal" => Self::compare(actual, &expected).map(|o| o.is_ge()).unwrap_or(false),
            "less" => Self::compare(actual, &expected).map(|o| o.is_lt()).unwrap_or(false),
            "less_equal" => Self::compare(actual, &expected).map(|o| o.is_le()).unwrap_or(false),
            "contains" => Self::as_text(actual).contains(&Self::as_text(&expected)),
            "not_contains" => !Self::as_text(actual).contains(&Self::as_text(&expected)),
            "in" => Self::as_text(&expected)
                .split(',')
                .any(|candidate| candidate.trim() == Self::as_text(actual)),
            "not_in" => !Self::as_text(&expected)
                .split(',')
                .any(|candidate| candidate.trim() == Self::as_text(actual)),
            _ => false,
        }
    }

    fn equals(actual: &Value, expected: &Value, numeric: bool) -> bool {
        if numeric {
            return match (Self::as_number(actual), Self::as_number(expected)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
        }
        Self::as_text(actual) == Self::as_text(expected)
    }

    fn compare(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
        match (Self::as_number(actual), Self::as_number(expected)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(Self::as_text(actual).cmp(&Self::as_text(expected))),
        }
    }

    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl NodePlugin for DataFilterNode {
    fn metadata(&self) -> NodeMetadata {
        let now = Utc::now();
        NodeMetadata {
            id: "data_filter".into(),
            name: "Data filter".into(),
            description: "Filters records by field conditions".into(),
            version: "1.0.0".into(),
            category: "transform".into(),
            kind: "filter".into(),
            icon: "filter".into(),
            tags: vec!["filter".into(), "condition".into()],
            input_ports: vec![PortDefinition {
                id: "data".into(),
                name: "Input data".into(),
                description: "Records to filter".into(),
                data_type: "array".into(),
                required: true,
                multiple: false,
            }],
            output_ports: vec![
                PortDefinition {
                    id: "filtered_data".into(),
                    name: "Matched records".into(),
                    description: "Records matching the conditions".into(),
                    data_type: "array".into(),
                    required: true,
                    multiple: false,
                },
                PortDefinition {
                    id: "excluded_data".into(),
                    name: "Excluded records".into(),
                    description: "Records that did not match".into(),
                    data_type: "array".into(),
                    required: false,
                    multiple: false,
                },
            ],
            config_schema: Some(ConfigSchema {
                kind: "object".into(),
                properties: vec![
                    ConfigField {
                        name: "conditions".into(),
                        kind: "array".into(),
                        title: "Conditions".into(),
                        items: Some(Box::new(ConfigField {
                            kind: "object".into(),
                            properties: vec![
                                ConfigField {
                                    name: "field".into(),
                                    kind: "string".into(),
                                    title: "Field".into(),
                                    ..ConfigField::default()
                                },
                                ConfigField {
                                    name: "operator".into(),
                                    kind: "string".into(),
                                    title: "Operator".into(),
                                    default: Some(json!("equals")),
                                    enum_values: Some(vec![
                                        json!("equals"),
                                        json!("not_equals"),
                                        json!("greater"),
                                        json!("greater_equal"),
                                        json!("less"),
                                        json!("less_equal"),
                                        json!("in"),
                                        json!("not_in"),
                                        json!("contains"),
                                        json!("not_contains"),
                                    ]),
                                    ..ConfigField::default()
                                },
                                ConfigField {
                                    name: "value".into(),
                                    kind: "string".into(),
                                    title: "Value".into(),
                                    ..ConfigField::default()
                                },
                                ConfigField {
                                    name: "data_type".into(),
                                    kind: "string".into(),
                                    title: "Data type".into(),
                                    default: Some(json!("string")),
                                    enum_values: Some(vec![
                                        json!("string"),
                                        json!("number"),
                                        json!("boolean"),
                                    ]),
                                    ..ConfigField::default()
                                },
                            ],
                            required: vec!["field".into(), "operator".into(), "value".into()],
                            ..ConfigField::default()
                        })),
                        ..ConfigField::default()
                    },
                    ConfigField {
                        name: "logic".into(),
                        kind: "string".into(),
                        title: "Logic".into(),
                        default: Some(json!("and")),
                        enum_values: Some(vec![json!("and"), json!("or")]),
                        ..ConfigField::default()
                    },
                    ConfigField {
                        name: "include_excluded".into(),
                        kind: "boolean".into(),
                        title: "Output excluded records".into(),
                        default: Some(json!(false)),
                        ..ConfigField::default()
                    },
                    ConfigField {
                        name: "include_stats".into(),
                        kind: "boolean".into(),
                        title: "Include filter statistics".into(),
                        default: Some(json!(true)),
                        ..ConfigField::default()
                    },
                    ConfigField {
                        name: "limit".into(),
                        kind: "number".into(),
                        title: "Result limit".into(),
                        description: "0 means unlimited".into(),
                        default: Some(json!(0)),
                        ..ConfigField::default()
                    },
                ],
                required: vec!["conditions".into()],
            }),
            author: "flowmill".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn validate(&self, config: &ValueMap) -> Result<(), NodeError> {
        let conditions = Self::conditions(config).map_err(NodeError::InvalidConfig)?;
        for (i, condition) in conditions.iter().enumerate() {
            let fields = condition
                .as_object()
                .ok_or_else(|| NodeError::InvalidConfig(format!("condition {i} is not an object")))?;
            for key in ["field", "operator", "value"] {
                if !fields.contains_key(key) {
                    return Err(NodeError::InvalidConfig(format!(
                        "condition {i} is missing '{key}'"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, input: NodeInput) -> Result<NodeOutput, NodeError> {
        let started = Instant::now();
        let mut output = NodeOutput::default();

        let records = match input.data.get("data").and_then(Value::as_array) {
            Some(records) => records,
            None => {
                output.error = Some("missing input data (expected an array under 'data')".into());
                output.duration_ms = started.elapsed().as_millis() as u64;
                return Ok(output);
            }
        };

        let conditions = match Self::conditions(&input.config) {
            Ok(conditions) => conditions,
            Err(msg) => {
                output.error = Some(msg);
                output.duration_ms = started.elapsed().as_millis() as u64;
                return Ok(output);
            }
        };
        let options = Self::options(&input.config);

        output
            .logs
            .push(format!("filtering {} records", records.len()));

        let (mut kept, mut excluded) = (Vec::new(), Vec::new());
        for record in records {
            if Self::matches(record, &conditions, options.logic_or) {
                kept.push(record.clone());
            } else {
                excluded.push(record.clone());
            }
        }

        let mut limited = false;
        if options.limit > 0 && kept.len() > options.limit {
            kept.truncate(options.limit);
            limited = true;
        }

        output.logs.push(format!(
            "kept {} records, excluded {}",
            kept.len(),
            excluded.len()
        ));
        output.metrics.insert("input_count".into(), json!(records.len()));
        output.metrics.insert("output_count".into(), json!(kept.len()));
        output
            .metrics
            .insert("excluded_count".into(), json!(excluded.len()));

        if options.include_stats {
            output.data.insert(
                "filter_stats".into(),
                json!({
                    "total_input": records.len(),
                    "filtered_count": kept.len(),
                    "excluded_count": excluded.len(),
                    "limited": limited,
                }),
            );
        }
        if options.include_excluded {
            output
                .data
                .insert("excluded_data".into(), Value::Array(excluded));
        }
        output
            .data
            .insert("filtered_data".into(), Value::Array(kept));

        output.success = true;
        output.duration_ms = started.elapsed().as_millis() as u64;
        Ok(output)
    }
}
