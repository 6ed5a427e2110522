//! `MockNode` — a scripted test double for [`NodePlugin`].
//!
//! Used by the engine and service tests where a real plugin implementation is
//! either unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::traits::{ConfigSchema, NodeInput, NodeMetadata, NodeOutput, ValueMap};
use crate::{NodeError, NodePlugin};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Succeed with the given output data.
    ReturnData(ValueMap),
    /// Return a structured failure (`success = false` with this error).
    FailOutput(String),
    /// Fail at the transport level (`Err(NodeError::Execution)`).
    FailError(String),
    /// Sleep for the given duration, then succeed with the data.
    /// Used to exercise timeouts and cancellation.
    Sleep(Duration, ValueMap),
}

/// A mock plugin that records every call it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    id: String,
    behaviour: MockBehaviour,
    calls: Arc<Mutex<Vec<NodeInput>>>,
}

impl MockNode {
    pub fn new(id: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            id: id.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that always succeeds with the given output data.
    pub fn returning(id: impl Into<String>, data: ValueMap) -> Self {
        Self::new(id, MockBehaviour::ReturnData(data))
    }

    /// A mock that returns `success = false` with the given error string.
    pub fn failing(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(id, MockBehaviour::FailOutput(error.into()))
    }

    /// A mock that errors at the transport level.
    pub fn erroring(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(id, MockBehaviour::FailError(error.into()))
    }

    /// A mock that sleeps before succeeding.
    pub fn sleeping(id: impl Into<String>, delay: Duration, data: ValueMap) -> Self {
        Self::new(id, MockBehaviour::Sleep(delay, data))
    }

    /// Number of times this plugin has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All inputs seen by this plugin, in call order.
    pub fn calls(&self) -> Vec<NodeInput> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodePlugin for MockNode {
    fn metadata(&self) -> NodeMetadata {
        let now = Utc::now();
        NodeMetadata {
            id: self.id.clone(),
            name: format!("mock: {}", self.id),
            description: "scripted test double".into(),
            version: "0.0.0".into(),
            category: "test".into(),
            kind: "mock".into(),
            icon: String::new(),
            tags: vec!["test".into()],
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            config_schema: Some(ConfigSchema {
                kind: "object".into(),
                properties: Vec::new(),
                required: Vec::new(),
            }),
            author: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn validate(&self, _config: &ValueMap) -> Result<(), NodeError> {
        Ok(())
    }

    async fn execute(&self, input: NodeInput) -> Result<NodeOutput, NodeError> {
        self.calls.lock().unwrap().push(input);

        match &self.behaviour {
            MockBehaviour::ReturnData(data) => Ok(NodeOutput {
                data: data.clone(),
                success: true,
                ..NodeOutput::default()
            }),
            MockBehaviour::FailOutput(error) => Ok(NodeOutput::failure(error.clone())),
            MockBehaviour::FailError(error) => Err(NodeError::Execution(error.clone())),
            MockBehaviour::Sleep(delay, data) => {
                tokio::time::sleep(*delay).await;
                Ok(NodeOutput {
                    data: data.clone(),
                    success: true,
                    ..NodeOutput::default()
                })
            }
        }
    }
}
