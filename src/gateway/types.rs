//! Invocation request/result types.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

/// One call against a single worker. Built per call, never retained.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub worker_id: String,
    pub payload: Map<String, Value>,
    /// Conversation hints, folded into the payload under `context` when present.
    pub context: Option<Map<String, Value>>,
}

impl InvocationRequest {
    pub fn new(worker_id: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            worker_id: worker_id.into(),
            payload,
            context: None,
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// Payload as sent to the worker.
    pub fn into_payload(self) -> Map<String, Value> {
        let mut payload = self.payload;
        if let Some(context) = self.context {
            payload
                .entry("context")
                .or_insert_with(|| Value::Object(context));
        }
        payload
    }
}

/// Outcome of a worker process that exited successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub success: bool,
    /// All stdout chunks, concatenated in arrival order.
    pub output: String,
    /// All stderr chunks, concatenated in arrival order.
    pub stderr: String,
    pub exit_code: i32,
    #[serde(skip)]
    pub duration: Duration,
}
