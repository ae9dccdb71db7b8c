//! Capability backed by a registry worker process.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Capability;
use crate::error::GatewayError;
use crate::gateway::{InvocationResult, ProcessGateway};

/// Generic description for workers the configuration does not describe.
const DEFAULT_DESCRIPTION: &str = "MCP server with processing capabilities.";

/// Merges the worker's fixed fields into the payload, then runs it through the gateway.
pub struct WorkerCapability {
    id: String,
    description: String,
    gateway: Arc<ProcessGateway>,
}

impl WorkerCapability {
    pub fn new(id: impl Into<String>, gateway: Arc<ProcessGateway>) -> Self {
        let id = id.into();
        let description = gateway
            .registry()
            .get(&id)
            .and_then(|desc| desc.description.clone())
            .or_else(|| builtin_description(&id).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        Self {
            id,
            description,
            gateway,
        }
    }
}

#[async_trait]
impl Capability for WorkerCapability {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(
        &self,
        payload: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, GatewayError> {
        // Without a descriptor the gateway reports ConfigNotFound itself.
        let payload = match self.gateway.registry().get(&self.id) {
            Some(descriptor) => {
                let merged = descriptor.merge_fixed_fields(payload);
                debug!(
                    worker = %self.id,
                    keys = merged.len(),
                    credential = descriptor.credential.is_some(),
                    "Merged fixed worker fields into payload"
                );
                merged
            }
            None => payload,
        };
        self.gateway
            .execute_with_cancel(&self.id, &payload, cancel)
            .await
    }
}

/// Descriptions of the well-known MCP servers.
fn builtin_description(id: &str) -> Option<&'static str> {
    let description = match id {
        "server-sequential-thinking" => "Processes requests using sequential thinking approach.",
        "perplexity-deep-research" => "Conducts deep research on complex topics.",
        "github" => "Interacts with GitHub repositories and issues.",
        "claude-code-mcp" => "Specialized in code generation and analysis.",
        "n8n-workflow-builder" => "Helps build and manage n8n workflows.",
        "fetch-mcp" => "Fetches and processes data from various sources.",
        "smart-thinking" => "Advanced reasoning and problem-solving capabilities.",
        "react-mcp" => "Specializes in React component design and implementation.",
        _ => return None,
    };
    Some(description)
}
