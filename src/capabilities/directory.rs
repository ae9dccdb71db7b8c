//! Capability directory: the dispatch table for routing and direct invocation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Capability, WorkerCapability};
use crate::error::GatewayError;
use crate::gateway::{InvocationRequest, InvocationResult, ProcessGateway};

/// Listing entry for one capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityInfo {
    pub id: String,
    pub description: String,
}

/// Fixed set of invokable capabilities, resolved once at startup.
pub struct CapabilityDirectory {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

/// Collects capabilities before the directory is frozen.
#[derive(Default)]
pub struct DirectoryBuilder {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl DirectoryBuilder {
    /// Add a capability. A later registration under the same id replaces the earlier one.
    pub fn register(mut self, capability: Arc<dyn Capability>) -> Self {
        let id = capability.id().to_string();
        if self.capabilities.insert(id.clone(), capability).is_some() {
            warn!(capability = %id, "Capability registered twice, keeping the last one");
        }
        self
    }

    pub fn build(self) -> CapabilityDirectory {
        CapabilityDirectory {
            capabilities: self.capabilities,
        }
    }
}

impl CapabilityDirectory {
    pub fn builder() -> DirectoryBuilder {
        DirectoryBuilder::default()
    }

    /// One `WorkerCapability` per id, all sharing `gateway`.
    ///
    /// Ids without a registry descriptor still get an entry; invoking them
    /// reports `ConfigNotFound` from the gateway.
    pub fn for_workers<'a>(
        ids: impl IntoIterator<Item = &'a str>,
        gateway: Arc<ProcessGateway>,
    ) -> Self {
        let registry = Arc::clone(gateway.registry());
        let mut builder = Self::builder();
        for id in ids {
            if !registry.contains(id) {
                warn!(worker = %id, "Capability has no worker configuration");
            }
            builder = builder.register(Arc::new(WorkerCapability::new(id, Arc::clone(&gateway))));
        }
        let directory = builder.build();

        for id in registry.ids() {
            if !directory.contains(id) {
                debug!(worker = %id, "Configured worker is not part of the capability directory");
            }
        }
        directory
    }

    /// Invoke a known capability.
    pub async fn invoke(
        &self,
        id: &str,
        payload: Map<String, Value>,
    ) -> Result<InvocationResult, GatewayError> {
        self.invoke_with_cancel(id, payload, &CancellationToken::new())
            .await
    }

    pub async fn invoke_with_cancel(
        &self,
        id: &str,
        payload: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, GatewayError> {
        let capability = self
            .capabilities
            .get(id)
            .ok_or_else(|| GatewayError::ConfigNotFound {
                worker: id.to_string(),
            })?;
        capability.invoke(payload, cancel).await
    }

    /// Invoke the capability a request names.
    pub async fn dispatch(
        &self,
        request: InvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, GatewayError> {
        let worker_id = request.worker_id.clone();
        self.invoke_with_cancel(&worker_id, request.into_payload(), cancel)
            .await
    }

    pub fn contains(&self, id: &str) -> bool {
        self.capabilities.contains_key(id)
    }

    /// All known capability ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.capabilities.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids with descriptions, sorted by id.
    pub fn describe(&self) -> Vec<CapabilityInfo> {
        let mut infos: Vec<CapabilityInfo> = self
            .capabilities
            .values()
            .map(|c| CapabilityInfo {
                id: c.id().to_string(),
                description: c.description().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
