//! Worker registry: immutable map from worker id to launch descriptor.

pub mod descriptor;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ConfigError;
pub use descriptor::{Credential, DEFAULT_PAYLOAD_FLAG, WorkerDescriptor};
use descriptor::WorkerEntry;

/// Registry of configured workers. Read-only once built.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<WorkerDescriptor>>,
}

impl WorkerRegistry {
    /// Build a registry from descriptors, rejecting duplicates and invalid entries.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = WorkerDescriptor>,
    ) -> Result<Self, ConfigError> {
        let mut workers = HashMap::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            if workers.contains_key(&descriptor.id) {
                return Err(ConfigError::InvalidValue {
                    key: format!("workers.{}", descriptor.id),
                    message: "duplicate worker id".to_string(),
                });
            }
            debug!(worker = %descriptor.id, command = %descriptor.command, "Registered worker");
            workers.insert(descriptor.id.clone(), Arc::new(descriptor));
        }
        Ok(Self { workers })
    }

    /// Parse the `{ "<id>": { "command": ..., "args": [...] } }` configuration shape.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let entries: BTreeMap<String, WorkerEntry> =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::from_descriptors(
            entries
                .into_iter()
                .map(|(id, entry)| entry.into_descriptor(id)),
        )
    }

    /// Load the worker configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let registry = Self::from_json_str(&json)?;
        info!(path = %path.display(), workers = registry.len(), "Loaded worker configuration");
        Ok(registry)
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, id: &str) -> Option<&Arc<WorkerDescriptor>> {
        self.workers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workers.contains_key(id)
    }

    /// All worker ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
