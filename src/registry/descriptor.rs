//! Worker launch descriptors.

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Flag placed in front of the JSON payload when none is configured.
pub const DEFAULT_PAYLOAD_FLAG: &str = "--payload";

/// A credential merged into every payload sent to the worker.
#[derive(Debug)]
pub struct Credential {
    /// Payload key the credential is written under (e.g. `apiKey`).
    pub param: String,
    /// The secret value. Never logged.
    pub value: SecretString,
}

impl Credential {
    pub fn new(param: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            value: SecretString::from(value.into()),
        }
    }
}

/// How to launch one worker process.
#[derive(Debug)]
pub struct WorkerDescriptor {
    /// Unique, case-sensitive worker identifier.
    pub id: String,
    /// Executable to run.
    pub command: String,
    /// Base arguments, before the payload pair.
    pub args: Vec<String>,
    /// Optional credential merged into the payload.
    pub credential: Option<Credential>,
    /// Fixed parameters merged into the payload under caller-supplied keys.
    pub params: Map<String, Value>,
    /// Human-readable description shown in capability listings.
    pub description: Option<String>,
    /// Flag preceding the JSON-encoded payload argument.
    pub payload_flag: String,
    /// Extra environment variables for the process.
    pub env: HashMap<String, String>,
    /// Per-worker override of the concurrent process cap.
    pub max_concurrency: Option<usize>,
}

impl WorkerDescriptor {
    /// Create a descriptor with no credential and default payload flag.
    pub fn new(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args,
            credential: None,
            params: Map::new(),
            description: None,
            payload_flag: DEFAULT_PAYLOAD_FLAG.to_string(),
            env: HashMap::new(),
            max_concurrency: None,
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Fixed fields this worker contributes to every payload.
    ///
    /// `params` are defaults the caller may override; the credential is
    /// applied last and always wins.
    pub fn merge_fixed_fields(&self, payload: Map<String, Value>) -> Map<String, Value> {
        let mut merged = self.params.clone();
        merged.extend(payload);
        if let Some(credential) = &self.credential {
            merged.insert(
                credential.param.clone(),
                Value::String(credential.value.expose_secret().to_string()),
            );
        }
        merged
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key: format!("workers.{}", self.id),
            message: message.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("worker id must not be empty"));
        }
        if self.command.trim().is_empty() {
            return Err(invalid("command must not be empty"));
        }
        if self.payload_flag.trim().is_empty() {
            return Err(invalid("payloadFlag must not be empty"));
        }
        if let Some(credential) = &self.credential {
            if credential.param.trim().is_empty() {
                return Err(invalid("credential.param must not be empty"));
            }
            if credential.value.expose_secret().trim().is_empty() {
                return Err(invalid("credential.value must not be empty"));
            }
        }
        if self.max_concurrency == Some(0) {
            return Err(invalid("maxConcurrency must be at least 1"));
        }
        Ok(())
    }
}

// ── JSON configuration shape ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct WorkerEntry {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    credential: Option<CredentialEntry>,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    payload_flag: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    max_concurrency: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CredentialEntry {
    param: String,
    value: String,
}

impl WorkerEntry {
    pub(crate) fn into_descriptor(self, id: String) -> WorkerDescriptor {
        WorkerDescriptor {
            id,
            command: self.command,
            args: self.args,
            credential: self.credential.map(|c| Credential::new(c.param, c.value)),
            params: self.params,
            description: self.description,
            payload_flag: self
                .payload_flag
                .unwrap_or_else(|| DEFAULT_PAYLOAD_FLAG.to_string()),
            env: self.env,
            max_concurrency: self.max_concurrency,
        }
    }
}
