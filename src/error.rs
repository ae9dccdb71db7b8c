//! Error types for the MCP gateway.

use std::time::Duration;

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single invocation or routing call.
///
/// Every variant is terminal for the call that produced it; nothing in the
/// gateway retries automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("No configuration found for worker {worker}")]
    ConfigNotFound { worker: String },

    #[error("Failed to start worker {worker}: {reason}")]
    Spawn { worker: String, reason: String },

    #[error("Worker {worker} exited with code {code}: {stderr}")]
    Process {
        worker: String,
        code: i32,
        stderr: String,
    },

    #[error("Worker {worker} timed out after {timeout:?}")]
    Timeout { worker: String, timeout: Duration },

    #[error("Invocation of worker {worker} was cancelled")]
    Cancelled { worker: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short machine-readable kind, used in logs and HTTP responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigNotFound { .. } => "config_not_found",
            Self::Spawn { .. } => "spawn_error",
            Self::Process { .. } => "process_error",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Validation(_) => "validation_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to hand back to a client.
    ///
    /// Internal errors are already logged where they happen, so their detail
    /// is not echoed.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
