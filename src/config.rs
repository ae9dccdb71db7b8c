//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Path of the JSON worker configuration file.
    pub workers_path: PathBuf,
    /// Deadline for a single worker invocation before the process is killed.
    pub invocation_timeout: Duration,
    /// Concurrent processes allowed per worker unless the descriptor overrides it.
    pub max_concurrency_per_worker: usize,
    /// Maximum number of conversations kept in memory (least recently used are evicted).
    pub max_sessions: usize,
    /// Idle time after which a conversation is dropped.
    ///
    /// Zero is accepted and disables idle expiry; only the capacity bound applies.
    pub session_ttl: Duration,
    /// How often idle conversations are swept.
    pub sweep_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            workers_path: PathBuf::from("./mcp-config.json"),
            invocation_timeout: Duration::from_secs(120),
            max_concurrency_per_worker: 4,
            max_sessions: 10_000,
            session_ttl: Duration::from_secs(3600), // 1 hour
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl GatewayConfig {
    /// Build from `MCP_GATEWAY_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            port: lookup("MCP_GATEWAY_PORT")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.port),
            workers_path: lookup("MCP_GATEWAY_WORKERS")
                .map(PathBuf::from)
                .unwrap_or(defaults.workers_path),
            invocation_timeout: parsed("MCP_GATEWAY_INVOKE_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.invocation_timeout),
            max_concurrency_per_worker: parsed("MCP_GATEWAY_MAX_CONCURRENCY")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.max_concurrency_per_worker),
            max_sessions: parsed("MCP_GATEWAY_MAX_SESSIONS")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.max_sessions),
            session_ttl: parsed("MCP_GATEWAY_SESSION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            sweep_interval: parsed("MCP_GATEWAY_SWEEP_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }
}
