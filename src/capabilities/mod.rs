//! Capability abstraction: what a conversation can be routed to.

pub mod directory;
pub mod worker;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::gateway::InvocationResult;

pub use directory::{CapabilityDirectory, CapabilityInfo, DirectoryBuilder};
pub use worker::WorkerCapability;

/// Something the gateway can invoke by id.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Identifier used for routing and direct invocation.
    fn id(&self) -> &str;

    /// One-line description for listings.
    fn description(&self) -> &str;

    /// Invoke with a raw caller payload.
    async fn invoke(
        &self,
        payload: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, GatewayError>;
}
