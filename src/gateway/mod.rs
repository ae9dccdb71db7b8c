//! Process execution gateway: one subprocess per invocation.

pub mod executor;
pub mod types;

#[cfg(all(test, target_os = "linux"))]
pub(crate) mod testing;

pub use executor::{ProcessGateway, build_argv};
pub use types::{InvocationRequest, InvocationResult};
