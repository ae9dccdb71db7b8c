//! MCP Gateway: routes conversations to external MCP server processes.

pub mod api;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod router;
pub mod session;
