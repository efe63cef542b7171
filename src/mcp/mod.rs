//! MCP (Model Context Protocol) integration.
//!
//! External tool servers expose `tools/list` and `tools/call` over
//! JSON-RPC 2.0.  [`bridge`] speaks the wire protocol; [`registry`] owns
//! the persisted server map and tools cache and resolves composite
//! `mcp_<server>_<tool>` names back to their owners.

pub mod bridge;
pub mod registry;
pub mod types;

pub use bridge::McpBridge;
pub use registry::McpRegistry;
pub use types::{McpCachedTool, McpServer, McpServerStatus, McpToolsCache};
