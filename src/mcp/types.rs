//! Persisted MCP configuration and cache types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::traits::ToolDefinition;

// ─── McpServer ───────────────────────────────────────────────────────────────

/// A configured remote tool server, persisted in `mcp_servers.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    pub url: String,
    /// Only `"http"` is supported; kept explicit for forward compatibility.
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_transport() -> String {
    "http".to_owned()
}

fn default_enabled() -> bool {
    true
}

// ─── McpCachedTool ───────────────────────────────────────────────────────────

/// One cached catalogue entry.
///
/// The owning server and original tool name are stored explicitly so
/// invocation never has to re-parse the composite `mcp_<server>_<tool>`
/// name, which is ambiguous when server names contain underscores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpCachedTool {
    /// Composite name the model sees: `mcp_<server>_<tool>`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Value,
    pub server: String,
    /// Tool name as reported by the server.
    pub tool: String,
}

impl McpCachedTool {
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            source: format!("mcp:{}", self.server),
            enabled: true,
        }
    }
}

// ─── McpServerStatus / McpToolsCache ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerStatus {
    pub connected: bool,
    pub tool_count: usize,
    pub last_refresh: DateTime<Utc>,
}

/// The persisted tools cache (`mcp_tools_cache.json`).
///
/// Invariant: every entry's `server` refers to an enabled [`McpServer`];
/// entries for removed or disabled servers are pruned on refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpToolsCache {
    #[serde(default)]
    pub tools: BTreeMap<String, McpCachedTool>,
    #[serde(default)]
    pub server_status: BTreeMap<String, McpServerStatus>,
    #[serde(default)]
    pub last_refresh: Option<DateTime<Utc>>,
}
