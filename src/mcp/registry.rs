//! MCP server registry and tools cache.
//!
//! CRUD over the persisted server map plus the composite-name catalogue.
//! Adding or refreshing a server replaces its cache entries wholesale;
//! `refresh_all` clears and repopulates every enabled server, pruning
//! entries whose server has been removed or disabled.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::RwLock,
};

use chrono::Utc;
use serde_json::Value;

use crate::storage;
use crate::tools::traits::ToolDefinition;

use super::{
    bridge::McpBridge,
    types::{McpCachedTool, McpServer, McpServerStatus, McpToolsCache},
};

pub struct McpRegistry {
    servers: RwLock<BTreeMap<String, McpServer>>,
    cache: RwLock<McpToolsCache>,
    bridge: McpBridge,
    servers_path: PathBuf,
    cache_path: PathBuf,
}

impl McpRegistry {
    /// Load the persisted server map and cache.  Corrupt files fall back
    /// to empty state; startup never fails here.
    pub fn load(bridge: McpBridge, servers_path: PathBuf, cache_path: PathBuf) -> Self {
        let servers: BTreeMap<String, McpServer> = storage::load_json_or_default(&servers_path);
        let cache: McpToolsCache = storage::load_json_or_default(&cache_path);
        log::info!(
            "mcp: {} server(s), {} cached tool(s)",
            servers.len(),
            cache.tools.len()
        );
        Self {
            servers: RwLock::new(servers),
            cache: RwLock::new(cache),
            bridge,
            servers_path,
            cache_path,
        }
    }

    // ── Server CRUD ──────────────────────────────────────────────────────────

    pub fn list_servers(&self) -> Vec<(McpServer, Option<McpServerStatus>)> {
        let servers = self.servers.read().map(|g| g.clone()).unwrap_or_default();
        let cache = self.cache.read().map(|g| g.clone()).unwrap_or_default();
        servers
            .into_values()
            .map(|s| {
                let status = cache.server_status.get(&s.name).cloned();
                (s, status)
            })
            .collect()
    }

    pub fn get_server(&self, name: &str) -> Option<McpServer> {
        self.servers.read().ok()?.get(name).cloned()
    }

    /// Register (or replace) a server, persist, and fetch its catalogue.
    pub async fn add_server(&self, server: McpServer) -> Result<usize, String> {
        let name = server.name.clone();
        {
            let mut servers = self.servers.write().map_err(|_| "server map poisoned")?;
            servers.insert(name.clone(), server);
            storage::save_json(&self.servers_path, &*servers)
                .map_err(|e| format!("failed to persist servers: {e}"))?;
        }
        self.refresh(&name).await
    }

    /// Remove a server and drop its cache entries.
    pub fn remove_server(&self, name: &str) -> Result<bool, String> {
        let removed = {
            let mut servers = self.servers.write().map_err(|_| "server map poisoned")?;
            let removed = servers.remove(name).is_some();
            storage::save_json(&self.servers_path, &*servers)
                .map_err(|e| format!("failed to persist servers: {e}"))?;
            removed
        };
        if removed {
            self.prune_server_entries(name)?;
        }
        Ok(removed)
    }

    fn prune_server_entries(&self, name: &str) -> Result<(), String> {
        let mut cache = self.cache.write().map_err(|_| "cache poisoned")?;
        cache.tools.retain(|_, t| t.server != name);
        cache.server_status.remove(name);
        storage::save_json(&self.cache_path, &*cache)
            .map_err(|e| format!("failed to persist cache: {e}"))
    }

    // ── Refresh ──────────────────────────────────────────────────────────────

    /// Re-fetch one server's catalogue and replace its cache entries.
    /// Returns the number of tools discovered.
    pub async fn refresh(&self, name: &str) -> Result<usize, String> {
        let server = self
            .get_server(name)
            .ok_or_else(|| format!("unknown MCP server: {name}"))?;

        if !server.enabled {
            self.prune_server_entries(name)?;
            return Ok(0);
        }

        let now = Utc::now();
        match self.bridge.list_tools(&server).await {
            Ok(tools) => {
                let count = tools.len();
                let mut cache = self.cache.write().map_err(|_| "cache poisoned")?;
                cache.tools.retain(|_, t| t.server != name);
                for tool in tools {
                    let composite = format!("mcp_{}_{}", name, tool.name);
                    cache.tools.insert(
                        composite.clone(),
                        McpCachedTool {
                            name: composite,
                            description: tool.description,
                            parameters: tool.input_schema,
                            server: name.to_owned(),
                            tool: tool.name,
                        },
                    );
                }
                cache.server_status.insert(
                    name.to_owned(),
                    McpServerStatus {
                        connected: true,
                        tool_count: count,
                        last_refresh: now,
                    },
                );
                cache.last_refresh = Some(now);
                storage::save_json(&self.cache_path, &*cache)
                    .map_err(|e| format!("failed to persist cache: {e}"))?;
                log::info!("mcp: refreshed '{name}': {count} tool(s)");
                Ok(count)
            }
            Err(e) => {
                let mut cache = self.cache.write().map_err(|_| "cache poisoned")?;
                cache.server_status.insert(
                    name.to_owned(),
                    McpServerStatus {
                        connected: false,
                        tool_count: 0,
                        last_refresh: now,
                    },
                );
                let _ = storage::save_json(&self.cache_path, &*cache);
                log::warn!("mcp: refresh of '{name}' failed: {e}");
                Err(e)
            }
        }
    }

    /// Clear the cache and repopulate every enabled server.  Idempotent.
    pub async fn refresh_all(&self) -> BTreeMap<String, Result<usize, String>> {
        {
            if let Ok(mut cache) = self.cache.write() {
                cache.tools.clear();
                cache.server_status.clear();
            }
        }
        let names: Vec<String> = self
            .servers
            .read()
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default();

        let mut results = BTreeMap::new();
        for name in names {
            let result = self.refresh(&name).await;
            results.insert(name, result);
        }
        results
    }

    // ── Catalogue access ─────────────────────────────────────────────────────

    /// Definitions of all cached tools (enabled servers only by invariant).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.cache
            .read()
            .map(|cache| cache.tools.values().map(McpCachedTool::to_definition).collect())
            .unwrap_or_default()
    }

    /// Resolve a composite `mcp_<server>_<tool>` name to its owner.
    ///
    /// The explicit cache mapping wins; names absent from the cache (e.g.
    /// a call racing a refresh) fall back to matching registered server
    /// names in descending length order, which disambiguates servers whose
    /// names themselves contain underscores.
    pub fn resolve(&self, composite: &str) -> Option<(McpServer, String)> {
        if let Ok(cache) = self.cache.read() {
            if let Some(entry) = cache.tools.get(composite) {
                let server = self.get_server(&entry.server)?;
                return Some((server, entry.tool.clone()));
            }
        }

        let stripped = composite.strip_prefix("mcp_")?;
        let servers = self.servers.read().ok()?;
        let mut names: Vec<&String> = servers.keys().collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));

        for name in names {
            if let Some(rest) = stripped.strip_prefix(&format!("{name}_")) {
                if !rest.is_empty() {
                    return Some((servers.get(name)?.clone(), rest.to_owned()));
                }
            }
        }
        None
    }

    /// Invoke a tool on a named server directly (the `/mcp/call` HTTP
    /// surface, which addresses server and tool separately).
    pub async fn call_server(
        &self,
        server_name: &str,
        tool: &str,
        args: Value,
    ) -> Result<String, String> {
        let server = self
            .get_server(server_name)
            .ok_or_else(|| format!("unknown MCP server: {server_name}"))?;
        if !server.enabled {
            return Err(format!("MCP server '{server_name}' is disabled"));
        }
        self.bridge.call_tool(&server, tool, args).await
    }

    /// Resolve and invoke a composite tool name.
    pub async fn call(&self, composite: &str, args: Value) -> Result<String, String> {
        let (server, tool) = self
            .resolve(composite)
            .ok_or_else(|| format!("No MCP server matches tool '{composite}'"))?;
        if !server.enabled {
            return Err(format!("MCP server '{}' is disabled", server.name));
        }
        self.bridge.call_tool(&server, &tool, args).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn registry_with_servers(names: &[&str]) -> (McpRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = McpRegistry::load(
            McpBridge::new(10, 60),
            dir.path().join("mcp_servers.json"),
            dir.path().join("mcp_tools_cache.json"),
        );
        {
            let mut servers = registry.servers.write().unwrap();
            for name in names {
                servers.insert(
                    (*name).to_owned(),
                    McpServer {
                        name: (*name).to_owned(),
                        url: "http://example.invalid/rpc".to_owned(),
                        transport: "http".to_owned(),
                        api_key: None,
                        enabled: true,
                        description: None,
                    },
                );
            }
        }
        (registry, dir)
    }

    #[test]
    fn resolve_prefers_cache_mapping() {
        let (registry, _dir) = registry_with_servers(&["docker"]);
        {
            let mut cache = registry.cache.write().unwrap();
            cache.tools.insert(
                "mcp_docker_ps".to_owned(),
                McpCachedTool {
                    name: "mcp_docker_ps".to_owned(),
                    description: String::new(),
                    parameters: serde_json::json!({"type": "object"}),
                    server: "docker".to_owned(),
                    tool: "ps".to_owned(),
                },
            );
        }

        let (server, tool) = registry.resolve("mcp_docker_ps").unwrap();
        assert_eq!(server.name, "docker");
        assert_eq!(tool, "ps");
    }

    #[test]
    fn resolve_falls_back_to_longest_server_prefix() {
        let (registry, _dir) = registry_with_servers(&["google", "google_workspace"]);

        // Not in the cache - the longer server name must win so the tool
        // half is "search_gmail" rather than "workspace_search_gmail".
        let (server, tool) = registry.resolve("mcp_google_workspace_search_gmail").unwrap();
        assert_eq!(server.name, "google_workspace");
        assert_eq!(tool, "search_gmail");
    }

    #[test]
    fn resolve_unknown_name_is_none() {
        let (registry, _dir) = registry_with_servers(&["docker"]);
        assert!(registry.resolve("mcp_unknown_ps").is_none());
        assert!(registry.resolve("not_mcp_at_all").is_none());
        // A bare server name with no tool half does not resolve.
        assert!(registry.resolve("mcp_docker_").is_none());
    }

    #[tokio::test]
    async fn remove_server_prunes_cache() {
        let (registry, _dir) = registry_with_servers(&["docker"]);
        {
            let mut cache = registry.cache.write().unwrap();
            cache.tools.insert(
                "mcp_docker_ps".to_owned(),
                McpCachedTool {
                    name: "mcp_docker_ps".to_owned(),
                    description: String::new(),
                    parameters: serde_json::json!({}),
                    server: "docker".to_owned(),
                    tool: "ps".to_owned(),
                },
            );
        }

        assert!(registry.remove_server("docker").unwrap());
        assert!(registry.definitions().is_empty());
        assert!(registry.resolve("mcp_docker_ps").is_none());
    }

    #[test]
    fn definitions_carry_server_source() {
        let (registry, _dir) = registry_with_servers(&["docker"]);
        {
            let mut cache = registry.cache.write().unwrap();
            cache.tools.insert(
                "mcp_docker_ps".to_owned(),
                McpCachedTool {
                    name: "mcp_docker_ps".to_owned(),
                    description: "List containers".to_owned(),
                    parameters: serde_json::json!({"type": "object"}),
                    server: "docker".to_owned(),
                    tool: "ps".to_owned(),
                },
            );
        }
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].source, "mcp:docker");
        assert_eq!(defs[0].name, "mcp_docker_ps");
    }
}
