//! Central tool catalogue.
//!
//! Two tiers: built-in executors registered at boot, and dynamically
//! discovered definitions merged in from the MCP cache and (best-effort)
//! the skills service.  Enabled state is a persisted `tools_config.json`
//! map; anything absent from it defaults to enabled.
//!
//! Listings are fronted by a short TTL cache keyed by `(source, lazy)` -
//! they are assembled on every agent turn - and the cache is invalidated
//! whenever an admin toggles a tool or mutates the MCP registry.

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::{Arc, Mutex, RwLock},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::mcp::McpRegistry;
use crate::skills::SkillsClient;
use crate::storage;

use super::traits::{Tool, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// The lazy-loading base subset: what the model always sees, plus the
/// discovery pair it uses to pull in anything else.
pub const BASE_TOOL_NAMES: &[&str] = &[
    "run_command",
    "read_file",
    "write_file",
    "edit_file",
    "list_directory",
    "search_files",
    "search_text",
    "memory",
    "manage_tasks",
    "search_tools",
    "load_tools",
    "search_web",
    "fetch_page",
    "telegram_channel",
    "telegram_send",
    "telegram_dialogs",
    "telegram_history",
    "telegram_join",
];

/// Bot-callback tools: appended for `bot`-sourced turns, never part of
/// the managed catalogue.
pub const BOT_ONLY_TOOLS: &[&str] = &["send_file", "send_dm", "manage_message", "ask_user"];

// ─── Enabled-state map ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolState {
    pub enabled: bool,
}

type ToolConfigMap = BTreeMap<String, ToolState>;

// ─── Search results ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ScoredTool {
    pub name: String,
    pub description: String,
    pub source: String,
    pub score: i32,
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

struct ListingCache {
    entries: HashMap<(String, bool), (Instant, Vec<ToolDefinition>)>,
}

pub struct ToolRegistry {
    /// name → (executor, source tag).  BTreeMap keeps listings stable.
    executors: RwLock<BTreeMap<String, (Arc<dyn Tool>, String)>>,
    /// Persisted enabled-state overrides.
    config: RwLock<ToolConfigMap>,
    config_path: PathBuf,
    mcp: Arc<McpRegistry>,
    skills: Arc<SkillsClient>,
    cache: Mutex<ListingCache>,
    ttl: Duration,
}

impl ToolRegistry {
    pub fn new(
        mcp: Arc<McpRegistry>,
        skills: Arc<SkillsClient>,
        config_path: PathBuf,
        ttl_secs: u64,
    ) -> Self {
        let config: ToolConfigMap = storage::load_json_or_default(&config_path);
        Self {
            executors: RwLock::new(BTreeMap::new()),
            config: RwLock::new(config),
            config_path,
            mcp,
            skills,
            cache: Mutex::new(ListingCache {
                entries: HashMap::new(),
            }),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    // ── Registration and lookup ──────────────────────────────────────────────

    /// Register a built-in tool under a source tag (`builtin`,
    /// `builtin:userbot`, `builtin:bot`).  Overwrites a same-named tool.
    pub fn register(&self, tool: Arc<dyn Tool>, source: &str) {
        if let Ok(mut map) = self.executors.write() {
            map.insert(tool.name().to_owned(), (tool, source.to_owned()));
        }
    }

    /// Look up an executor by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.executors
            .read()
            .ok()?
            .get(name)
            .map(|(tool, _)| tool.clone())
    }

    /// Names of every known tool (built-in + cached MCP + skills are not
    /// included here; this feeds the permission status report).
    pub fn builtin_names(&self) -> Vec<String> {
        self.executors
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn is_enabled(&self, name: &str) -> bool {
        self.config
            .read()
            .ok()
            .and_then(|cfg| cfg.get(name).map(|s| s.enabled))
            .unwrap_or(true)
    }

    // ── Catalogue assembly ───────────────────────────────────────────────────

    /// Every known definition with its current enabled state: managed
    /// built-ins (bot-only excluded), MCP cache, skill-sourced extras.
    pub async fn all_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = Vec::new();

        if let Ok(map) = self.executors.read() {
            for (name, (tool, source)) in map.iter() {
                if BOT_ONLY_TOOLS.contains(&name.as_str()) {
                    continue;
                }
                let mut def = ToolDefinition::from_tool(tool.as_ref(), source);
                def.enabled = self.is_enabled(name);
                defs.push(def);
            }
        }

        for mut def in self.mcp.definitions() {
            def.enabled = self.is_enabled(&def.name);
            defs.push(def);
        }

        for mut def in self.skills.tool_definitions().await {
            def.enabled = self.is_enabled(&def.name);
            defs.push(def);
        }

        defs
    }

    /// Enabled definitions only.
    pub async fn enabled_definitions(&self) -> Vec<ToolDefinition> {
        self.all_definitions()
            .await
            .into_iter()
            .filter(|d| d.enabled)
            .collect()
    }

    /// The lazy-loading base subset (enabled members only, in the fixed
    /// base order).
    pub async fn base_definitions(&self) -> Vec<ToolDefinition> {
        let all: BTreeMap<String, ToolDefinition> = self
            .all_definitions()
            .await
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        BASE_TOOL_NAMES
            .iter()
            .filter_map(|name| all.get(*name))
            .filter(|d| d.enabled)
            .cloned()
            .collect()
    }

    /// Bot-callback definitions appended for `bot`-sourced turns.
    pub fn bot_only_definitions(&self) -> Vec<ToolDefinition> {
        let map = match self.executors.read() {
            Ok(m) => m,
            Err(_) => return Vec::new(),
        };
        BOT_ONLY_TOOLS
            .iter()
            .filter_map(|name| map.get(*name))
            .map(|(tool, source)| ToolDefinition::from_tool(tool.as_ref(), source))
            .collect()
    }

    /// The toolset for one agent turn, before permission filtering:
    /// base or full catalogue per `lazy`, plus bot-only tools for the
    /// `bot` source.  Cached for [`Self::ttl`] per `(source, lazy)`.
    pub async fn definitions_for(&self, source: &str, lazy: bool) -> Vec<ToolDefinition> {
        let key = (source.to_owned(), lazy);
        if let Ok(cache) = self.cache.lock() {
            if let Some((at, defs)) = cache.entries.get(&key) {
                if at.elapsed() < self.ttl {
                    return defs.clone();
                }
            }
        }

        let mut defs = if lazy {
            self.base_definitions().await
        } else {
            self.enabled_definitions().await
        };
        if source == "bot" {
            defs.extend(self.bot_only_definitions());
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.entries.insert(key, (Instant::now(), defs.clone()));
        }
        log::debug!(
            "tools: assembled {} definition(s) for source={source} lazy={lazy}",
            defs.len()
        );
        defs
    }

    /// Drop all cached listings.  Called on admin writes and MCP changes.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.entries.clear();
        }
    }

    // ── Discovery ────────────────────────────────────────────────────────────

    /// Score-ranked search over the whole catalogue.
    ///
    /// Scoring: exact name +100, name contains query +50, name contains a
    /// query word +30, description contains query +10, word +5.  With an
    /// empty query everything matches at score 0.
    pub async fn search(
        &self,
        query: &str,
        source_filter: &str,
        limit: usize,
    ) -> (Vec<ScoredTool>, usize) {
        let all = self.all_definitions().await;
        let total = all.len();

        let query = query.to_lowercase();
        let words: Vec<&str> = query.split_whitespace().collect();

        let mut results: Vec<ScoredTool> = all
            .into_iter()
            .filter(|def| match source_filter {
                "builtin" => def.source.starts_with("builtin"),
                "mcp" => def.source.starts_with("mcp:"),
                "skill" => def.source.starts_with("skill:"),
                _ => true,
            })
            .filter_map(|def| {
                let name = def.name.to_lowercase();
                let desc = def.description.to_lowercase();
                let mut score = 0;
                if !query.is_empty() {
                    if name == query {
                        score += 100;
                    } else if name.contains(&query) {
                        score += 50;
                    } else if words.iter().any(|w| name.contains(w)) {
                        score += 30;
                    }
                    if desc.contains(&query) {
                        score += 10;
                    } else if words.iter().any(|w| desc.contains(w)) {
                        score += 5;
                    }
                    if score == 0 {
                        return None;
                    }
                }
                Some(ScoredTool {
                    name: def.name,
                    description: def.description,
                    source: def.source,
                    score,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.cmp(&a.score).then(a.name.cmp(&b.name)));
        if limit > 0 {
            results.truncate(limit);
        }
        (results, total)
    }

    /// Full definitions for the named tools (enabled ones only).
    /// Duplicate requests collapse; unknown or disabled names land in the
    /// `not_found` list.
    pub async fn load(&self, names: &[String]) -> (Vec<ToolDefinition>, Vec<String>) {
        let all: BTreeMap<String, ToolDefinition> = self
            .all_definitions()
            .await
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        let mut loaded = Vec::new();
        let mut not_found = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for name in names {
            if !seen.insert(name.clone()) {
                continue;
            }
            match all.get(name) {
                Some(def) if def.enabled => loaded.push(def.clone()),
                _ => not_found.push(name.clone()),
            }
        }
        (loaded, not_found)
    }

    // ── Admin ────────────────────────────────────────────────────────────────

    /// Toggle a tool.  Unknown names are rejected so typos don't create
    /// phantom config entries.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), String> {
        let known = self
            .all_definitions()
            .await
            .iter()
            .any(|d| d.name == name);
        if !known {
            return Err(format!("Tool {name} not found"));
        }

        {
            let mut config = self.config.write().map_err(|_| "tool config poisoned")?;
            config.insert(name.to_owned(), ToolState { enabled });
            storage::save_json(&self.config_path, &*config)
                .map_err(|e| format!("failed to persist tool config: {e}"))?;
        }
        self.invalidate();
        Ok(())
    }

    /// Remove a tool's override, restoring its default (enabled) state.
    pub fn reset(&self, name: &str) -> Result<(), String> {
        {
            let mut config = self.config.write().map_err(|_| "tool config poisoned")?;
            config.remove(name);
            storage::save_json(&self.config_path, &*config)
                .map_err(|e| format!("failed to persist tool config: {e}"))?;
        }
        self.invalidate();
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mcp::McpBridge;
    use crate::tools::traits::{ToolContext, ToolResult};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct DummyTool {
        name: &'static str,
        description: &'static str,
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            self.description
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            Ok(ToolResult::ok("done"))
        }
    }

    fn make_registry() -> (ToolRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mcp = Arc::new(McpRegistry::load(
            McpBridge::new(10, 60),
            dir.path().join("mcp_servers.json"),
            dir.path().join("mcp_tools_cache.json"),
        ));
        let skills = Arc::new(SkillsClient::new(""));
        let registry = ToolRegistry::new(mcp, skills, dir.path().join("tools_config.json"), 60);
        (registry, dir)
    }

    fn register_dummies(registry: &ToolRegistry) {
        for (name, desc) in [
            ("read_file", "Read file contents. Always read before editing."),
            ("write_file", "Write content to file."),
            ("search_web", "Search the internet for current info."),
        ] {
            registry.register(
                Arc::new(DummyTool {
                    name,
                    description: desc,
                }),
                "builtin",
            );
        }
        registry.register(
            Arc::new(DummyTool {
                name: "send_dm",
                description: "Send a private message to current user.",
            }),
            "builtin:bot",
        );
    }

    #[tokio::test]
    async fn bot_only_tools_excluded_from_managed_catalogue() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);

        let all = registry.all_definitions().await;
        assert!(all.iter().all(|d| d.name != "send_dm"));

        let bot_only = registry.bot_only_definitions();
        assert_eq!(bot_only.len(), 1);
        assert_eq!(bot_only[0].name, "send_dm");
    }

    #[tokio::test]
    async fn definitions_for_appends_bot_tools_for_bot_source() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);

        let bot = registry.definitions_for("bot", false).await;
        assert!(bot.iter().any(|d| d.name == "send_dm"));

        let userbot = registry.definitions_for("userbot", false).await;
        assert!(userbot.iter().all(|d| d.name != "send_dm"));
    }

    #[tokio::test]
    async fn toggle_disables_and_reset_restores() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);

        registry.set_enabled("search_web", false).await.unwrap();
        let enabled = registry.enabled_definitions().await;
        assert!(enabled.iter().all(|d| d.name != "search_web"));

        registry.reset("search_web").unwrap();
        let enabled = registry.enabled_definitions().await;
        assert!(enabled.iter().any(|d| d.name == "search_web"));
    }

    #[tokio::test]
    async fn toggle_unknown_tool_is_rejected() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);
        assert!(registry.set_enabled("no_such_tool", false).await.is_err());
    }

    #[tokio::test]
    async fn search_ranks_exact_name_first() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);

        let (results, total) = registry.search("read_file", "all", 10).await;
        assert_eq!(total, 3);
        assert_eq!(results[0].name, "read_file");
        assert_eq!(results[0].score, 100);
    }

    #[tokio::test]
    async fn search_matches_description_words() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);

        let (results, _) = registry.search("internet", "all", 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "search_web");
    }

    #[tokio::test]
    async fn search_empty_query_returns_everything() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);

        let (results, _) = registry.search("", "all", 0).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.score == 0));
    }

    #[tokio::test]
    async fn load_reports_not_found_and_dedups() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);
        registry.set_enabled("write_file", false).await.unwrap();

        let (loaded, not_found) = registry
            .load(&[
                "read_file".to_owned(),
                "read_file".to_owned(),
                "write_file".to_owned(),
                "ghost".to_owned(),
            ])
            .await;

        let names: Vec<&str> = loaded.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["read_file"]);
        assert_eq!(not_found, vec!["write_file".to_owned(), "ghost".to_owned()]);
    }

    #[tokio::test]
    async fn loaded_tools_are_subset_of_enabled() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);

        let enabled: Vec<String> = registry
            .enabled_definitions()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();
        let (loaded, _) = registry
            .load(&["read_file".to_owned(), "search_web".to_owned()])
            .await;

        for def in &loaded {
            assert!(enabled.contains(&def.name));
        }
        // No duplicates.
        let mut names: Vec<&str> = loaded.iter().map(|d| d.name.as_str()).collect();
        names.dedup();
        assert_eq!(names.len(), loaded.len());
    }

    #[tokio::test]
    async fn listing_cache_serves_within_ttl_until_invalidated() {
        let (registry, _dir) = make_registry();
        register_dummies(&registry);

        let first = registry.definitions_for("bot", false).await;
        // Register a new tool; the cached listing must not see it yet.
        registry.register(
            Arc::new(DummyTool {
                name: "fetch_page",
                description: "Fetch a URL.",
            }),
            "builtin",
        );
        let cached = registry.definitions_for("bot", false).await;
        assert_eq!(first.len(), cached.len());

        registry.invalidate();
        let fresh = registry.definitions_for("bot", false).await;
        assert_eq!(fresh.len(), first.len() + 1);
    }
}
