//! TOML configuration schema for the runtime.
//!
//! All fields have `#[serde(default)]` so a partially-filled `ratel.toml`
//! works correctly.  Missing sections fall back to their `Default` impl.
//!
//! Example:
//! ```toml
//! [provider]
//! proxy_url = "http://proxy:8200"
//! model = "deepseek-chat"
//!
//! [workspace]
//! root = "/workspace"
//!
//! [gateway]
//! port = 8300
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─── ProviderConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the chat-completions proxy (e.g. `"http://proxy:8200"`).
    /// Empty means no backend is configured; turns fail fast with an error.
    pub proxy_url: String,
    /// Model identifier forwarded verbatim to the proxy.
    pub model: String,
    /// `max_tokens` sent with every completion request.
    pub max_tokens: u32,
    /// Hard deadline for one completion call, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            proxy_url: String::new(),
            model: "deepseek-chat".to_owned(),
            max_tokens: 8000,
            request_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    /// Backends that cannot hold a large context or drive native tool
    /// calling (local MLX-style runners).  Tools are omitted for these and
    /// the context char budget shrinks.
    pub fn is_minimal_context(&self) -> bool {
        let model = self.model.to_lowercase();
        model.contains("mlx") || model.starts_with("local/")
    }
}

// ─── AgentConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum tool-call → response iterations per turn.
    pub max_iterations: usize,
    /// Retained user/assistant exchanges; the transcript keeps at most
    /// `2 * max_history` entries between turns.
    pub max_history: usize,
    /// Maximum non-system messages sent to the model in one call.
    pub max_context_messages: usize,
    /// Serialized context budget in characters.
    pub max_context_chars: usize,
    /// Context budget when the backend is a minimal-context variant.
    pub minimal_context_chars: usize,
    /// Cap on a single tool output before head/tail trimming.
    pub max_tool_output: usize,
    /// Security violations tolerated before the session locks.
    pub max_blocked_commands: u32,
    /// Expose only the base toolset plus discovery tools by default.
    pub lazy_tool_loading: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_history: 20,
            max_context_messages: 40,
            max_context_chars: 50_000,
            minimal_context_chars: 40_000,
            max_tool_output: 6_000,
            max_blocked_commands: 3,
            lazy_tool_loading: true,
        }
    }
}

// ─── WorkspaceConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root under which each user gets `<root>/<user_id>` as their cwd.
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/workspace"),
        }
    }
}

impl WorkspaceConfig {
    /// Per-user working directory.
    pub fn user_dir(&self, user_id: i64) -> PathBuf {
        self.root.join(user_id.to_string())
    }

    /// Shared directory for cross-user config (permission overrides).
    pub fn shared_dir(&self) -> PathBuf {
        self.root.join("_shared")
    }
}

// ─── EndpointsConfig ─────────────────────────────────────────────────────────

/// URLs of the external collaborators.  Empty string disables the feature
/// the endpoint backs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Bot adapter callback base (send / send_dm / send_file / edit /
    /// delete / ask / answer).
    pub bot_url: String,
    /// Userbot adapter callback base (same contract plus telegram ops).
    pub userbot_url: String,
    /// Skills service base (mentions / install / list).
    pub skills_url: String,
}

// ─── GatewayConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8300,
        }
    }
}

// ─── SchedulerConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick interval for the due-task scan.
    pub tick_secs: u64,
    /// Per-user cap on live tasks; creates beyond it are rejected.
    pub max_tasks_per_user: usize,
    /// Outbound deadline for `message` tasks (adapter send).
    pub message_timeout_secs: u64,
    /// Outbound deadline for `agent` tasks (full agent turn).
    pub agent_timeout_secs: u64,
    /// Path of the durable task file.
    pub store_path: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 5,
            max_tasks_per_user: 20,
            message_timeout_secs: 10,
            agent_timeout_secs: 120,
            store_path: PathBuf::from("scheduled_tasks.json"),
        }
    }
}

// ─── ToolsConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Hard deadline for a single tool execution.
    pub timeout_secs: u64,
    /// Deadline for an MCP `tools/list` catalogue fetch.
    pub mcp_list_timeout_secs: u64,
    /// Deadline for an MCP `tools/call`.
    pub mcp_call_timeout_secs: u64,
    /// TTL of the tool-definition listing cache.
    pub definitions_ttl_secs: u64,
    /// Path of the persisted enabled-state map.
    pub config_path: PathBuf,
    /// Path of the persisted MCP server map.
    pub mcp_servers_path: PathBuf,
    /// Path of the persisted MCP tools cache.
    pub mcp_cache_path: PathBuf,
    /// System prompt template file.  Missing file → built-in fallback.
    pub system_prompt_path: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            mcp_list_timeout_secs: 10,
            mcp_call_timeout_secs: 60,
            definitions_ttl_secs: 60,
            config_path: PathBuf::from("tools_config.json"),
            mcp_servers_path: PathBuf::from("mcp_servers.json"),
            mcp_cache_path: PathBuf::from("mcp_tools_cache.json"),
            system_prompt_path: PathBuf::from("prompts/system.txt"),
        }
    }
}

// ─── RuntimeConfig ───────────────────────────────────────────────────────────

/// Root configuration object, shared immutably across the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub provider: ProviderConfig,
    pub agent: AgentConfig,
    pub workspace: WorkspaceConfig,
    pub endpoints: EndpointsConfig,
    pub gateway: GatewayConfig,
    pub scheduler: SchedulerConfig,
    pub tools: ToolsConfig,
}

impl RuntimeConfig {
    /// Effective context char cap for the configured backend.
    pub fn context_char_cap(&self) -> usize {
        if self.provider.is_minimal_context() {
            self.agent.minimal_context_chars
        } else {
            self.agent.max_context_chars
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
