//! Tool permissions - allowlist/denylist by session type.
//!
//! Defence-in-depth: even when prompt injection succeeds, dangerous tools
//! are simply not available in group or sandbox contexts.
//!
//! Session types: `main` (direct messages), `group`, `sandbox` (untrusted
//! users), `userbot`.  Defaults live in [`default_rules`] and can be
//! overridden per type through `<workspace>/_shared/tool_permissions.json`.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

use crate::storage;
use crate::tools::traits::ToolDefinition;

// ─── SessionKind ─────────────────────────────────────────────────────────────

/// Effective permission category a turn runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Main,
    Group,
    Sandbox,
    Userbot,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Main => "main",
            SessionKind::Group => "group",
            SessionKind::Sandbox => "sandbox",
            SessionKind::Userbot => "userbot",
        }
    }

    /// Map a chat type and message source to the effective kind.  The
    /// userbot source always wins; unknown chat types fall back to `main`.
    pub fn effective(chat_type: &str, source: &str) -> Self {
        if source == "userbot" {
            return SessionKind::Userbot;
        }
        match chat_type {
            "group" | "supergroup" => SessionKind::Group,
            "sandbox" => SessionKind::Sandbox,
            _ => SessionKind::Main,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "main" => Some(SessionKind::Main),
            "group" => Some(SessionKind::Group),
            "sandbox" => Some(SessionKind::Sandbox),
            "userbot" => Some(SessionKind::Userbot),
            _ => None,
        }
    }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    Allowlist,
    Denylist,
}

/// The tool set a rule applies to: every tool, or an explicit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolSet {
    /// `"*"` on the wire.
    All(String),
    Names(Vec<String>),
}

impl ToolSet {
    pub fn all() -> Self {
        ToolSet::All("*".to_owned())
    }

    fn is_all(&self) -> bool {
        matches!(self, ToolSet::All(_))
    }

    fn contains(&self, name: &str) -> bool {
        match self {
            ToolSet::All(_) => true,
            ToolSet::Names(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Per-session-type permission rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub mode: RuleMode,
    pub tools: ToolSet,
    #[serde(default)]
    pub description: String,
}

/// Tools that are never available in sandbox sessions, regardless of the
/// configured rule.
pub const SANDBOX_DENIED: &[&str] = &["send_dm", "manage_message", "schedule_task", "ask_user"];

/// Advisory map of tools that warrant extra caution, surfaced in the
/// admin status report.
pub const DANGEROUS_TOOLS: &[(&str, &str)] = &[
    ("run_command", "Can execute arbitrary shell commands"),
    ("write_file", "Can overwrite files"),
    ("delete_file", "Can delete files"),
    ("schedule_task", "Can schedule persistent tasks"),
];

fn default_rules() -> BTreeMap<SessionKind, PermissionRule> {
    let mut rules = BTreeMap::new();
    rules.insert(
        SessionKind::Main,
        PermissionRule {
            mode: RuleMode::Allowlist,
            tools: ToolSet::all(),
            description: "Full access for direct messages".to_owned(),
        },
    );
    rules.insert(
        SessionKind::Group,
        PermissionRule {
            mode: RuleMode::Denylist,
            tools: ToolSet::Names(vec![
                "send_dm".to_owned(),
                "manage_message".to_owned(),
                "schedule_task".to_owned(),
            ]),
            description: "Restricted access for group chats".to_owned(),
        },
    );
    rules.insert(
        SessionKind::Sandbox,
        PermissionRule {
            mode: RuleMode::Allowlist,
            tools: ToolSet::Names(
                [
                    "run_command",
                    "read_file",
                    "write_file",
                    "edit_file",
                    "delete_file",
                    "search_files",
                    "search_text",
                    "list_directory",
                    "memory",
                    "manage_tasks",
                ]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            ),
            description: "Minimal tools for sandboxed sessions".to_owned(),
        },
    );
    rules.insert(
        SessionKind::Userbot,
        PermissionRule {
            mode: RuleMode::Denylist,
            tools: ToolSet::Names(vec![
                "send_file".to_owned(),
                "send_dm".to_owned(),
                "manage_message".to_owned(),
                "ask_user".to_owned(),
            ]),
            description: "Userbot cannot use bot-callback tools".to_owned(),
        },
    );
    rules
}

// ─── PermissionDecision ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub reason: String,
    pub tool: String,
    pub session_type: SessionKind,
}

// ─── PermissionEngine ────────────────────────────────────────────────────────

/// Shared permission checker.  Interior `RwLock` so admin updates take
/// effect for in-flight turns; reads dominate.
pub struct PermissionEngine {
    rules: RwLock<BTreeMap<SessionKind, PermissionRule>>,
    /// Override file, loaded at startup and rewritten on admin updates.
    override_path: PathBuf,
}

impl PermissionEngine {
    /// Build from defaults merged with the on-disk override file (if any).
    pub fn load(override_path: PathBuf) -> Self {
        let mut rules = default_rules();

        match storage::load_json::<BTreeMap<String, PermissionRule>>(&override_path) {
            Ok(Some(custom)) => {
                for (key, rule) in custom {
                    match SessionKind::parse(&key) {
                        Some(kind) => {
                            rules.insert(kind, rule);
                        }
                        None => log::warn!("permissions: ignoring unknown session type '{key}'"),
                    }
                }
                log::info!("permissions: loaded overrides from {}", override_path.display());
            }
            Ok(None) => {}
            Err(e) => log::error!("permissions: failed to load overrides: {e}"),
        }

        Self {
            rules: RwLock::new(rules),
            override_path,
        }
    }

    /// Decide whether `tool_name` may run in a session of the given chat
    /// type and source.
    pub fn check(&self, tool_name: &str, chat_type: &str, source: &str) -> PermissionDecision {
        let kind = SessionKind::effective(chat_type, source);
        let rules = match self.rules.read() {
            Ok(g) => g,
            Err(_) => {
                return PermissionDecision {
                    allowed: false,
                    reason: "permission table unavailable".to_owned(),
                    tool: tool_name.to_owned(),
                    session_type: kind,
                };
            }
        };

        let rule = rules.get(&kind).or_else(|| rules.get(&SessionKind::Main));
        let (mut allowed, mut reason) = match rule {
            Some(rule) => match rule.mode {
                RuleMode::Allowlist => {
                    if rule.tools.is_all() {
                        (true, "All tools allowed".to_owned())
                    } else if rule.tools.contains(tool_name) {
                        (true, "Tool in allowlist".to_owned())
                    } else {
                        (false, "Tool not in allowlist".to_owned())
                    }
                }
                RuleMode::Denylist => {
                    if rule.tools.is_all() {
                        (false, "All tools denied".to_owned())
                    } else if rule.tools.contains(tool_name) {
                        (false, "Tool in denylist".to_owned())
                    } else {
                        (true, "Tool not in denylist".to_owned())
                    }
                }
            },
            None => (true, "No rule, defaulting to allow".to_owned()),
        };

        // Sandbox hard-deny overrides any configured rule.
        if kind == SessionKind::Sandbox && SANDBOX_DENIED.contains(&tool_name) {
            allowed = false;
            reason = format!("Tool '{tool_name}' never allowed in sandbox");
        }

        PermissionDecision {
            allowed,
            reason,
            tool: tool_name.to_owned(),
            session_type: kind,
        }
    }

    /// Subset of `all_names` permitted for the session.
    pub fn allowed_tools(&self, all_names: &[String], chat_type: &str, source: &str) -> Vec<String> {
        all_names
            .iter()
            .filter(|name| self.check(name, chat_type, source).allowed)
            .cloned()
            .collect()
    }

    /// Remove definitions the session may not use.  Idempotent.
    pub fn filter(
        &self,
        definitions: Vec<ToolDefinition>,
        chat_type: &str,
        source: &str,
    ) -> Vec<ToolDefinition> {
        let before = definitions.len();
        let filtered: Vec<ToolDefinition> = definitions
            .into_iter()
            .filter(|def| self.check(&def.name, chat_type, source).allowed)
            .collect();
        log::debug!(
            "permissions: filtered tools for {chat_type}/{source}: {}/{before}",
            filtered.len()
        );
        filtered
    }

    /// Update one session type's rule and persist the whole map atomically.
    pub fn update(
        &self,
        session_type: &str,
        mode: Option<RuleMode>,
        tools: Option<ToolSet>,
    ) -> Result<(), String> {
        let kind = SessionKind::parse(session_type)
            .ok_or_else(|| format!("invalid session type: {session_type}"))?;

        let snapshot = {
            let mut rules = self.rules.write().map_err(|_| "permission table poisoned")?;
            let rule = rules.entry(kind).or_insert_with(|| PermissionRule {
                mode: RuleMode::Allowlist,
                tools: ToolSet::all(),
                description: String::new(),
            });
            if let Some(mode) = mode {
                rule.mode = mode;
            }
            if let Some(tools) = tools {
                rule.tools = tools;
            }
            rules
                .iter()
                .map(|(k, v)| (k.as_str().to_owned(), v.clone()))
                .collect::<BTreeMap<String, PermissionRule>>()
        };

        storage::save_json(&self.override_path, &snapshot)
            .map_err(|e| format!("failed to persist permissions: {e}"))
    }

    /// Status report for the admin surface.
    pub fn status(&self, all_names: &[String]) -> serde_json::Value {
        let rules = match self.rules.read() {
            Ok(g) => g.clone(),
            Err(_) => BTreeMap::new(),
        };

        let per_type: BTreeMap<String, serde_json::Value> = rules
            .iter()
            .map(|(kind, rule)| {
                let allowed = self.allowed_tools(
                    all_names,
                    kind.as_str(),
                    if *kind == SessionKind::Userbot { "userbot" } else { "bot" },
                );
                (
                    kind.as_str().to_owned(),
                    serde_json::json!({
                        "mode": rule.mode,
                        "tools": rule.tools,
                        "allowed_count": allowed.len(),
                        "description": rule.description,
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "session_types": rules.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            "total_tools": all_names.len(),
            "permissions": per_type,
            "dangerous_tools": DANGEROUS_TOOLS
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect::<BTreeMap<_, _>>(),
            "sandbox_denied": SANDBOX_DENIED,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> PermissionEngine {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool_permissions.json");
        // Leak the tempdir so the path stays valid for the test's writes.
        std::mem::forget(dir);
        PermissionEngine::load(path)
    }

    fn defs(names: &[&str]) -> Vec<ToolDefinition> {
        names
            .iter()
            .map(|n| ToolDefinition {
                name: (*n).to_owned(),
                description: String::new(),
                parameters: json!({"type": "object"}),
                source: "builtin".to_owned(),
                enabled: true,
            })
            .collect()
    }

    #[test]
    fn effective_type_mapping() {
        assert_eq!(SessionKind::effective("private", "bot"), SessionKind::Main);
        assert_eq!(SessionKind::effective("group", "bot"), SessionKind::Group);
        assert_eq!(SessionKind::effective("supergroup", "bot"), SessionKind::Group);
        assert_eq!(SessionKind::effective("sandbox", "bot"), SessionKind::Sandbox);
        assert_eq!(SessionKind::effective("channel", "bot"), SessionKind::Main);
        // Userbot source always wins.
        assert_eq!(SessionKind::effective("group", "userbot"), SessionKind::Userbot);
    }

    #[test]
    fn main_allows_everything() {
        let engine = engine();
        assert!(engine.check("run_command", "private", "bot").allowed);
        assert!(engine.check("send_dm", "private", "bot").allowed);
    }

    #[test]
    fn group_denies_listed_tools() {
        let engine = engine();
        let denied = engine.check("send_dm", "group", "bot");
        assert!(!denied.allowed);
        assert_eq!(denied.session_type, SessionKind::Group);
        assert!(engine.check("read_file", "group", "bot").allowed);
    }

    #[test]
    fn sandbox_hard_deny_overrides_allowlist() {
        let engine = engine();
        // Even if an admin allowlists it, ask_user stays denied in sandbox.
        engine
            .update("sandbox", Some(RuleMode::Allowlist), Some(ToolSet::all()))
            .unwrap();
        let decision = engine.check("ask_user", "sandbox", "bot");
        assert!(!decision.allowed);
        assert!(decision.reason.contains("never allowed in sandbox"));
        assert!(engine.check("read_file", "sandbox", "bot").allowed);
    }

    #[test]
    fn userbot_denies_bot_callback_tools() {
        let engine = engine();
        assert!(!engine.check("send_file", "private", "userbot").allowed);
        assert!(engine.check("telegram_send", "private", "userbot").allowed);
    }

    #[test]
    fn filter_is_idempotent() {
        let engine = engine();
        let input = defs(&["read_file", "send_dm", "schedule_task", "memory"]);

        let once = engine.filter(input.clone(), "group", "bot");
        let twice = engine.filter(once.clone(), "group", "bot");
        assert_eq!(once, twice);

        let names: Vec<&str> = once.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "memory"]);
    }

    #[test]
    fn update_persists_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool_permissions.json");

        let engine = PermissionEngine::load(path.clone());
        engine
            .update(
                "group",
                Some(RuleMode::Allowlist),
                Some(ToolSet::Names(vec!["read_file".to_owned()])),
            )
            .unwrap();

        // A fresh engine sees the persisted rule.
        let reloaded = PermissionEngine::load(path);
        assert!(reloaded.check("read_file", "group", "bot").allowed);
        assert!(!reloaded.check("write_file", "group", "bot").allowed);
    }

    #[test]
    fn update_rejects_unknown_type() {
        let engine = engine();
        assert!(engine.update("nonsense", None, None).is_err());
    }
}
