//! Tool dispatch: name → executor resolution with permission gating,
//! MCP routing, and per-call deadlines.
//!
//! The dispatcher never returns `Err` - every failure mode is embedded in
//! the returned [`ToolResult`] so the agent loop can always append a
//! tool-role message and let the model react.

use std::{sync::Arc, time::Duration};

use serde_json::Value;

use crate::mcp::McpRegistry;
use crate::permissions::PermissionEngine;

use super::{
    registry::ToolRegistry,
    traits::{ToolContext, ToolResult},
};

// ─── Security-violation classifier ───────────────────────────────────────────

/// Tokens that mark a blocked action as an actual security threat rather
/// than a plain privilege or capability refusal.
const SENSITIVE_TOKENS: &[&str] = &[
    "secret",
    "env",
    "token",
    "key",
    "password",
    "credential",
    "injection",
    "/etc/passwd",
    "/etc/shadow",
    "proc/self",
    "base64",
    "exfiltration",
    "fork bomb",
    "rm -rf",
];

/// Whether a tool error counts against the session's security counter.
///
/// Only `BLOCKED` errors that also name a sensitive token qualify;
/// sandbox capability limits ("BLOCKED: network disabled") do not.
pub fn is_security_violation(error: &str) -> bool {
    if !error.contains("BLOCKED") {
        return false;
    }
    let lower = error.to_lowercase();
    SENSITIVE_TOKENS.iter().any(|t| lower.contains(t))
}

// ─── ToolDispatcher ──────────────────────────────────────────────────────────

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    permissions: Arc<PermissionEngine>,
    mcp: Arc<McpRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        permissions: Arc<PermissionEngine>,
        mcp: Arc<McpRegistry>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            registry,
            permissions,
            mcp,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Execute `name` with `args` under the session context.
    #[tracing::instrument(name = "tool.execute", skip_all, fields(tool = %name))]
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        // Permission gate first: a denied tool must not run at all.
        let decision = self.permissions.check(name, &ctx.chat_type, &ctx.source);
        if !decision.allowed {
            log::info!(
                "tool '{name}' denied for {}/{}: {}",
                ctx.chat_type,
                ctx.source,
                decision.reason
            );
            return ToolResult::err(format!(
                "🔒 Tool '{name}' not available in {} sessions. {}",
                decision.session_type.as_str(),
                decision.reason
            ));
        }

        log::info!("tool call: {name} (session {})", ctx.session_id);

        // MCP-routed names bypass the built-in registry entirely.
        if name.starts_with("mcp_") {
            return match tokio::time::timeout(self.timeout, self.mcp.call(name, args)).await {
                Ok(Ok(output)) => ToolResult::ok(output),
                Ok(Err(e)) => ToolResult::err(e),
                Err(_) => ToolResult::err(format!("MCP tool {name} timed out")),
            };
        }

        let Some(tool) = self.registry.get(name) else {
            return ToolResult::err(format!("Unknown tool: {name}"));
        };

        match tokio::time::timeout(self.timeout, tool.execute(args, ctx)).await {
            Ok(Ok(result)) => {
                log::debug!(
                    "tool {name}: success={} output={} chars error={:?}",
                    result.success,
                    result.output.len(),
                    if result.error.is_empty() { None } else { Some(&result.error) }
                );
                result
            }
            Ok(Err(e)) => ToolResult::err(e),
            Err(_) => ToolResult::err(format!("Tool {name} timed out")),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
