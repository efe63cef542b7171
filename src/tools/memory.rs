//! Long-term memory: an append-only `MEMORY.md` in the user workspace.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use super::traits::{Tool, ToolContext, ToolResult};

const MEMORY_FILE: &str = "MEMORY.md";

pub struct MemoryTool;

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Long-term memory. Save/read important info across sessions."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action":  { "type": "string", "enum": ["read", "append", "clear"] },
                "content": { "type": "string", "description": "Text to save (for append)" }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'action'")?;
        let path = ctx.cwd.join(MEMORY_FILE);

        match action {
            "read" => match tokio::fs::read_to_string(&path).await {
                Ok(contents) if !contents.trim().is_empty() => Ok(ToolResult::ok(contents)),
                _ => Ok(ToolResult::ok("Memory is empty")),
            },
            "append" => {
                let content = args
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or("append requires 'content'")?;

                let existing = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                let dated = format!("{existing}- [{}] {content}\n", Utc::now().format("%Y-%m-%d"));
                tokio::fs::write(&path, dated)
                    .await
                    .map_err(|e| format!("failed to write memory: {e}"))?;
                Ok(ToolResult::ok("Saved to memory"))
            }
            "clear" => {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(format!("failed to clear memory: {e}")),
                }
                Ok(ToolResult::ok("Memory cleared"))
            }
            other => Err(format!("Unknown action: {other}. Use: read, append, clear")),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
