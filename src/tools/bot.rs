//! Bot-callback tools: available only on `bot`-sourced turns.
//!
//! The adapters have no workspace volume access; `send_file` reads bytes
//! here and ships them over the callback contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::adapters::{AdapterClient, MAX_FILE_BYTES};

use super::files::normalize_path;
use super::traits::{Tool, ToolContext, ToolResult};

// ─── SendFileTool ────────────────────────────────────────────────────────────

pub struct SendFileTool {
    adapters: Arc<AdapterClient>,
}

impl SendFileTool {
    pub fn new(adapters: Arc<AdapterClient>) -> Self {
        Self { adapters }
    }
}

#[async_trait]
impl Tool for SendFileTool {
    fn name(&self) -> &str {
        "send_file"
    }

    fn description(&self) -> &str {
        "Send a file from workspace to the chat."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":    { "type": "string", "description": "Path to file in workspace" },
                "caption": { "type": "string", "description": "Optional caption" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let raw = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or("Path required")?;
        let caption = args.get("caption").and_then(Value::as_str).unwrap_or("");

        let path = normalize_path(raw, &ctx.cwd)?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| format!("File not found: {}", path.display()))?;
        if metadata.len() as usize > MAX_FILE_BYTES {
            return Ok(ToolResult::err("File too large (max 50MB)"));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());

        let kind = AdapterClient::kind_for_source(&ctx.source);
        match self
            .adapters
            .send_file(kind, ctx.chat_id, &filename, bytes, caption)
            .await
        {
            Ok(()) => Ok(ToolResult::ok(format!("✅ File sent: {filename}"))),
            Err(e) => Ok(ToolResult::err(e)),
        }
    }
}

// ─── SendDmTool ──────────────────────────────────────────────────────────────

pub struct SendDmTool {
    adapters: Arc<AdapterClient>,
}

impl SendDmTool {
    pub fn new(adapters: Arc<AdapterClient>) -> Self {
        Self { adapters }
    }
}

#[async_trait]
impl Tool for SendDmTool {
    fn name(&self) -> &str {
        "send_dm"
    }

    fn description(&self) -> &str {
        "Send a private message to any user who has messaged the bot. Accepts \
         @username or numeric user_id. The bot resolves @username automatically \
         from its registry of known users."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string", "description": "@username or numeric user ID" },
                "text":    { "type": "string", "description": "Message text" }
            },
            "required": ["user_id", "text"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        let user_id = args.get("user_id").ok_or("user_id required")?;
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or("text required")?;

        match self.adapters.send_dm(user_id, text).await {
            Ok(()) => Ok(ToolResult::ok("✅ DM sent")),
            Err(e) => Ok(ToolResult::err(e)),
        }
    }
}

// ─── ManageMessageTool ───────────────────────────────────────────────────────

pub struct ManageMessageTool {
    adapters: Arc<AdapterClient>,
}

impl ManageMessageTool {
    pub fn new(adapters: Arc<AdapterClient>) -> Self {
        Self { adapters }
    }
}

#[async_trait]
impl Tool for ManageMessageTool {
    fn name(&self) -> &str {
        "manage_message"
    }

    fn description(&self) -> &str {
        "Edit or delete bot messages."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action":     { "type": "string", "enum": ["edit", "delete"] },
                "message_id": { "type": "integer", "description": "Message ID to edit/delete" },
                "text":       { "type": "string", "description": "New text (for edit)" }
            },
            "required": ["action", "message_id"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or("action required")?;
        let message_id = args
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or("message_id required")?;

        let kind = AdapterClient::kind_for_source(&ctx.source);
        match action {
            "edit" => {
                let text = args
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or("edit requires 'text'")?;
                match self
                    .adapters
                    .edit_message(kind, ctx.chat_id, message_id, text)
                    .await
                {
                    Ok(()) => Ok(ToolResult::ok(format!("Message {message_id} edited"))),
                    Err(e) => Ok(ToolResult::err(e)),
                }
            }
            "delete" => match self
                .adapters
                .delete_message(kind, ctx.chat_id, message_id)
                .await
            {
                Ok(()) => Ok(ToolResult::ok(format!("Message {message_id} deleted"))),
                Err(e) => Ok(ToolResult::err(e)),
            },
            other => Err(format!("Unknown action: {other}. Use: edit, delete")),
        }
    }
}

// ─── AskUserTool ─────────────────────────────────────────────────────────────

/// Ask a question through the adapter, then poll for the answer the
/// adapter captures from the user's next message.
pub struct AskUserTool {
    adapters: Arc<AdapterClient>,
}

impl AskUserTool {
    pub fn new(adapters: Arc<AdapterClient>) -> Self {
        Self { adapters }
    }
}

const ANSWER_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_ANSWER_TIMEOUT_SECS: u64 = 60;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask user a question and wait for their answer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "description": "Question to ask" },
                "timeout":  { "type": "integer", "description": "Seconds to wait (default 60)" }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let question = args
            .get("question")
            .and_then(Value::as_str)
            .ok_or("question required")?;
        let timeout_secs = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_ANSWER_TIMEOUT_SECS);

        let question_id = uuid::Uuid::new_v4().to_string();
        self.adapters
            .ask(&question_id, ctx.chat_id, ctx.user_id, question)
            .await?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            tokio::time::sleep(ANSWER_POLL_INTERVAL).await;
            match self.adapters.poll_answer(&question_id).await {
                Ok(Some(answer)) => {
                    return Ok(ToolResult::ok(format!("User answered: {answer}")));
                }
                Ok(None) => {}
                Err(e) => log::warn!("ask_user: poll failed: {e}"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(ToolResult::err(format!(
                    "No answer within {timeout_secs}s"
                )));
            }
        }
    }
}
