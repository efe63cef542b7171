//! Userbot telegram tools.
//!
//! Thin executors over the userbot adapter's per-operation endpoints.
//! All eight share the same shape: validate arguments, POST, render the
//! adapter's response - so one descriptor table drives them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::adapters::AdapterClient;

use super::traits::{Tool, ToolContext, ToolResult};

/// One userbot operation: tool name, endpoint path, description, schema,
/// required argument names.
struct TelegramOp {
    name: &'static str,
    path: &'static str,
    description: &'static str,
    schema: fn() -> Value,
    required: &'static [&'static str],
}

const OPS: &[TelegramOp] = &[
    TelegramOp {
        name: "telegram_channel",
        path: "/channel",
        description: "Read posts from a Telegram channel. Use for t.me links - fetch_page doesn't work for Telegram!",
        schema: || {
            json!({
                "type": "object",
                "properties": {
                    "channel": { "type": "string", "description": "Channel username (@channel) or t.me link" },
                    "limit":   { "type": "integer", "description": "Number of posts to fetch (default: 5)" }
                },
                "required": ["channel"]
            })
        },
        required: &["channel"],
    },
    TelegramOp {
        name: "telegram_join",
        path: "/join",
        description: "Join a Telegram group or channel by invite link or username.",
        schema: || {
            json!({
                "type": "object",
                "properties": {
                    "invite_link": { "type": "string", "description": "Invite link (t.me/+xxx) or username (@channel)" }
                },
                "required": ["invite_link"]
            })
        },
        required: &["invite_link"],
    },
    TelegramOp {
        name: "telegram_send",
        path: "/send_message",
        description: "Send a message to any Telegram user or chat.",
        schema: || {
            json!({
                "type": "object",
                "properties": {
                    "target":  { "type": "string", "description": "Username (@user), phone, or chat_id" },
                    "message": { "type": "string", "description": "Message text to send" }
                },
                "required": ["target", "message"]
            })
        },
        required: &["target", "message"],
    },
    TelegramOp {
        name: "telegram_history",
        path: "/history",
        description: "Get message history from a chat. Returns message IDs for delete/edit.",
        schema: || {
            json!({
                "type": "object",
                "properties": {
                    "chat_id": { "type": "integer", "description": "Chat ID to get history from" },
                    "limit":   { "type": "integer", "description": "Number of messages (default: 20)" }
                },
                "required": ["chat_id"]
            })
        },
        required: &["chat_id"],
    },
    TelegramOp {
        name: "telegram_dialogs",
        path: "/dialogs",
        description: "List recent Telegram chats/dialogs.",
        schema: || {
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "description": "Number of dialogs (default: 20)" }
                },
                "required": []
            })
        },
        required: &[],
    },
    TelegramOp {
        name: "telegram_delete",
        path: "/delete_message",
        description: "Delete a message in a chat. Get message_id from telegram_history.",
        schema: || {
            json!({
                "type": "object",
                "properties": {
                    "chat_id":    { "type": "integer", "description": "Chat ID" },
                    "message_id": { "type": "integer", "description": "Message ID to delete" }
                },
                "required": ["chat_id", "message_id"]
            })
        },
        required: &["chat_id", "message_id"],
    },
    TelegramOp {
        name: "telegram_edit",
        path: "/edit_message",
        description: "Edit a message in a chat. Get message_id from telegram_history.",
        schema: || {
            json!({
                "type": "object",
                "properties": {
                    "chat_id":    { "type": "integer", "description": "Chat ID" },
                    "message_id": { "type": "integer", "description": "Message ID to edit" },
                    "new_text":   { "type": "string", "description": "New message text" }
                },
                "required": ["chat_id", "message_id", "new_text"]
            })
        },
        required: &["chat_id", "message_id", "new_text"],
    },
    TelegramOp {
        name: "telegram_resolve",
        path: "/resolve",
        description: "Resolve Telegram username to user ID and info.",
        schema: || {
            json!({
                "type": "object",
                "properties": {
                    "username": { "type": "string", "description": "Username to resolve (@username)" }
                },
                "required": ["username"]
            })
        },
        required: &["username"],
    },
];

// ─── TelegramTool ────────────────────────────────────────────────────────────

pub struct TelegramTool {
    op: &'static TelegramOp,
    adapters: Arc<AdapterClient>,
}

/// Build all eight userbot tools.
pub fn telegram_tools(adapters: Arc<AdapterClient>) -> Vec<Arc<TelegramTool>> {
    OPS.iter()
        .map(|op| {
            Arc::new(TelegramTool {
                op,
                adapters: adapters.clone(),
            })
        })
        .collect()
}

#[async_trait]
impl Tool for TelegramTool {
    fn name(&self) -> &str {
        self.op.name
    }

    fn description(&self) -> &str {
        self.op.description
    }

    fn parameters_schema(&self) -> Value {
        (self.op.schema)()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
        for key in self.op.required {
            if args.get(*key).map_or(true, Value::is_null) {
                return Err(format!("missing required argument '{key}'"));
            }
        }

        match self.adapters.userbot_op(self.op.path, args).await {
            Ok(data) => {
                let output = data
                    .get("result")
                    .or_else(|| data.get("output"))
                    .map(render_value)
                    .unwrap_or_else(|| render_value(&data));
                Ok(ToolResult::ok(output))
            }
            Err(e) => Ok(ToolResult::err(e)),
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
