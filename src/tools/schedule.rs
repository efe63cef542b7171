//! `schedule_task` - the agent's handle on the persistent scheduler.
//!
//! Backed directly by the shared [`TaskStore`]; the `run` action marks a
//! task due immediately and the next tick (≤5 s) drains it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use crate::scheduler::{NewTask, TaskKind, TaskStore};

use super::traits::{Tool, ToolContext, ToolResult};

pub struct ScheduleTaskTool {
    store: Arc<TaskStore>,
}

impl ScheduleTaskTool {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ScheduleTaskTool {
    fn name(&self) -> &str {
        "schedule_task"
    }

    fn description(&self) -> &str {
        "REAL scheduler: execute tasks after delay or periodically (recurring). \
         Use this to check GitHub, email, send reminders, etc. Tasks run even \
         when user is offline."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action":  { "type": "string", "enum": ["add", "list", "cancel", "run"], "description": "Action to perform" },
                "type":    { "type": "string", "enum": ["message", "agent"], "description": "Task type: 'message' sends reminder, 'agent' runs agent with content" },
                "content": { "type": "string", "description": "Task content/message" },
                "delay_minutes":    { "type": "integer", "description": "Delay before first execution (default: 1)" },
                "recurring":        { "type": "boolean", "description": "Repeat task after execution" },
                "interval_minutes": { "type": "integer", "description": "Repeat interval in minutes" },
                "task_id": { "type": "string", "description": "Task ID for cancel/run actions" }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("list");

        match action {
            "add" => {
                let task_type = match args.get("type").and_then(Value::as_str) {
                    Some("message") => TaskKind::Message,
                    Some("agent") => TaskKind::Agent,
                    Some(other) => {
                        return Ok(ToolResult::err(format!(
                            "Type must be 'message' or 'agent', got '{other}'"
                        )));
                    }
                    None => return Ok(ToolResult::err("Need type and content")),
                };
                let Some(content) = args.get("content").and_then(Value::as_str) else {
                    return Ok(ToolResult::err("Need type and content"));
                };

                let new = NewTask {
                    user_id: ctx.user_id,
                    chat_id: ctx.chat_id,
                    source: ctx.source.clone(),
                    task_type,
                    content: content.to_owned(),
                    delay_minutes: args
                        .get("delay_minutes")
                        .and_then(Value::as_u64)
                        .unwrap_or(1) as u32,
                    recurring: args
                        .get("recurring")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    interval_minutes: args
                        .get("interval_minutes")
                        .and_then(Value::as_u64)
                        .unwrap_or(60) as u32,
                };

                match self.store.create(new) {
                    Ok(task) => Ok(ToolResult::ok(format!(
                        "Task {} scheduled ({} in {}min{})",
                        task.id,
                        task.task_type.as_str(),
                        task.time_left_minutes(Utc::now().timestamp()).max(0),
                        if task.recurring {
                            format!(", every {}min", task.interval_minutes)
                        } else {
                            String::new()
                        }
                    ))),
                    Err(e) => Ok(ToolResult::err(e)),
                }
            }

            "list" => {
                let tasks = self.store.list(Some(ctx.user_id));
                if tasks.is_empty() {
                    return Ok(ToolResult::ok("No scheduled tasks"));
                }
                let now = Utc::now().timestamp();
                let lines: Vec<String> = tasks
                    .iter()
                    .map(|t| {
                        let recur = if t.recurring {
                            format!(" 🔄 every {}min", t.interval_minutes)
                        } else {
                            String::new()
                        };
                        let icon = if t.source == "userbot" { "👤" } else { "🤖" };
                        let enabled = if t.enabled { "✅" } else { "⏸️" };
                        format!(
                            "• {}: {icon}{enabled} [{}] in {}min{recur}\n  \"{}\" (runs: {})",
                            t.id,
                            t.task_type.as_str(),
                            t.time_left_minutes(now),
                            truncate(&t.content, 50),
                            t.run_count
                        )
                    })
                    .collect();
                Ok(ToolResult::ok(format!(
                    "Scheduled tasks ({}):\n{}",
                    tasks.len(),
                    lines.join("\n")
                )))
            }

            "cancel" => {
                let Some(task_id) = args.get("task_id").and_then(Value::as_str) else {
                    return Ok(ToolResult::err("Need task_id"));
                };
                match self.store.delete(task_id, Some(ctx.user_id)) {
                    Ok(true) => Ok(ToolResult::ok(format!("Task {task_id} cancelled"))),
                    Ok(false) => Ok(ToolResult::err(format!("Task {task_id} not found"))),
                    Err(e) => Ok(ToolResult::err(e)),
                }
            }

            "run" => {
                let Some(task_id) = args.get("task_id").and_then(Value::as_str) else {
                    return Ok(ToolResult::err("Need task_id"));
                };
                match self.store.mark_due_now(task_id) {
                    Ok(()) => Ok(ToolResult::ok(format!(
                        "Task {task_id} triggered (runs on next tick)"
                    ))),
                    Err(e) => Ok(ToolResult::err(e)),
                }
            }

            other => Ok(ToolResult::err(format!(
                "Unknown action: {other}. Use: add, list, cancel, run"
            ))),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_owned()
    } else {
        s.chars().take(max).collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
