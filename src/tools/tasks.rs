//! Per-session todo list (`TASKS.json` in the workspace).
//!
//! A planning aid only - nothing here executes automatically.  The
//! `schedule_task` tool is the one backed by the real scheduler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::traits::{Tool, ToolContext, ToolResult};

const TASKS_FILE: &str = "TASKS.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TodoItem {
    id: String,
    content: String,
    status: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TodoList {
    #[serde(default)]
    tasks: Vec<TodoItem>,
    #[serde(default)]
    next_id: u64,
}

pub struct ManageTasksTool;

impl ManageTasksTool {
    async fn load(ctx: &ToolContext) -> TodoList {
        let path = ctx.cwd.join(TASKS_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => TodoList::default(),
        }
    }

    async fn save(ctx: &ToolContext, list: &TodoList) -> Result<(), String> {
        let path = ctx.cwd.join(TASKS_FILE);
        let raw = serde_json::to_string_pretty(list).map_err(|e| e.to_string())?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| format!("failed to save tasks: {e}"))
    }

    fn render(list: &TodoList) -> String {
        if list.tasks.is_empty() {
            return "No tasks".to_owned();
        }
        list.tasks
            .iter()
            .map(|t| {
                let mark = match t.status.as_str() {
                    "done" => "x",
                    "cancelled" => "-",
                    _ => " ",
                };
                format!("[{mark}] {}: {}", t.id, t.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Tool for ManageTasksTool {
    fn name(&self) -> &str {
        "manage_tasks"
    }

    fn description(&self) -> &str {
        "Personal todo/checklist for planning steps. NOT a scheduler - does NOT \
         execute anything automatically. Use schedule_task for periodic/delayed execution."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action":  { "type": "string", "enum": ["add", "update", "list", "clear"] },
                "id":      { "type": "string", "description": "Task ID" },
                "content": { "type": "string", "description": "Task description" },
                "status":  { "type": "string", "enum": ["pending", "done", "cancelled"] }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'action'")?;

        match action {
            "add" => {
                let content = args
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or("add requires 'content'")?;
                let mut list = Self::load(ctx).await;
                list.next_id += 1;
                let id = list.next_id.to_string();
                list.tasks.push(TodoItem {
                    id: id.clone(),
                    content: content.to_owned(),
                    status: "pending".to_owned(),
                });
                Self::save(ctx, &list).await?;
                Ok(ToolResult::ok(format!("Added task {id}\n{}", Self::render(&list))))
            }
            "update" => {
                let id = args
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or("update requires 'id'")?;
                let mut list = Self::load(ctx).await;
                let item = list
                    .tasks
                    .iter_mut()
                    .find(|t| t.id == id)
                    .ok_or_else(|| format!("no task with id {id}"))?;
                if let Some(content) = args.get("content").and_then(Value::as_str) {
                    item.content = content.to_owned();
                }
                if let Some(status) = args.get("status").and_then(Value::as_str) {
                    if !["pending", "done", "cancelled"].contains(&status) {
                        return Err(format!("invalid status: {status}"));
                    }
                    item.status = status.to_owned();
                }
                Self::save(ctx, &list).await?;
                Ok(ToolResult::ok(Self::render(&list)))
            }
            "list" => {
                let list = Self::load(ctx).await;
                Ok(ToolResult::ok(Self::render(&list)))
            }
            "clear" => {
                Self::save(ctx, &TodoList::default()).await?;
                Ok(ToolResult::ok("Tasks cleared"))
            }
            other => Err(format!("Unknown action: {other}. Use: add, update, list, clear")),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_update_list_flow() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), 1, 1);

        ManageTasksTool
            .execute(json!({"action": "add", "content": "write tests"}), &ctx)
            .await
            .unwrap();
        ManageTasksTool
            .execute(json!({"action": "add", "content": "ship it"}), &ctx)
            .await
            .unwrap();

        let updated = ManageTasksTool
            .execute(json!({"action": "update", "id": "1", "status": "done"}), &ctx)
            .await
            .unwrap();
        assert!(updated.output.contains("[x] 1: write tests"));
        assert!(updated.output.contains("[ ] 2: ship it"));

        ManageTasksTool
            .execute(json!({"action": "clear"}), &ctx)
            .await
            .unwrap();
        let listed = ManageTasksTool
            .execute(json!({"action": "list"}), &ctx)
            .await
            .unwrap();
        assert_eq!(listed.output, "No tasks");
    }

    #[tokio::test]
    async fn update_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), 1, 1);
        let err = ManageTasksTool
            .execute(json!({"action": "update", "id": "42", "status": "done"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.contains("no task with id 42"));
    }
}
