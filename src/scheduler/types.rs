//! Scheduler data model.

use serde::{Deserialize, Serialize};

// ─── TaskKind ────────────────────────────────────────────────────────────────

/// What firing a task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Send a reminder text to the originating chat via the adapter.
    Message,
    /// Re-enter the agent with the task content as the user message.
    Agent,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Message => "message",
            TaskKind::Agent => "agent",
        }
    }
}

// ─── Task ────────────────────────────────────────────────────────────────────

/// A durable scheduled item.
///
/// `id` is `<unix-secs>-<6 random alphanumerics>`: the time prefix keeps
/// ids sortable by creation order, the suffix keeps them unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: i64,
    pub chat_id: i64,
    #[serde(default = "default_source")]
    pub source: String,
    pub task_type: TaskKind,
    pub content: String,
    /// Absolute unix seconds.
    pub execute_at: i64,
    pub created_at: i64,
    #[serde(default)]
    pub last_run: Option<i64>,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_source() -> String {
    "bot".to_owned()
}

fn default_interval() -> u32 {
    60
}

fn default_enabled() -> bool {
    true
}

impl Task {
    /// Minutes until execution, clamped at zero for overdue tasks.
    pub fn time_left_minutes(&self, now: i64) -> i64 {
        ((self.execute_at - now).max(0)) / 60
    }
}

// ─── NewTask ─────────────────────────────────────────────────────────────────

/// Creation request, from the `schedule_task` tool or the HTTP surface.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub user_id: i64,
    pub chat_id: i64,
    #[serde(default = "default_source")]
    pub source: String,
    pub task_type: TaskKind,
    pub content: String,
    #[serde(default = "default_delay")]
    pub delay_minutes: u32,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
}

fn default_delay() -> u32 {
    1
}

// ─── TaskPatch ───────────────────────────────────────────────────────────────

/// Partial update for `PUT /tasks/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub content: Option<String>,
    pub enabled: Option<bool>,
    pub recurring: Option<bool>,
    pub interval_minutes: Option<u32>,
    pub delay_minutes: Option<u32>,
}
