//! Durable task store: an in-memory map persisted to
//! `scheduled_tasks.json` after every mutation.
//!
//! Loading is tolerant - a corrupt file logs and starts empty rather than
//! failing boot.  Overdue tasks are left in place; the tick loop drains
//! them within one interval of startup.

use std::{
    path::PathBuf,
    sync::Mutex,
};

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::storage;

use super::types::{NewTask, Task, TaskPatch};

/// On-disk shape: `{"tasks": [...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskFile {
    #[serde(default)]
    tasks: Vec<Task>,
}

pub struct TaskStore {
    tasks: Mutex<Vec<Task>>,
    path: PathBuf,
    max_per_user: usize,
}

impl TaskStore {
    pub fn load(path: PathBuf, max_per_user: usize) -> Self {
        let file: TaskFile = storage::load_json_or_default(&path);
        log::info!("scheduler: loaded {} task(s) from {}", file.tasks.len(), path.display());
        Self {
            tasks: Mutex::new(file.tasks),
            path,
            max_per_user,
        }
    }

    fn persist(&self, tasks: &[Task]) {
        let file = TaskFile {
            tasks: tasks.to_vec(),
        };
        if let Err(e) = storage::save_json(&self.path, &file) {
            log::error!("scheduler: failed to persist tasks: {e}");
        }
    }

    fn generate_id(now: i64) -> String {
        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect();
        format!("{now}-{suffix}")
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Create a task.  Enforces the per-user cap and the 1-minute minimum
    /// recurrence interval.
    pub fn create(&self, new: NewTask) -> Result<Task, String> {
        if new.recurring && new.interval_minutes < 1 {
            return Err("interval_minutes must be at least 1".to_owned());
        }
        if new.content.trim().is_empty() {
            return Err("content must not be empty".to_owned());
        }

        let now = Utc::now().timestamp();
        let task = Task {
            id: Self::generate_id(now),
            user_id: new.user_id,
            chat_id: new.chat_id,
            source: new.source,
            task_type: new.task_type,
            content: new.content,
            execute_at: now + i64::from(new.delay_minutes) * 60,
            created_at: now,
            last_run: None,
            run_count: 0,
            recurring: new.recurring,
            interval_minutes: new.interval_minutes,
            enabled: true,
        };

        let mut tasks = self.tasks.lock().map_err(|_| "task store poisoned")?;
        let user_count = tasks.iter().filter(|t| t.user_id == task.user_id).count();
        if user_count >= self.max_per_user {
            return Err(format!(
                "Task limit reached ({} per user). Cancel an existing task first.",
                self.max_per_user
            ));
        }

        tasks.push(task.clone());
        self.persist(&tasks);
        Ok(task)
    }

    /// Apply a partial update.  `delay_minutes` re-anchors `execute_at`
    /// from now.
    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, String> {
        let mut tasks = self.tasks.lock().map_err(|_| "task store poisoned")?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| format!("Task {id} not found"))?;

        if let Some(content) = patch.content {
            task.content = content;
        }
        if let Some(enabled) = patch.enabled {
            task.enabled = enabled;
        }
        if let Some(recurring) = patch.recurring {
            task.recurring = recurring;
        }
        if let Some(interval) = patch.interval_minutes {
            if interval < 1 {
                return Err("interval_minutes must be at least 1".to_owned());
            }
            task.interval_minutes = interval;
        }
        if let Some(delay) = patch.delay_minutes {
            task.execute_at = Utc::now().timestamp() + i64::from(delay) * 60;
        }

        let updated = task.clone();
        self.persist(&tasks);
        Ok(updated)
    }

    /// Delete a task.  `user_id`, when given, restricts deletion to the
    /// task's owner.
    pub fn delete(&self, id: &str, user_id: Option<i64>) -> Result<bool, String> {
        let mut tasks = self.tasks.lock().map_err(|_| "task store poisoned")?;
        let before = tasks.len();
        tasks.retain(|t| {
            t.id != id || user_id.is_some_and(|uid| t.user_id != uid)
        });
        let removed = tasks.len() != before;
        if removed {
            self.persist(&tasks);
        }
        Ok(removed)
    }

    /// Make a task due immediately (drained by the next tick).
    pub fn mark_due_now(&self, id: &str) -> Result<(), String> {
        let mut tasks = self.tasks.lock().map_err(|_| "task store poisoned")?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| format!("Task {id} not found"))?;
        task.execute_at = Utc::now().timestamp();
        task.enabled = true;
        self.persist(&tasks);
        Ok(())
    }

    /// Record an execution attempt: bump `run_count`, set `last_run`, and
    /// either advance `execute_at` (recurring) or remove the task.
    /// Returns the task's post-attempt state (`None` once removed).
    pub fn complete_run(&self, id: &str, now: i64) -> Option<Task> {
        let mut tasks = self.tasks.lock().ok()?;
        let idx = tasks.iter().position(|t| t.id == id)?;

        tasks[idx].last_run = Some(now);
        tasks[idx].run_count += 1;

        let result = if tasks[idx].recurring && tasks[idx].interval_minutes > 0 {
            tasks[idx].execute_at = now + i64::from(tasks[idx].interval_minutes) * 60;
            Some(tasks[idx].clone())
        } else {
            tasks.remove(idx);
            None
        };
        self.persist(&tasks);
        result
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.lock().ok()?.iter().find(|t| t.id == id).cloned()
    }

    pub fn list(&self, user_id: Option<i64>) -> Vec<Task> {
        self.tasks
            .lock()
            .map(|tasks| {
                tasks
                    .iter()
                    .filter(|t| user_id.map_or(true, |uid| t.user_id == uid))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tasks that should fire now.
    pub fn due(&self, now: i64) -> Vec<Task> {
        self.tasks
            .lock()
            .map(|tasks| {
                tasks
                    .iter()
                    .filter(|t| t.enabled && t.execute_at <= now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> serde_json::Value {
        let tasks = self.tasks.lock().map(|t| t.clone()).unwrap_or_default();
        let recurring = tasks.iter().filter(|t| t.recurring).count();
        let enabled = tasks.iter().filter(|t| t.enabled).count();
        let total_runs: u64 = tasks.iter().map(|t| u64::from(t.run_count)).sum();
        serde_json::json!({
            "total": tasks.len(),
            "enabled": enabled,
            "recurring": recurring,
            "total_runs": total_runs,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
