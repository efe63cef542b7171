//! Per-(user, chat) session state.
//!
//! Sessions are created on first interaction and live until process
//! restart.  Each one carries its own `tokio::sync::Mutex` - a turn holds
//! the lock end-to-end, so turns on the same session serialize while
//! distinct sessions run concurrently.  A user-facing snapshot (the last
//! ten user/assistant pairs) is written to `SESSION.json` in the
//! session's workspace after every turn; the raw transcript is in-memory
//! only.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ai::{ChatMessage, MessageRole};
use crate::config::schema::WorkspaceConfig;
use crate::storage;

/// Snapshot entries kept in `SESSION.json`.
const SNAPSHOT_ENTRIES: usize = 10;

// ─── Session ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Session {
    pub user_id: i64,
    pub chat_id: i64,
    /// Per-user workspace directory (shared by all chats of the user).
    pub cwd: PathBuf,
    /// Retained user/assistant exchanges fed back into later turns.
    pub history: Vec<ChatMessage>,
    /// Security violations incurred; only ever increases until `clear`.
    pub blocked_count: u32,
    /// `bot | userbot` - updated on each turn.
    pub source: String,
}

impl Session {
    pub fn key(user_id: i64, chat_id: i64) -> String {
        format!("{user_id}_{chat_id}")
    }
}

/// Shared handle: the per-session lock that serializes turns.
pub struct SessionHandle {
    pub state: tokio::sync::Mutex<Session>,
}

// ─── Snapshot shape ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub history: Vec<SnapshotEntry>,
}

// ─── SessionManager ──────────────────────────────────────────────────────────

pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
    workspace: WorkspaceConfig,
}

impl SessionManager {
    pub fn new(workspace: WorkspaceConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            workspace,
        }
    }

    /// Return the session handle, creating the session (and its workspace
    /// directory) on first touch.
    pub fn get(&self, user_id: i64, chat_id: i64) -> Arc<SessionHandle> {
        let key = Session::key(user_id, chat_id);
        let mut sessions = match self.sessions.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        sessions
            .entry(key.clone())
            .or_insert_with(|| {
                let cwd = self.workspace.user_dir(user_id);
                if let Err(e) = std::fs::create_dir_all(&cwd) {
                    log::error!("session: failed to create workspace '{}': {e}", cwd.display());
                }
                log::info!("session: new session {key}");
                Arc::new(SessionHandle {
                    state: tokio::sync::Mutex::new(Session {
                        user_id,
                        chat_id,
                        cwd,
                        history: Vec::new(),
                        blocked_count: 0,
                        source: "bot".to_owned(),
                    }),
                })
            })
            .clone()
    }

    /// Empty the transcript and reset the security counter.  Waits for
    /// any in-flight turn on the session to finish.
    pub async fn clear(&self, user_id: i64, chat_id: i64) {
        let handle = self.get(user_id, chat_id);
        let mut session = handle.state.lock().await;
        session.history.clear();
        session.blocked_count = 0;
        log::info!("session: cleared {}", Session::key(user_id, chat_id));
    }

    /// Summaries for the admin surface.  Skips sessions mid-turn rather
    /// than blocking on them.
    pub fn summaries(&self) -> Vec<serde_json::Value> {
        let handles: Vec<Arc<SessionHandle>> = self
            .sessions
            .lock()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();

        handles
            .iter()
            .filter_map(|h| h.state.try_lock().ok())
            .map(|s| {
                serde_json::json!({
                    "user_id": s.user_id,
                    "chat_id": s.chat_id,
                    "history_len": s.history.len(),
                    "blocked_count": s.blocked_count,
                    "source": s.source,
                })
            })
            .collect()
    }
}

// ─── Snapshot persistence ────────────────────────────────────────────────────

/// Write the user-facing snapshot for `session`.  Best-effort: failures
/// are logged, never propagated - a full disk must not fail the turn.
pub fn save_snapshot(session: &Session) {
    let entries = build_snapshot(&session.history);
    let path = session.cwd.join("SESSION.json");
    if let Err(e) = storage::save_json(&path, &Snapshot { history: entries }) {
        log::error!("session: failed to save snapshot: {e}");
    }
}

/// Fold the transcript into dated user/assistant pairs, keeping the last
/// [`SNAPSHOT_ENTRIES`].
fn build_snapshot(history: &[ChatMessage]) -> Vec<SnapshotEntry> {
    let date = Utc::now().format("[%Y-%m-%d]");
    let mut entries = Vec::new();
    let mut i = 0;

    while i < history.len() {
        if history[i].role == MessageRole::User {
            let user_text = history[i].content.clone().unwrap_or_default();
            let mut entry = SnapshotEntry {
                user: format!("{date} {user_text}"),
                assistant: None,
            };
            if let Some(next) = history.get(i + 1) {
                if next.role == MessageRole::Assistant {
                    entry.assistant = next.content.clone();
                    i += 1;
                }
            }
            entries.push(entry);
        }
        i += 1;
    }

    let overflow = entries.len().saturating_sub(SNAPSHOT_ENTRIES);
    entries.split_off(overflow)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn manager(dir: &tempfile::TempDir) -> SessionManager {
        SessionManager::new(WorkspaceConfig {
            root: dir.path().to_path_buf(),
        })
    }

    #[tokio::test]
    async fn get_creates_workspace_and_reuses_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);

        let a = mgr.get(7, 100);
        let b = mgr.get(7, 100);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(dir.path().join("7").is_dir());

        // A different chat gets its own session but shares the user dir.
        let c = mgr.get(7, 200);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn clear_resets_history_and_counter() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);

        {
            let handle = mgr.get(1, 1);
            let mut s = handle.state.lock().await;
            s.history.push(ChatMessage::user("hi"));
            s.blocked_count = 2;
        }

        mgr.clear(1, 1).await;
        let handle = mgr.get(1, 1);
        let s = handle.state.lock().await;
        assert!(s.history.is_empty());
        assert_eq!(s.blocked_count, 0);
    }

    #[test]
    fn snapshot_pairs_user_and_assistant() {
        let history = vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi"),
            ChatMessage::user("ls please"),
        ];
        let entries = build_snapshot(&history);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].user.ends_with("Hello"));
        assert!(entries[0].user.starts_with('['));
        assert_eq!(entries[0].assistant.as_deref(), Some("Hi"));
        assert!(entries[1].assistant.is_none());
    }

    #[test]
    fn snapshot_keeps_last_ten_entries() {
        let mut history = Vec::new();
        for i in 0..15 {
            history.push(ChatMessage::user(format!("q{i}")));
            history.push(ChatMessage::assistant(format!("a{i}")));
        }
        let entries = build_snapshot(&history);
        assert_eq!(entries.len(), 10);
        assert!(entries[0].user.ends_with("q5"));
        assert!(entries[9].user.ends_with("q14"));
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);
        let handle = mgr.get(3, 3);
        {
            let mut s = handle.state.lock().await;
            s.history.push(ChatMessage::user("Hello"));
            s.history.push(ChatMessage::assistant("Hi"));
            save_snapshot(&s);
        }

        let path = dir.path().join("3").join("SESSION.json");
        let snapshot: Snapshot = storage::load_json(&path).unwrap().unwrap();
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].assistant.as_deref(), Some("Hi"));
    }
}
