//! The agent subsystem: bounded ReAct loop, prompt composition, and
//! tool-argument repair.

pub mod args_repair;
pub mod loop_;
pub mod prompt;

use async_trait::async_trait;

pub use loop_::{AgentService, LOCK_MESSAGE};

// ─── TurnRequest ─────────────────────────────────────────────────────────────

/// One inbound user turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: i64,
    pub chat_id: i64,
    pub message: String,
    pub username: String,
    /// `private | group | supergroup | sandbox`.
    pub chat_type: String,
    /// `bot | userbot`.
    pub source: String,
}

impl TurnRequest {
    pub fn new(user_id: i64, chat_id: i64, message: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            message: message.into(),
            username: String::new(),
            chat_type: "private".to_owned(),
            source: "bot".to_owned(),
        }
    }
}

// ─── AgentRunner ─────────────────────────────────────────────────────────────

/// Shared entry point for everything that triggers an agent turn - the
/// chat endpoint and the scheduler.  Always returns user-facing text;
/// failures are folded into the string.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_turn(&self, request: TurnRequest) -> String;
}
