//! Core chat and admin handlers.
//!
//! Handlers are total: every outcome maps to a status code and a JSON
//! body at this boundary, nothing panics through axum.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::agent::TurnRequest;
use crate::permissions::{RuleMode, ToolSet};

use super::server::SharedState;

// ─── Health ──────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "ratel" }))
}

// ─── Chat ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub user_id: i64,
    pub chat_id: i64,
    pub message: String,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_chat_type")]
    pub chat_type: String,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_chat_type() -> String {
    "private".to_owned()
}

fn default_source() -> String {
    "bot".to_owned()
}

/// `POST /api/chat` - run one agent turn.
pub async fn chat(
    State(state): State<SharedState>,
    Json(body): Json<ChatRequestBody>,
) -> impl IntoResponse {
    let request = TurnRequest {
        user_id: body.user_id,
        chat_id: body.chat_id,
        message: body.message,
        username: body.username,
        chat_type: body.chat_type,
        source: body.source,
    };
    let response = state.agent.run(request).await;
    Json(json!({ "response": response }))
}

// ─── Clear ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ClearRequestBody {
    pub user_id: i64,
    pub chat_id: i64,
}

/// `POST /api/clear` - wipe the session transcript and security counter.
pub async fn clear(
    State(state): State<SharedState>,
    Json(body): Json<ClearRequestBody>,
) -> impl IntoResponse {
    state.sessions.clear(body.user_id, body.chat_id).await;
    Json(json!({ "success": true }))
}

// ─── Admin ───────────────────────────────────────────────────────────────────

pub async fn permissions_status(State(state): State<SharedState>) -> impl IntoResponse {
    let names: Vec<String> = state
        .registry
        .all_definitions()
        .await
        .into_iter()
        .map(|d| d.name)
        .collect();
    Json(state.permissions.status(&names))
}

#[derive(Debug, Deserialize)]
pub struct PermissionUpdateBody {
    pub mode: Option<RuleMode>,
    pub tools: Option<ToolSet>,
}

pub async fn permissions_update(
    State(state): State<SharedState>,
    Path(session_type): Path<String>,
    Json(body): Json<PermissionUpdateBody>,
) -> impl IntoResponse {
    match state
        .permissions
        .update(&session_type, body.mode, body.tools)
    {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "session_type": session_type })),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

pub async fn sessions_summary(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({ "sessions": state.sessions.summaries() }))
}

pub async fn config_snapshot(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({ "config": &*state.config }))
}
