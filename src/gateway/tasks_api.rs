//! Scheduler HTTP handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::scheduler::{NewTask, Task, TaskPatch};

use super::server::SharedState;

fn render_task(task: &Task, now: i64) -> Value {
    json!({
        "id": task.id,
        "user_id": task.user_id,
        "chat_id": task.chat_id,
        "source": task.source,
        "type": task.task_type.as_str(),
        "content": task.content,
        "execute_at": task.execute_at,
        "created_at": task.created_at,
        "last_run": task.last_run,
        "run_count": task.run_count,
        "recurring": task.recurring,
        "interval_minutes": task.interval_minutes,
        "enabled": task.enabled,
        "time_left_minutes": task.time_left_minutes(now),
    })
}

#[derive(Debug, Deserialize)]
pub struct UserFilter {
    pub user_id: Option<i64>,
}

/// `GET /tasks[?user_id]`.
pub async fn list_tasks(
    State(state): State<SharedState>,
    Query(filter): Query<UserFilter>,
) -> impl IntoResponse {
    let now = Utc::now().timestamp();
    let tasks: Vec<Value> = state
        .tasks
        .list(filter.user_id)
        .iter()
        .map(|t| render_task(t, now))
        .collect();
    Json(json!({ "tasks": tasks, "count": tasks.len() }))
}

/// `POST /tasks`.
pub async fn create_task(
    State(state): State<SharedState>,
    Json(new): Json<NewTask>,
) -> impl IntoResponse {
    match state.tasks.create(new) {
        Ok(task) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "task": render_task(&task, Utc::now().timestamp()),
                "message": format!("Task {} created", task.id),
            })),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

/// `GET /tasks/:id`.
pub async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tasks.get(&id) {
        Some(task) => (
            StatusCode::OK,
            Json(render_task(&task, Utc::now().timestamp())),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("Task {id} not found") })),
        ),
    }
}

/// `PUT /tasks/:id`.
pub async fn update_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> impl IntoResponse {
    match state.tasks.update(&id, patch) {
        Ok(task) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "task": render_task(&task, Utc::now().timestamp()),
            })),
        ),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

/// `DELETE /tasks/:id[?user_id]`.
pub async fn delete_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(filter): Query<UserFilter>,
) -> impl IntoResponse {
    match state.tasks.delete(&id, filter.user_id) {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": format!("Task {id} cancelled") })),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("Task {id} not found") })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

/// `POST /tasks/:id/run` - make the task due now; the next tick fires it.
pub async fn run_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tasks.mark_due_now(&id) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": format!("Task {id} triggered") })),
        ),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

/// `GET /stats`.
pub async fn stats(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.tasks.stats())
}
