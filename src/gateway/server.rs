//! Router construction and the serve loop.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::agent::AgentService;
use crate::config::RuntimeConfig;
use crate::mcp::McpRegistry;
use crate::permissions::PermissionEngine;
use crate::scheduler::TaskStore;
use crate::sessions::SessionManager;
use crate::tools::ToolRegistry;

use super::{routes, tasks_api, tools_api};

// ─── AppState ────────────────────────────────────────────────────────────────

/// Everything the handlers need, shared immutably.
pub struct AppState {
    pub config: Arc<RuntimeConfig>,
    pub agent: Arc<AgentService>,
    pub sessions: Arc<SessionManager>,
    pub registry: Arc<ToolRegistry>,
    pub permissions: Arc<PermissionEngine>,
    pub mcp: Arc<McpRegistry>,
    pub tasks: Arc<TaskStore>,
}

pub type SharedState = Arc<AppState>;

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn build_router(state: SharedState) -> Router {
    let core = Router::new()
        .route("/api/chat", post(routes::chat))
        .route("/api/clear", post(routes::clear))
        .route("/api/health", get(routes::health))
        .route("/api/admin/permissions", get(routes::permissions_status))
        .route(
            "/api/admin/permissions/:session_type",
            put(routes::permissions_update),
        )
        .route("/api/admin/sessions", get(routes::sessions_summary))
        .route("/api/admin/config", get(routes::config_snapshot));

    let tools = Router::new()
        .route("/tools", get(tools_api::list_tools))
        .route("/tools/enabled", get(tools_api::enabled_tools))
        .route("/tools/base", get(tools_api::base_tools))
        .route("/tools/load", post(tools_api::load_tools))
        .route("/tools/search", get(tools_api::search_tools))
        .route(
            "/tools/:name",
            put(tools_api::toggle_tool).delete(tools_api::reset_tool),
        );

    let mcp = Router::new()
        .route(
            "/mcp/servers",
            get(tools_api::list_servers).post(tools_api::add_server),
        )
        .route("/mcp/servers/:name", delete(tools_api::remove_server))
        .route("/mcp/servers/:name/refresh", post(tools_api::refresh_server))
        .route("/mcp/refresh-all", post(tools_api::refresh_all))
        .route("/mcp/call/:server/:tool", post(tools_api::call_tool));

    let tasks = Router::new()
        .route("/tasks", get(tasks_api::list_tasks).post(tasks_api::create_task))
        .route(
            "/tasks/:id",
            get(tasks_api::get_task)
                .put(tasks_api::update_task)
                .delete(tasks_api::delete_task),
        )
        .route("/tasks/:id/run", post(tasks_api::run_task))
        .route("/stats", get(tasks_api::stats))
        .route("/health", get(routes::health));

    Router::new()
        .merge(core)
        .merge(tools)
        .merge(mcp)
        .merge(tasks)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(state: SharedState) -> Result<(), String> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.gateway.host, state.config.gateway.port
    )
    .parse()
    .map_err(|e| format!("invalid gateway address: {e}"))?;

    let app = build_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("could not bind {addr}: {e}"))?;
    log::info!("gateway: listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("gateway: shutdown signal received");
        })
        .await
        .map_err(|e| format!("gateway error: {e}"))
}
