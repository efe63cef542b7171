//! Tools-API and MCP management handlers.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::mcp::McpServer;
use crate::tools::{BOT_ONLY_TOOLS, ToolDefinition};

use super::server::SharedState;

fn to_openai_list(defs: &[ToolDefinition]) -> Vec<Value> {
    defs.iter().map(ToolDefinition::to_openai).collect()
}

// ─── Tool listings ───────────────────────────────────────────────────────────

/// `GET /tools` - the full catalogue with enabled state and stats.
pub async fn list_tools(State(state): State<SharedState>) -> impl IntoResponse {
    let tools = state.registry.all_definitions().await;

    let builtin = tools.iter().filter(|t| t.source.starts_with("builtin")).count();
    let mcp = tools.iter().filter(|t| t.source.starts_with("mcp:")).count();
    let skill = tools.iter().filter(|t| t.source.starts_with("skill:")).count();

    Json(json!({
        "tools": tools,
        "bot_only_tools": BOT_ONLY_TOOLS,
        "stats": {
            "builtin": builtin,
            "mcp": mcp,
            "skill": skill,
            "total": tools.len(),
        }
    }))
}

/// `GET /tools/enabled` - enabled tools in wire format, for the agent.
pub async fn enabled_tools(State(state): State<SharedState>) -> impl IntoResponse {
    let defs = state.registry.enabled_definitions().await;
    Json(json!({ "tools": to_openai_list(&defs), "count": defs.len() }))
}

/// `GET /tools/base` - the lazy-loading base subset.
pub async fn base_tools(State(state): State<SharedState>) -> impl IntoResponse {
    let defs = state.registry.base_definitions().await;
    Json(json!({ "tools": to_openai_list(&defs), "count": defs.len() }))
}

/// `POST /tools/load` - full definitions for the named tools.
pub async fn load_tools(
    State(state): State<SharedState>,
    Json(names): Json<Vec<String>>,
) -> impl IntoResponse {
    let (loaded, not_found) = state.registry.load(&names).await;
    Json(json!({
        "tools": to_openai_list(&loaded),
        "count": loaded.len(),
        "not_found": not_found,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_search_source")]
    pub source: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_source() -> String {
    "all".to_owned()
}

fn default_search_limit() -> usize {
    10
}

/// `GET /tools/search?query&source&limit`.
pub async fn search_tools(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let (results, total) = state
        .registry
        .search(&params.query, &params.source, params.limit)
        .await;
    Json(json!({
        "tools": results,
        "count": results.len(),
        "total_available": total,
    }))
}

// ─── Tool admin ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
    pub enabled: bool,
}

/// `PUT /tools/:name` - enable or disable a tool.
pub async fn toggle_tool(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(body): Json<ToggleBody>,
) -> impl IntoResponse {
    match state.registry.set_enabled(&name, body.enabled).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "name": name, "enabled": body.enabled })),
        ),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

/// `DELETE /tools/:name` - drop the override, restoring the default.
pub async fn reset_tool(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.registry.reset(&name) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "success": true, "name": name, "message": "Reset to default" })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

// ─── MCP servers ─────────────────────────────────────────────────────────────

/// `GET /mcp/servers`.
pub async fn list_servers(State(state): State<SharedState>) -> impl IntoResponse {
    let servers: Vec<Value> = state
        .mcp
        .list_servers()
        .into_iter()
        .map(|(server, status)| {
            json!({
                "name": server.name,
                "url": server.url,
                "transport": server.transport,
                "enabled": server.enabled,
                "description": server.description,
                "status": status,
            })
        })
        .collect();
    Json(json!({ "servers": servers, "count": servers.len() }))
}

/// `POST /mcp/servers` - register and fetch the catalogue.
pub async fn add_server(
    State(state): State<SharedState>,
    Json(server): Json<McpServer>,
) -> impl IntoResponse {
    let name = server.name.clone();
    match state.mcp.add_server(server).await {
        Ok(count) => {
            state.registry.invalidate();
            (
                StatusCode::OK,
                Json(json!({ "success": true, "name": name, "tools": count })),
            )
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

/// `DELETE /mcp/servers/:name`.
pub async fn remove_server(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.mcp.remove_server(&name) {
        Ok(true) => {
            state.registry.invalidate();
            (StatusCode::OK, Json(json!({ "success": true, "name": name })))
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("unknown MCP server: {name}") })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

/// `POST /mcp/servers/:name/refresh`.
pub async fn refresh_server(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.mcp.refresh(&name).await {
        Ok(count) => {
            state.registry.invalidate();
            (
                StatusCode::OK,
                Json(json!({ "success": true, "name": name, "tools": count })),
            )
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}

/// `POST /mcp/refresh-all` - clear and repopulate every enabled server.
pub async fn refresh_all(State(state): State<SharedState>) -> impl IntoResponse {
    let results = state.mcp.refresh_all().await;
    state.registry.invalidate();

    let rendered: HashMap<String, Value> = results
        .into_iter()
        .map(|(name, result)| {
            let value = match result {
                Ok(count) => json!({ "success": true, "tools": count }),
                Err(e) => json!({ "success": false, "error": e }),
            };
            (name, value)
        })
        .collect();
    Json(json!({ "results": rendered }))
}

/// `POST /mcp/call/:server/:tool` - direct invocation for external
/// consumers (the agent path goes through the dispatcher instead).
pub async fn call_tool(
    State(state): State<SharedState>,
    Path((server, tool)): Path<(String, String)>,
    Json(args): Json<Value>,
) -> impl IntoResponse {
    match state.mcp.call_server(&server, &tool, args).await {
        Ok(output) => (
            StatusCode::OK,
            Json(json!({ "success": true, "result": output })),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "success": false, "error": e })),
        ),
    }
}
