//! Cross-subsystem flows: the HTTP surface, the scheduler against a live
//! adapter endpoint, and MCP routing against a live JSON-RPC server.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Value, json};

use ratel::{
    adapters::AdapterClient,
    agent::AgentService,
    ai::{ChatMessage, ChatResponse, LlmBackend},
    config::RuntimeConfig,
    gateway::{AppState, build_router},
    mcp::{McpBridge, McpRegistry, McpServer},
    permissions::PermissionEngine,
    scheduler::{SchedulerService, TaskStore},
    sessions::SessionManager,
    skills::SkillsClient,
    tools::{ToolContext, ToolDispatcher, ToolRegistry},
};

// ─── Mock servers ────────────────────────────────────────────────────────────

async fn spawn_http(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

type Recorded = Arc<Mutex<Vec<Value>>>;

/// Adapter fake: records `/send` bodies.
async fn spawn_adapter(recorded: Recorded) -> String {
    async fn handle_send(
        State(recorded): State<Recorded>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        recorded.lock().expect("lock").push(body);
        Json(json!({ "success": true, "message_id": 1 }))
    }

    let router = Router::new()
        .route("/send", post(handle_send))
        .with_state(recorded);
    spawn_http(router).await
}

/// MCP fake: serves a one-tool catalogue and records `tools/call`s.
async fn spawn_mcp(recorded: Recorded) -> String {
    async fn handle_rpc(
        State(recorded): State<Recorded>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let method = body["method"].as_str().unwrap_or("");
        match method {
            "tools/list" => Json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "result": {
                    "tools": [{
                        "name": "ps",
                        "description": "List containers",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "all": { "type": "boolean" } }
                        }
                    }]
                }
            })),
            "tools/call" => {
                recorded.lock().expect("lock").push(body.clone());
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": body["id"],
                    "result": {
                        "content": [
                            { "type": "text", "text": "CONTAINER ID   IMAGE" },
                            { "type": "text", "text": "abc123         alpine" }
                        ]
                    }
                }))
            }
            _ => Json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": { "code": -32601, "message": "Method not found" }
            })),
        }
    }

    let router = Router::new().route("/", post(handle_rpc)).with_state(recorded);
    spawn_http(router).await
}

/// Scripted LLM backend.
struct ScriptedBackend {
    replies: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _tools: Option<Vec<Value>>,
    ) -> Result<ChatResponse, String> {
        let mut replies = self.replies.lock().expect("lock");
        if replies.is_empty() {
            return Err("scripted backend exhausted".to_owned());
        }
        let content = replies.remove(0);
        serde_json::from_value(json!({
            "choices": [{
                "message": { "content": content },
                "finish_reason": "stop"
            }]
        }))
        .map_err(|e| e.to_string())
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Runtime {
    state: Arc<AppState>,
    dispatcher: Arc<ToolDispatcher>,
    adapters: Arc<AdapterClient>,
    _dir: tempfile::TempDir,
}

async fn runtime(replies: Vec<&str>, bot_url: &str) -> Runtime {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut config = RuntimeConfig::default();
    config.workspace.root = dir.path().join("workspace");
    config.tools.config_path = dir.path().join("tools_config.json");
    config.tools.mcp_servers_path = dir.path().join("mcp_servers.json");
    config.tools.mcp_cache_path = dir.path().join("mcp_tools_cache.json");
    config.scheduler.store_path = dir.path().join("scheduled_tasks.json");
    config.endpoints.bot_url = bot_url.to_owned();
    let config = Arc::new(config);

    let permissions = Arc::new(PermissionEngine::load(
        config.workspace.shared_dir().join("tool_permissions.json"),
    ));
    let mcp = Arc::new(McpRegistry::load(
        McpBridge::new(5, 5),
        config.tools.mcp_servers_path.clone(),
        config.tools.mcp_cache_path.clone(),
    ));
    let skills = Arc::new(SkillsClient::new(""));
    let adapters = Arc::new(AdapterClient::new(config.endpoints.bot_url.clone(), ""));
    let task_store = Arc::new(TaskStore::load(config.scheduler.store_path.clone(), 20));

    let registry = Arc::new(ToolRegistry::new(
        mcp.clone(),
        skills.clone(),
        config.tools.config_path.clone(),
        60,
    ));
    ratel::tools::register_builtin_tools(
        &registry,
        task_store.clone(),
        adapters.clone(),
        skills.clone(),
    );
    ratel::tools::register_discovery_tools(&registry);

    let dispatcher = Arc::new(ToolDispatcher::new(
        registry.clone(),
        permissions.clone(),
        mcp.clone(),
        5,
    ));
    let sessions = Arc::new(SessionManager::new(config.workspace.clone()));
    let backend = Arc::new(ScriptedBackend {
        replies: Mutex::new(replies.into_iter().map(str::to_owned).collect()),
    });
    let agent = Arc::new(AgentService::new(
        config.clone(),
        backend,
        sessions.clone(),
        registry.clone(),
        permissions.clone(),
        dispatcher.clone(),
        skills,
    ));

    let state = Arc::new(AppState {
        config,
        agent,
        sessions,
        registry,
        permissions,
        mcp,
        tasks: task_store,
    });

    Runtime {
        state,
        dispatcher,
        adapters,
        _dir: dir,
    }
}

// ─── HTTP surface ────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_and_clear_round_trip_over_http() {
    let rt = runtime(vec!["Hi"], "").await;
    let base = spawn_http(build_router(rt.state.clone())).await;
    let client = reqwest::Client::new();

    let reply: Value = client
        .post(format!("{base}/api/chat"))
        .json(&json!({ "user_id": 1, "chat_id": 1, "message": "Hello" }))
        .send()
        .await
        .expect("chat request")
        .json()
        .await
        .expect("chat body");
    assert_eq!(reply["response"], "Hi");

    let cleared: Value = client
        .post(format!("{base}/api/clear"))
        .json(&json!({ "user_id": 1, "chat_id": 1 }))
        .send()
        .await
        .expect("clear request")
        .json()
        .await
        .expect("clear body");
    assert_eq!(cleared["success"], true);

    let health: Value = client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .expect("health")
        .json()
        .await
        .expect("health body");
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn tools_surface_lists_base_subset() {
    let rt = runtime(vec![], "").await;
    let base = spawn_http(build_router(rt.state.clone())).await;
    let client = reqwest::Client::new();

    let listing: Value = client
        .get(format!("{base}/tools/base"))
        .send()
        .await
        .expect("base tools")
        .json()
        .await
        .expect("body");
    let names: Vec<&str> = listing["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|t| t["function"]["name"].as_str())
        .collect();
    assert!(names.contains(&"run_command"));
    assert!(names.contains(&"search_tools"));
    // Bot-only tools never appear in the managed listing.
    assert!(!names.contains(&"send_dm"));

    // load_tools returns a subset of enabled names with no duplicates.
    let loaded: Value = client
        .post(format!("{base}/tools/load"))
        .json(&json!(["read_file", "read_file", "ghost"]))
        .send()
        .await
        .expect("load")
        .json()
        .await
        .expect("body");
    assert_eq!(loaded["count"], 1);
    assert_eq!(loaded["not_found"], json!(["ghost"]));
}

// ─── Scheduler: recurring reminder ───────────────────────────────────────────

#[tokio::test]
async fn recurring_reminder_fires_and_reschedules() {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let adapter_url = spawn_adapter(recorded.clone()).await;
    let rt = runtime(vec![], &adapter_url).await;

    let base = spawn_http(build_router(rt.state.clone())).await;
    let client = reqwest::Client::new();

    // Create via the HTTP surface: due immediately, recurring every minute.
    let created: Value = client
        .post(format!("{base}/tasks"))
        .json(&json!({
            "user_id": 7,
            "chat_id": 70,
            "task_type": "message",
            "content": "ping",
            "delay_minutes": 0,
            "recurring": true,
            "interval_minutes": 1
        }))
        .send()
        .await
        .expect("create task")
        .json()
        .await
        .expect("body");
    assert_eq!(created["success"], true);
    let task_id = created["task"]["id"].as_str().expect("task id").to_owned();

    // Drive one tick directly.
    let scheduler = SchedulerService::new(
        rt.state.tasks.clone(),
        rt.adapters.clone(),
        rt.state.agent.clone(),
        rt.state.config.scheduler.clone(),
    );
    let before = chrono::Utc::now().timestamp();
    scheduler.tick().await;

    // The adapter received the reminder.
    let sent = recorded.lock().expect("lock");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], 70);
    assert_eq!(sent[0]["text"], "⏰ Reminder: ping");
    drop(sent);

    // Rescheduled one interval out with run_count bumped.
    let task = rt.state.tasks.get(&task_id).expect("task still present");
    assert_eq!(task.run_count, 1);
    assert!(task.execute_at >= before + 60);

    // DELETE removes it.
    let deleted: Value = client
        .delete(format!("{base}/tasks/{task_id}"))
        .send()
        .await
        .expect("delete")
        .json()
        .await
        .expect("body");
    assert_eq!(deleted["success"], true);
    assert!(rt.state.tasks.get(&task_id).is_none());
}

// ─── MCP: composite-name routing ─────────────────────────────────────────────

#[tokio::test]
async fn mcp_tool_routes_through_json_rpc() {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let mcp_url = spawn_mcp(recorded.clone()).await;
    let rt = runtime(vec![], "").await;

    // Register the server; add_server fetches the catalogue.
    let discovered = rt
        .state
        .mcp
        .add_server(McpServer {
            name: "docker".to_owned(),
            url: mcp_url,
            transport: "http".to_owned(),
            api_key: None,
            enabled: true,
            description: None,
        })
        .await
        .expect("add_server");
    assert_eq!(discovered, 1);

    // The composite name is now in the catalogue.
    let defs = rt.state.mcp.definitions();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].name, "mcp_docker_ps");
    assert_eq!(defs[0].source, "mcp:docker");

    // Dispatch through the agent's tool path.
    let ctx = ToolContext::new("/tmp", 1, 1);
    let result = rt
        .dispatcher
        .execute("mcp_docker_ps", json!({ "all": true }), &ctx)
        .await;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.output, "CONTAINER ID   IMAGE\nabc123         alpine");

    // The server saw a tools/call with the original name and arguments.
    let calls = recorded.lock().expect("lock");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["method"], "tools/call");
    assert_eq!(calls[0]["params"]["name"], "ps");
    assert_eq!(calls[0]["params"]["arguments"], json!({ "all": true }));
}
