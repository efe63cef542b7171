//! ratel - headless multi-tenant LLM-agent runtime.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ratel::{
    adapters::AdapterClient,
    agent::AgentService,
    ai::LlmClient,
    config,
    gateway::{self, AppState},
    mcp::{McpBridge, McpRegistry},
    permissions::PermissionEngine,
    scheduler::{SchedulerService, TaskStore},
    sessions::SessionManager,
    skills::SkillsClient,
    tools::{ToolDispatcher, ToolRegistry, register_builtin_tools, register_discovery_tools},
};

#[derive(Debug, Parser)]
#[command(name = "ratel", about = "Multi-tenant LLM agent runtime", version)]
struct Cli {
    /// Path to ratel.toml (default: ~/.ratel/ratel.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the gateway port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the workspace root.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ratel=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    // Route `log` macro records through the tracing subscriber.
    let _ = tracing_log::LogTracer::init();
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let cli = Cli::parse();
    let mut runtime_config = config::load_config(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        runtime_config.gateway.port = port;
    }
    if let Some(workspace) = cli.workspace {
        runtime_config.workspace.root = workspace;
    }
    let config = Arc::new(runtime_config);

    log::info!(
        "ratel starting: model={} workspace={} port={}",
        config.provider.model,
        config.workspace.root.display(),
        config.gateway.port
    );

    // ── Wiring, leaves first ─────────────────────────────────────────────────
    let permissions = Arc::new(PermissionEngine::load(
        config.workspace.shared_dir().join("tool_permissions.json"),
    ));

    let mcp = Arc::new(McpRegistry::load(
        McpBridge::new(
            config.tools.mcp_list_timeout_secs,
            config.tools.mcp_call_timeout_secs,
        ),
        config.tools.mcp_servers_path.clone(),
        config.tools.mcp_cache_path.clone(),
    ));

    let skills = Arc::new(SkillsClient::new(config.endpoints.skills_url.clone()));
    let adapters = Arc::new(AdapterClient::new(
        config.endpoints.bot_url.clone(),
        config.endpoints.userbot_url.clone(),
    ));

    let task_store = Arc::new(TaskStore::load(
        config.scheduler.store_path.clone(),
        config.scheduler.max_tasks_per_user,
    ));

    let registry = Arc::new(ToolRegistry::new(
        mcp.clone(),
        skills.clone(),
        config.tools.config_path.clone(),
        config.tools.definitions_ttl_secs,
    ));
    register_builtin_tools(
        &registry,
        task_store.clone(),
        adapters.clone(),
        skills.clone(),
    );
    register_discovery_tools(&registry);

    let dispatcher = Arc::new(ToolDispatcher::new(
        registry.clone(),
        permissions.clone(),
        mcp.clone(),
        config.tools.timeout_secs,
    ));

    let llm = Arc::new(LlmClient::new(config.provider.clone()));
    let sessions = Arc::new(SessionManager::new(config.workspace.clone()));

    let agent = Arc::new(AgentService::new(
        config.clone(),
        llm,
        sessions.clone(),
        registry.clone(),
        permissions.clone(),
        dispatcher,
        skills,
    ));

    let scheduler = SchedulerService::new(
        task_store.clone(),
        adapters,
        agent.clone(),
        config.scheduler.clone(),
    );
    scheduler.start();

    // ── Serve ────────────────────────────────────────────────────────────────
    let state: gateway::SharedState = Arc::new(AppState {
        config,
        agent,
        sessions,
        registry,
        permissions,
        mcp,
        tasks: task_store,
    });

    let result = gateway::serve(state).await;
    scheduler.stop();
    result
}
