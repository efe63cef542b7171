//! The tool layer: trait and types, built-in executors, the two-tier
//! registry, and the dispatcher.

pub mod bot;
pub mod discovery;
pub mod dispatcher;
pub mod files;
pub mod memory;
pub mod registry;
pub mod schedule;
pub mod shell;
pub mod skills;
pub mod tasks;
pub mod telegram;
pub mod traits;
pub mod web;

use std::sync::Arc;

use crate::adapters::AdapterClient;
use crate::scheduler::TaskStore;
use crate::skills::SkillsClient;

pub use dispatcher::ToolDispatcher;
pub use registry::{BASE_TOOL_NAMES, BOT_ONLY_TOOLS, ToolRegistry};
pub use traits::{Tool, ToolContext, ToolDefinition, ToolResult};

/// Register the whole built-in catalogue on `registry`.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    task_store: Arc<TaskStore>,
    adapters: Arc<AdapterClient>,
    skills_client: Arc<SkillsClient>,
) {
    // Core workspace tools.
    registry.register(Arc::new(shell::RunCommandTool), "builtin");
    registry.register(Arc::new(files::ReadFileTool), "builtin");
    registry.register(Arc::new(files::WriteFileTool), "builtin");
    registry.register(Arc::new(files::EditFileTool), "builtin");
    registry.register(Arc::new(files::DeleteFileTool), "builtin");
    registry.register(Arc::new(files::SearchFilesTool), "builtin");
    registry.register(Arc::new(files::SearchTextTool), "builtin");
    registry.register(Arc::new(files::ListDirectoryTool), "builtin");

    // Web.
    registry.register(Arc::new(web::SearchWebTool::new()), "builtin");
    registry.register(Arc::new(web::FetchPageTool::new()), "builtin");

    // Memory, todo list, scheduler.
    registry.register(Arc::new(memory::MemoryTool), "builtin");
    registry.register(Arc::new(tasks::ManageTasksTool), "builtin");
    registry.register(
        Arc::new(schedule::ScheduleTaskTool::new(task_store)),
        "builtin",
    );

    // Skill management.
    registry.register(
        Arc::new(skills::InstallSkillTool::new(skills_client.clone())),
        "builtin",
    );
    registry.register(
        Arc::new(skills::ListSkillsTool::new(skills_client)),
        "builtin",
    );

    // Bot callbacks (appended to the toolset for `bot` source only).
    registry.register(
        Arc::new(bot::SendFileTool::new(adapters.clone())),
        "builtin:bot",
    );
    registry.register(
        Arc::new(bot::SendDmTool::new(adapters.clone())),
        "builtin:bot",
    );
    registry.register(
        Arc::new(bot::ManageMessageTool::new(adapters.clone())),
        "builtin:bot",
    );
    registry.register(
        Arc::new(bot::AskUserTool::new(adapters.clone())),
        "builtin:bot",
    );

    // Userbot telegram family.
    for tool in telegram::telegram_tools(adapters) {
        registry.register(tool, "builtin:userbot");
    }
}

/// Discovery tools close over the registry itself, so they are wired
/// after construction.
pub fn register_discovery_tools(registry: &Arc<ToolRegistry>) {
    registry.register(
        Arc::new(discovery::SearchToolsTool::new(registry.clone())),
        "builtin",
    );
    registry.register(
        Arc::new(discovery::LoadToolsTool::new(registry.clone())),
        "builtin",
    );
}
