//! The reasoning loop.
//!
//! ```text
//! lock check ──► compose system prompt + trimmed history + user message
//!       │
//!       ▼
//! LLM.complete() ──► tool calls?
//!       │                │ yes: for each call, in order:
//!       │                │   repair args → dispatch → append tool message
//!       │                │   security violation? counter++, cap → lock
//!       │                │   merge metadata.loaded_tools into toolset
//!       │                ▼
//!       │            iteration++ < max? → repeat
//!       │ no
//!       ▼
//! final content ──► epilogue: history append, trim, snapshot, cleanup
//! ```
//!
//! Each session's turns serialize on the session mutex; turns on
//! different sessions run concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::ai::{ChatMessage, LlmBackend, MessageRole};
use crate::config::RuntimeConfig;
use crate::permissions::PermissionEngine;
use crate::sessions::{SessionManager, save_snapshot};
use crate::skills::SkillsClient;
use crate::tools::{
    dispatcher::{ToolDispatcher, is_security_violation},
    registry::ToolRegistry,
    traits::{ToolContext, ToolDefinition},
};

use super::{
    AgentRunner, TurnRequest,
    args_repair::repair_arguments,
    prompt,
};

/// Terminal message once the security-violation cap is hit.  Repeated on
/// every turn until the session is cleared.
pub const LOCK_MESSAGE: &str =
    "🚫 Session locked due to repeated security violations. /clear to reset.";

/// Synthetic nudge when the model returns reasoning with neither content
/// nor tool calls.
const CONTINUE_NUDGE: &str = "[system: continue — emit a tool_call or a final answer in content]";

// ─── AgentService ────────────────────────────────────────────────────────────

pub struct AgentService {
    config: Arc<RuntimeConfig>,
    llm: Arc<dyn LlmBackend>,
    sessions: Arc<SessionManager>,
    registry: Arc<ToolRegistry>,
    permissions: Arc<PermissionEngine>,
    dispatcher: Arc<ToolDispatcher>,
    skills: Arc<SkillsClient>,
}

impl AgentService {
    pub fn new(
        config: Arc<RuntimeConfig>,
        llm: Arc<dyn LlmBackend>,
        sessions: Arc<SessionManager>,
        registry: Arc<ToolRegistry>,
        permissions: Arc<PermissionEngine>,
        dispatcher: Arc<ToolDispatcher>,
        skills: Arc<SkillsClient>,
    ) -> Self {
        Self {
            config,
            llm,
            sessions,
            registry,
            permissions,
            dispatcher,
            skills,
        }
    }

    /// Run one turn.  See module docs for the control flow.
    #[tracing::instrument(
        name = "agent.turn",
        skip_all,
        fields(user_id = request.user_id, chat_id = request.chat_id, source = %request.source)
    )]
    pub async fn run(&self, request: TurnRequest) -> String {
        let handle = self.sessions.get(request.user_id, request.chat_id);
        // Held for the whole turn: transcript appends never interleave.
        let mut session = handle.state.lock().await;
        session.source = request.source.clone();

        let cap = self.config.agent.max_blocked_commands;
        if cap > 0 && session.blocked_count >= cap {
            return LOCK_MESSAGE.to_owned();
        }

        log::info!(
            "agent run: user={} chat={} source={}",
            request.user_id,
            request.chat_id,
            request.source
        );

        // ── Toolset ──────────────────────────────────────────────────────────
        let lazy = self.config.agent.lazy_tool_loading;
        let defs = self.registry.definitions_for(&request.source, lazy).await;
        let mut tool_defs =
            self.permissions
                .filter(defs, &request.chat_type, &request.source);
        log::info!(
            "agent: {} tool(s) for {}/{} (lazy={lazy})",
            tool_defs.len(),
            request.chat_type,
            request.source
        );

        // ── System prompt ────────────────────────────────────────────────────
        let tools_list = tool_defs
            .iter()
            .map(|d| format!("- {}: {}", d.name, truncate_str(&d.description, 100)))
            .collect::<Vec<_>>()
            .join("\n");
        let skills_block = self.skills.mentions(Some(request.user_id)).await;
        let template = prompt::load_template(&self.config.tools.system_prompt_path);
        let system_prompt = prompt::render_system_prompt(
            &template,
            &session.cwd,
            &tools_list,
            &prompt::user_ports(request.user_id),
            &skills_block,
        ) + &prompt::turn_footer(&request.username, request.user_id, &session.cwd, &request.source);

        // ── Compose context ──────────────────────────────────────────────────
        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(session.history.clone());
        messages.push(ChatMessage::user(request.message.clone()));
        messages = prompt::trim_messages(
            messages,
            self.config.agent.max_context_messages,
            self.config.context_char_cap(),
        );

        let ctx = ToolContext {
            cwd: session.cwd.clone(),
            session_id: format!("{}_{}", request.user_id, request.chat_id),
            user_id: request.user_id,
            chat_id: request.chat_id,
            chat_type: request.chat_type.clone(),
            source: request.source.clone(),
            is_admin: false,
        };

        // ── Iterate ──────────────────────────────────────────────────────────
        let mut final_response = String::new();
        let mut iteration = 0;

        while iteration < self.config.agent.max_iterations {
            iteration += 1;
            log::debug!(
                "[iter {iteration}/{}] {} message(s) in context",
                self.config.agent.max_iterations,
                messages.len()
            );

            let tools_payload = if self.llm.supports_tools() {
                Some(tool_defs.iter().map(ToolDefinition::to_openai).collect())
            } else {
                log::info!("agent: backend without tool support, omitting tools");
                None
            };

            let response = match self.llm.complete(messages.clone(), tools_payload).await {
                Ok(r) => r,
                Err(e) => {
                    log::error!("agent: LLM error: {e}");
                    return format!("Error: {e}");
                }
            };

            let Some(choice) = response.choices.first() else {
                return "No response from model".to_owned();
            };
            let assistant = &choice.message;
            messages.push(assistant.to_chat_message());

            let tool_calls = assistant.tool_calls.clone().unwrap_or_default();
            let content = assistant.content.clone().unwrap_or_default();

            if content.is_empty() && tool_calls.is_empty() {
                let reasoning = assistant.reasoning_content.clone().unwrap_or_default();
                if !reasoning.is_empty() {
                    log::info!("[iter {iteration}] reasoning only, nudging model to continue");
                    messages.push(ChatMessage::user(CONTINUE_NUDGE));
                    continue;
                }
                log::warn!("[iter {iteration}] empty response from model");
                break;
            }

            if tool_calls.is_empty() {
                log::info!("[iter {iteration}] final response ({} chars)", content.len());
                final_response = content;
                break;
            }

            for call in &tool_calls {
                let name = &call.function.name;
                let args = match serde_json::from_str::<Value>(&call.function.arguments) {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("[iter {iteration}] bad args for {name}: {e}");
                        repair_arguments(&call.function.arguments).unwrap_or_else(|| {
                            log::error!("[iter {iteration}] could not repair args for {name}");
                            Value::Object(serde_json::Map::new())
                        })
                    }
                };

                let result = self.dispatcher.execute(name, args, &ctx).await;

                // Dynamic discovery: definitions returned by load_tools
                // join the live toolset for subsequent LLM calls.
                if let Some(loaded) = result
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("loaded_tools"))
                    .and_then(Value::as_array)
                {
                    for value in loaded {
                        if let Some(def) = ToolDefinition::from_openai(value) {
                            if !tool_defs.iter().any(|d| d.name == def.name) {
                                log::info!("agent: loaded tool '{}' into session", def.name);
                                tool_defs.push(def);
                            }
                        }
                    }
                }

                if !result.success && is_security_violation(&result.error) {
                    session.blocked_count += 1;
                    log::warn!(
                        "agent: security violation #{}: {}",
                        session.blocked_count,
                        truncate_str(&result.error, 100)
                    );
                    if cap > 0 && session.blocked_count >= cap {
                        log::warn!("agent: session {} locked", ctx.session_id);
                        return LOCK_MESSAGE.to_owned();
                    }
                }

                let output = if result.success {
                    if result.output.is_empty() {
                        "(empty)".to_owned()
                    } else {
                        result.output
                    }
                } else if result.error.starts_with("🔒") {
                    // Permission denials reach the model unprefixed.
                    result.error
                } else if result.error.is_empty() {
                    "Error: Unknown error".to_owned()
                } else {
                    format!("Error: {}", result.error)
                };

                messages.push(ChatMessage::tool(
                    call.id.clone(),
                    trim_tool_output(&output, self.config.agent.max_tool_output),
                ));
            }
        }

        // ── Fallback ─────────────────────────────────────────────────────────
        if final_response.is_empty() && iteration >= 1 {
            final_response = fallback_from_tools(&messages);
        }

        // ── Epilogue ─────────────────────────────────────────────────────────
        session.history.push(ChatMessage::user(request.message));
        if !final_response.is_empty() {
            session
                .history
                .push(ChatMessage::assistant(final_response.clone()));
        }
        session.history = prompt::trim_messages(
            std::mem::take(&mut session.history),
            self.config.agent.max_history * 2,
            30_000,
        );
        save_snapshot(&session);

        let cleaned = prompt::clean_response(&final_response);
        log::info!("agent: response ({} chars)", cleaned.len());
        if cleaned.is_empty() {
            "(no response)".to_owned()
        } else {
            cleaned
        }
    }
}

#[async_trait]
impl AgentRunner for AgentService {
    async fn run_turn(&self, request: TurnRequest) -> String {
        self.run(request).await
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_owned()
}

/// Keep ~60% of the head and ~30% of the tail of an oversized output.
fn trim_tool_output(output: &str, cap: usize) -> String {
    if output.len() <= cap {
        return output.to_owned();
    }
    let head = truncate_str(output, cap * 6 / 10);
    let tail_len = cap * 3 / 10;
    let mut start = output.len().saturating_sub(tail_len);
    while start < output.len() && !output.is_char_boundary(start) {
        start += 1;
    }
    format!("{head}\n\n... [TRIMMED] ...\n\n{}", &output[start..])
}

/// Synthesize a reply when the loop ran out of iterations without final
/// content.  A failing last tool surfaces its error; otherwise the first
/// lines of successful outputs collapse to a one-line confirmation.
fn fallback_from_tools(messages: &[ChatMessage]) -> String {
    let last_tool = messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Tool)
        .and_then(|m| m.content.as_deref());

    let Some(last) = last_tool else {
        return String::new();
    };

    if let Some(rest) = last.strip_prefix("Error:") {
        log::info!("agent fallback: surfacing last tool error");
        return format!("Error: {}", truncate_str(rest.trim(), 200));
    }

    let first_lines: Vec<String> = messages
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .filter_map(|m| m.content.as_deref())
        .filter(|c| !c.starts_with("Error:"))
        .filter_map(|c| c.lines().next())
        .map(|l| truncate_str(l, 100))
        .filter(|l| !l.is_empty() && l != "(empty)")
        .collect();

    match first_lines.len() {
        0 => String::new(),
        1 => format!("Done! {}", first_lines[0]),
        _ => "✅ Done".to_owned(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ai::{AssistantMessage, ChatResponse, Choice, FunctionCall, ToolCall};
    use crate::config::schema::WorkspaceConfig;
    use crate::mcp::{McpBridge, McpRegistry};
    use crate::storage;
    use crate::tools::traits::{Tool, ToolResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Mock backend ─────────────────────────────────────────────────────────

    /// Scripted responses, one per LLM call.
    struct MockBackend {
        responses: std::sync::Mutex<Vec<ChatResponse>>,
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: std::sync::Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _tools: Option<Vec<Value>>,
        ) -> Result<ChatResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err("mock backend exhausted".to_owned())
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    fn text_response(content: &str) -> ChatResponse {
        ChatResponse {
            choices: vec![Choice {
                message: AssistantMessage {
                    content: Some(content.to_owned()),
                    tool_calls: None,
                    reasoning_content: None,
                },
                finish_reason: Some("stop".to_owned()),
            }],
            usage: None,
        }
    }

    fn tool_call_response(id: &str, name: &str, arguments: &str) -> ChatResponse {
        ChatResponse {
            choices: vec![Choice {
                message: AssistantMessage {
                    content: None,
                    tool_calls: Some(vec![ToolCall {
                        id: id.to_owned(),
                        call_type: "function".to_owned(),
                        function: FunctionCall {
                            name: name.to_owned(),
                            arguments: arguments.to_owned(),
                        },
                    }]),
                    reasoning_content: None,
                },
                finish_reason: Some("tool_calls".to_owned()),
            }],
            usage: None,
        }
    }

    // ── Mock tools ───────────────────────────────────────────────────────────

    struct ListDirMock;

    #[async_trait]
    impl Tool for ListDirMock {
        fn name(&self) -> &str {
            "list_directory"
        }
        fn description(&self) -> &str {
            "List directory contents."
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            Ok(ToolResult::ok("SESSION.json\n"))
        }
    }

    /// Records the args it was invoked with.
    struct ArgsProbe {
        seen: std::sync::Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Tool for ArgsProbe {
        fn name(&self) -> &str {
            "read_file"
        }
        fn description(&self) -> &str {
            "Read file contents."
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            self.seen.lock().unwrap().push(args);
            Ok(ToolResult::ok("contents"))
        }
    }

    struct BlockedCommandMock;

    #[async_trait]
    impl Tool for BlockedCommandMock {
        fn name(&self) -> &str {
            "run_command"
        }
        fn description(&self) -> &str {
            "Run a shell command."
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            Ok(ToolResult::err("BLOCKED: attempt to read secret env"))
        }
    }

    struct SendDmMock;

    #[async_trait]
    impl Tool for SendDmMock {
        fn name(&self) -> &str {
            "send_dm"
        }
        fn description(&self) -> &str {
            "Send a private message to current user."
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            Ok(ToolResult::ok("dm sent"))
        }
    }

    // ── Harness ──────────────────────────────────────────────────────────────

    struct Harness {
        service: AgentService,
        sessions: Arc<SessionManager>,
        backend: Arc<MockBackend>,
        _dir: tempfile::TempDir,
        workspace: std::path::PathBuf,
    }

    fn harness(responses: Vec<ChatResponse>, extra_tools: Vec<Arc<dyn Tool>>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("workspace");

        let mut config = RuntimeConfig::default();
        config.workspace.root = workspace.clone();
        config.agent.lazy_tool_loading = false;
        config.tools.config_path = dir.path().join("tools_config.json");
        let config = Arc::new(config);

        let mcp = Arc::new(McpRegistry::load(
            McpBridge::new(1, 1),
            dir.path().join("mcp_servers.json"),
            dir.path().join("mcp_tools_cache.json"),
        ));
        let skills = Arc::new(SkillsClient::new(""));
        let registry = Arc::new(ToolRegistry::new(
            mcp.clone(),
            skills.clone(),
            config.tools.config_path.clone(),
            60,
        ));
        registry.register(Arc::new(ListDirMock), "builtin");
        registry.register(Arc::new(SendDmMock), "builtin:bot");
        for tool in extra_tools {
            registry.register(tool, "builtin");
        }

        let permissions = Arc::new(PermissionEngine::load(
            dir.path().join("tool_permissions.json"),
        ));
        let dispatcher = Arc::new(ToolDispatcher::new(
            registry.clone(),
            permissions.clone(),
            mcp,
            config.tools.timeout_secs,
        ));
        let sessions = Arc::new(SessionManager::new(WorkspaceConfig {
            root: workspace.clone(),
        }));
        let backend = MockBackend::new(responses);

        let service = AgentService::new(
            config,
            backend.clone(),
            sessions.clone(),
            registry,
            permissions,
            dispatcher,
            skills,
        );
        Harness {
            service,
            sessions,
            backend,
            _dir: dir,
            workspace,
        }
    }

    // ── Scenarios ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn pure_reply_updates_history_and_snapshot() {
        let h = harness(vec![text_response("Hi")], vec![]);

        let reply = h.service.run(TurnRequest::new(1, 1, "Hello")).await;
        assert_eq!(reply, "Hi");
        assert_eq!(h.backend.call_count(), 1);

        let handle = h.sessions.get(1, 1);
        let session = handle.state.lock().await;
        assert_eq!(session.history.len(), 2);

        let snapshot: crate::sessions::Snapshot =
            storage::load_json(&h.workspace.join("1").join("SESSION.json"))
                .unwrap()
                .unwrap();
        assert_eq!(snapshot.history.len(), 1);
        assert!(snapshot.history[0].user.contains("Hello"));
        assert_eq!(snapshot.history[0].assistant.as_deref(), Some("Hi"));
    }

    #[tokio::test]
    async fn tool_call_then_reply() {
        let h = harness(
            vec![
                tool_call_response("c1", "list_directory", "{}"),
                text_response("Only SESSION.json here."),
            ],
            vec![],
        );

        let reply = h
            .service
            .run(TurnRequest::new(1, 1, "what's in my workspace?"))
            .await;
        assert_eq!(reply, "Only SESSION.json here.");
        assert_eq!(h.backend.call_count(), 2);
    }

    #[tokio::test]
    async fn malformed_arguments_are_repaired() {
        let probe = Arc::new(ArgsProbe {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let h = harness(
            vec![
                tool_call_response("c1", "read_file", "{'path': 'a.txt',}"),
                text_response("done"),
            ],
            vec![probe.clone() as Arc<dyn Tool>],
        );

        let reply = h.service.run(TurnRequest::new(1, 1, "read a.txt")).await;
        assert_eq!(reply, "done");

        let seen = probe.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], serde_json::json!({"path": "a.txt"}));
    }

    #[tokio::test]
    async fn group_permission_denial_continues_loop() {
        let h = harness(
            vec![
                tool_call_response("c1", "send_dm", "{}"),
                text_response("Understood, I can't DM from here."),
            ],
            vec![],
        );

        let mut request = TurnRequest::new(1, 1, "dm me");
        request.chat_type = "group".to_owned();
        let reply = h.service.run(request).await;
        assert_eq!(reply, "Understood, I can't DM from here.");

        // Counter untouched by permission denials.
        let handle = h.sessions.get(1, 1);
        assert_eq!(handle.state.lock().await.blocked_count, 0);
    }

    #[tokio::test]
    async fn security_violation_cap_locks_session() {
        let responses = (0..3)
            .map(|i| tool_call_response(&format!("c{i}"), "run_command", "{}"))
            .collect();
        let h = harness(responses, vec![Arc::new(BlockedCommandMock) as Arc<dyn Tool>]);

        let reply = h.service.run(TurnRequest::new(1, 1, "cat secrets")).await;
        assert_eq!(reply, LOCK_MESSAGE);

        let handle = h.sessions.get(1, 1);
        assert_eq!(handle.state.lock().await.blocked_count, 3);

        // Later turns return the lock without calling the backend.
        let calls_before = h.backend.call_count();
        let reply = h.service.run(TurnRequest::new(1, 1, "hello?")).await;
        assert_eq!(reply, LOCK_MESSAGE);
        assert_eq!(h.backend.call_count(), calls_before);

        // /clear resets the lock.
        h.sessions.clear(1, 1).await;
        let reply = h.service.run(TurnRequest::new(1, 1, "hello again")).await;
        // Backend is exhausted; the turn surfaces the transport error.
        assert!(reply.starts_with("Error:"));
    }

    #[tokio::test]
    async fn transport_error_aborts_turn() {
        let h = harness(vec![], vec![]);
        let reply = h.service.run(TurnRequest::new(1, 1, "hi")).await;
        assert_eq!(reply, "Error: mock backend exhausted");
    }

    #[tokio::test]
    async fn iteration_cap_falls_back_to_tool_summary() {
        // The model keeps calling tools; the loop must give up and
        // synthesize a confirmation from the successful outputs.
        let responses: Vec<ChatResponse> = (0..20)
            .map(|i| tool_call_response(&format!("c{i}"), "list_directory", "{}"))
            .collect();
        let h = harness(responses, vec![]);

        let reply = h.service.run(TurnRequest::new(1, 1, "loop forever")).await;
        assert_eq!(reply, "✅ Done");
    }

    #[tokio::test]
    async fn single_iteration_budget_still_falls_back() {
        // With a one-iteration budget, a tool-only turn must surface the
        // tool output instead of "(no response)".
        let h = harness(
            vec![tool_call_response("c1", "list_directory", "{}")],
            vec![],
        );
        let mut config = (*h.service.config).clone();
        config.agent.max_iterations = 1;
        let service = AgentService::new(
            Arc::new(config),
            h.backend.clone(),
            h.service.sessions.clone(),
            h.service.registry.clone(),
            h.service.permissions.clone(),
            h.service.dispatcher.clone(),
            h.service.skills.clone(),
        );

        let reply = service.run(TurnRequest::new(1, 1, "ls")).await;
        assert_eq!(reply, "Done! SESSION.json");
    }

    #[tokio::test]
    async fn reasoning_only_response_gets_nudged() {
        let reasoning_only = ChatResponse {
            choices: vec![Choice {
                message: AssistantMessage {
                    content: None,
                    tool_calls: None,
                    reasoning_content: Some("thinking about it".to_owned()),
                },
                finish_reason: None,
            }],
            usage: None,
        };
        let h = harness(vec![reasoning_only, text_response("Answer: 4")], vec![]);

        let reply = h.service.run(TurnRequest::new(1, 1, "2+2?")).await;
        assert_eq!(reply, "Answer: 4");
        assert_eq!(h.backend.call_count(), 2);
    }

    #[tokio::test]
    async fn thinking_blocks_are_stripped_from_reply() {
        let h = harness(
            vec![text_response("<thinking>hmm</thinking>The answer is 4.")],
            vec![],
        );
        let reply = h.service.run(TurnRequest::new(1, 1, "2+2?")).await;
        assert_eq!(reply, "The answer is 4.");
    }

    // ── Invariants ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn tool_messages_pair_with_calls_in_order() {
        // Two calls in one assistant message → two tool messages with the
        // matching ids, in issue order.
        let two_calls = ChatResponse {
            choices: vec![Choice {
                message: AssistantMessage {
                    content: None,
                    tool_calls: Some(vec![
                        ToolCall {
                            id: "c1".to_owned(),
                            call_type: "function".to_owned(),
                            function: FunctionCall {
                                name: "list_directory".to_owned(),
                                arguments: "{}".to_owned(),
                            },
                        },
                        ToolCall {
                            id: "c2".to_owned(),
                            call_type: "function".to_owned(),
                            function: FunctionCall {
                                name: "nonexistent".to_owned(),
                                arguments: "{}".to_owned(),
                            },
                        },
                    ]),
                    reasoning_content: None,
                },
                finish_reason: None,
            }],
            usage: None,
        };

        // Probe the transcript through the second LLM call's input.
        struct Capture {
            backend: Arc<MockBackend>,
            seen: std::sync::Mutex<Vec<ChatMessage>>,
        }

        #[async_trait]
        impl LlmBackend for Capture {
            async fn complete(
                &self,
                messages: Vec<ChatMessage>,
                tools: Option<Vec<Value>>,
            ) -> Result<ChatResponse, String> {
                *self.seen.lock().unwrap() = messages.clone();
                self.backend.complete(messages, tools).await
            }
        }

        let h = harness(vec![], vec![]);
        let capture = Arc::new(Capture {
            backend: MockBackend::new(vec![two_calls, text_response("ok")]),
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let service = AgentService::new(
            h.service.config.clone(),
            capture.clone(),
            h.service.sessions.clone(),
            h.service.registry.clone(),
            h.service.permissions.clone(),
            h.service.dispatcher.clone(),
            h.service.skills.clone(),
        );

        let reply = service.run(TurnRequest::new(2, 2, "go")).await;
        assert_eq!(reply, "ok");

        let transcript = capture.seen.lock().unwrap();
        let tool_ids: Vec<&str> = transcript
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(tool_ids, vec!["c1", "c2"]);

        // The unknown tool surfaced as an error message, not a crash.
        let unknown = transcript
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("c2"))
            .unwrap();
        assert!(unknown.content.as_deref().unwrap().starts_with("Error:"));
    }

    #[tokio::test]
    async fn history_stays_within_caps_across_turns() {
        let responses: Vec<ChatResponse> =
            (0..30).map(|i| text_response(&format!("reply {i}"))).collect();
        let h = harness(responses, vec![]);

        for i in 0..30 {
            h.service
                .run(TurnRequest::new(1, 1, format!("msg {i}")))
                .await;
        }

        let handle = h.sessions.get(1, 1);
        let session = handle.state.lock().await;
        let max = h.service.config.agent.max_history * 2;
        assert!(session.history.len() <= max);
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    #[test]
    fn tool_output_trimming_marks_gap() {
        let output = "x".repeat(1000);
        let trimmed = trim_tool_output(&output, 100);
        assert!(trimmed.contains("... [TRIMMED] ..."));
        assert!(trimmed.len() < 1000);

        let short = trim_tool_output("short", 100);
        assert_eq!(short, "short");
    }

    #[test]
    fn fallback_surfaces_last_error() {
        let messages = vec![
            ChatMessage::tool("c1", "Error: disk on fire"),
        ];
        assert_eq!(fallback_from_tools(&messages), "Error: disk on fire");
    }

    #[test]
    fn fallback_single_success_quotes_first_line() {
        let messages = vec![ChatMessage::tool("c1", "42 files\nmore detail")];
        assert_eq!(fallback_from_tools(&messages), "Done! 42 files");
    }

    #[test]
    fn fallback_without_tools_is_empty() {
        assert_eq!(fallback_from_tools(&[ChatMessage::user("hi")]), "");
    }
}
