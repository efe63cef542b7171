use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ─── ToolResult ──────────────────────────────────────────────────────────────

/// The result of executing a [`Tool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool considered the execution successful.
    pub success: bool,
    /// Human-readable output (stdout, file contents, listing, etc.).
    #[serde(default)]
    pub output: String,
    /// Error description when `success` is false.
    #[serde(default)]
    pub error: String,
    /// Optional structured metadata for machine consumption.  The
    /// discovery tool returns dynamically loaded definitions under the
    /// `loaded_tools` key here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            metadata: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ─── ToolContext ─────────────────────────────────────────────────────────────

/// Per-invocation context passed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The session's working directory (per-user workspace root).
    pub cwd: std::path::PathBuf,
    /// `"<user_id>_<chat_id>"`.
    pub session_id: String,
    pub user_id: i64,
    pub chat_id: i64,
    /// `private | group | supergroup | sandbox`.
    pub chat_type: String,
    /// `bot | userbot`.
    pub source: String,
    /// Admin users bypass some security patterns in the executor layer.
    pub is_admin: bool,
}

impl ToolContext {
    pub fn new(cwd: impl Into<std::path::PathBuf>, user_id: i64, chat_id: i64) -> Self {
        Self {
            cwd: cwd.into(),
            session_id: format!("{user_id}_{chat_id}"),
            user_id,
            chat_id,
            chat_type: "private".to_owned(),
            source: "bot".to_owned(),
            is_admin: false,
        }
    }

    pub fn with_chat_type(mut self, chat_type: impl Into<String>) -> Self {
        self.chat_type = chat_type.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

// ─── Tool ────────────────────────────────────────────────────────────────────

/// A capability the agent loop can invoke.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// `Arc<dyn Tool>` registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable machine identifier (snake_case), e.g. `"run_command"`.
    fn name(&self) -> &str;

    /// Human-readable description used in LLM tool payloads.
    fn description(&self) -> &str;

    /// JSON Schema object describing the accepted parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with the given arguments and invocation context.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String>;
}

// ─── ToolDefinition ──────────────────────────────────────────────────────────

/// A catalogue entry: what the model (and admin surface) sees.
///
/// Sources: `builtin`, `builtin:userbot`, `mcp:<server>`, `skill:<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Value,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_source() -> String {
    "builtin".to_owned()
}

fn default_enabled() -> bool {
    true
}

impl ToolDefinition {
    pub fn from_tool(tool: &dyn Tool, source: &str) -> Self {
        Self {
            name: tool.name().to_owned(),
            description: tool.description().to_owned(),
            parameters: tool.parameters_schema(),
            source: source.to_owned(),
            enabled: true,
        }
    }

    /// Render into the `{type: "function", function: {...}}` shape the
    /// chat-completions wire format expects.
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    /// Parse a `{type, function}` value back into a definition (used when
    /// merging `metadata.loaded_tools` into the live toolset).
    pub fn from_openai(value: &Value) -> Option<Self> {
        let function = value.get("function")?;
        Some(Self {
            name: function.get("name")?.as_str()?.to_owned(),
            description: function
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            parameters: function
                .get("parameters")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object"})),
            source: "builtin".to_owned(),
            enabled: true,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
