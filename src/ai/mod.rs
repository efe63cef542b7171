pub mod client;
pub mod types;

pub use client::{LlmBackend, LlmClient};
pub use types::{
    AssistantMessage, ChatMessage, ChatRequest, ChatResponse, Choice, FunctionCall, MessageRole,
    ToolCall, TokenUsage,
};
