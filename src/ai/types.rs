//! OpenAI-compatible chat-completions wire types with native tool calling.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── MessageRole ─────────────────────────────────────────────────────────────

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

// ─── ToolCall / FunctionCall ─────────────────────────────────────────────────

/// An assistant's structured request to invoke a named function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_owned()
}

/// The function half of a tool call.  `arguments` is a JSON-encoded string
/// per the wire format; models routinely emit malformed JSON here, which
/// the agent loop repairs before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

// ─── ChatMessage ─────────────────────────────────────────────────────────────

/// One entry in the conversation sent to (or echoed back from) the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Present only on tool-role messages; pairs the result with its call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Serialized size in characters, used for context budgeting.
    pub fn size_chars(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }
}

// ─── ChatRequest ─────────────────────────────────────────────────────────────

/// Outbound completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            tool_choice: None,
            max_tokens,
        }
    }

    /// Attach tool definitions (already in `{type, function}` form) with
    /// `tool_choice: "auto"`.
    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        if !tools.is_empty() {
            self.tools = Some(tools);
            self.tool_choice = Some("auto".to_owned());
        }
        self
    }
}

// ─── ChatResponse ────────────────────────────────────────────────────────────

/// Assistant message inside a response choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Some backends surface chain-of-thought here without any content.
    #[serde(default, alias = "reasoning")]
    pub reasoning_content: Option<String>,
}

impl AssistantMessage {
    /// Convert into the transcript representation.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: MessageRole::Assistant,
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Inbound completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_serializes_with_call_id() {
        let msg = ChatMessage::tool("c1", "result body");
        let s = serde_json::to_string(&msg).unwrap();
        assert!(s.contains("\"role\":\"tool\""));
        assert!(s.contains("\"tool_call_id\":\"c1\""));
        assert!(!s.contains("tool_calls"));
    }

    #[test]
    fn user_message_omits_optional_fields() {
        let s = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(s, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn response_with_tool_calls_deserializes() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "list_directory", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let resp: ChatResponse = serde_json::from_str(raw).unwrap();
        let msg = &resp.choices[0].message;
        assert!(msg.content.is_none());
        let calls = msg.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "list_directory");
        assert_eq!(calls[0].id, "c1");
    }

    #[test]
    fn reasoning_alias_is_accepted() {
        let raw = r#"{"choices":[{"message":{"reasoning":"thinking..."},"finish_reason":null}]}"#;
        let resp: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            resp.choices[0].message.reasoning_content.as_deref(),
            Some("thinking...")
        );
    }

    #[test]
    fn request_with_tools_sets_auto_choice() {
        let req = ChatRequest::new("m", vec![ChatMessage::user("x")], 100)
            .with_tools(vec![serde_json::json!({"type": "function"})]);
        assert_eq!(req.tool_choice.as_deref(), Some("auto"));

        let bare = ChatRequest::new("m", vec![], 100).with_tools(vec![]);
        assert!(bare.tools.is_none());
        assert!(bare.tool_choice.is_none());
    }
}
