//! HTTP client for the chat-completions proxy.
//!
//! One implementation talks to any OpenAI-compatible endpoint; the trait
//! exists so the agent loop can run against a scripted mock in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::schema::ProviderConfig;

use super::types::{ChatMessage, ChatRequest, ChatResponse};

pub type Result<T> = std::result::Result<T, String>;

// ─── LlmBackend ──────────────────────────────────────────────────────────────

/// A completion backend.  `Send + Sync` so it can be shared as
/// `Arc<dyn LlmBackend>` across concurrent turns.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Run one completion.  `tools` are pre-rendered `{type, function}`
    /// definitions; `None` omits the field entirely.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<ChatResponse>;

    /// Whether this backend supports native tool calling.
    fn supports_tools(&self) -> bool {
        true
    }
}

// ─── LlmClient ───────────────────────────────────────────────────────────────

/// Production backend: POSTs to `<proxy_url>/v1/chat/completions`.
pub struct LlmClient {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl LlmClient {
    pub fn new(config: ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    fn log_request(&self, messages: &[ChatMessage], tools: usize) {
        log::debug!("llm request: {} messages, {} tool defs", messages.len(), tools);
        for (i, msg) in messages.iter().enumerate() {
            let content_len = msg.content.as_deref().map(str::len).unwrap_or(0);
            match &msg.tool_calls {
                Some(calls) => {
                    for call in calls {
                        log::debug!(
                            "  [{i}] {:?} tool_call: {}({})",
                            msg.role,
                            call.function.name,
                            &call.function.arguments.chars().take(100).collect::<String>()
                        );
                    }
                }
                None => log::debug!("  [{i}] {:?}: {content_len} chars", msg.role),
            }
        }
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<Value>>,
    ) -> Result<ChatResponse> {
        if self.config.proxy_url.is_empty() {
            return Err("No proxy configured".to_owned());
        }

        self.log_request(&messages, tools.as_ref().map(Vec::len).unwrap_or(0));

        let mut request = ChatRequest::new(
            self.config.model.clone(),
            messages,
            self.config.max_tokens,
        );
        if let Some(tools) = tools {
            request = request.with_tools(tools);
        }

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.proxy_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("LLM request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            log::error!("llm error {status}: {snippet}");
            return Err(format!("LLM error {}: {snippet}", status.as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("LLM response parse error: {e}"))?;

        if let Some(usage) = &parsed.usage {
            log::debug!(
                "llm usage: prompt={} completion={} total={}",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            );
        }
        Ok(parsed)
    }

    fn supports_tools(&self) -> bool {
        !self.config.is_minimal_context()
    }
}
