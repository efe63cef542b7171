//! JSON-RPC 2.0 bridge to HTTP MCP servers.
//!
//! Wire shapes:
//! - catalogue: `{method: "tools/list"}` → `{result: {tools: [...]}}`
//! - invocation: `{method: "tools/call", params: {name, arguments}}`
//!
//! `tools/call` results carry a `content` array; all `text`-typed entries
//! are concatenated as the tool output, anything else is stringified.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::McpServer;

// ─── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Convert into `Ok(result)` or `Err(message)`.
    pub fn into_result(self) -> Result<Value, String> {
        if let Some(err) = self.error {
            return Err(format!(
                "MCP error {} ({}): {}",
                err.code,
                err.message,
                err.data.unwrap_or(Value::Null)
            ));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

// ─── McpTool ─────────────────────────────────────────────────────────────────

/// A tool as advertised by `tools/list`.  Servers report the schema under
/// `inputSchema`; some older ones use `parameters`.
#[derive(Debug, Clone, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", alias = "parameters", default)]
    pub input_schema: Value,
}

// ─── McpBridge ───────────────────────────────────────────────────────────────

/// Stateless JSON-RPC client shared by the registry and dispatcher.
pub struct McpBridge {
    client: reqwest::Client,
    list_timeout: Duration,
    call_timeout: Duration,
    next_id: AtomicU64,
}

impl McpBridge {
    pub fn new(list_timeout_secs: u64, call_timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            list_timeout: Duration::from_secs(list_timeout_secs),
            call_timeout: Duration::from_secs(call_timeout_secs),
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc(
        &self,
        server: &McpServer,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, String> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: method.to_owned(),
            params,
        };

        let mut builder = self.client.post(&server.url).timeout(timeout).json(&request);
        if let Some(key) = &server.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| format!("MCP call failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("MCP API error: {}", status.as_u16()));
        }

        response
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| format!("MCP deserialize error: {e}"))?
            .into_result()
    }

    /// Fetch the server's tool catalogue.
    pub async fn list_tools(&self, server: &McpServer) -> Result<Vec<McpTool>, String> {
        let result = self
            .rpc(server, "tools/list", None, self.list_timeout)
            .await?;

        let tools = result
            .get("tools")
            .and_then(|v| serde_json::from_value::<Vec<McpTool>>(v.clone()).ok())
            .unwrap_or_default();
        Ok(tools)
    }

    /// Invoke one tool and extract its textual output.
    pub async fn call_tool(
        &self,
        server: &McpServer,
        tool: &str,
        arguments: Value,
    ) -> Result<String, String> {
        let params = serde_json::json!({ "name": tool, "arguments": arguments });
        let result = self
            .rpc(server, "tools/call", Some(params), self.call_timeout)
            .await?;
        Ok(extract_content(&result))
    }
}

/// Pull text out of a `tools/call` result.
fn extract_content(result: &Value) -> String {
    if let Some(entries) = result.get("content").and_then(Value::as_array) {
        let texts: Vec<&str> = entries
            .iter()
            .filter(|e| e.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|e| e.get("text").and_then(Value::as_str))
            .collect();
        if !texts.is_empty() {
            return texts.join("\n");
        }
    }
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
