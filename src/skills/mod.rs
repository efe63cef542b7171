//! Client for the external skills service.
//!
//! Skills live outside the runtime; this client fetches the mention block
//! injected into the system prompt, installs/lists skills on behalf of
//! the agent tools, and (best-effort) pulls skill-sourced tool
//! definitions for the catalogue.  Every call degrades gracefully - an
//! unreachable skills service never fails a turn.

use std::time::Duration;

use serde_json::Value;

use crate::tools::traits::ToolDefinition;

pub struct SkillsClient {
    client: reqwest::Client,
    base_url: String,
}

impl SkillsClient {
    /// `base_url` empty disables all skill features.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    /// Skill-mention block for the system prompt (name + description per
    /// skill; full instructions are loaded on demand by the agent).
    /// Returns an empty string on any failure.
    pub async fn mentions(&self, user_id: Option<i64>) -> String {
        if !self.is_configured() {
            return String::new();
        }
        let mut url = format!("{}/skills/mentions", self.base_url);
        if let Some(uid) = user_id {
            url.push_str(&format!("?user_id={uid}"));
        }

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let body: Value = resp.json().await.unwrap_or(Value::Null);
                match body.get("mentions").and_then(Value::as_str) {
                    Some(m) if !m.is_empty() => format!("\n\n{m}"),
                    _ => String::new(),
                }
            }
            Ok(resp) => {
                log::warn!("skills: mentions returned {}", resp.status());
                String::new()
            }
            Err(e) => {
                log::warn!("skills: failed to load mentions: {e}");
                String::new()
            }
        }
    }

    /// Install a skill by name.  Long deadline: installs may download.
    pub async fn install(&self, name: &str, source: &str) -> Result<Value, String> {
        if !self.is_configured() {
            return Err("skills service not configured".to_owned());
        }
        let response = self
            .client
            .post(format!("{}/skills/install", self.base_url))
            .timeout(Duration::from_secs(120))
            .json(&serde_json::json!({ "name": name, "source": source }))
            .send()
            .await
            .map_err(|e| format!("skills request failed: {e}"))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            Ok(body)
        } else {
            let detail = body
                .get("detail")
                .and_then(Value::as_str)
                .unwrap_or("Installation failed");
            Err(detail.to_owned())
        }
    }

    /// Installed and available skill listings, raw.
    pub async fn list(&self) -> Result<(Value, Value), String> {
        if !self.is_configured() {
            return Err("skills service not configured".to_owned());
        }
        let installed = self.get_json("/skills").await?;
        let available = self.get_json("/skills/available").await?;
        Ok((installed, available))
    }

    /// Skill-sourced tool definitions for the catalogue.  Missing endpoint
    /// or unreachable service → empty list.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        if !self.is_configured() {
            return Vec::new();
        }
        match self.get_json("/skills/tools").await {
            Ok(body) => body
                .get("tools")
                .and_then(Value::as_array)
                .map(|tools| {
                    tools
                        .iter()
                        .filter_map(|t| serde_json::from_value::<ToolDefinition>(t.clone()).ok())
                        .filter(|d| d.source.starts_with("skill:"))
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                log::debug!("skills: no tool definitions: {e}");
                Vec::new()
            }
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, String> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| format!("skills request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("skills API error: {}", response.status().as_u16()));
        }
        response
            .json()
            .await
            .map_err(|e| format!("skills response parse error: {e}"))
    }
}
