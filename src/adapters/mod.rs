//! HTTP client for the chat-frontend callback contract.
//!
//! The bot and userbot adapters are separate services; the core talks to
//! them over a small REST surface: `/send`, `/send_dm`, `/send_file`,
//! `/edit`, `/delete`, `/ask`, `/answer/{id}`, plus per-operation
//! endpoints for the userbot's telegram tools.
//!
//! File uploads differ by adapter: the bot takes multipart form data, the
//! userbot takes base64 JSON.  Neither adapter has workspace volume
//! access - the core reads bytes and ships them.

use std::time::Duration;

use base64::Engine;
use serde_json::Value;

/// Hard cap on outbound file size (50 MiB).
pub const MAX_FILE_BYTES: usize = 50 * 1024 * 1024;

const SEND_TIMEOUT_SECS: u64 = 10;
const FILE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Bot,
    Userbot,
}

pub struct AdapterClient {
    client: reqwest::Client,
    bot_url: String,
    userbot_url: String,
}

impl AdapterClient {
    pub fn new(bot_url: impl Into<String>, userbot_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_url: bot_url.into(),
            userbot_url: userbot_url.into(),
        }
    }

    /// Pick the adapter for a message source tag.
    pub fn kind_for_source(source: &str) -> AdapterKind {
        if source == "userbot" {
            AdapterKind::Userbot
        } else {
            AdapterKind::Bot
        }
    }

    fn base_url(&self, kind: AdapterKind) -> Result<&str, String> {
        let url = match kind {
            AdapterKind::Bot => &self.bot_url,
            AdapterKind::Userbot => &self.userbot_url,
        };
        if url.is_empty() {
            Err(format!("{kind:?} adapter not configured"))
        } else {
            Ok(url)
        }
    }

    /// POST a JSON body and interpret the `{success, ...}` envelope.
    async fn post_json(
        &self,
        kind: AdapterKind,
        path: &str,
        body: Value,
        timeout_secs: u64,
    ) -> Result<Value, String> {
        let base = self.base_url(kind)?;
        let response = self
            .client
            .post(format!("{base}{path}"))
            .timeout(Duration::from_secs(timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("adapter request failed: {e}"))?;

        let status = response.status();
        let data: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() && data.get("success").and_then(Value::as_bool).unwrap_or(true) {
            Ok(data)
        } else {
            let error = data
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("adapter error: HTTP {}", status.as_u16()));
            Err(error)
        }
    }

    // ── Messaging ────────────────────────────────────────────────────────────

    /// `POST /send {chat_id, text}`.
    pub async fn send(&self, kind: AdapterKind, chat_id: i64, text: &str) -> Result<(), String> {
        self.post_json(
            kind,
            "/send",
            serde_json::json!({ "chat_id": chat_id, "text": text }),
            SEND_TIMEOUT_SECS,
        )
        .await
        .map(|_| ())
    }

    /// `POST /send_dm {user_id, text}` - bot adapter only.
    pub async fn send_dm(&self, user_id: &Value, text: &str) -> Result<(), String> {
        self.post_json(
            AdapterKind::Bot,
            "/send_dm",
            serde_json::json!({ "user_id": user_id, "text": text }),
            SEND_TIMEOUT_SECS,
        )
        .await
        .map(|_| ())
    }

    /// `POST /edit {chat_id, message_id, text}`.
    pub async fn edit_message(
        &self,
        kind: AdapterKind,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), String> {
        self.post_json(
            kind,
            "/edit",
            serde_json::json!({ "chat_id": chat_id, "message_id": message_id, "text": text }),
            SEND_TIMEOUT_SECS,
        )
        .await
        .map(|_| ())
    }

    /// `POST /delete {chat_id, message_id}`.
    pub async fn delete_message(
        &self,
        kind: AdapterKind,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), String> {
        self.post_json(
            kind,
            "/delete",
            serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
            SEND_TIMEOUT_SECS,
        )
        .await
        .map(|_| ())
    }

    // ── Files ────────────────────────────────────────────────────────────────

    /// Ship file bytes to the chat.  Multipart for the bot, base64 JSON
    /// for the userbot.
    pub async fn send_file(
        &self,
        kind: AdapterKind,
        chat_id: i64,
        filename: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), String> {
        if bytes.len() > MAX_FILE_BYTES {
            return Err("File too large (max 50MB)".to_owned());
        }

        match kind {
            AdapterKind::Bot => {
                let base = self.base_url(kind)?;
                let form = reqwest::multipart::Form::new()
                    .text("chat_id", chat_id.to_string())
                    .text("caption", caption.to_owned())
                    .part(
                        "file",
                        reqwest::multipart::Part::bytes(bytes)
                            .file_name(filename.to_owned()),
                    );

                let response = self
                    .client
                    .post(format!("{base}/send_file"))
                    .timeout(Duration::from_secs(FILE_TIMEOUT_SECS))
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| format!("adapter request failed: {e}"))?;

                let status = response.status();
                let data: Value = response.json().await.unwrap_or(Value::Null);
                if status.is_success()
                    && data.get("success").and_then(Value::as_bool).unwrap_or(false)
                {
                    Ok(())
                } else {
                    Err(data
                        .get("error")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                        .unwrap_or_else(|| format!("adapter error: HTTP {}", status.as_u16())))
                }
            }
            AdapterKind::Userbot => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                self.post_json(
                    kind,
                    "/send_file",
                    serde_json::json!({
                        "target": chat_id.to_string(),
                        "file_data": encoded,
                        "filename": filename,
                        "caption": caption,
                    }),
                    FILE_TIMEOUT_SECS,
                )
                .await
                .map(|_| ())
            }
        }
    }

    // ── Questions ────────────────────────────────────────────────────────────

    /// `POST /ask` - register a pending question with the adapter, which
    /// forwards it to the chat and captures the next reply.
    pub async fn ask(
        &self,
        question_id: &str,
        chat_id: i64,
        user_id: i64,
        question: &str,
    ) -> Result<(), String> {
        self.post_json(
            AdapterKind::Bot,
            "/ask",
            serde_json::json!({
                "question_id": question_id,
                "chat_id": chat_id,
                "user_id": user_id,
                "question": question,
            }),
            SEND_TIMEOUT_SECS,
        )
        .await
        .map(|_| ())
    }

    /// `GET /answer/{id}` - `Ok(Some(answer))` once the user replied,
    /// `Ok(None)` while still pending.
    pub async fn poll_answer(&self, question_id: &str) -> Result<Option<String>, String> {
        let base = self.base_url(AdapterKind::Bot)?;
        let response = self
            .client
            .get(format!("{base}/answer/{question_id}"))
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| format!("adapter request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("adapter error: HTTP {}", response.status().as_u16()));
        }
        let data: Value = response
            .json()
            .await
            .map_err(|e| format!("adapter response error: {e}"))?;

        if data.get("answered").and_then(Value::as_bool).unwrap_or(false) {
            Ok(data
                .get("answer")
                .and_then(Value::as_str)
                .map(str::to_owned))
        } else {
            Ok(None)
        }
    }

    // ── Userbot telegram operations ──────────────────────────────────────────

    /// POST an arbitrary userbot operation (`/channel`, `/history`, …)
    /// and return the raw response body.
    pub async fn userbot_op(&self, path: &str, body: Value) -> Result<Value, String> {
        self.post_json(AdapterKind::Userbot, path, body, FILE_TIMEOUT_SECS)
            .await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
