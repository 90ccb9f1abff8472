//! Telegram channel, long-polls the Bot API for updates.
//!
//! Private chats are always handled. In groups the bot only sees messages
//! that address it: an `@username` mention, a reply to one of its messages,
//! or the generic `@bot` / `@assistant` tags. The mention is stripped before
//! the text reaches the assistant, and group replies are threaded to the
//! triggering message.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::config::TelegramConfig;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

static GENERIC_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@(?:bot|assistant)\b").unwrap());

/// Who the bot is, learned from `getMe` at startup.
#[derive(Debug, Clone, Default)]
pub struct BotIdentity {
    pub id: Option<i64>,
    pub username: Option<String>,
}

impl BotIdentity {
    fn mention_pattern(&self) -> Regex {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => Regex::new(&format!(
                r"(?i)@(?:bot|assistant|{})\b",
                regex::escape(name)
            ))
            .unwrap_or_else(|_| GENERIC_MENTION.clone()),
            _ => GENERIC_MENTION.clone(),
        }
    }

    fn from_get_me(data: &Value) -> Self {
        let result = data.get("result");
        Self {
            id: result.and_then(|r| r.get("id")).and_then(Value::as_i64),
            username: result
                .and_then(|r| r.get("username"))
                .and_then(Value::as_str)
                .map(String::from),
        }
    }
}

/// Telegram channel, connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &TelegramConfig) -> Self {
        Self::new(config.bot_token.clone(), config.allowed_users.clone())
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Check if a username is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        check_user_allowed(&self.allowed_users, [username])
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages; only the first chunk is threaded.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);

        for (i, chunk) in chunks.iter().enumerate() {
            let reply_to = if i == 0 { reply_to } else { None };
            self.send_message_chunk(chat_id, chunk, reply_to).await?;
        }
        Ok(())
    }

    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), ChannelError> {
        let mut markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        if let Some(message_id) = reply_to {
            markdown_body["reply_to_message_id"] = Value::from(message_id);
        }

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let mut plain_body = markdown_body;
        if let Some(obj) = plain_body.as_object_mut() {
            obj.remove("parse_mode");
        }
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        let identity = match client.get(api_url(&bot_token, "getMe")).send().await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(data) => BotIdentity::from_get_me(&data),
                Err(e) => {
                    tracing::warn!("Telegram getMe parse error: {e}");
                    BotIdentity::default()
                }
            },
            Err(e) => {
                tracing::warn!("Telegram getMe failed, group mentions limited to @bot/@assistant: {e}");
                BotIdentity::default()
            }
        };

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            let mentions = identity.mention_pattern();

            tracing::info!(
                bot = identity.username.as_deref().unwrap_or("unknown"),
                "Telegram channel listening for messages..."
            );

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let resp = match client
                    .post(api_url(&bot_token, "getUpdates"))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message") else {
                        continue;
                    };

                    let Some(incoming) =
                        parse_message(message, &identity, &mentions, &allowed_users)
                    else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;
        let reply_to = msg.metadata.get("reply_to").and_then(Value::as_i64);

        self.send_message(chat_id, &response.content, reply_to).await
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        metadata: &Value,
    ) -> Result<(), ChannelError> {
        if let (StatusUpdate::Thinking(_), Some(chat_id)) =
            (&status, metadata.get("chat_id").and_then(|v| v.as_str()))
        {
            let _ = self
                .client
                .post(self.api_url("sendChatAction"))
                .json(&serde_json::json!({
                    "chat_id": chat_id,
                    "action": "typing"
                }))
                .send()
                .await;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(bot_token: &str, method: &str) -> String {
    format!("https://api.telegram.org/bot{bot_token}/{method}")
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Turn a Telegram `message` object into an [`IncomingMessage`], or `None`
/// when it should not reach the assistant.
fn parse_message(
    message: &Value,
    bot: &BotIdentity,
    mentions: &Regex,
    allowed_users: &[String],
) -> Option<IncomingMessage> {
    let text = message.get("text").and_then(Value::as_str)?;
    let from = message.get("from");

    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string());

    if bot.id.is_some() && from.and_then(|f| f.get("id")).and_then(Value::as_i64) == bot.id {
        return None;
    }

    let mut identities = vec![username];
    if let Some(ref id) = user_id {
        identities.push(id.as_str());
    }
    if !check_user_allowed(allowed_users, identities) {
        tracing::warn!(
            "Telegram: ignoring message from unauthorized user: username={username}, user_id={}",
            user_id.as_deref().unwrap_or("unknown")
        );
        return None;
    }

    let chat = message.get("chat");
    let chat_id = chat
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();
    let chat_type = chat
        .and_then(|c| c.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("private");
    let is_group = matches!(chat_type, "group" | "supergroup");

    let first_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str);

    let mut metadata = serde_json::json!({
        "chat_id": chat_id,
        "username": username,
    });

    let content = if is_group {
        if !is_addressed(message, text, bot, mentions) {
            tracing::debug!(chat_id = %chat_id, "Telegram: group message not addressed to bot, skipping");
            return None;
        }
        if let Some(message_id) = message.get("message_id").and_then(Value::as_i64) {
            metadata["reply_to"] = Value::from(message_id);
        }
        strip_mentions(text, mentions)
    } else {
        text.trim().to_string()
    };

    if content.is_empty() {
        return None;
    }

    let mut incoming = IncomingMessage::new(
        "telegram",
        user_id.as_deref().unwrap_or(username),
        &content,
    )
    .with_metadata(metadata)
    .with_user_name(first_name.unwrap_or(username));

    if is_group {
        let title = chat.and_then(|c| c.get("title")).and_then(Value::as_str);
        incoming = incoming.with_group(&chat_id, title);
    }

    Some(incoming)
}

/// A group message addresses the bot by mention, text mention, or reply.
fn is_addressed(message: &Value, text: &str, bot: &BotIdentity, mentions: &Regex) -> bool {
    if mentions.is_match(text) {
        return true;
    }

    if let Some(bot_id) = bot.id {
        let replied_to_bot = message
            .get("reply_to_message")
            .and_then(|r| r.get("from"))
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            == Some(bot_id);
        if replied_to_bot {
            return true;
        }

        let text_mention = message
            .get("entities")
            .and_then(Value::as_array)
            .is_some_and(|entities| {
                entities.iter().any(|e| {
                    e.get("type").and_then(Value::as_str) == Some("text_mention")
                        && e.get("user").and_then(|u| u.get("id")).and_then(Value::as_i64)
                            == Some(bot_id)
                })
            });
        if text_mention {
            return true;
        }
    }

    false
}

fn strip_mentions(text: &str, mentions: &Regex) -> String {
    let stripped = mentions.replace_all(text, " ");
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_start_matches([',', ':'])
        .trim()
        .to_string()
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
