//! The `Channel` trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;
use crate::scope::ConversationScope;
use crate::search::SearchOutcome;

/// Group chat a message was posted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: String,
    pub name: Option<String>,
}

/// A message received from a transport.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel that produced the message.
    pub channel: String,
    /// Transport-level sender id.
    pub user_id: String,
    pub user_name: Option<String>,
    /// Text with any bot mention already stripped.
    pub content: String,
    pub group: Option<GroupInfo>,
    pub received_at: DateTime<Utc>,
    /// Transport-specific data needed to reply (chat id, message id, ...).
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            content: content.to_string(),
            group: None,
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    pub fn with_group(mut self, id: &str, name: Option<&str>) -> Self {
        self.group = Some(GroupInfo {
            id: id.to_string(),
            name: name.map(String::from),
        });
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Memory/state scope. Ids are namespaced by channel so two transports
    /// never collide.
    pub fn scope(&self) -> ConversationScope {
        let user = format!("{}:{}", self.channel, self.user_id);
        match &self.group {
            Some(group) => ConversationScope::grouped(format!("{}:{}", self.channel, group.id), user),
            None => ConversationScope::direct(user),
        }
    }

    /// Key used by the per-sender rate limiter.
    pub fn sender_key(&self) -> String {
        format!("{}:{}", self.channel, self.user_id)
    }

    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.user_id)
    }
}

/// A reply to send back through the originating channel.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub content: String,
    pub search: Option<SearchOutcome>,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            search: None,
        }
    }
}

/// Transient progress signals. Channels may ignore them.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Thinking(String),
    Status(String),
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A transport the assistant can listen and reply on.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin listening. The stream ends when the transport shuts down.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn send_status(
        &self,
        _status: StatusUpdate,
        _metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
