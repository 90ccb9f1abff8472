//! `Database` trait, the single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::scope::ConversationScope;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One immutable entry of a scope's conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            occurred_at,
        }
    }
}

/// Someone the assistant has talked to, per scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub scope: ConversationScope,
    pub display_name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub message_count: i64,
}

/// A group chat the assistant has been addressed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatGroup {
    pub group_id: String,
    pub name: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Conversation log ────────────────────────────────────────────

    /// Append a turn to the scope's log.
    async fn append_turn(
        &self,
        scope: &ConversationScope,
        turn: &ConversationTurn,
    ) -> Result<(), DatabaseError>;

    /// The most recent `limit` turns, oldest first.
    async fn recent_turns(
        &self,
        scope: &ConversationScope,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DatabaseError>;

    /// Every turn of the scope, oldest first.
    async fn all_turns(
        &self,
        scope: &ConversationScope,
    ) -> Result<Vec<ConversationTurn>, DatabaseError>;

    /// Number of stored turns for the scope.
    async fn count_turns(&self, scope: &ConversationScope) -> Result<u64, DatabaseError>;

    // ── Registry ────────────────────────────────────────────────────

    /// Record activity from a participant, creating the row on first contact.
    async fn touch_participant(
        &self,
        scope: &ConversationScope,
        display_name: &str,
    ) -> Result<(), DatabaseError>;

    async fn get_participant(
        &self,
        scope: &ConversationScope,
    ) -> Result<Option<Participant>, DatabaseError>;

    /// Record activity in a group chat.
    async fn touch_group(&self, group_id: &str, name: Option<&str>) -> Result<(), DatabaseError>;

    async fn get_group(&self, group_id: &str) -> Result<Option<ChatGroup>, DatabaseError>;
}
