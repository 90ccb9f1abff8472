//! Conversation scopes, the isolation key for dialogue state and memory.

use serde::{Deserialize, Serialize};

/// Identifies an isolated memory/state lane.
///
/// A user's direct conversation and their presence in a group are separate
/// scopes, as is the same user in two different groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationScope {
    Direct { user_id: String },
    Grouped { group_id: String, user_id: String },
}

impl ConversationScope {
    pub fn direct(user_id: impl Into<String>) -> Self {
        Self::Direct {
            user_id: user_id.into(),
        }
    }

    pub fn grouped(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::Grouped {
            group_id: group_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::Direct { user_id } | Self::Grouped { user_id, .. } => user_id,
        }
    }

    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::Direct { .. } => None,
            Self::Grouped { group_id, .. } => Some(group_id),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Grouped { .. })
    }

    /// Storage discriminator, paired with `group_id` and `user_id` columns.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::Grouped { .. } => "group",
        }
    }
}

impl std::fmt::Display for ConversationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct { user_id } => write!(f, "direct:{user_id}"),
            Self::Grouped { group_id, user_id } => write!(f, "group:{group_id}/{user_id}"),
        }
    }
}
