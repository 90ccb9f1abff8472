//! Bounded context memory.
//!
//! Every turn is appended to the durable log. The window handed to the model
//! is a read-only projection of the last N turns, recomputed on each request.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::error::DatabaseError;
use crate::scope::ConversationScope;
use crate::store::{ConversationTurn, Database, TurnRole};

/// Upper bound on the audit history returned to callers.
pub const MAX_HISTORY: usize = 1000;

pub struct ContextWindowManager {
    db: Arc<dyn Database>,
    default_limit: usize,
}

impl ContextWindowManager {
    pub fn new(db: Arc<dyn Database>, default_limit: usize) -> Self {
        Self { db, default_limit }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Append a turn stamped with the current time.
    pub async fn append_turn(
        &self,
        scope: &ConversationScope,
        role: TurnRole,
        text: &str,
    ) -> Result<ConversationTurn, DatabaseError> {
        let turn = ConversationTurn::new(role, text, Utc::now());
        self.db.append_turn(scope, &turn).await?;
        debug!(%scope, role = role.as_str(), "Turn recorded");
        Ok(turn)
    }

    /// The most recent `limit` turns oldest-first (config default when `None`).
    pub async fn get_window(
        &self,
        scope: &ConversationScope,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, DatabaseError> {
        self.db
            .recent_turns(scope, limit.unwrap_or(self.default_limit))
            .await
    }

    /// The audit view. With no limit this is the whole stored log; an
    /// explicit limit returns the last `limit` turns, capped at
    /// [`MAX_HISTORY`].
    pub async fn full_history(
        &self,
        scope: &ConversationScope,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, DatabaseError> {
        match limit {
            None => self.db.all_turns(scope).await,
            Some(limit) => self.db.recent_turns(scope, limit.min(MAX_HISTORY)).await,
        }
    }
}
