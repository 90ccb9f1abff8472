//! libSQL backend, async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::scope::ConversationScope;
use crate::store::migrations;
use crate::store::traits::{ChatGroup, ConversationTurn, Database, Participant, TurnRole};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn select_turns(
        &self,
        scope: &ConversationScope,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, DatabaseError> {
        let (kind, group_id, user_id) = scope_columns(scope);
        // -1 is SQLite's "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut rows = self
            .conn()
            .query(
                "SELECT role, content, occurred_at FROM conversation_turns
                 WHERE scope_kind = ?1 AND group_id = ?2 AND user_id = ?3
                 ORDER BY seq DESC LIMIT ?4",
                params![kind, group_id, user_id, limit],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("select turns: {e}")))?;

        let mut turns = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let role: String = row.get(0).unwrap_or_default();
            let Some(role) = TurnRole::parse(&role) else {
                debug!(%scope, role, "Skipping turn with unknown role");
                continue;
            };
            let content: String = row.get(1).unwrap_or_default();
            let occurred_at: String = row.get(2).unwrap_or_default();
            turns.push(ConversationTurn {
                role,
                content,
                occurred_at: parse_datetime(&occurred_at),
            });
        }
        turns.reverse();
        Ok(turns)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Split a scope into its `(scope_kind, group_id, user_id)` columns.
/// Direct scopes store an empty group id.
fn scope_columns(scope: &ConversationScope) -> (&'static str, String, String) {
    (
        scope.kind(),
        scope.group_id().unwrap_or_default().to_string(),
        scope.user_id().to_string(),
    )
}

/// Parse a datetime string, handling both RFC 3339 and SQLite's
/// `datetime('now')` output.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Conversation log ────────────────────────────────────────────

    async fn append_turn(
        &self,
        scope: &ConversationScope,
        turn: &ConversationTurn,
    ) -> Result<(), DatabaseError> {
        let (kind, group_id, user_id) = scope_columns(scope);
        self.conn()
            .execute(
                "INSERT INTO conversation_turns
                    (scope_kind, group_id, user_id, role, content, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    kind,
                    group_id,
                    user_id,
                    turn.role.as_str(),
                    turn.content.as_str(),
                    turn.occurred_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append turn: {e}")))?;
        Ok(())
    }

    async fn recent_turns(
        &self,
        scope: &ConversationScope,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DatabaseError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.select_turns(scope, Some(limit)).await
    }

    async fn all_turns(
        &self,
        scope: &ConversationScope,
    ) -> Result<Vec<ConversationTurn>, DatabaseError> {
        self.select_turns(scope, None).await
    }

    async fn count_turns(&self, scope: &ConversationScope) -> Result<u64, DatabaseError> {
        let (kind, group_id, user_id) = scope_columns(scope);
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM conversation_turns
                 WHERE scope_kind = ?1 AND group_id = ?2 AND user_id = ?3",
                params![kind, group_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count turns: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0).max(0) as u64),
            _ => Ok(0),
        }
    }

    // ── Registry ────────────────────────────────────────────────────

    async fn touch_participant(
        &self,
        scope: &ConversationScope,
        display_name: &str,
    ) -> Result<(), DatabaseError> {
        let (kind, group_id, user_id) = scope_columns(scope);
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO participants
                    (scope_kind, group_id, user_id, display_name, first_seen, last_seen, message_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)
                 ON CONFLICT (scope_kind, group_id, user_id) DO UPDATE SET
                    display_name = excluded.display_name,
                    last_seen = excluded.last_seen,
                    message_count = participants.message_count + 1",
                params![kind, group_id, user_id, display_name, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch participant: {e}")))?;
        Ok(())
    }

    async fn get_participant(
        &self,
        scope: &ConversationScope,
    ) -> Result<Option<Participant>, DatabaseError> {
        let (kind, group_id, user_id) = scope_columns(scope);
        let mut rows = self
            .conn()
            .query(
                "SELECT display_name, first_seen, last_seen, message_count FROM participants
                 WHERE scope_kind = ?1 AND group_id = ?2 AND user_id = ?3",
                params![kind, group_id, user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get participant: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let first_seen: String = row.get(1).unwrap_or_default();
                let last_seen: String = row.get(2).unwrap_or_default();
                Ok(Some(Participant {
                    scope: scope.clone(),
                    display_name: row.get(0).unwrap_or_default(),
                    first_seen: parse_datetime(&first_seen),
                    last_seen: parse_datetime(&last_seen),
                    message_count: row.get(3).unwrap_or(0),
                }))
            }
            _ => Ok(None),
        }
    }

    async fn touch_group(&self, group_id: &str, name: Option<&str>) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO chat_groups (group_id, name, first_seen, last_active)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT (group_id) DO UPDATE SET
                    name = COALESCE(excluded.name, chat_groups.name),
                    last_active = excluded.last_active",
                params![group_id, opt_text(name), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch group: {e}")))?;
        Ok(())
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<ChatGroup>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT group_id, name, first_seen, last_active FROM chat_groups
                 WHERE group_id = ?1",
                params![group_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get group: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let first_seen: String = row.get(2).unwrap_or_default();
                let last_active: String = row.get(3).unwrap_or_default();
                Ok(Some(ChatGroup {
                    group_id: row.get(0).unwrap_or_default(),
                    name: row.get::<Option<String>>(1).unwrap_or(None),
                    first_seen: parse_datetime(&first_seen),
                    last_active: parse_datetime(&last_active),
                }))
            }
            _ => Ok(None),
        }
    }
}
