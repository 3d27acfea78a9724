//! SQLite conversation store

use async_trait::async_trait;
use rusqlite::{OptionalExtension, Row, params};

use super::ConversationStore;
use super::database::{Database, now_rfc3339, parse_optional_timestamp, parse_timestamp};
use crate::types::{
    AgentConversation, AgentState, ConversationId, DraftId, ParseWithDefault, Result, ResultExt,
    TallyError, UserId,
};

const COLUMNS: &str = "id, user_id, agent_state, active_draft_id, is_deleted, \
                       started_at, last_activity_at, completed_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<AgentConversation> {
    let state: String = row.get(2)?;
    let started_at: String = row.get(5)?;
    let last_activity_at: String = row.get(6)?;
    Ok(AgentConversation {
        id: ConversationId::new(row.get::<_, String>(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        agent_state: AgentState::parse_or_default(&state),
        active_draft_id: row.get::<_, Option<String>>(3)?.map(DraftId::new),
        is_deleted: row.get(4)?,
        started_at: parse_timestamp(5, &started_at)?,
        last_activity_at: parse_timestamp(6, &last_activity_at)?,
        completed_at: parse_optional_timestamp(7, row.get(7)?)?,
    })
}

impl Database {
    /// Run an UPDATE against one conversation; zero rows means it is gone.
    fn update_conversation(
        &self,
        id: &ConversationId,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<()> {
        let affected = self
            .conn()?
            .execute(sql, params)
            .with_context_fn(|| format!("Failed to update conversation {}", id))?;
        if affected == 0 {
            return Err(TallyError::not_found("conversation", id.as_str()));
        }
        Ok(())
    }

    /// Most recent conversations of a user, deleted ones excluded
    pub fn list_conversations(&self, user_id: &UserId, limit: usize) -> Result<Vec<AgentConversation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM conversations
             WHERE user_id = ?1 AND is_deleted = 0
             ORDER BY last_activity_at DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![user_id.as_str(), limit as i64], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl ConversationStore for Database {
    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<AgentConversation>> {
        let conn = self.conn()?;
        let conversation = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1 AND is_deleted = 0"),
                params![id.as_str()],
                map_row,
            )
            .optional()?;
        Ok(conversation)
    }

    async fn get_active_by_user(&self, user_id: &UserId) -> Result<Option<AgentConversation>> {
        let conn = self.conn()?;
        let conversation = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM conversations
                     WHERE user_id = ?1 AND is_deleted = 0
                       AND agent_state NOT IN ('COMPLETED', 'CANCELLED')
                     ORDER BY last_activity_at DESC LIMIT 1"
                ),
                params![user_id.as_str()],
                map_row,
            )
            .optional()?;
        Ok(conversation)
    }

    async fn create_conversation(&self, user_id: &UserId) -> Result<AgentConversation> {
        let id = ConversationId::generate();
        let now = now_rfc3339();
        self.conn()?
            .execute(
                "INSERT INTO conversations (id, user_id, agent_state, started_at, last_activity_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id.as_str(), user_id.as_str(), AgentState::Idle.as_str(), now],
            )
            .with_context("Failed to create conversation")?;

        tracing::debug!(conversation_id = %id, user_id = %user_id, "conversation created");

        self.get_conversation(&id)
            .await?
            .ok_or_else(|| TallyError::not_found("conversation", id.as_str()))
    }

    async fn update_state(&self, id: &ConversationId, state: AgentState) -> Result<()> {
        self.update_conversation(
            id,
            "UPDATE conversations SET agent_state = ?2, last_activity_at = ?3
             WHERE id = ?1 AND is_deleted = 0",
            &[&id.as_str(), &state.as_str(), &now_rfc3339()],
        )
    }

    async fn set_active_draft(&self, id: &ConversationId, draft_id: &DraftId) -> Result<()> {
        self.update_conversation(
            id,
            "UPDATE conversations SET active_draft_id = ?2 WHERE id = ?1 AND is_deleted = 0",
            &[&id.as_str(), &draft_id.as_str()],
        )
    }

    async fn touch_activity(&self, id: &ConversationId) -> Result<()> {
        self.update_conversation(
            id,
            "UPDATE conversations SET last_activity_at = ?2 WHERE id = ?1 AND is_deleted = 0",
            &[&id.as_str(), &now_rfc3339()],
        )
    }

    async fn mark_conversation_completed(&self, id: &ConversationId) -> Result<()> {
        let now = now_rfc3339();
        self.update_conversation(
            id,
            "UPDATE conversations
             SET agent_state = 'COMPLETED', completed_at = COALESCE(completed_at, ?2),
                 last_activity_at = ?2
             WHERE id = ?1 AND is_deleted = 0",
            &[&id.as_str(), &now],
        )
    }

    async fn mark_conversation_cancelled(&self, id: &ConversationId) -> Result<()> {
        let now = now_rfc3339();
        self.update_conversation(
            id,
            "UPDATE conversations
             SET agent_state = 'CANCELLED', completed_at = COALESCE(completed_at, ?2),
                 last_activity_at = ?2
             WHERE id = ?1 AND is_deleted = 0",
            &[&id.as_str(), &now],
        )
    }

    async fn soft_delete_conversation(&self, id: &ConversationId) -> Result<()> {
        self.update_conversation(
            id,
            "UPDATE conversations SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0",
            &[&id.as_str()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[tokio::test]
    async fn test_create_starts_idle() {
        let db = db();
        let user = UserId::new("u1");
        let conversation = db.create_conversation(&user).await.unwrap();

        assert_eq!(conversation.agent_state, AgentState::Idle);
        assert_eq!(conversation.user_id, user);
        assert!(conversation.active_draft_id.is_none());
        assert!(conversation.is_active());
    }

    #[tokio::test]
    async fn test_active_by_user_skips_terminal() {
        let db = db();
        let user = UserId::new("u1");
        let first = db.create_conversation(&user).await.unwrap();
        db.mark_conversation_cancelled(&first.id).await.unwrap();

        assert!(db.get_active_by_user(&user).await.unwrap().is_none());

        let second = db.create_conversation(&user).await.unwrap();
        let active = db.get_active_by_user(&user).await.unwrap().unwrap();
        assert_eq!(active.id, second.id);

        let cancelled = db.get_conversation(&first.id).await.unwrap().unwrap();
        assert_eq!(cancelled.agent_state, AgentState::Cancelled);
        assert!(cancelled.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_state_and_draft_link() {
        let db = db();
        let conversation = db.create_conversation(&UserId::new("u1")).await.unwrap();
        let draft_id = DraftId::new("d1");

        db.update_state(&conversation.id, AgentState::Extracting)
            .await
            .unwrap();
        db.set_active_draft(&conversation.id, &draft_id).await.unwrap();

        let loaded = db.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded.agent_state, AgentState::Extracting);
        assert_eq!(loaded.active_draft_id, Some(draft_id));
        assert!(loaded.last_activity_at >= conversation.last_activity_at);
    }

    #[tokio::test]
    async fn test_missing_conversation_is_not_found() {
        let db = db();
        let err = db
            .update_state(&ConversationId::new("nope"), AgentState::Extracting)
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_conversation() {
        let db = db();
        let user = UserId::new("u1");
        let conversation = db.create_conversation(&user).await.unwrap();
        db.soft_delete_conversation(&conversation.id).await.unwrap();

        assert!(db.get_conversation(&conversation.id).await.unwrap().is_none());
        assert!(db.get_active_by_user(&user).await.unwrap().is_none());
        assert!(db.list_conversations(&user, 10).unwrap().is_empty());
    }
}
