//! SQLite draft store
//!
//! Field map, confidence map and missing list are JSON text columns. Status
//! changes are guarded in SQL so a terminal draft can never be rewritten.

use async_trait::async_trait;
use rusqlite::{OptionalExtension, Row, params};

use super::DraftStore;
use super::database::{
    Database, now_rfc3339, parse_json, parse_optional_timestamp, parse_timestamp,
};
use crate::types::{
    ConversationId, DraftField, DraftId, DraftPatch, DraftStatus, ParseWithDefault, Result,
    ResultExt, TallyError, TransactionDraft, TransactionId, UserId,
};

/// CONFIRMED -> FINALIZED; params are draft id, transaction id, timestamp
pub(super) const FINALIZE_SQL: &str = "UPDATE drafts
     SET status = 'FINALIZED', transaction_id = ?2, finalized_at = ?3, updated_at = ?3
     WHERE id = ?1 AND is_deleted = 0 AND status = 'CONFIRMED'";

const COLUMNS: &str = "id, user_id, conversation_id, status, extracted_fields, confidence_map, \
                       missing_fields, is_deleted, confirmed_at, cancelled_at, finalized_at, \
                       transaction_id, created_at, updated_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<TransactionDraft> {
    let status: String = row.get(3)?;
    let fields: String = row.get(4)?;
    let confidence: String = row.get(5)?;
    let missing: String = row.get(6)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;
    Ok(TransactionDraft {
        id: DraftId::new(row.get::<_, String>(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        conversation_id: ConversationId::new(row.get::<_, String>(2)?),
        status: DraftStatus::parse_or_default(&status),
        extracted_fields: parse_json(4, &fields)?,
        confidence_map: parse_json(5, &confidence)?,
        missing_fields: parse_json(6, &missing)?,
        is_deleted: row.get(7)?,
        confirmed_at: parse_optional_timestamp(8, row.get(8)?)?,
        cancelled_at: parse_optional_timestamp(9, row.get(9)?)?,
        finalized_at: parse_optional_timestamp(10, row.get(10)?)?,
        transaction_id: row.get::<_, Option<String>>(11)?.map(TransactionId::new),
        created_at: parse_timestamp(12, &created_at)?,
        updated_at: parse_timestamp(13, &updated_at)?,
    })
}

impl Database {
    fn load_draft(&self, id: &DraftId) -> Result<Option<TransactionDraft>> {
        let conn = self.conn()?;
        let draft = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM drafts WHERE id = ?1 AND is_deleted = 0"),
                params![id.as_str()],
                map_row,
            )
            .optional()?;
        Ok(draft)
    }

    /// Guarded status change. Zero rows means missing or in the wrong status.
    fn transition_draft(
        &self,
        id: &DraftId,
        from: DraftStatus,
        to: DraftStatus,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<()> {
        let affected = self
            .conn()?
            .execute(sql, params)
            .with_context_fn(|| format!("Failed to mark draft {} {}", id, to))?;

        if affected == 0 {
            return match self.load_draft(id)? {
                None => Err(TallyError::not_found("draft", id.as_str())),
                Some(draft) => Err(TallyError::invariant(format!(
                    "draft {} is {}, expected {} before {}",
                    id, draft.status, from, to
                ))),
            };
        }

        tracing::debug!(draft_id = %id, status = %to, "draft status changed");
        Ok(())
    }
}

#[async_trait]
impl DraftStore for Database {
    async fn get_draft(&self, id: &DraftId) -> Result<Option<TransactionDraft>> {
        self.load_draft(id)
    }

    async fn get_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<TransactionDraft>> {
        let conn = self.conn()?;
        let draft = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM drafts
                     WHERE conversation_id = ?1 AND is_deleted = 0
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![conversation_id.as_str()],
                map_row,
            )
            .optional()?;
        Ok(draft)
    }

    async fn create_draft(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        missing_fields: Vec<DraftField>,
    ) -> Result<TransactionDraft> {
        let id = DraftId::generate();
        let now = now_rfc3339();
        let missing = serde_json::to_string(&missing_fields)?;

        let result = self.conn()?.execute(
            "INSERT INTO drafts (id, user_id, conversation_id, status, missing_fields,
                                 created_at, updated_at)
             VALUES (?1, ?2, ?3, 'ACTIVE', ?4, ?5, ?5)",
            params![
                id.as_str(),
                user_id.as_str(),
                conversation_id.as_str(),
                missing,
                now
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(TallyError::invariant(format!(
                    "conversation {} already has a draft",
                    conversation_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(draft_id = %id, conversation_id = %conversation_id, "draft created");

        self.load_draft(&id)?
            .ok_or_else(|| TallyError::not_found("draft", id.as_str()))
    }

    async fn update_draft(&self, id: &DraftId, patch: DraftPatch) -> Result<TransactionDraft> {
        let fields = patch
            .extracted_fields
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let confidence = patch
            .confidence_map
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let missing = patch
            .missing_fields
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let affected = self
            .conn()?
            .execute(
                "UPDATE drafts SET
                    extracted_fields = COALESCE(?2, extracted_fields),
                    confidence_map = COALESCE(?3, confidence_map),
                    missing_fields = COALESCE(?4, missing_fields),
                    updated_at = ?5
                 WHERE id = ?1 AND is_deleted = 0 AND status = 'ACTIVE'",
                params![id.as_str(), fields, confidence, missing, now_rfc3339()],
            )
            .with_context_fn(|| format!("Failed to update draft {}", id))?;

        let draft = self
            .load_draft(id)?
            .ok_or_else(|| TallyError::not_found("draft", id.as_str()))?;

        if affected == 0 {
            return Err(TallyError::invariant(format!(
                "draft {} is {} and can no longer change",
                id, draft.status
            )));
        }
        Ok(draft)
    }

    async fn mark_draft_confirmed(&self, id: &DraftId) -> Result<()> {
        self.transition_draft(
            id,
            DraftStatus::Active,
            DraftStatus::Confirmed,
            "UPDATE drafts SET status = 'CONFIRMED', confirmed_at = ?2, updated_at = ?2
             WHERE id = ?1 AND is_deleted = 0 AND status = 'ACTIVE'",
            &[&id.as_str(), &now_rfc3339()],
        )
    }

    async fn mark_draft_cancelled(&self, id: &DraftId) -> Result<()> {
        self.transition_draft(
            id,
            DraftStatus::Active,
            DraftStatus::Cancelled,
            "UPDATE drafts SET status = 'CANCELLED', cancelled_at = ?2, updated_at = ?2
             WHERE id = ?1 AND is_deleted = 0 AND status = 'ACTIVE'",
            &[&id.as_str(), &now_rfc3339()],
        )
    }

    async fn mark_draft_finalized(
        &self,
        id: &DraftId,
        transaction_id: &TransactionId,
    ) -> Result<()> {
        self.transition_draft(
            id,
            DraftStatus::Confirmed,
            DraftStatus::Finalized,
            FINALIZE_SQL,
            &[&id.as_str(), &transaction_id.as_str(), &now_rfc3339()],
        )
    }

    async fn soft_delete_draft(&self, id: &DraftId) -> Result<()> {
        let affected = self
            .conn()?
            .execute(
                "UPDATE drafts SET is_deleted = 1, updated_at = ?2 WHERE id = ?1 AND is_deleted = 0",
                params![id.as_str(), now_rfc3339()],
            )
            .with_context_fn(|| format!("Failed to delete draft {}", id))?;
        if affected == 0 {
            return Err(TallyError::not_found("draft", id.as_str()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ConversationStore;
    use crate::types::{ConfidenceMap, DraftFields, TransactionType};

    async fn setup() -> (Database, UserId, ConversationId) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let user = UserId::new("u1");
        let conversation = db.create_conversation(&user).await.unwrap();
        (db, user, conversation.id)
    }

    #[tokio::test]
    async fn test_create_empty_draft() {
        let (db, user, conversation) = setup().await;
        let draft = db
            .create_draft(&user, &conversation, DraftField::REQUIRED.to_vec())
            .await
            .unwrap();

        assert_eq!(draft.status, DraftStatus::Active);
        assert_eq!(draft.extracted_fields, DraftFields::default());
        assert!(draft.confidence_map.is_empty());
        assert_eq!(draft.missing_fields, DraftField::REQUIRED.to_vec());
        assert!(draft.transaction_id.is_none());

        let by_conversation = db.get_by_conversation(&conversation).await.unwrap().unwrap();
        assert_eq!(by_conversation.id, draft.id);
    }

    #[tokio::test]
    async fn test_one_draft_per_conversation() {
        let (db, user, conversation) = setup().await;
        db.create_draft(&user, &conversation, vec![]).await.unwrap();

        let err = db
            .create_draft(&user, &conversation, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Invariant(_)));
    }

    #[tokio::test]
    async fn test_soft_deleted_draft_frees_slot() {
        let (db, user, conversation) = setup().await;
        let first = db.create_draft(&user, &conversation, vec![]).await.unwrap();
        db.soft_delete_draft(&first.id).await.unwrap();

        assert!(db.get_draft(&first.id).await.unwrap().is_none());
        let second = db.create_draft(&user, &conversation, vec![]).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_patch_updates_only_given_columns() {
        let (db, user, conversation) = setup().await;
        let draft = db
            .create_draft(&user, &conversation, DraftField::REQUIRED.to_vec())
            .await
            .unwrap();

        let fields = DraftFields {
            amount: Some(500.0),
            transaction_type: Some(TransactionType::Expense),
            ..Default::default()
        };
        let mut confidence = ConfidenceMap::new();
        confidence.insert(DraftField::Amount, 0.9);

        let updated = db
            .update_draft(
                &draft.id,
                DraftPatch {
                    extracted_fields: Some(fields.clone()),
                    confidence_map: Some(confidence.clone()),
                    missing_fields: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.extracted_fields, fields);
        assert_eq!(updated.confidence_map, confidence);
        assert_eq!(updated.missing_fields, DraftField::REQUIRED.to_vec());
    }

    #[tokio::test]
    async fn test_status_guards() {
        let (db, user, conversation) = setup().await;
        let draft = db.create_draft(&user, &conversation, vec![]).await.unwrap();

        // Finalize before confirm is refused
        let err = db
            .mark_draft_finalized(&draft.id, &TransactionId::new("t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Invariant(_)));

        db.mark_draft_confirmed(&draft.id).await.unwrap();
        assert!(db.mark_draft_cancelled(&draft.id).await.is_err());
        assert!(
            db.update_draft(&draft.id, DraftPatch::default())
                .await
                .is_err()
        );

        db.mark_draft_finalized(&draft.id, &TransactionId::new("t1"))
            .await
            .unwrap();
        let finalized = db.get_draft(&draft.id).await.unwrap().unwrap();
        assert_eq!(finalized.status, DraftStatus::Finalized);
        assert_eq!(finalized.transaction_id, Some(TransactionId::new("t1")));
        assert!(finalized.confirmed_at.is_some());
        assert!(finalized.finalized_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_draft_is_not_found() {
        let (db, _, _) = setup().await;
        let err = db
            .mark_draft_confirmed(&DraftId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::NotFound { .. }));
    }
}
