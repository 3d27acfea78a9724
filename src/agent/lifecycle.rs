//! Conversation and draft lifecycle use cases
//!
//! Thin wrappers that check ownership and preconditions before touching the
//! stores.

use std::sync::Arc;
use tracing::info;

use super::validator;
use crate::storage::{ConversationStore, DraftStore};
use crate::types::{
    AgentConversation, ConversationId, DraftField, DraftId, DraftStatus, Result, TallyError,
    TransactionDraft, UserId,
};

#[derive(Clone)]
pub struct LifecycleService {
    conversations: Arc<dyn ConversationStore>,
    drafts: Arc<dyn DraftStore>,
}

impl LifecycleService {
    pub fn new(conversations: Arc<dyn ConversationStore>, drafts: Arc<dyn DraftStore>) -> Self {
        Self {
            conversations,
            drafts,
        }
    }

    /// Conversation owned by `user_id`
    pub async fn load_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<AgentConversation> {
        let conversation = self
            .conversations
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| TallyError::not_found("conversation", conversation_id.as_str()))?;
        if &conversation.user_id != user_id {
            return Err(TallyError::unauthorized(
                "conversation",
                conversation_id.as_str(),
                user_id.as_str(),
            ));
        }
        Ok(conversation)
    }

    /// Draft owned by `user_id`
    pub async fn load_draft(&self, user_id: &UserId, draft_id: &DraftId) -> Result<TransactionDraft> {
        let draft = self
            .drafts
            .get_draft(draft_id)
            .await?
            .ok_or_else(|| TallyError::not_found("draft", draft_id.as_str()))?;
        if &draft.user_id != user_id {
            return Err(TallyError::unauthorized(
                "draft",
                draft_id.as_str(),
                user_id.as_str(),
            ));
        }
        Ok(draft)
    }

    /// The user's active conversation, or a new one in IDLE
    pub async fn start_conversation(&self, user_id: &UserId) -> Result<AgentConversation> {
        if let Some(existing) = self.conversations.get_active_by_user(user_id).await? {
            info!(
                conversation_id = %existing.id,
                state = %existing.agent_state,
                "resuming active conversation"
            );
            return Ok(existing);
        }
        let conversation = self.conversations.create_conversation(user_id).await?;
        info!(conversation_id = %conversation.id, "conversation started");
        Ok(conversation)
    }

    /// Empty draft linked to the conversation. Refuses a second draft.
    pub async fn create_draft(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<TransactionDraft> {
        let conversation = self.load_conversation(user_id, conversation_id).await?;
        if conversation.agent_state.is_terminal() {
            return Err(TallyError::invariant(format!(
                "conversation {} is {}",
                conversation.id, conversation.agent_state
            )));
        }
        if let Some(existing) = self.drafts.get_by_conversation(conversation_id).await? {
            return Err(TallyError::invariant(format!(
                "conversation {} already has draft {}",
                conversation_id, existing.id
            )));
        }

        let draft = self
            .drafts
            .create_draft(user_id, conversation_id, DraftField::REQUIRED.to_vec())
            .await?;
        self.conversations
            .set_active_draft(conversation_id, &draft.id)
            .await?;
        info!(conversation_id = %conversation_id, draft_id = %draft.id, "draft created");
        Ok(draft)
    }

    /// ACTIVE and complete -> CONFIRMED
    pub async fn confirm_draft(&self, user_id: &UserId, draft_id: &DraftId) -> Result<TransactionDraft> {
        let draft = self.load_draft(user_id, draft_id).await?;
        if draft.status != DraftStatus::Active {
            return Err(TallyError::invariant(format!(
                "draft {} is {}, only ACTIVE drafts can be confirmed",
                draft.id, draft.status
            )));
        }
        let report = validator::validate(&draft.extracted_fields);
        if !report.is_valid() {
            return Err(TallyError::invariant(format!(
                "draft {} is not ready: missing {:?}",
                draft.id,
                report.missing_fields()
            )));
        }

        self.drafts.mark_draft_confirmed(draft_id).await?;
        info!(draft_id = %draft_id, "draft confirmed");
        self.load_draft(user_id, draft_id).await
    }

    /// ACTIVE -> CANCELLED; the owning conversation is cancelled too.
    /// Repeating it on a CANCELLED draft only re-cancels the conversation.
    pub async fn cancel_draft(&self, user_id: &UserId, draft_id: &DraftId) -> Result<TransactionDraft> {
        let draft = self.load_draft(user_id, draft_id).await?;
        match draft.status {
            DraftStatus::Active => self.drafts.mark_draft_cancelled(draft_id).await?,
            DraftStatus::Cancelled => {}
            status => {
                return Err(TallyError::invariant(format!(
                    "draft {} is {}, only ACTIVE drafts can be cancelled",
                    draft.id, status
                )));
            }
        }

        self.conversations
            .mark_conversation_cancelled(&draft.conversation_id)
            .await?;
        info!(draft_id = %draft_id, conversation_id = %draft.conversation_id, "draft cancelled");
        self.load_draft(user_id, draft_id).await
    }

    pub async fn touch_activity(&self, conversation_id: &ConversationId) -> Result<()> {
        self.conversations.touch_activity(conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::types::{AgentState, CategoryId, DraftPatch, PoolId, TransactionType};
    use chrono::Local;

    fn service() -> (Arc<Database>, LifecycleService) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        (db.clone(), LifecycleService::new(db.clone(), db))
    }

    #[tokio::test]
    async fn test_start_reuses_active_conversation() {
        let (_db, service) = service();
        let user = UserId::new("u1");
        let first = service.start_conversation(&user).await.unwrap();
        let second = service.start_conversation(&user).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.agent_state, AgentState::Idle);

        let other = service.start_conversation(&UserId::new("u2")).await.unwrap();
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_create_draft_links_and_refuses_second() {
        let (db, service) = service();
        let user = UserId::new("u1");
        let conversation = service.start_conversation(&user).await.unwrap();
        let draft = service.create_draft(&user, &conversation.id).await.unwrap();

        assert_eq!(draft.missing_fields, DraftField::REQUIRED.to_vec());
        let reloaded = db.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.active_draft_id, Some(draft.id));

        let err = service.create_draft(&user, &conversation.id).await.unwrap_err();
        assert!(matches!(err, TallyError::Invariant(_)));
    }

    #[tokio::test]
    async fn test_ownership_is_checked() {
        let (_db, service) = service();
        let owner = UserId::new("u1");
        let conversation = service.start_conversation(&owner).await.unwrap();

        let err = service
            .create_draft(&UserId::new("intruder"), &conversation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_confirm_requires_complete_draft() {
        let (db, service) = service();
        let user = UserId::new("u1");
        let conversation = service.start_conversation(&user).await.unwrap();
        let draft = service.create_draft(&user, &conversation.id).await.unwrap();

        let err = service.confirm_draft(&user, &draft.id).await.unwrap_err();
        assert!(matches!(err, TallyError::Invariant(_)));

        let fields = crate::types::DraftFields {
            transaction_type: Some(TransactionType::Expense),
            amount: Some(10.0),
            pool_id: Some(PoolId::new("p1")),
            category_id: Some(CategoryId::new("c1")),
            purpose: Some("lunch".into()),
            date: Some(Local::now().date_naive()),
            ..Default::default()
        };
        db.update_draft(
            &draft.id,
            DraftPatch {
                extracted_fields: Some(fields),
                missing_fields: Some(Vec::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let confirmed = service.confirm_draft(&user, &draft.id).await.unwrap();
        assert_eq!(confirmed.status, DraftStatus::Confirmed);
        assert!(confirmed.confirmed_at.is_some());

        let err = service.cancel_draft(&user, &draft.id).await.unwrap_err();
        assert!(matches!(err, TallyError::Invariant(_)));
    }

    #[tokio::test]
    async fn test_cancel_closes_conversation() {
        let (db, service) = service();
        let user = UserId::new("u1");
        let conversation = service.start_conversation(&user).await.unwrap();
        let draft = service.create_draft(&user, &conversation.id).await.unwrap();

        let cancelled = service.cancel_draft(&user, &draft.id).await.unwrap();
        assert_eq!(cancelled.status, DraftStatus::Cancelled);

        let reloaded = db.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(reloaded.agent_state, AgentState::Cancelled);

        // repeating settles the conversation again without failing
        let again = service.cancel_draft(&user, &draft.id).await.unwrap();
        assert_eq!(again.status, DraftStatus::Cancelled);

        // a new conversation can start once the old one is closed
        let next = service.start_conversation(&user).await.unwrap();
        assert_ne!(next.id, conversation.id);
    }
}
