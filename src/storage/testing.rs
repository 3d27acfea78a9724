//! Store doubles for failure paths

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ConversationStore, Database, Stores};
use crate::types::{
    AgentConversation, AgentState, ConversationId, DraftId, Result, TallyError, UserId,
};

/// Conversation store that fails chosen terminal writes once
pub(crate) struct FlakyConversations {
    inner: Arc<Database>,
    fail_completion: AtomicBool,
    fail_cancellation: AtomicBool,
}

impl FlakyConversations {
    pub(crate) fn new(inner: Arc<Database>) -> Self {
        Self {
            inner,
            fail_completion: AtomicBool::new(false),
            fail_cancellation: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_next_completion(&self) {
        self.fail_completion.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_cancellation(&self) {
        self.fail_cancellation.store(true, Ordering::SeqCst);
    }

    fn injected(flag: &AtomicBool) -> Result<()> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(TallyError::Storage("database is locked".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FlakyConversations {
    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<AgentConversation>> {
        self.inner.get_conversation(id).await
    }

    async fn get_active_by_user(&self, user_id: &UserId) -> Result<Option<AgentConversation>> {
        self.inner.get_active_by_user(user_id).await
    }

    async fn create_conversation(&self, user_id: &UserId) -> Result<AgentConversation> {
        self.inner.create_conversation(user_id).await
    }

    async fn update_state(&self, id: &ConversationId, state: AgentState) -> Result<()> {
        self.inner.update_state(id, state).await
    }

    async fn set_active_draft(&self, id: &ConversationId, draft_id: &DraftId) -> Result<()> {
        self.inner.set_active_draft(id, draft_id).await
    }

    async fn touch_activity(&self, id: &ConversationId) -> Result<()> {
        self.inner.touch_activity(id).await
    }

    async fn mark_conversation_completed(&self, id: &ConversationId) -> Result<()> {
        Self::injected(&self.fail_completion)?;
        self.inner.mark_conversation_completed(id).await
    }

    async fn mark_conversation_cancelled(&self, id: &ConversationId) -> Result<()> {
        Self::injected(&self.fail_cancellation)?;
        self.inner.mark_conversation_cancelled(id).await
    }

    async fn soft_delete_conversation(&self, id: &ConversationId) -> Result<()> {
        self.inner.soft_delete_conversation(id).await
    }
}

/// Stores over `db` with `conversations` in front of its conversation table
pub(crate) fn stores_with(db: Arc<Database>, conversations: Arc<FlakyConversations>) -> Stores {
    Stores {
        conversations,
        ..Stores::from_database(db)
    }
}
