//! Persistence collaborators
//!
//! The agent only sees the traits below. `Database` implements all of
//! them on SQLite; tests swap in the same type over an in-memory file.

pub mod conversations;
pub mod database;
pub mod drafts;
pub mod ledger;
pub mod reference;
#[cfg(test)]
pub(crate) mod testing;

pub use database::{Database, PoolConfig, SharedDatabase};
pub use reference::{NewCashPool, NewCategory};

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{
    AgentConversation, AgentState, CashPool, Category, ConversationId, DraftField, DraftId,
    DraftPatch, NewTransaction, Result, Transaction, TransactionDraft, TransactionId, UserId,
};

/// Conversation records. Never hard-deleted.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<AgentConversation>>;

    /// The user's non-terminal conversation, most recently active first
    async fn get_active_by_user(&self, user_id: &UserId) -> Result<Option<AgentConversation>>;

    /// New conversation in IDLE
    async fn create_conversation(&self, user_id: &UserId) -> Result<AgentConversation>;

    /// Write the state and touch activity
    async fn update_state(&self, id: &ConversationId, state: AgentState) -> Result<()>;

    async fn set_active_draft(&self, id: &ConversationId, draft_id: &DraftId) -> Result<()>;

    async fn touch_activity(&self, id: &ConversationId) -> Result<()>;

    async fn mark_conversation_completed(&self, id: &ConversationId) -> Result<()>;

    async fn mark_conversation_cancelled(&self, id: &ConversationId) -> Result<()>;

    async fn soft_delete_conversation(&self, id: &ConversationId) -> Result<()>;
}

/// Draft records. Field writes go through `update_draft` only.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn get_draft(&self, id: &DraftId) -> Result<Option<TransactionDraft>>;

    /// The non-deleted draft of a conversation, most recent first
    async fn get_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<TransactionDraft>>;

    /// Empty ACTIVE draft. Fails if the conversation already has one.
    async fn create_draft(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        missing_fields: Vec<DraftField>,
    ) -> Result<TransactionDraft>;

    /// Apply a patch to an ACTIVE draft in one statement
    async fn update_draft(&self, id: &DraftId, patch: DraftPatch) -> Result<TransactionDraft>;

    /// ACTIVE -> CONFIRMED
    async fn mark_draft_confirmed(&self, id: &DraftId) -> Result<()>;

    /// ACTIVE -> CANCELLED
    async fn mark_draft_cancelled(&self, id: &DraftId) -> Result<()>;

    /// CONFIRMED -> FINALIZED, recording the created transaction
    async fn mark_draft_finalized(&self, id: &DraftId, transaction_id: &TransactionId)
    -> Result<()>;

    async fn soft_delete_draft(&self, id: &DraftId) -> Result<()>;
}

#[async_trait]
pub trait PoolProvider: Send + Sync {
    /// Every pool of the user, active or not
    async fn get_pools(&self, user_id: &UserId) -> Result<Vec<CashPool>>;
}

#[async_trait]
pub trait CategoryProvider: Send + Sync {
    async fn get_categories(&self, user_id: &UserId) -> Result<Vec<Category>>;
}

/// Creates real transactions and moves pool balances
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fails on a missing/inactive pool or an expense above the balance
    async fn create_transaction(&self, transaction: NewTransaction) -> Result<Transaction>;

    /// Create the transaction and move the CONFIRMED draft to FINALIZED as
    /// one atomic write. Nothing is kept when either part fails.
    async fn create_for_draft(
        &self,
        draft_id: &DraftId,
        transaction: NewTransaction,
    ) -> Result<Transaction>;
}

/// Every collaborator the agent needs, behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub drafts: Arc<dyn DraftStore>,
    pub pools: Arc<dyn PoolProvider>,
    pub categories: Arc<dyn CategoryProvider>,
    pub ledger: Arc<dyn Ledger>,
}

impl Stores {
    /// All collaborators backed by one database
    pub fn from_database(db: SharedDatabase) -> Self {
        Self {
            conversations: db.clone(),
            drafts: db.clone(),
            pools: db.clone(),
            categories: db.clone(),
            ledger: db,
        }
    }
}
