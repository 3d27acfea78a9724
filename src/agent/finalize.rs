//! Finalization: confirmed draft -> one real transaction
//!
//! Outcomes are plain values so callers can branch without error handling.
//! The ledger entry and the FINALIZED status are written together, and a
//! draft that is already FINALIZED with a transaction id short-circuits, so
//! retries never record a second transaction.

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use super::validator;
use crate::storage::Stores;
use crate::types::{
    AgentState, DraftId, DraftStatus, NewTransaction, Result, TransactionDraft, TransactionId,
    UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalizeStatus {
    Success,
    AlreadyFinalized,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalizeErrorCode {
    DraftNotFound,
    Unauthorized,
    DraftNotConfirmed,
    IncompleteDraft,
    TransactionCreationFailed,
}

impl FinalizeErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DraftNotFound => "DRAFT_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::DraftNotConfirmed => "DRAFT_NOT_CONFIRMED",
            Self::IncompleteDraft => "INCOMPLETE_DRAFT",
            Self::TransactionCreationFailed => "TRANSACTION_CREATION_FAILED",
        }
    }
}

impl fmt::Display for FinalizeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResult {
    pub status: FinalizeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<FinalizeErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FinalizeResult {
    fn success(transaction_id: TransactionId) -> Self {
        Self {
            status: FinalizeStatus::Success,
            transaction_id: Some(transaction_id),
            error_code: None,
            error_message: None,
        }
    }

    fn already_finalized(transaction_id: TransactionId) -> Self {
        Self {
            status: FinalizeStatus::AlreadyFinalized,
            ..Self::success(transaction_id)
        }
    }

    fn error(code: FinalizeErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: FinalizeStatus::Error,
            transaction_id: None,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == FinalizeStatus::Error
    }
}

/// Ledger entry for a complete draft, amount normalized to its absolute value
fn ledger_entry(draft: &TransactionDraft) -> Option<NewTransaction> {
    let fields = &draft.extracted_fields;
    Some(NewTransaction {
        user_id: draft.user_id.clone(),
        pool_id: fields.pool_id.clone()?,
        amount: fields.amount?.abs(),
        transaction_type: fields.transaction_type?,
        category_id: fields.category_id.clone()?,
        purpose: fields.purpose.as_deref()?.trim().to_string(),
        notes: fields.notes.clone(),
        tags: fields.tags.clone().unwrap_or_default(),
        date: fields.date?,
    })
}

pub struct FinalizeService {
    stores: Stores,
}

impl FinalizeService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Turn a CONFIRMED draft into a transaction and complete its conversation.
    ///
    /// Store failures while loading or marking propagate as errors; every
    /// precondition and ledger failure is a `FinalizeResult`.
    pub async fn finalize(&self, draft_id: &DraftId, user_id: &UserId) -> Result<FinalizeResult> {
        let Some(draft) = self.stores.drafts.get_draft(draft_id).await? else {
            return Ok(FinalizeResult::error(
                FinalizeErrorCode::DraftNotFound,
                format!("Draft {} not found", draft_id),
            ));
        };
        if &draft.user_id != user_id {
            warn!(draft_id = %draft_id, user_id = %user_id, "finalize by non-owner refused");
            return Ok(FinalizeResult::error(
                FinalizeErrorCode::Unauthorized,
                "Draft belongs to another user",
            ));
        }
        if draft.status == DraftStatus::Finalized
            && let Some(transaction_id) = draft.transaction_id.clone()
        {
            info!(draft_id = %draft_id, transaction_id = %transaction_id, "draft already finalized");
            self.complete_conversation(&draft).await?;
            return Ok(FinalizeResult::already_finalized(transaction_id));
        }
        if draft.status != DraftStatus::Confirmed {
            return Ok(FinalizeResult::error(
                FinalizeErrorCode::DraftNotConfirmed,
                format!("Draft is {}, it must be CONFIRMED first", draft.status),
            ));
        }

        let report = validator::validate(&draft.extracted_fields);
        let entry = ledger_entry(&draft).filter(|_| report.is_valid());
        let Some(entry) = entry else {
            let missing: Vec<&str> = report
                .missing_fields()
                .iter()
                .map(|field| field.as_str())
                .collect();
            return Ok(FinalizeResult::error(
                FinalizeErrorCode::IncompleteDraft,
                format!("Draft is incomplete: {}", missing.join(", ")),
            ));
        };

        let transaction = match self.stores.ledger.create_for_draft(draft_id, entry).await {
            Ok(transaction) => transaction,
            Err(e) => {
                // a concurrent call may have finalized the draft first
                if let Some(current) = self.stores.drafts.get_draft(draft_id).await?
                    && current.status == DraftStatus::Finalized
                    && let Some(transaction_id) = current.transaction_id
                {
                    info!(draft_id = %draft_id, transaction_id = %transaction_id, "draft finalized concurrently");
                    return Ok(FinalizeResult::already_finalized(transaction_id));
                }
                warn!(draft_id = %draft_id, error = %e, "transaction creation failed");
                return Ok(FinalizeResult::error(
                    FinalizeErrorCode::TransactionCreationFailed,
                    e.to_string(),
                ));
            }
        };

        self.complete_conversation(&draft).await?;

        info!(
            draft_id = %draft_id,
            transaction_id = %transaction.id,
            "draft finalized"
        );
        Ok(FinalizeResult::success(transaction.id))
    }

    /// Move the owning conversation to COMPLETED unless it already is
    async fn complete_conversation(&self, draft: &TransactionDraft) -> Result<()> {
        let conversations = &self.stores.conversations;
        let state = conversations
            .get_conversation(&draft.conversation_id)
            .await?
            .map(|conversation| conversation.agent_state);
        if state != Some(AgentState::Completed) {
            conversations
                .mark_conversation_completed(&draft.conversation_id)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        ConversationStore, Database, DraftStore, NewCashPool, NewCategory, PoolProvider,
    };
    use crate::types::TallyError;
    use crate::storage::testing::{FlakyConversations, stores_with};
    use crate::types::{DraftFields, DraftPatch, TransactionType};
    use chrono::Local;
    use std::sync::Arc;

    struct Fixture {
        db: Arc<Database>,
        service: FinalizeService,
        user: UserId,
        draft: TransactionDraft,
    }

    async fn fixture(amount: f64) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        let user = UserId::new("u1");
        let pool = db
            .add_pool(NewCashPool {
                user_id: user.clone(),
                name: "Main Wallet".into(),
                currency: "USD".into(),
                balance: 1000.0,
            })
            .unwrap();
        let category = db
            .add_category(NewCategory {
                user_id: user.clone(),
                key: "groceries".into(),
                category_type: TransactionType::Expense,
                icon: "🛒".into(),
                color: String::new(),
            })
            .unwrap();
        let conversation = db.create_conversation(&user).await.unwrap();
        let draft = db
            .create_draft(&user, &conversation.id, Vec::new())
            .await
            .unwrap();
        let fields = DraftFields {
            transaction_type: Some(TransactionType::Expense),
            amount: Some(amount),
            pool_id: Some(pool.id),
            category_id: Some(category.id),
            purpose: Some("groceries".into()),
            date: Some(Local::now().date_naive()),
            ..Default::default()
        };
        let draft = db
            .update_draft(
                &draft.id,
                DraftPatch {
                    extracted_fields: Some(fields),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let service = FinalizeService::new(Stores::from_database(db.clone()));
        Fixture {
            db,
            service,
            user,
            draft,
        }
    }

    async fn balance(f: &Fixture) -> f64 {
        f.db.get_pools(&f.user).await.unwrap()[0].balance
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let f = fixture(250.0).await;
        f.db.mark_draft_confirmed(&f.draft.id).await.unwrap();

        let first = f.service.finalize(&f.draft.id, &f.user).await.unwrap();
        assert_eq!(first.status, FinalizeStatus::Success);
        let transaction_id = first.transaction_id.clone().unwrap();

        let second = f.service.finalize(&f.draft.id, &f.user).await.unwrap();
        assert_eq!(second.status, FinalizeStatus::AlreadyFinalized);
        assert_eq!(second.transaction_id, Some(transaction_id));

        // ledger side effect happened exactly once
        assert_eq!(balance(&f).await, 750.0);
        assert_eq!(f.db.recent_transactions(&f.user, 10).unwrap().len(), 1);

        let draft = f.db.get_draft(&f.draft.id).await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Finalized);
        let conversation = f
            .db
            .get_conversation(&draft.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.agent_state, AgentState::Completed);
    }

    #[tokio::test]
    async fn test_retry_after_failed_completion_records_once() {
        let f = fixture(100.0).await;
        f.db.mark_draft_confirmed(&f.draft.id).await.unwrap();
        let conversations = Arc::new(FlakyConversations::new(f.db.clone()));
        let service = FinalizeService::new(stores_with(f.db.clone(), conversations.clone()));

        conversations.fail_next_completion();
        let err = service.finalize(&f.draft.id, &f.user).await.unwrap_err();
        assert!(matches!(err, TallyError::Storage(_)));
        let draft = f.db.get_draft(&f.draft.id).await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Finalized);

        let retry = service.finalize(&f.draft.id, &f.user).await.unwrap();
        assert_eq!(retry.status, FinalizeStatus::AlreadyFinalized);
        assert_eq!(retry.transaction_id, draft.transaction_id);

        assert_eq!(f.db.recent_transactions(&f.user, 10).unwrap().len(), 1);
        assert_eq!(balance(&f).await, 900.0);
        let conversation = f
            .db
            .get_conversation(&f.draft.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.agent_state, AgentState::Completed);
    }

    #[tokio::test]
    async fn test_precondition_order() {
        let f = fixture(250.0).await;

        let missing = f
            .service
            .finalize(&DraftId::new("nope"), &f.user)
            .await
            .unwrap();
        assert_eq!(missing.error_code, Some(FinalizeErrorCode::DraftNotFound));

        let foreign = f
            .service
            .finalize(&f.draft.id, &UserId::new("u2"))
            .await
            .unwrap();
        assert_eq!(foreign.error_code, Some(FinalizeErrorCode::Unauthorized));

        let active = f.service.finalize(&f.draft.id, &f.user).await.unwrap();
        assert_eq!(active.error_code, Some(FinalizeErrorCode::DraftNotConfirmed));
        assert!(active.is_error());
    }

    #[tokio::test]
    async fn test_incomplete_confirmed_draft_rejected() {
        let f = fixture(250.0).await;
        let mut fields = f.draft.extracted_fields.clone();
        fields.purpose = Some("ab".into());
        f.db.update_draft(
            &f.draft.id,
            DraftPatch {
                extracted_fields: Some(fields),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        f.db.mark_draft_confirmed(&f.draft.id).await.unwrap();

        let result = f.service.finalize(&f.draft.id, &f.user).await.unwrap();
        assert_eq!(result.error_code, Some(FinalizeErrorCode::IncompleteDraft));
        assert_eq!(balance(&f).await, 1000.0);
    }

    #[tokio::test]
    async fn test_ledger_failure_leaves_draft_confirmed() {
        let f = fixture(5000.0).await;
        f.db.mark_draft_confirmed(&f.draft.id).await.unwrap();

        let result = f.service.finalize(&f.draft.id, &f.user).await.unwrap();
        assert_eq!(
            result.error_code,
            Some(FinalizeErrorCode::TransactionCreationFailed)
        );

        let draft = f.db.get_draft(&f.draft.id).await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Confirmed);
        assert!(draft.transaction_id.is_none());
    }

    #[test]
    fn test_ledger_entry_uses_absolute_amount() {
        let mut draft_fields = DraftFields {
            transaction_type: Some(TransactionType::Expense),
            amount: Some(-12.0),
            pool_id: Some(crate::types::PoolId::new("p1")),
            category_id: Some(crate::types::CategoryId::new("c1")),
            purpose: Some(" lunch ".into()),
            date: Some(Local::now().date_naive()),
            ..Default::default()
        };
        let now = chrono::Utc::now();
        let mut draft = TransactionDraft {
            id: DraftId::new("d1"),
            user_id: UserId::new("u1"),
            conversation_id: crate::types::ConversationId::new("c1"),
            status: DraftStatus::Confirmed,
            extracted_fields: draft_fields.clone(),
            confidence_map: Default::default(),
            missing_fields: Vec::new(),
            is_deleted: false,
            confirmed_at: None,
            cancelled_at: None,
            finalized_at: None,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        let entry = ledger_entry(&draft).unwrap();
        assert_eq!(entry.amount, 12.0);
        assert_eq!(entry.purpose, "lunch");

        draft_fields.pool_id = None;
        draft.extracted_fields = draft_fields;
        assert!(ledger_entry(&draft).is_none());
    }
}
