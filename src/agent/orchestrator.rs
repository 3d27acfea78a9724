//! Agent orchestrator: the conversation state machine
//!
//! ```text
//! IDLE -> EXTRACTING -> ASKING_CLARIFICATION <-> ASKING_CLARIFICATION
//!                    \-> WAITING_CONFIRMATION -> COMPLETED | CANCELLED
//! ```
//!
//! Each message is handled to completion. The persisted state is written
//! once, after every draft mutation of the turn has succeeded.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::clarification::{
    ClarificationQuestion, SelectableOption, next_question, parse_reply, question_for,
};
use super::confirmation::ConfirmationPayload;
use super::edit_intent;
use super::hints;
use super::lifecycle::LifecycleService;
use super::mutation::DraftMutationService;
use super::normalizer;
use super::targeted::TargetedFieldExtractor;
use super::today;
use crate::ai::SharedExtractionService;
use crate::constants::tokens;
use crate::storage::Stores;
use crate::types::{
    AgentConversation, AgentState, CashPool, Category, ConversationId, DraftField, DraftStatus,
    FieldValue, Result, TallyError, TransactionDraft, TransactionType, USER_PROVIDED_CONFIDENCE, UserId,
};

const REPHRASE: &str = "Sorry, I couldn't make sense of that. Could you rephrase it? \
                        For example: \"Spent 20 on lunch from my wallet\".";
const NOT_UNDERSTOOD: &str = "Sorry, I didn't catch that.";
const EDIT_UNCLEAR: &str = "I couldn't tell what to change. Try something like \
                            \"the amount is 40\" or \"category is travel\".";
const EDIT_FAILED: &str = "I couldn't apply that change right now. Please try again.";
const CONFIRMED: &str = "Confirmed. Your transaction is ready to be recorded.";
const CANCELLED: &str = "Okay, I've cancelled this transaction.";

/// Reply to one user message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub message: String,
    pub agent_state: AgentState,
    pub requires_user_input: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_payload: Option<ConfirmationPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selectable_options: Option<Vec<SelectableOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_draft: Option<TransactionDraft>,
}

impl AgentResponse {
    fn new(message: impl Into<String>, agent_state: AgentState) -> Self {
        Self {
            message: message.into(),
            agent_state,
            requires_user_input: !agent_state.is_terminal(),
            confirmation_payload: None,
            selectable_options: None,
            updated_draft: None,
        }
    }

    fn with_draft(mut self, draft: TransactionDraft) -> Self {
        self.updated_draft = Some(draft);
        self
    }

    /// Fixed reply for a conversation that accepts no more input
    fn closed(state: AgentState) -> Self {
        let message = match state {
            AgentState::Cancelled => {
                "This conversation was cancelled. Start a new one to record another transaction."
            }
            _ => "This conversation is completed. Start a new one to record another transaction.",
        };
        Self::new(message, state)
    }

    fn rephrase(state: AgentState, draft: TransactionDraft) -> Self {
        Self::new(REPHRASE, state).with_draft(draft)
    }

    fn question(
        question: ClarificationQuestion,
        draft: TransactionDraft,
        notice: Option<&str>,
    ) -> Self {
        let message = match notice {
            Some(notice) => format!("{} {}", notice, question.question),
            None => question.question,
        };
        let mut response =
            Self::new(message, AgentState::AskingClarification).with_draft(draft);
        if !question.options.is_empty() {
            response.selectable_options = Some(question.options);
        }
        response
    }

    fn confirmation(
        payload: ConfirmationPayload,
        draft: TransactionDraft,
        notice: Option<&str>,
    ) -> Self {
        let summary = format!(
            "Please confirm: {}. Reply \"confirm\", \"cancel\", or tell me what to change.",
            payload.summary()
        );
        let message = match notice {
            Some(notice) => format!("{} {}", notice, summary),
            None => summary,
        };
        let mut response = Self::new(message, AgentState::WaitingConfirmation).with_draft(draft);
        response.confirmation_payload = Some(payload);
        response
    }
}

/// Terminal conversation state owed by a draft that is no longer ACTIVE
fn settled_state(status: DraftStatus) -> Option<AgentState> {
    match status {
        DraftStatus::Active => None,
        DraftStatus::Confirmed | DraftStatus::Finalized => Some(AgentState::Completed),
        DraftStatus::Cancelled => Some(AgentState::Cancelled),
    }
}

/// Whether a turn may move the conversation from `from` to `to`.
/// IDLE always passes through EXTRACTING within the same turn.
fn turn_allowed(from: AgentState, to: AgentState) -> bool {
    match from {
        AgentState::Idle => {
            to == AgentState::Extracting || AgentState::Extracting.can_transition_to(to)
        }
        _ => from.can_transition_to(to),
    }
}

pub struct AgentOrchestrator {
    stores: Stores,
    extraction: SharedExtractionService,
    lifecycle: LifecycleService,
    mutation: DraftMutationService,
    targeted: TargetedFieldExtractor,
}

impl AgentOrchestrator {
    pub fn new(stores: Stores, extraction: SharedExtractionService) -> Self {
        Self {
            lifecycle: LifecycleService::new(stores.conversations.clone(), stores.drafts.clone()),
            mutation: DraftMutationService::new(stores.drafts.clone()),
            targeted: TargetedFieldExtractor::new(extraction.clone()),
            stores,
            extraction,
        }
    }

    /// Confidence used for edits the extraction did not score
    pub fn with_targeted_confidence(mut self, value: f64) -> Self {
        self.targeted = self.targeted.with_default_confidence(value);
        self
    }

    pub fn lifecycle(&self) -> &LifecycleService {
        &self.lifecycle
    }

    /// Handle one user message for a conversation the user owns
    #[instrument(skip_all, fields(user_id = %user_id, conversation_id = %conversation_id))]
    pub async fn handle_message(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        message: &str,
    ) -> Result<AgentResponse> {
        let conversation = self
            .lifecycle
            .load_conversation(user_id, conversation_id)
            .await?;
        let from = conversation.agent_state;
        debug!(state = %from, message, "agent message received");

        if from.is_terminal() {
            return Ok(AgentResponse::closed(from));
        }

        let (state, draft) = match from {
            AgentState::Idle => {
                let draft = match self.stores.drafts.get_by_conversation(conversation_id).await? {
                    Some(existing) => existing,
                    None => self.lifecycle.create_draft(user_id, conversation_id).await?,
                };
                (AgentState::Extracting, draft)
            }
            state => (state, self.active_draft(&conversation).await?),
        };

        // The draft left ACTIVE in an earlier turn whose conversation write
        // failed; finish that transition instead of handling the message.
        if let Some(settled) = settled_state(draft.status) {
            warn!(
                draft_id = %draft.id,
                draft_status = %draft.status,
                state = %state,
                "settling conversation behind its draft"
            );
            let response = match settled {
                AgentState::Cancelled => AgentResponse::new(CANCELLED, settled),
                _ => AgentResponse::new(CONFIRMED, settled),
            }
            .with_draft(draft);
            self.commit(&conversation, settled).await?;
            return Ok(response);
        }

        let response = match state {
            AgentState::Extracting => self.on_extracting(draft, message).await?,
            AgentState::AskingClarification => self.on_clarification(draft, message).await?,
            AgentState::WaitingConfirmation => self.on_confirmation(draft, message).await?,
            other => {
                return Err(TallyError::invariant(format!(
                    "no handler for conversation state {}",
                    other
                )));
            }
        };

        self.commit(&conversation, response.agent_state).await?;
        Ok(response)
    }

    async fn active_draft(&self, conversation: &AgentConversation) -> Result<TransactionDraft> {
        let draft = match &conversation.active_draft_id {
            Some(id) => self.stores.drafts.get_draft(id).await?,
            None => self.stores.drafts.get_by_conversation(&conversation.id).await?,
        };
        draft.ok_or_else(|| {
            TallyError::invariant(format!(
                "conversation {} is {} but has no draft",
                conversation.id, conversation.agent_state
            ))
        })
    }

    async fn reference(&self, user_id: &UserId) -> Result<(Vec<CashPool>, Vec<Category>)> {
        let pools = self.stores.pools.get_pools(user_id).await?;
        let categories = self.stores.categories.get_categories(user_id).await?;
        Ok((pools, categories))
    }

    /// Persist the turn's resulting state
    async fn commit(&self, conversation: &AgentConversation, to: AgentState) -> Result<()> {
        let from = conversation.agent_state;
        if !turn_allowed(from, to) {
            return Err(TallyError::invariant(format!(
                "illegal conversation transition {} -> {}",
                from, to
            )));
        }

        let conversations = &self.stores.conversations;
        match to {
            AgentState::Completed => conversations.mark_conversation_completed(&conversation.id).await?,
            AgentState::Cancelled => conversations.mark_conversation_cancelled(&conversation.id).await?,
            state if state == from => conversations.touch_activity(&conversation.id).await?,
            state => conversations.update_state(&conversation.id, state).await?,
        }
        if from != to {
            info!(conversation_id = %conversation.id, from = %from, to = %to, "conversation state changed");
        }
        Ok(())
    }

    /// Question for the next missing field, or the confirmation payload
    fn next_step(
        &self,
        draft: TransactionDraft,
        pools: &[CashPool],
        categories: &[Category],
        notice: Option<&str>,
    ) -> AgentResponse {
        match next_question(
            &draft.missing_fields,
            &draft.extracted_fields,
            pools,
            categories,
        ) {
            Some(question) => AgentResponse::question(question, draft, notice),
            None => {
                let payload = ConfirmationPayload::build(&draft, pools, categories);
                AgentResponse::confirmation(payload, draft, notice)
            }
        }
    }

    async fn on_extracting(&self, draft: TransactionDraft, message: &str) -> Result<AgentResponse> {
        let raw = match self
            .extraction
            .extract(message, Some(&draft.extracted_fields))
            .await
        {
            Ok(raw) => raw,
            Err(e) if e.is_recoverable() => {
                warn!(draft_id = %draft.id, error = %e, "extraction failed");
                return Ok(AgentResponse::rephrase(AgentState::Extracting, draft));
            }
            Err(e) => return Err(e),
        };
        let normalized = match normalizer::normalize(&raw) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(draft_id = %draft.id, kind = %e.kind, "extraction response rejected");
                return Ok(AgentResponse::rephrase(AgentState::Extracting, draft));
            }
        };

        let (pools, categories) = self.reference(&draft.user_id).await?;
        let resolved = hints::resolve_extraction(
            &normalized,
            &draft.extracted_fields,
            &pools,
            &categories,
            today(),
        );
        let updated = self
            .mutation
            .update_fields(&draft.id, &resolved.fields, &resolved.confidence)
            .await?;
        Ok(self.next_step(updated, &pools, &categories, None))
    }

    async fn on_clarification(
        &self,
        draft: TransactionDraft,
        message: &str,
    ) -> Result<AgentResponse> {
        let (pools, categories) = self.reference(&draft.user_id).await?;
        let Some(field) = draft.missing_fields.first().copied() else {
            return Ok(self.next_step(draft, &pools, &categories, None));
        };

        let question = question_for(field, &draft.extracted_fields, &pools, &categories);
        let value = match field {
            DraftField::PoolId | DraftField::CategoryId => question
                .match_option(message)
                .map(|option| FieldValue::Text(option.value.clone())),
            DraftField::Type => parse_reply(field, message, today()).or_else(|| {
                question
                    .match_option(message)
                    .and_then(|option| option.value.parse::<TransactionType>().ok())
                    .map(FieldValue::Type)
            }),
            _ => parse_reply(field, message, today()),
        };

        let Some(value) = value else {
            debug!(draft_id = %draft.id, field = %field, "clarification reply not understood");
            let question = next_question(
                &draft.missing_fields,
                &draft.extracted_fields,
                &pools,
                &categories,
            )
            .unwrap_or(question);
            return Ok(AgentResponse::question(question, draft, Some(NOT_UNDERSTOOD)));
        };

        let updated = self
            .mutation
            .update_field(&draft.id, field, value, USER_PROVIDED_CONFIDENCE)
            .await?;
        Ok(self.next_step(updated, &pools, &categories, None))
    }

    async fn on_confirmation(
        &self,
        draft: TransactionDraft,
        message: &str,
    ) -> Result<AgentResponse> {
        let reply = message.trim().to_lowercase();
        if tokens::CONFIRM.contains(&reply.as_str()) {
            let confirmed = self.lifecycle.confirm_draft(&draft.user_id, &draft.id).await?;
            return Ok(AgentResponse::new(CONFIRMED, AgentState::Completed).with_draft(confirmed));
        }
        if tokens::CANCEL.contains(&reply.as_str()) {
            let cancelled = self.lifecycle.cancel_draft(&draft.user_id, &draft.id).await?;
            return Ok(AgentResponse::new(CANCELLED, AgentState::Cancelled).with_draft(cancelled));
        }

        let (pools, categories) = self.reference(&draft.user_id).await?;
        let Some(intent) = edit_intent::detect(message) else {
            let payload = ConfirmationPayload::build(&draft, &pools, &categories);
            return Ok(AgentResponse::confirmation(payload, draft, Some(EDIT_UNCLEAR)));
        };

        let targeted = self
            .targeted
            .extract(
                message,
                &intent,
                &draft.extracted_fields,
                &pools,
                &categories,
                today(),
            )
            .await;
        let value = match targeted {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(draft_id = %draft.id, field = %intent.field, "edit value not found");
                let payload = ConfirmationPayload::build(&draft, &pools, &categories);
                return Ok(AgentResponse::confirmation(payload, draft, Some(EDIT_UNCLEAR)));
            }
            Err(e) if e.is_recoverable() => {
                warn!(draft_id = %draft.id, error = %e, "targeted extraction failed");
                let payload = ConfirmationPayload::build(&draft, &pools, &categories);
                return Ok(AgentResponse::confirmation(payload, draft, Some(EDIT_FAILED)));
            }
            Err(e) => return Err(e),
        };

        let field = value.field;
        let updated = self
            .mutation
            .update_field(&draft.id, field, value.value, value.confidence)
            .await?;
        let notice = format!("Updated the {}.", field.label());
        Ok(self.next_step(updated, &pools, &categories, Some(&notice)))
    }
}
