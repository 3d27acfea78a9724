//! Agent conversation and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ConversationId, DraftId, UserId};
use super::utils::ParseWithDefault;

/// Conversation state. The only source of truth for what a turn means;
/// never re-derived from chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    #[default]
    Idle,
    Extracting,
    AskingClarification,
    WaitingConfirmation,
    Completed,
    Cancelled,
}

impl AgentState {
    pub const ALL: [AgentState; 6] = [
        Self::Idle,
        Self::Extracting,
        Self::AskingClarification,
        Self::WaitingConfirmation,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Extracting => "EXTRACTING",
            Self::AskingClarification => "ASKING_CLARIFICATION",
            Self::WaitingConfirmation => "WAITING_CONFIRMATION",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Transition table of the conversation state machine.
    ///
    /// Staying in the same non-terminal state is always allowed (re-ask,
    /// rephrase, edit that keeps the draft complete).
    pub fn can_transition_to(&self, next: AgentState) -> bool {
        use AgentState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (from, to) if *from == to => true,
            (_, Cancelled) => true,
            (Idle, Extracting) => true,
            (Extracting, AskingClarification | WaitingConfirmation) => true,
            (AskingClarification, WaitingConfirmation) => true,
            (WaitingConfirmation, AskingClarification | Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ParseWithDefault for AgentState {
    fn type_name() -> &'static str {
        "AgentState"
    }

    fn default_value() -> Self {
        AgentState::Idle
    }

    fn try_parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == s)
    }
}

/// One dialogue session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConversation {
    pub id: ConversationId,
    pub user_id: UserId,
    pub agent_state: AgentState,
    pub active_draft_id: Option<DraftId>,
    pub is_deleted: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentConversation {
    /// Active = not completed and not cancelled
    pub fn is_active(&self) -> bool {
        !self.is_deleted && !self.agent_state.is_terminal()
    }
}
