pub mod conversation;
pub mod draft;
pub mod error;
pub mod ids;
pub mod reference;
pub mod transaction;
pub mod utils;

pub use conversation::{AgentConversation, AgentState};
pub use draft::{
    ConfidenceMap, DraftField, DraftFields, DraftPatch, DraftStatus, FieldValue, TransactionDraft,
    TransactionType, USER_PROVIDED_CONFIDENCE, is_valid_confidence,
};
pub use error::{
    ErrorCategory, ErrorClassifier, ExtractionError, ExtractionErrorKind, LlmError, Result,
    ResultExt, TallyError,
};
pub use ids::{CategoryId, ConversationId, DraftId, PoolId, TransactionId, UserId};
pub use reference::{CashPool, Category};
pub use transaction::{NewTransaction, Transaction};
pub use utils::{ParseWithDefault, format_amount, non_empty_trimmed};
