//! Conversational transaction agent
//!
//! ## Turn Pipeline
//!
//! ```text
//! message -> extraction (ai) -> normalizer -> hints -> mutation -> validator
//!                                                          |
//!                          clarification question <- incomplete
//!                          confirmation payload   <- complete
//! ```
//!
//! The orchestrator owns state transitions, the mutation service owns the
//! only write path to draft fields, and finalization turns a confirmed
//! draft into at most one ledger transaction.

pub mod clarification;
pub mod confirmation;
pub mod edit_intent;
pub mod finalize;
pub mod hints;
pub mod lifecycle;
pub mod mutation;
pub mod normalizer;
pub mod orchestrator;
pub mod targeted;
pub mod validator;

pub use clarification::{ClarificationQuestion, SelectableOption};
pub use confirmation::{ConfirmationAction, ConfirmationPayload};
pub use edit_intent::EditIntent;
pub use finalize::{FinalizeErrorCode, FinalizeResult, FinalizeService, FinalizeStatus};
pub use hints::Resolution;
pub use lifecycle::LifecycleService;
pub use mutation::DraftMutationService;
pub use normalizer::{NormalizedExtraction, normalize};
pub use orchestrator::{AgentOrchestrator, AgentResponse};
pub use targeted::TargetedFieldExtractor;
pub use validator::{FieldProblem, ValidationReport};

use chrono::{Local, NaiveDate};

/// Local calendar date used for date hints and validation
pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}
