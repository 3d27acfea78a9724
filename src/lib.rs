//! Tally - Conversational Transaction Recording
//!
//! Turns free-form chat ("spent 500 on groceries from my wallet") into a
//! validated ledger transaction through a multi-turn dialogue: extract,
//! clarify what is missing, confirm, and finalize exactly once.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tally::{AgentOrchestrator, Database, FinalizeService, Stores};
//!
//! let db = Arc::new(Database::open(".tally/tally.db")?);
//! db.initialize()?;
//! let stores = Stores::from_database(db);
//! let agent = AgentOrchestrator::new(stores.clone(), extraction);
//!
//! let conversation = agent.lifecycle().start_conversation(&user).await?;
//! let reply = agent.handle_message(&user, &conversation.id, "spent 20 on lunch").await?;
//! ```
//!
//! ## Modules
//!
//! - [`agent`]: State machine, hint resolution, clarification, edits, finalization
//! - [`ai`]: Extraction service contract and LLM providers
//! - [`storage`]: Collaborator traits and their SQLite implementation
//! - [`config`]: Layered configuration
//! - [`types`]: Domain types and the unified error

pub mod agent;
pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{
    ErrorCategory, ExtractionError, ExtractionErrorKind, LlmError, Result, ResultExt, TallyError,
};

// Storage
pub use storage::{Database, SharedDatabase, Stores};

// =============================================================================
// Agent Re-exports
// =============================================================================

pub use agent::{
    AgentOrchestrator, AgentResponse, ConfirmationPayload, FinalizeErrorCode, FinalizeResult,
    FinalizeService, FinalizeStatus, LifecycleService,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    ExtractionService, LlmExtractionService, LlmProvider, SharedExtractionService, TimeoutConfig,
    create_provider, with_timeout,
};
