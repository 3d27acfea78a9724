//! Unified Error Type System
//!
//! Centralized error types for the whole agent.
//!
//! ## Error Families
//!
//! - **Extraction**: the extraction oracle produced something we refuse to trust
//!   (always recoverable, the user is asked to rephrase)
//! - **Llm**: provider/transport failures, classified for retry decisions
//! - **Invariant**: a programming error such as an out-of-range confidence or a
//!   write to a terminal draft (never mapped to a user-facing reply)
//! - **Storage**: persistence collaborator failures (propagated, turn is aborted)
//!
//! Finalization outcomes are *not* errors; see `agent::finalize`.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// LLM error categories for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Authentication failed - fail fast, don't retry
    Auth,
    /// Network/connectivity issues - retry with backoff
    Network,
    /// Provider unavailable
    Unavailable,
    /// Invalid request - don't retry, fix request
    BadRequest,
    /// Temporary server issues - retry
    Transient,
    /// Unknown error - don't retry
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is worth retrying within the same turn
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Transient)
    }

    /// Get recommended retry delay for this category
    pub fn recommended_delay(&self) -> Duration {
        match self {
            Self::RateLimit => Duration::from_secs(5),
            Self::Network => Duration::from_secs(1),
            Self::Transient => Duration::from_millis(500),
            _ => Duration::from_millis(200),
        }
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// LLM error with category, provider and retry hint
#[derive(Debug, Clone)]
pub struct LlmError {
    pub category: ErrorCategory,
    pub message: String,
    pub provider: Option<String>,
    pub retry_after: Option<Duration>,
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    pub fn recommended_delay(&self) -> Duration {
        self.retry_after
            .unwrap_or_else(|| self.category.recommended_delay())
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps provider failures onto categories
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
        {
            return LlmError::with_provider(ErrorCategory::RateLimit, message, provider);
        }

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timed out")
            || lower.contains("unreachable")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider);
        }

        if lower.contains("503")
            || lower.contains("502")
            || lower.contains("service unavailable")
            || lower.contains("not installed")
        {
            return LlmError::with_provider(ErrorCategory::Unavailable, message, provider);
        }

        if lower.contains("overloaded") || lower.contains("temporary") {
            return LlmError::with_provider(ErrorCategory::Transient, message, provider);
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        match status {
            429 => LlmError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(5)),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 422 => LlmError::with_provider(ErrorCategory::BadRequest, message, provider),
            500 | 502 | 503 | 504 => {
                LlmError::with_provider(ErrorCategory::Transient, message, provider)
            }
            404 => LlmError::with_provider(ErrorCategory::Unavailable, message, provider),
            _ => LlmError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }
}

// =============================================================================
// Extraction Error
// =============================================================================

/// Why a raw extraction response was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionErrorKind {
    /// Response text is not JSON at all
    MalformedJson,
    /// Wrong shape: not an object, missing key, bad confidence object
    InvalidSchema,
    /// A key outside the fixed allowed set
    UnknownKey,
    /// An enum slot holds a value outside its closed set
    HallucinatedEnum,
    /// A value has the wrong JSON type
    InvalidType,
}

impl fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedJson => write!(f, "MALFORMED_JSON"),
            Self::InvalidSchema => write!(f, "INVALID_SCHEMA"),
            Self::UnknownKey => write!(f, "UNKNOWN_KEY"),
            Self::HallucinatedEnum => write!(f, "HALLUCINATED_ENUM"),
            Self::InvalidType => write!(f, "INVALID_TYPE"),
        }
    }
}

/// Structured extraction validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    /// Offending key, when the failure is tied to one
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] '{}': {}", self.kind, field, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ExtractionError {}

impl ExtractionError {
    pub fn new(kind: ExtractionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            message: message.into(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum TallyError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Extraction Errors
    // -------------------------------------------------------------------------
    #[error("LLM error: {0}")]
    Llm(LlmError),

    #[error("Invalid extraction response: {0}")]
    Extraction(ExtractionError),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    /// Broken domain invariant. Always a bug in the caller.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("User {user_id} does not own {entity} {id}")]
    Unauthorized {
        entity: &'static str,
        id: String,
        user_id: String,
    },

    #[error("Insufficient balance in pool {pool_id}: balance {balance:.2}, required {required:.2}")]
    InsufficientBalance {
        pool_id: String,
        balance: f64,
        required: f64,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not initialized: run 'tally init' first")]
    NotInitialized,
}

impl From<LlmError> for TallyError {
    fn from(err: LlmError) -> Self {
        TallyError::Llm(err)
    }
}

impl From<ExtractionError> for TallyError {
    fn from(err: ExtractionError) -> Self {
        TallyError::Extraction(err)
    }
}

pub type Result<T> = std::result::Result<T, TallyError>;

impl TallyError {
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn unauthorized(
        entity: &'static str,
        id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self::Unauthorized {
            entity,
            id: id.into(),
            user_id: user_id.into(),
        }
    }

    /// Whether the current turn can answer "please rephrase" instead of failing.
    ///
    /// Covers every failure of the extraction oracle: validation, timeout and
    /// transport. Storage and invariant failures are never recoverable here.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Extraction(_) | Self::Timeout { .. } | Self::Llm(_)
        )
    }

    /// Whether a retry inside the same extraction call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Minimum wait before retrying, as hinted by the provider or its category
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::Llm(e) => Some(e.recommended_delay()),
            _ => None,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| TallyError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| TallyError::Storage(format!("{}: {}", f().into(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_kind_display() {
        assert_eq!(ExtractionErrorKind::MalformedJson.to_string(), "MALFORMED_JSON");
        assert_eq!(ExtractionErrorKind::InvalidSchema.to_string(), "INVALID_SCHEMA");
        assert_eq!(ExtractionErrorKind::UnknownKey.to_string(), "UNKNOWN_KEY");
        assert_eq!(
            ExtractionErrorKind::HallucinatedEnum.to_string(),
            "HALLUCINATED_ENUM"
        );
        assert_eq!(ExtractionErrorKind::InvalidType.to_string(), "INVALID_TYPE");
    }

    #[test]
    fn test_extraction_error_display() {
        let err = ExtractionError::new(ExtractionErrorKind::InvalidType, "expected number")
            .with_field("amount");
        assert_eq!(err.to_string(), "[INVALID_TYPE] 'amount': expected number");
    }

    #[test]
    fn test_recoverable_errors() {
        let extraction: TallyError =
            ExtractionError::new(ExtractionErrorKind::MalformedJson, "bad").into();
        assert!(extraction.is_recoverable());
        assert!(TallyError::timeout("extraction", Duration::from_secs(1)).is_recoverable());
        assert!(TallyError::Llm(LlmError::new(ErrorCategory::Auth, "no key")).is_recoverable());

        assert!(!TallyError::invariant("confidence 1.5").is_recoverable());
        assert!(!TallyError::Storage("disk".into()).is_recoverable());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TallyError::Llm(LlmError::new(ErrorCategory::Transient, "x")).is_retryable());
        assert!(!TallyError::Llm(LlmError::new(ErrorCategory::Auth, "x")).is_retryable());
        assert!(!TallyError::timeout("x", Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_retry_delay_prefers_provider_hint() {
        let hinted: TallyError = LlmError::new(ErrorCategory::Transient, "busy")
            .retry_after(Duration::from_secs(2))
            .into();
        assert_eq!(hinted.retry_delay(), Some(Duration::from_secs(2)));

        let network: TallyError = LlmError::new(ErrorCategory::Network, "reset").into();
        assert_eq!(network.retry_delay(), Some(Duration::from_secs(1)));

        assert_eq!(TallyError::invariant("x").retry_delay(), None);
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = ErrorClassifier::classify_http_status(429, "Rate limited", "test");
        assert_eq!(rate_limit.category, ErrorCategory::RateLimit);
        assert_eq!(rate_limit.recommended_delay(), Duration::from_secs(5));

        let auth = ErrorClassifier::classify_http_status(401, "Unauthorized", "test");
        assert_eq!(auth.category, ErrorCategory::Auth);

        let server_error = ErrorClassifier::classify_http_status(503, "Server error", "test");
        assert_eq!(server_error.category, ErrorCategory::Transient);
    }

    #[test]
    fn test_classify_message() {
        let err = ErrorClassifier::classify("Connection refused", "ollama");
        assert_eq!(err.category, ErrorCategory::Network);
        assert!(err.is_retryable());

        let err = ErrorClassifier::classify("Something weird happened", "test");
        assert_eq!(err.category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::with_provider(ErrorCategory::RateLimit, "Too many requests", "openai");
        assert_eq!(err.to_string(), "[openai:RATE_LIMIT] Too many requests");
    }
}
