//! Extraction service
//!
//! Turns one user message (plus the current draft as context) into the raw
//! text of the fixed extraction schema. The reply is deliberately *not*
//! parsed here: `agent::normalizer` treats it as untrusted input.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{Local, NaiveDate};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::SharedProvider;
use super::timeout::{TimeoutConfig, with_timeout};
use crate::constants::extraction as extraction_constants;
use crate::types::{DraftFields, Result, TallyError};

/// Contract of the extraction oracle
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Raw response text for `message`. Timeouts and transport failures come
    /// back as recoverable errors.
    async fn extract(&self, message: &str, context: Option<&DraftFields>) -> Result<String>;
}

pub type SharedExtractionService = Arc<dyn ExtractionService>;

/// JSON schema sent to providers that support constrained output
pub fn extraction_schema() -> Value {
    let level = json!({"type": "string", "enum": ["HIGH", "MEDIUM", "LOW"]});
    let nullable_string = json!({"type": ["string", "null"]});
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "transactionType", "amount", "cashPoolHint",
            "categoryHint", "description", "dateHint", "confidence"
        ],
        "properties": {
            "transactionType": {"type": ["string", "null"], "enum": ["INCOME", "EXPENSE", null]},
            "amount": {"type": ["number", "null"]},
            "cashPoolHint": nullable_string,
            "categoryHint": nullable_string,
            "description": nullable_string,
            "dateHint": {
                "type": ["string", "null"],
                "description": "ISO date (YYYY-MM-DD), TODAY or YESTERDAY"
            },
            "confidence": {
                "type": "object",
                "additionalProperties": false,
                "required": [
                    "transactionType", "amount", "cashPoolHint",
                    "categoryHint", "description", "dateHint"
                ],
                "properties": {
                    "transactionType": level,
                    "amount": level,
                    "cashPoolHint": level,
                    "categoryHint": level,
                    "description": level,
                    "dateHint": level
                }
            }
        }
    })
}

/// Build the extraction prompt for one turn
pub fn build_prompt(message: &str, context: Option<&DraftFields>, today: NaiveDate) -> String {
    let mut prompt = format!(
        "Extract a single financial transaction from the user's message.\n\
         Today is {today}.\n\n\
         Rules:\n\
         - transactionType is INCOME, EXPENSE or null.\n\
         - amount is a positive number or null. Never guess an amount.\n\
         - cashPoolHint and categoryHint are words the user used for the account \
         and the category, copied verbatim, or null.\n\
         - description is a short purpose of the transaction, or null.\n\
         - dateHint is TODAY, YESTERDAY, an ISO date (YYYY-MM-DD) or null.\n\
         - Use null for anything the message does not state.\n\
         - confidence rates every field as HIGH, MEDIUM or LOW.\n",
    );

    if let Some(fields) = context.filter(|f| !f.set_fields().is_empty()) {
        let draft = serde_json::to_string(fields).unwrap_or_default();
        prompt.push_str(&format!(
            "\nThe transaction collected so far (for context only):\n{}\n",
            draft
        ));
    }

    prompt.push_str(&format!("\nUser message:\n\"\"\"\n{}\n\"\"\"\n", message));
    prompt
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// `ExtractionService` over any `LlmProvider`
pub struct LlmExtractionService {
    provider: SharedProvider,
    timeouts: TimeoutConfig,
    max_retries: usize,
    schema: Value,
}

impl LlmExtractionService {
    pub fn new(provider: SharedProvider) -> Self {
        Self {
            provider,
            timeouts: TimeoutConfig::default(),
            max_retries: extraction_constants::DEFAULT_MAX_RETRIES,
            schema: extraction_schema(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn call_once(&self, prompt: &str) -> Result<String> {
        let response = self.provider.generate(prompt, &self.schema).await?;
        debug!(
            provider = response.provider,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            elapsed_ms = response.elapsed.as_millis() as u64,
            "extraction reply received"
        );
        Ok(response.content)
    }
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    async fn extract(&self, message: &str, context: Option<&DraftFields>) -> Result<String> {
        let prompt = build_prompt(message, context, Local::now().date_naive());

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(extraction_constants::BASE_DELAY_MS))
            .with_max_times(self.max_retries);

        let attempts = (|| self.call_once(&prompt))
            .retry(backoff)
            .when(TallyError::is_retryable)
            .adjust(|err: &TallyError, delay: Option<Duration>| {
                delay.map(|delay| err.retry_delay().map_or(delay, |hint| delay.max(hint)))
            })
            .notify(|err: &TallyError, delay: Duration| {
                warn!(
                    provider = self.provider.name(),
                    "extraction failed ({}), retrying in {:?}", err, delay
                );
            });

        let raw = with_timeout(self.timeouts.extraction, attempts, "transaction extraction").await?;
        Ok(strip_code_fence(&raw).to_string())
    }
}
