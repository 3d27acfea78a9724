//! Timeout handling for provider calls
//!
//! Every extraction call runs under a hard upper bound. An expired call
//! surfaces as `TallyError::Timeout`, which the orchestrator treats like
//! any other recoverable extraction failure.

use std::future::Future;
use std::time::Duration;

use crate::constants::{extraction as extraction_constants, network as net_constants};
use crate::types::{Result, TallyError};

/// Timeouts applied around LLM traffic
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Whole extraction call including retries (default: 20 seconds)
    pub extraction: Duration,
    /// Single HTTP/CLI provider request (default: 60 seconds)
    pub llm_request: Duration,
    /// TCP connect (default: 10 seconds)
    pub connection: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            extraction: Duration::from_secs(extraction_constants::DEFAULT_TIMEOUT_SECS),
            llm_request: Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS),
            connection: Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS),
        }
    }
}

impl TimeoutConfig {
    pub fn with_extraction_secs(mut self, secs: u64) -> Self {
        self.extraction = Duration::from_secs(secs);
        self
    }
}

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the specified duration.
///
/// ```ignore
/// let raw = with_timeout(
///     Duration::from_secs(20),
///     async { provider.generate(&prompt).await },
///     "transaction extraction",
/// ).await?;
/// ```
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} timed out after {:?}", operation_name, timeout);
            Err(TallyError::timeout(operation_name, timeout))
        }
    }
}
