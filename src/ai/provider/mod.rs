//! LLM Provider Abstraction
//!
//! Providers are thin transports: they send a prompt and hand back the
//! model's raw text. Nothing here interprets the reply; the extraction
//! normalizer owns every schema decision.

mod claude_code;
mod ollama;
mod openai;
mod prompt_utils;

pub use claude_code::ClaudeCodeProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use prompt_utils::build_schema_prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::network as net_constants;
use crate::types::{Result, TallyError};

// =============================================================================
// LLM Response
// =============================================================================

/// Raw provider reply plus usage metrics for logging
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Unparsed model output
    pub content: String,
    pub usage: TokenUsage,
    pub elapsed: Duration,
    pub provider: &'static str,
}

impl LlmResponse {
    pub fn new(content: impl Into<String>, provider: &'static str) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
            elapsed: Duration::ZERO,
            provider,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage, elapsed: Duration) -> Self {
        self.usage = usage;
        self.elapsed = elapsed;
        self
    }
}

/// Token usage metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Shared LLM provider type
pub type SharedProvider = Arc<dyn LlmProvider>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for LLM providers
///
/// API keys are never serialized and are redacted in debug output. Each
/// provider converts the key to a `SecretString` on construction.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "openai", "ollama", "claude-code"
    pub provider: String,
    /// Model name (provider-specific)
    pub model: Option<String>,
    /// Single request timeout in seconds
    pub timeout_secs: u64,
    pub temperature: f32,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_max_tokens() -> usize {
    512
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout_secs: net_constants::DEFAULT_TIMEOUT_SECS,
            temperature: 0.0,
            api_key: None,
            api_base: None,
            max_tokens: default_max_tokens(),
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send the prompt and return the model's raw reply.
    ///
    /// `schema` is a hint for providers that support constrained output;
    /// the reply is still validated by the caller.
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "claude-code" => Ok(Arc::new(ClaudeCodeProvider::new(config.clone()))),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config.clone())?)),
        _ => Err(TallyError::Config(format!(
            "Unknown provider: {}. Supported: openai, ollama, claude-code",
            config.provider
        ))),
    }
}
