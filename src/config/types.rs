//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (platform config dir) and project (.tally/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ai::provider::ProviderConfig;
use crate::ai::timeout::TimeoutConfig;
use crate::constants::{
    cli as cli_constants, confidence, extraction as extraction_constants,
    network as net_constants, storage as storage_constants,
};
use crate::types::{Result, TallyError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Extraction call bounds
    pub extraction: ExtractionConfig,

    /// Conversation agent settings
    pub agent: AgentConfig,

    /// Database location
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            extraction: ExtractionConfig::default(),
            agent: AgentConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `TallyError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(TallyError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(TallyError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.extraction.timeout_secs == 0 {
            return Err(TallyError::Config(
                "Extraction timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(TallyError::Config(
                "LLM max_tokens must be greater than 0".to_string(),
            ));
        }

        let default_confidence = self.agent.targeted_default_confidence;
        if !default_confidence.is_finite() || !(0.0..=1.0).contains(&default_confidence) {
            return Err(TallyError::Config(format!(
                "Agent targeted_default_confidence must be between 0.0 and 1.0, got {}",
                default_confidence
            )));
        }

        if self.agent.default_user.trim().is_empty() {
            return Err(TallyError::Config(
                "Agent default_user must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Provider settings for `create_provider`
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.llm.provider.clone(),
            model: self.llm.model.clone(),
            timeout_secs: self.llm.timeout_secs,
            temperature: self.llm.temperature,
            api_key: self.llm.api_key.clone(),
            api_base: self.llm.api_base.clone(),
            max_tokens: self.llm.max_tokens,
        }
    }

    /// Timeouts for the extraction service
    pub fn to_timeout_config(&self) -> TimeoutConfig {
        TimeoutConfig::default().with_extraction_secs(self.extraction.timeout_secs)
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai", "ollama", "claude-code"
    pub provider: String,

    /// Model name (provider default when unset)
    pub model: Option<String>,

    /// Base URL override for HTTP providers
    pub api_base: Option<String>,

    /// API key; read from config or `TALLY_LLM_API_KEY`, never written back
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Temperature for LLM generation (0.0 = deterministic)
    pub temperature: f32,

    /// Reply token limit
    pub max_tokens: usize,

    /// Single provider request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        let provider = ProviderConfig::default();
        Self {
            provider: provider.provider,
            model: None,
            api_base: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: provider.max_tokens,
            timeout_secs: net_constants::DEFAULT_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Extraction Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Upper bound for one extraction call, retries included
    pub timeout_secs: u64,

    /// Retries for transient provider errors
    pub max_retries: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: extraction_constants::DEFAULT_TIMEOUT_SECS,
            max_retries: extraction_constants::DEFAULT_MAX_RETRIES,
        }
    }
}

// =============================================================================
// Agent Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Confidence for an edited field the extraction did not score
    pub targeted_default_confidence: f64,

    /// User id the CLI acts as when `--user` is not given
    pub default_user: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            targeted_default_confidence: confidence::TARGETED_DEFAULT,
            default_user: cli_constants::DEFAULT_USER.to_string(),
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(storage_constants::DATA_DIR).join(storage_constants::DB_FILE),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.extraction.timeout_secs, 20);
        assert_eq!(config.agent.default_user, "local");
        assert_eq!(config.storage.db_path, PathBuf::from(".tally/tally.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::default();
        config.llm.temperature = 2.5;
        assert!(matches!(config.validate(), Err(TallyError::Config(_))));

        let mut config = Config::default();
        config.extraction.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(TallyError::Config(_))));

        let mut config = Config::default();
        config.agent.targeted_default_confidence = 1.5;
        assert!(matches!(config.validate(), Err(TallyError::Config(_))));

        let mut config = Config::default();
        config.agent.targeted_default_confidence = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_stays_out_of_output() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".into());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));

        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(!rendered.contains("sk-secret"));

        assert_eq!(
            config.to_provider_config().api_key.as_deref(),
            Some("sk-secret")
        );
    }
}
