//! AI Integration Layer
//!
//! The extraction service contract and its LLM-backed implementation.

pub mod extraction;
pub mod provider;
pub mod timeout;

pub use extraction::{
    ExtractionService, LlmExtractionService, SharedExtractionService, build_prompt,
    extraction_schema, strip_code_fence,
};
pub use provider::{
    ClaudeCodeProvider, LlmProvider, LlmResponse, OllamaProvider, OpenAiProvider, ProviderConfig,
    SharedProvider, TokenUsage, create_provider,
};
pub use timeout::{TimeoutConfig, with_timeout};
