//! Claude Code CLI Provider
//!
//! Runs the local `claude` CLI in print mode. The CLI wraps the model reply
//! in a JSON envelope; we unwrap `structured_output` or `result` back into
//! raw text so validation happens in one place.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{LlmProvider, LlmResponse, ProviderConfig, TokenUsage};
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, Result};

const PROVIDER: &str = "claude-code";
const DEFAULT_MODEL: &str = "haiku";

/// Claude Code CLI Provider (single shot; retries live in the extraction service)
pub struct ClaudeCodeProvider {
    model: String,
    timeout_secs: u64,
}

impl ClaudeCodeProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            model: config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout_secs: config.timeout_secs,
        }
    }

    async fn execute(&self, prompt: &str, schema: &Value) -> Result<LlmResponse> {
        let start_time = Instant::now();

        let mut cmd = Command::new("claude");
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("json")
            .arg("--model")
            .arg(&self.model)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if !schema.is_null() {
            cmd.arg("--json-schema").arg(serde_json::to_string(schema)?);
        }

        let child = cmd.spawn().map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::Unavailable,
                format!("Failed to spawn Claude Code CLI: {}. Is it installed?", e),
                PROVIDER,
            )
        })?;

        let output = timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| {
            LlmError::with_provider(
                ErrorCategory::Network,
                format!("Claude Code timed out after {}s", self.timeout_secs),
                PROVIDER,
            )
        })?
        .map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::Unknown,
                format!("Claude Code execution failed: {}", e),
                PROVIDER,
            )
        })?;

        let elapsed = start_time.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            if let Ok(envelope) = serde_json::from_str::<Value>(&stdout)
                && envelope
                    .get("is_error")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            {
                let message = envelope
                    .get("result")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown API error");
                return Err(ErrorClassifier::classify(message, PROVIDER).into());
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                "Process exited with non-zero status"
            } else {
                stderr.trim()
            };
            return Err(ErrorClassifier::classify(message, PROVIDER).into());
        }

        let envelope: Value = serde_json::from_str(&stdout).map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::Unknown,
                format!("Failed to parse Claude Code output: {}", e),
                PROVIDER,
            )
        })?;

        let content = Self::unwrap_envelope(&envelope).ok_or_else(|| {
            LlmError::with_provider(
                ErrorCategory::Unknown,
                "No result in Claude Code response",
                PROVIDER,
            )
        })?;
        debug!("Claude Code replied in {:?}", elapsed);

        Ok(LlmResponse::new(content, PROVIDER).with_usage(Self::extract_usage(&envelope), elapsed))
    }

    /// Reply text from the CLI envelope; structured output is re-serialized.
    fn unwrap_envelope(envelope: &Value) -> Option<String> {
        if let Some(structured) = envelope.get("structured_output")
            && !structured.is_null()
        {
            return Some(structured.to_string());
        }
        match envelope.get("result")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn extract_usage(envelope: &Value) -> TokenUsage {
        let usage = envelope.get("usage");
        let count = |key: &str| {
            usage
                .and_then(|u| u.get(key))
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32
        };
        TokenUsage::new(count("input_tokens"), count("output_tokens"))
    }
}

#[async_trait]
impl LlmProvider for ClaudeCodeProvider {
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<LlmResponse> {
        debug!("Generating with Claude Code CLI (model: {})", self.model);
        self.execute(prompt, schema).await
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let output = Command::new("claude")
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                LlmError::with_provider(
                    ErrorCategory::Unavailable,
                    format!("Claude Code not found: {}", e),
                    PROVIDER,
                )
            })?;

        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout);
            info!("Claude Code CLI available: {}", version.trim());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
