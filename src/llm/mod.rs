//! LLM client module
//!
//! Provides the completion trait, the Gemini implementation, and response
//! sanitization helpers.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod gemini;

pub use client::{CompletionRequest, LlmClient};
pub use error::LlmError;
pub use gemini::GeminiClient;

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiClient::from_config(config)?)),
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown LLM provider: '{}'. Supported: gemini",
            other
        ))),
    }
}

/// Extract the JSON payload from a model response.
///
/// Models wrap JSON in prose and fenced code blocks; this returns the first
/// ```json block if present, then the first generic fenced block, otherwise
/// the trimmed text unchanged. The inner text itself is not validated.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(inner) = fenced_block(trimmed, "```json") {
        return inner;
    }
    if let Some(inner) = fenced_block(trimmed, "```") {
        return inner;
    }
    trimmed
}

fn fenced_block<'a>(text: &'a str, fence: &str) -> Option<&'a str> {
    let start = text.find(fence)? + fence.len();
    let rest = &text[start..];
    let end = rest.find("```").unwrap_or(rest.len());
    Some(rest[..end].trim())
}
