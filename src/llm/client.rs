//! LlmClient trait definition

use async_trait::async_trait;

use super::LlmError;

/// A single prompt-to-text completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Optional system instruction
    pub system: Option<String>,

    /// Rendered prompt text
    pub prompt: String,

    /// Max tokens for the response
    pub max_output_tokens: u32,
}

impl CompletionRequest {
    /// Plain request with the default output budget
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_output_tokens: 2048,
        }
    }

    /// Attach a system instruction
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Stateless LLM client - each call is independent.
///
/// No conversation state is kept between calls; every agent invocation
/// renders a full prompt and gets back raw text. Implementations own their
/// connection pooling and are safe for concurrent use.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and return the raw response text
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}
