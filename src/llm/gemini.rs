//! Gemini API client implementation
//!
//! Implements the LlmClient trait against the generateContent endpoint with
//! bounded retries and exponential backoff.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::LlmConfig;

use super::{CompletionRequest, LlmClient, LlmError};

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Gemini generateContent API client
pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_output_tokens: u32,
    /// Upper bound for one call including retries
    max_elapsed: Duration,
}

impl GeminiClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "from_config: called");
        let api_key = config
            .api_key()
            .map_err(|e| LlmError::Auth(e.to_string()))?;

        let max_elapsed = Duration::from_millis(config.timeout_ms);
        let http = Client::builder()
            .timeout(max_elapsed)
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_output_tokens: config.max_output_tokens,
            max_elapsed,
        })
    }

    /// Build the generateContent request body
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, "build_request_body: called");
        let mut body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "generationConfig": {
                "maxOutputTokens": request.max_output_tokens.min(self.max_output_tokens),
                "temperature": 0.2,
            },
        });

        if let Some(system) = &request.system {
            debug!("build_request_body: adding system instruction");
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
        }

        body
    }

    /// Concatenate the text parts of the first candidate
    fn parse_response(&self, api_response: GeminiResponse) -> Result<String, LlmError> {
        let candidate = api_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No candidates in response".to_string()))?;

        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::InvalidResponse("Empty candidate content".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        debug!(%self.model, "complete: called");
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = self.build_request_body(&request);
        let started = Instant::now();

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1));
                if started.elapsed() + backoff >= self.max_elapsed {
                    debug!(attempt, "complete: deadline would be exceeded, giving up");
                    break;
                }
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "complete: retrying after transient error"
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .http
                .post(&url)
                .header("x-goog-api-key", self.api_key.clone())
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "complete: network error");
                    last_error = Some(if e.is_timeout() {
                        LlmError::Timeout(self.max_elapsed)
                    } else {
                        LlmError::Network(e)
                    });
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 401 || status == 403 {
                debug!(%status, "complete: auth failure");
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::Auth(text));
            }

            if status == 429 {
                debug!("complete: rate limited (429)");
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(30);
                last_error = Some(LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
                continue;
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "complete: retryable error");
                last_error = Some(LlmError::Api { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "complete: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::Api { status, message: text });
            }

            debug!("complete: success");
            let api_response: GeminiResponse = response.json().await?;
            return self.parse_response(api_response);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

// Gemini API response types

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> GeminiClient {
        GeminiClient {
            model: "gemini-2.0-flash".to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            http: Client::new(),
            max_output_tokens: 2048,
            max_elapsed: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let client = test_client();
        let request = CompletionRequest::new("Hello");

        let body = client.build_request_body(&request);

        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_build_request_body_with_system() {
        let client = test_client();
        let request = CompletionRequest::new("Hello").with_system("Return only JSON");

        let body = client.build_request_body(&request);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Return only JSON");
    }

    #[test]
    fn test_max_tokens_capped() {
        let client = test_client();
        let mut request = CompletionRequest::new("Hello");
        request.max_output_tokens = 100_000;

        let body = client.build_request_body(&request);

        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_parse_response_concatenates_parts() {
        let client = test_client();
        let response: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello " }, { "text": "world" }] }
            }]
        }))
        .unwrap();

        assert_eq!(client.parse_response(response).unwrap(), "Hello world");
    }

    #[test]
    fn test_parse_response_empty_is_invalid() {
        let client = test_client();
        let response: GeminiResponse = serde_json::from_value(serde_json::json!({ "candidates": [] })).unwrap();
        assert!(matches!(
            client.parse_response(response),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }
}
