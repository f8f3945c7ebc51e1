//! Web research client
//!
//! Finds ranked learning resources for a subtask heading. Research is never
//! critical: every failure degrades to an empty result list.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ResearchConfig;
use crate::domain::{Resource, ResourceKind};
use crate::llm::extract_json;

/// Ranked-resource lookup for subtask headings
#[async_trait]
pub trait ResearchClient: Send + Sync {
    /// Best resources for a query, deduplicated by URL and capped at
    /// `max_results`. Returns an empty list on any upstream failure.
    async fn find_resources(&self, query: &str, max_results: usize) -> Vec<Resource>;
}

/// Perplexity-backed research client
pub struct PerplexityClient {
    model: String,
    /// None when no key is configured; lookups then return empty
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl PerplexityClient {
    /// Create a client from configuration. A missing API key is not an
    /// error: the client degrades to empty results.
    pub fn from_config(config: &ResearchConfig) -> eyre::Result<Self> {
        let api_key = match config.api_key() {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "No research API key configured, resources will be empty");
                None
            }
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
        })
    }

    fn build_query_prompt(query: &str, max_results: usize) -> String {
        format!(
            "Find the {} best learning resources for: {}\n\
             Respond with a JSON array only. Each element: \
             {{\"title\": string, \"url\": string, \
             \"kind\": \"article\"|\"video\"|\"tutorial\"|\"docs\", \
             \"focus\": string (which section to focus on)}}",
            max_results.max(1),
            query
        )
    }

    async fn query_upstream(&self, query: &str, max_results: usize) -> eyre::Result<Vec<Resource>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no research API key configured"))?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "Be precise and concise. Return only valid JSON."
                },
                {
                    "role": "user",
                    "content": Self::build_query_prompt(query, max_results)
                }
            ],
            "max_tokens": 1024,
            "temperature": 0.1,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: ChatCompletionResponse = response.json().await?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| eyre::eyre!("no choices in research response"))?;

        let raw: Vec<RawResource> = serde_json::from_str(extract_json(&content))?;
        Ok(raw.into_iter().map(RawResource::into_resource).collect())
    }
}

#[async_trait]
impl ResearchClient for PerplexityClient {
    async fn find_resources(&self, query: &str, max_results: usize) -> Vec<Resource> {
        debug!(%query, max_results, "find_resources: called");
        match self.query_upstream(query, max_results).await {
            Ok(resources) => dedup_and_cap(resources, max_results),
            Err(e) => {
                warn!(%query, error = %e, "Research lookup failed, continuing without resources");
                Vec::new()
            }
        }
    }
}

/// Drop duplicate URLs (keeping the first, highest-ranked hit) and cap
fn dedup_and_cap(resources: Vec<Resource>, max_results: usize) -> Vec<Resource> {
    let mut seen = std::collections::HashSet::new();
    resources
        .into_iter()
        .filter(|r| !r.url.is_empty() && seen.insert(r.url.clone()))
        .take(max_results)
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    title: String,
    url: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    focus: Option<String>,
}

impl RawResource {
    fn into_resource(self) -> Resource {
        let kind = self
            .kind
            .as_deref()
            .and_then(|k| k.parse::<ResourceKind>().ok())
            .unwrap_or_default();
        Resource {
            title: self.title,
            url: self.url,
            kind,
            focus: self.focus.unwrap_or_default(),
        }
    }
}


#[cfg(test)]
pub mod mock {
    use super::*;

    /// Mock research client returning a fixed resource list
    pub struct MockResearchClient {
        resources: Vec<Resource>,
    }

    impl MockResearchClient {
        pub fn new(resources: Vec<Resource>) -> Self {
            Self { resources }
        }

        pub fn empty() -> Self {
            Self { resources: Vec::new() }
        }
    }

    #[async_trait]
    impl ResearchClient for MockResearchClient {
        async fn find_resources(&self, _query: &str, max_results: usize) -> Vec<Resource> {
            super::dedup_and_cap(self.resources.clone(), max_results)
        }
    }
}
