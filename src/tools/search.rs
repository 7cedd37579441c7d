//! Web search client (Tavily).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::SearchConfig;

/// Results forwarded to the model per query.
pub const MAX_RESULTS: usize = 5;

/// Snippet length (in characters) forwarded to the model.
pub const MAX_SNIPPET_CHARS: usize = 500;

/// One condensed search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Condensed result list for a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSummary {
    pub hits: Vec<SearchHit>,
}

impl SearchSummary {
    /// JSON array of `{title, url, content}` handed back as the tool result.
    pub fn to_payload(&self) -> String {
        serde_json::to_string(&self.hits).unwrap_or_else(|_| "[]".to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    #[error("search unavailable: no Tavily API key is configured")]
    MissingCredential,

    #[error("Tavily API error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("network error while calling Tavily: {0}")]
    Network(String),

    #[error("malformed Tavily response: {0}")]
    Malformed(String),
}

/// A web search backend.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchSummary, SearchError>;
}

pub struct TavilyClient {
    client: reqwest::Client,
    api_key: Option<String>,
    url: String,
    timeout: Duration,
}

impl TavilyClient {
    pub fn new(api_key: Option<String>, url: String, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            url,
            timeout,
        })
    }

    pub fn from_config(config: &SearchConfig, timeout: Duration) -> Result<Self, SearchError> {
        Self::new(config.api_key.clone(), config.url.clone(), timeout)
    }
}

#[async_trait]
impl SearchClient for TavilyClient {
    async fn search(&self, query: &str) -> Result<SearchSummary, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::MissingCredential)?;

        tracing::info!(query = %query, "Running web search");

        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "api_key": api_key,
                "query": query,
                "search_depth": "basic",
                "include_answer": false,
                "max_results": MAX_RESULTS,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Network(format!(
                        "request timed out after {}ms",
                        self.timeout.as_millis()
                    ))
                } else {
                    SearchError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Http {
                status: status.as_u16(),
                message: error_detail(&body),
            });
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Malformed(e.to_string()))?;

        Ok(condense(body))
    }
}

fn condense(body: TavilyResponse) -> SearchSummary {
    SearchSummary {
        hits: body
            .results
            .into_iter()
            .take(MAX_RESULTS)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                content: r.content.chars().take(MAX_SNIPPET_CHARS).collect(),
            })
            .collect(),
    }
}

/// Tavily reports errors as `{"detail": {"error": ...}}` or `{"error": ...}`.
fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    value["detail"]["error"]
        .as_str()
        .or_else(|| value["error"].as_str())
        .or_else(|| value["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}
