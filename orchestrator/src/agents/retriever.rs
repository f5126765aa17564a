// Retriever Agent: Web search and page content extraction

use super::{EXTRACT_CONTENT_METHOD, SEARCH_METHOD};
use crate::bus::AgentHandler;
use crate::error::AgentError;
use crate::models::{Envelope, MessageKind, SearchHit};
use async_trait::async_trait;
use scraper::{Html, Node};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Characters of page text returned by `extract_content`.
pub const MAX_EXTRACT_CHARS: usize = 5000;

/// External web-search capability.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, AgentError>;

    /// Raw HTML of a page.
    async fn fetch_page(&self, url: &str) -> Result<String, AgentError>;
}

const GOOGLE_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Programmable Search Engine. The API returns at most ten items per call.
pub struct GoogleSearch {
    http: reqwest::Client,
    api_key: String,
    engine_id: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Deserialize)]
struct GoogleItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

impl GoogleSearch {
    pub fn new(api_key: String, engine_id: String, timeout: Duration) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            engine_id,
        })
    }
}

#[async_trait]
impl SearchProvider for GoogleSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, AgentError> {
        info!("Performing Google search for: {}", query);
        let num = max_results.clamp(1, 10).to_string();
        let response = self
            .http
            .get(GOOGLE_SEARCH_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Upstream(format!(
                "Google Search API error: {} - {}",
                status, detail
            )));
        }

        let body: GoogleResponse = response.json().await?;
        let hits: Vec<SearchHit> = body
            .items
            .into_iter()
            .map(|item| SearchHit {
                title: item.title.unwrap_or_else(|| "No Title".to_string()),
                url: item.link.unwrap_or_default(),
                content: item
                    .snippet
                    .unwrap_or_else(|| "No snippet available.".to_string()),
            })
            .collect();
        info!("Found {} results from Google search", hits.len());
        Ok(hits)
    }

    async fn fetch_page(&self, url: &str) -> Result<String, AgentError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

pub struct RetrieverAgent {
    provider: Arc<dyn SearchProvider>,
    default_max_results: usize,
}

impl RetrieverAgent {
    pub fn new(provider: Arc<dyn SearchProvider>, default_max_results: usize) -> Self {
        Self {
            provider,
            default_max_results,
        }
    }

    async fn handle_search(&self, message: &Envelope) -> Result<Envelope, AgentError> {
        let query = message
            .param_str("query")
            .ok_or_else(|| AgentError::InvalidParams("Query parameter is required".to_string()))?;
        let max_results = message
            .param_usize("max_results")
            .unwrap_or(self.default_max_results);

        let hits = match self.provider.search(query, max_results).await {
            Ok(mut hits) => {
                hits.truncate(max_results);
                hits
            }
            Err(e) => {
                warn!("Retriever: search for {} failed: {}", query, e);
                Vec::new()
            }
        };
        Ok(Envelope::response(serde_json::to_value(hits)?))
    }

    async fn handle_extract(&self, message: &Envelope) -> Result<Envelope, AgentError> {
        let url = message
            .param_str("url")
            .ok_or_else(|| AgentError::InvalidParams("URL parameter is required".to_string()))?;

        let text = match self.provider.fetch_page(url).await {
            Ok(html) => extract_text(&html),
            Err(e) => {
                warn!("Retriever: could not extract content from {}: {}", url, e);
                String::new()
            }
        };
        Ok(Envelope::response(Value::String(text)))
    }
}

#[async_trait]
impl AgentHandler for RetrieverAgent {
    async fn handle_message(&self, message: Envelope) -> Result<Envelope, AgentError> {
        match (message.kind, message.method()) {
            (MessageKind::Request, Some(SEARCH_METHOD)) => self.handle_search(&message).await,
            (MessageKind::Request, Some(EXTRACT_CONTENT_METHOD)) => {
                self.handle_extract(&message).await
            }
            (MessageKind::Initialize, _) => Ok(Envelope::lifecycle(MessageKind::Initialized)),
            (_, method) => Err(AgentError::UnknownMethod(
                method.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Visible text of an HTML page: script and style bodies dropped, whitespace
/// collapsed, cut to `MAX_EXTRACT_CHARS`.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut words: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            matches!(
                ancestor.value(),
                Node::Element(element) if matches!(element.name(), "script" | "style" | "noscript")
            )
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    let joined = words.join(" ");
    if joined.chars().count() > MAX_EXTRACT_CHARS {
        let cut: String = joined.chars().take(MAX_EXTRACT_CHARS).collect();
        format!("{}...", cut)
    } else {
        joined
    }
}
