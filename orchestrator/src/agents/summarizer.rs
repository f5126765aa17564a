// Summarizer Agent: Condenses retrieved documents, grounded in its similarity index

use super::{
    COMPARE_SOURCES_METHOD, EXTRACT_KEY_POINTS_METHOD, FIND_RELEVANT_METHOD, INDEX_STATS_METHOD,
    SUMMARIZE_METHOD,
};
use crate::bus::AgentHandler;
use crate::error::AgentError;
use crate::index::{Metadata, SimilarityIndex};
use crate::llm::{strip_code_fences, TextGenerator};
use crate::models::{Envelope, MessageKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Matches scoring at or below this are not considered relevant to a theme.
pub const RELEVANCE_THRESHOLD: f32 = 0.3;

const DEFAULT_MAX_LENGTH: usize = 500;
const DEFAULT_MAX_POINTS: usize = 5;
const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStyle {
    Comprehensive,
    BulletPoints,
    Executive,
}

impl SummaryStyle {
    pub fn parse(name: Option<&str>) -> Self {
        match name {
            Some("bullet_points") => SummaryStyle::BulletPoints,
            Some("executive") => SummaryStyle::Executive,
            _ => SummaryStyle::Comprehensive,
        }
    }
}

/// One item of the `data` parameter: a search hit object or plain text.
struct SourceItem {
    title: String,
    content: String,
    source: String,
}

impl SourceItem {
    fn from_value(position: usize, value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let field = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
                SourceItem {
                    title: field("title").unwrap_or_else(|| format!("Document {}", position + 1)),
                    content: field("content").unwrap_or_else(|| value.to_string()),
                    source: field("url").unwrap_or_else(|| "unknown".to_string()),
                }
            }
            Value::String(text) => SourceItem {
                title: format!("Document {}", position + 1),
                content: text.clone(),
                source: "unknown".to_string(),
            },
            other => SourceItem {
                title: format!("Document {}", position + 1),
                content: other.to_string(),
                source: "unknown".to_string(),
            },
        }
    }
}

pub struct SummarizerAgent {
    instance: Uuid,
    generator: Arc<dyn TextGenerator>,
    index: Mutex<SimilarityIndex>,
    ingested: AtomicUsize,
}

impl SummarizerAgent {
    pub fn new(generator: Arc<dyn TextGenerator>, dimension: usize) -> Self {
        Self {
            instance: Uuid::new_v4(),
            generator,
            index: Mutex::new(SimilarityIndex::new(dimension)),
            ingested: AtomicUsize::new(0),
        }
    }

    fn data_param(message: &Envelope) -> Result<Vec<SourceItem>, AgentError> {
        let items: Vec<SourceItem> = message
            .param("data")
            .and_then(Value::as_array)
            .map(|array| {
                array
                    .iter()
                    .enumerate()
                    .map(|(i, value)| SourceItem::from_value(i, value))
                    .collect()
            })
            .unwrap_or_default();

        if items.is_empty() {
            return Err(AgentError::InvalidParams("Data parameter is required".to_string()));
        }
        Ok(items)
    }

    fn ingest(&self, items: &[SourceItem]) {
        let mut index = self.index.lock();
        for item in items {
            let n = self.ingested.fetch_add(1, Ordering::SeqCst);
            let mut metadata = Metadata::new();
            metadata.insert("title".to_string(), item.title.clone());
            metadata.insert("source".to_string(), item.source.clone());
            index.add_document(&format!("doc_{}_{}", n, self.instance), &item.content, metadata);
        }
    }

    async fn summarize(&self, message: &Envelope) -> Result<Envelope, AgentError> {
        let items = Self::data_param(message)?;
        let context = message.param_str("context").unwrap_or_default();
        let style = SummaryStyle::parse(message.param_str("type"));
        let max_length = message
            .param_usize("max_length")
            .unwrap_or(DEFAULT_MAX_LENGTH);

        info!("Summarizer: Creating summary of {} sources for: {}", items.len(), context);
        self.ingest(&items);

        let prompt = summary_prompt(&items, context, style, max_length);
        let summary = self.generator.generate(&prompt).await?;
        Ok(Envelope::response(Value::String(summary)))
    }

    async fn extract_key_points(&self, message: &Envelope) -> Result<Envelope, AgentError> {
        let items = Self::data_param(message)?;
        let max_points = message
            .param_usize("max_points")
            .unwrap_or(DEFAULT_MAX_POINTS);

        let content: Vec<&str> = items.iter().map(|item| item.content.as_str()).collect();
        let prompt = format!(
            "Extract the {max_points} most important key points from the following content:\n\n{}\n\n\
             Requirements:\n\
             - Return exactly {max_points} key points\n\
             - Each point should be a complete, standalone sentence\n\
             - Avoid redundancy between points\n\
             - Format as a numbered list",
            content.join("\n\n")
        );
        let text = self.generator.generate(&prompt).await?;
        Ok(Envelope::response(json!(parse_points(&text, max_points))))
    }

    /// Model-written comparison of two or more sources. A reply that is not a
    /// JSON object comes back as `{comparison_text, sources_count}`.
    async fn compare_sources(&self, message: &Envelope) -> Result<Envelope, AgentError> {
        let sources: Vec<SourceItem> = message
            .param("sources")
            .and_then(Value::as_array)
            .map(|array| {
                array
                    .iter()
                    .enumerate()
                    .map(|(i, value)| SourceItem::from_value(i, value))
                    .collect()
            })
            .unwrap_or_default();
        if sources.len() < 2 {
            return Err(AgentError::InvalidParams(
                "At least 2 sources required for comparison".to_string(),
            ));
        }

        info!("Summarizer: Comparing {} sources", sources.len());
        let text = self.generator.generate(&comparison_prompt(&sources)).await?;
        let comparison = match serde_json::from_str::<Value>(&strip_code_fences(&text)) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => {
                warn!("Comparison was not JSON, returning it as text");
                json!({ "comparison_text": text, "sources_count": sources.len() })
            }
        };
        Ok(Envelope::response(comparison))
    }

    /// Indexed documents relevant to a theme; keyword matching when nothing
    /// clears the relevance threshold.
    fn find_relevant(&self, message: &Envelope) -> Result<Envelope, AgentError> {
        let theme = message
            .param_str("theme")
            .ok_or_else(|| AgentError::InvalidParams("Theme parameter is required".to_string()))?;
        let top_k = message.param_usize("top_k").unwrap_or(DEFAULT_TOP_K);

        let mut index = self.index.lock();
        let mut relevant: Vec<Value> = index
            .search(theme, top_k)
            .into_iter()
            .filter(|m| m.score > RELEVANCE_THRESHOLD)
            .map(|m| {
                json!({
                    "id": m.id,
                    "title": m.metadata.get("title").cloned().unwrap_or_else(|| "Untitled".to_string()),
                    "content": m.content,
                    "similarity": m.score,
                })
            })
            .collect();

        if relevant.is_empty() {
            let keywords: Vec<String> = theme.to_lowercase().split_whitespace().map(str::to_string).collect();
            relevant = index
                .documents()
                .filter(|doc| {
                    let content = doc.content.to_lowercase();
                    keywords.iter().any(|k| content.contains(k.as_str()))
                })
                .take(top_k)
                .map(|doc| {
                    json!({
                        "id": doc.id,
                        "title": doc.metadata.get("title").cloned().unwrap_or_else(|| "Untitled".to_string()),
                        "content": doc.content,
                    })
                })
                .collect();
        }
        Ok(Envelope::response(Value::Array(relevant)))
    }

    fn index_stats(&self) -> Result<Envelope, AgentError> {
        Ok(Envelope::response(serde_json::to_value(self.index.lock().stats())?))
    }
}

#[async_trait]
impl AgentHandler for SummarizerAgent {
    async fn handle_message(&self, message: Envelope) -> Result<Envelope, AgentError> {
        match (message.kind, message.method()) {
            (MessageKind::Request, Some(SUMMARIZE_METHOD)) => self.summarize(&message).await,
            (MessageKind::Request, Some(EXTRACT_KEY_POINTS_METHOD)) => {
                self.extract_key_points(&message).await
            }
            (MessageKind::Request, Some(FIND_RELEVANT_METHOD)) => self.find_relevant(&message),
            (MessageKind::Request, Some(INDEX_STATS_METHOD)) => self.index_stats(),
            (MessageKind::Request, Some(COMPARE_SOURCES_METHOD)) => {
                self.compare_sources(&message).await
            }
            (MessageKind::Initialize, _) => Ok(Envelope::lifecycle(MessageKind::Initialized)),
            (_, method) => Err(AgentError::UnknownMethod(
                method.unwrap_or("<none>").to_string(),
            )),
        }
    }

    async fn shutdown(&self) -> Result<(), AgentError> {
        self.index.lock().clear();
        info!("Summarizer Agent shutdown completed");
        Ok(())
    }
}

fn summary_prompt(items: &[SourceItem], context: &str, style: SummaryStyle, max_length: usize) -> String {
    let sources: Vec<String> = items
        .iter()
        .map(|item| {
            format!(
                "Source: {} ({})\nContent: {}\n",
                item.title, item.source, item.content
            )
        })
        .collect();
    let combined = sources.join("\n");

    let requirements = match style {
        SummaryStyle::BulletPoints => format!(
            "- Use clear, concise bullet points\n\
             - Maximum {max_length} words total\n\
             - Group related points together"
        ),
        SummaryStyle::Executive => format!(
            "- Professional executive summary format\n\
             - Maximum {max_length} words\n\
             - Include key findings and recommendations"
        ),
        SummaryStyle::Comprehensive => format!(
            "- Comprehensive but concise summary\n\
             - Maximum {max_length} words\n\
             - Cover all major topics and themes\n\
             - Identify any contradictions or gaps"
        ),
    };
    let kind = match style {
        SummaryStyle::BulletPoints => "a bullet-point summary",
        SummaryStyle::Executive => "an executive summary",
        SummaryStyle::Comprehensive => "a comprehensive summary",
    };

    format!(
        "Create {kind} of the following content about \"{context}\":\n\n{combined}\n\nRequirements:\n{requirements}"
    )
}

fn comparison_prompt(sources: &[SourceItem]) -> String {
    let listed: Vec<String> = sources
        .iter()
        .enumerate()
        .map(|(i, item)| format!("Source {}: {}\nContent: {}\n", i + 1, item.title, item.content))
        .collect();

    format!(
        "Compare and analyze the following sources:\n\n{}\n\n\
         Provide a comparison that includes:\n\
         1. Common themes and agreements between sources\n\
         2. Key differences and contradictions\n\
         3. Reliability assessment of each source\n\
         4. Synthesis of the most credible information\n\
         5. Gaps in information that need further research\n\n\
         Format the response as JSON:\n\
         {{\"common_themes\": [\"theme1\"], \"differences\": [\"diff1\"], \
         \"reliability_assessment\": {{\"source1\": \"assessment\"}}, \
         \"synthesis\": \"combined analysis\", \"information_gaps\": [\"gap1\"]}}",
        listed.join("\n")
    )
}

/// Pull list items out of a numbered or bulleted response.
pub fn parse_points(text: &str, max_points: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let first = line.chars().next()?;
            let point = if first.is_ascii_digit() {
                let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
                rest.trim_start_matches(['.', ')']).trim()
            } else if first == '-' || first == '*' || first == '•' {
                line[first.len_utf8()..].trim()
            } else {
                return None;
            };
            (!point.is_empty()).then(|| point.to_string())
        })
        .take(max_points)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _prompt: &str) -> Result<String, AgentError> {
            Ok(self.0.to_string())
        }
    }

    fn hits() -> Value {
        json!([
            {"title": "EU ETS", "url": "https://a.example", "content": "Carbon pricing in the EU emissions trading system cut power sector emissions."},
            {"title": "Solar", "url": "https://b.example", "content": "Solar panel costs fell 20% in 2023."},
            {"title": "Duplicate", "url": "https://c.example", "content": "Solar panel costs fell 20% in 2023."}
        ])
    }

    #[tokio::test]
    async fn test_summarize_ingests_and_deduplicates() {
        let agent = SummarizerAgent::new(Arc::new(Canned("A summary.")), 384);
        let reply = agent
            .handle_message(Envelope::request(
                SUMMARIZE_METHOD,
                json!({ "data": hits(), "context": "energy" }),
            ))
            .await
            .unwrap();

        assert_eq!(reply.into_result().unwrap(), json!("A summary."));
        assert_eq!(agent.index.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_summarize_requires_data() {
        let agent = SummarizerAgent::new(Arc::new(Canned("unused")), 384);
        let result = agent
            .handle_message(Envelope::request(SUMMARIZE_METHOD, json!({ "data": [] })))
            .await;
        assert!(matches!(result, Err(AgentError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_find_relevant_uses_index() {
        let agent = SummarizerAgent::new(Arc::new(Canned("ok")), 384);
        agent
            .handle_message(Envelope::request(SUMMARIZE_METHOD, json!({ "data": hits() })))
            .await
            .unwrap();

        let reply = agent
            .handle_message(Envelope::request(
                FIND_RELEVANT_METHOD,
                json!({ "theme": "carbon pricing emissions" }),
            ))
            .await
            .unwrap();
        let items = reply.into_result().unwrap();
        assert_eq!(items.as_array().unwrap().len(), 1);
        assert_eq!(items[0]["title"], "EU ETS");
    }

    #[tokio::test]
    async fn test_shutdown_clears_index() {
        let agent = SummarizerAgent::new(Arc::new(Canned("ok")), 384);
        agent
            .handle_message(Envelope::request(SUMMARIZE_METHOD, json!({ "data": hits() })))
            .await
            .unwrap();
        agent.shutdown().await.unwrap();
        assert!(agent.index.lock().is_empty());
    }

    #[tokio::test]
    async fn test_compare_sources_parses_fenced_json() {
        let agent = SummarizerAgent::new(
            Arc::new(Canned(
                "```json\n{\"common_themes\": [\"falling costs\"], \"differences\": [], \
                 \"reliability_assessment\": {}, \"synthesis\": \"Solar got cheaper.\", \
                 \"information_gaps\": [\"storage\"]}\n```",
            )),
            384,
        );
        let reply = agent
            .handle_message(Envelope::request(
                COMPARE_SOURCES_METHOD,
                json!({ "sources": hits() }),
            ))
            .await
            .unwrap();

        let comparison = reply.into_result().unwrap();
        assert_eq!(comparison["common_themes"][0], "falling costs");
        assert_eq!(comparison["synthesis"], "Solar got cheaper.");
        assert_eq!(comparison["information_gaps"], json!(["storage"]));
    }

    #[tokio::test]
    async fn test_compare_sources_falls_back_to_text() {
        let agent = SummarizerAgent::new(Arc::new(Canned("The sources broadly agree.")), 384);
        let reply = agent
            .handle_message(Envelope::request(
                COMPARE_SOURCES_METHOD,
                json!({ "sources": hits() }),
            ))
            .await
            .unwrap();

        let comparison = reply.into_result().unwrap();
        assert_eq!(comparison["comparison_text"], "The sources broadly agree.");
        assert_eq!(comparison["sources_count"], 3);
    }

    #[tokio::test]
    async fn test_compare_sources_needs_two() {
        let agent = SummarizerAgent::new(Arc::new(Canned("unused")), 384);
        let result = agent
            .handle_message(Envelope::request(
                COMPARE_SOURCES_METHOD,
                json!({ "sources": [{"title": "Only", "content": "one"}] }),
            ))
            .await;
        match result {
            Err(AgentError::InvalidParams(message)) => {
                assert_eq!(message, "At least 2 sources required for comparison")
            }
            other => panic!("unexpected reply: {:?}", other.map(|e| e.kind)),
        }
    }

    #[test]
    fn test_parse_points() {
        let text = "Key points:\n1. Prices fell.\n2) Capacity grew.\n- Policy matters.\n\n3.";
        assert_eq!(
            parse_points(text, 5),
            vec!["Prices fell.", "Capacity grew.", "Policy matters."]
        );
        assert_eq!(parse_points(text, 1), vec!["Prices fell."]);
    }
}
