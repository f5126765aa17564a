// Report Writer Agent: Turns a research summary into a structured report

use super::{EXECUTIVE_SUMMARY_METHOD, FORMAT_REPORT_METHOD, GENERATE_REPORT_METHOD};
use crate::bus::AgentHandler;
use crate::error::AgentError;
use crate::llm::TextGenerator;
use crate::models::{Envelope, MessageKind};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

const DEFAULT_EXECUTIVE_LENGTH: usize = 300;

/// Markdown rewrites applied in order by `markdown_to_plain_text`.
static PLAIN_TEXT_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"#{1,6}\s*", ""),
        (r"\*\*(.*?)\*\*", "${1}"),
        (r"\*(.*?)\*", "${1}"),
        (r"`(.*?)`", "${1}"),
        (r"\[([^\]]+)\]\([^)]+\)", "${1}"),
        (r"(?m)^\s*-\s*", "• "),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            warn!("Skipping plain text rule {}: {}", pattern, e);
            None
        }
    })
    .collect()
});

/// Output formats understood by `format_report`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Html,
    PdfReady,
    PlainText,
}

impl ReportFormat {
    pub fn parse(name: Option<&str>) -> Self {
        match name {
            Some("html") => ReportFormat::Html,
            Some("pdf_ready") => ReportFormat::PdfReady,
            Some("plain_text") => ReportFormat::PlainText,
            _ => ReportFormat::Markdown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Comprehensive,
    Academic,
    Business,
    Technical,
    Executive,
}

impl ReportType {
    pub fn parse(name: Option<&str>) -> Self {
        match name {
            Some("academic") => ReportType::Academic,
            Some("business") => ReportType::Business,
            Some("technical") => ReportType::Technical,
            Some("executive") => ReportType::Executive,
            _ => ReportType::Comprehensive,
        }
    }

    /// Section outline the model is asked to follow.
    fn template(&self) -> &'static str {
        match self {
            ReportType::Comprehensive => {
                "# Title\n## Executive Summary\n## Introduction\n## Key Findings\n## Analysis\n## Conclusions\n## Sources"
            }
            ReportType::Academic => {
                "# Title\n## Abstract\n## Introduction\n## Literature Review\n## Methodology\n## Findings\n## Discussion\n## Conclusion\n## References"
            }
            ReportType::Business => {
                "# Title\n## Executive Summary\n## Market Context\n## Opportunities and Risks\n## Recommendations\n## Next Steps"
            }
            ReportType::Technical => {
                "# Title\n## Overview\n## Background\n## Technical Details\n## Trade-offs\n## Implementation Notes\n## Open Issues"
            }
            ReportType::Executive => {
                "# Title\n## Bottom Line\n## Key Points\n## Recommended Actions"
            }
        }
    }
}

pub struct ReportWriterAgent {
    generator: Arc<dyn TextGenerator>,
}

impl ReportWriterAgent {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    async fn generate_report(&self, message: &Envelope) -> Result<Envelope, AgentError> {
        let summary = message
            .param_str("summary")
            .ok_or_else(|| AgentError::InvalidParams("Summary parameter is required".to_string()))?;
        let context = message.param_str("context").unwrap_or_default();
        let report_type = ReportType::parse(message.param_str("type"));
        let title = message
            .param_str("title")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Research Report: {}", context));

        info!("Report Writer: Generating {:?} report: {}", report_type, title);
        let prompt = format!(
            "Write a well-structured Markdown research report titled \"{title}\" about \"{context}\".\n\n\
             Base it only on this research summary:\n{summary}\n\n\
             Follow this outline:\n{}\n\n\
             Use clear headings, cite sources where the summary names them, and do not invent data.",
            report_type.template()
        );
        let report = self.generator.generate(&prompt).await?;
        Ok(Envelope::response(Value::String(report)))
    }

    /// Re-render Markdown content. Generator failures leave the content
    /// readable: HTML falls back to a `<pre>` page, PDF to the input.
    async fn format_report(&self, message: &Envelope) -> Result<Envelope, AgentError> {
        let content = message
            .param_str("content")
            .ok_or_else(|| AgentError::InvalidParams("Content parameter is required".to_string()))?;
        let format = ReportFormat::parse(message.param_str("format"));

        info!("Report Writer: Formatting report as {:?}", format);
        let formatted = match format {
            ReportFormat::Markdown => content.to_string(),
            ReportFormat::PlainText => markdown_to_plain_text(content),
            ReportFormat::Html => {
                let prompt = format!(
                    "Convert the following markdown content to clean, professional HTML:\n\n{content}\n\n\
                     Requirements:\n\
                     - Use semantic HTML tags\n\
                     - Include proper CSS styling (embedded)\n\
                     - Responsive, readable layout\n\n\
                     Return only the complete HTML document."
                );
                match self.generator.generate(&prompt).await {
                    Ok(html) => html.trim().to_string(),
                    Err(e) => {
                        warn!("HTML conversion failed: {}", e);
                        format!("<html><body><pre>{}</pre></body></html>", content)
                    }
                }
            }
            ReportFormat::PdfReady => {
                let prompt = format!(
                    "Format the following content for PDF generation with proper page breaks and structure:\n\n{content}\n\n\
                     Requirements:\n\
                     - Add appropriate page breaks\n\
                     - Format headers and footers\n\
                     - Include table of contents\n\
                     - Clear section divisions\n\n\
                     Use markdown with PDF formatting annotations."
                );
                match self.generator.generate(&prompt).await {
                    Ok(text) => text.trim().to_string(),
                    Err(e) => {
                        warn!("PDF formatting failed: {}", e);
                        content.to_string()
                    }
                }
            }
        };
        Ok(Envelope::response(Value::String(formatted)))
    }

    async fn create_executive_summary(&self, message: &Envelope) -> Result<Envelope, AgentError> {
        let report = message
            .param_str("report")
            .ok_or_else(|| AgentError::InvalidParams("Report parameter is required".to_string()))?;
        let max_length = message
            .param_usize("max_length")
            .unwrap_or(DEFAULT_EXECUTIVE_LENGTH);

        let prompt = format!(
            "Create an executive summary of at most {max_length} words for the following report. \
             Lead with the main conclusion, then the key supporting findings.\n\n{report}"
        );
        let summary = self.generator.generate(&prompt).await?;
        Ok(Envelope::response(Value::String(summary)))
    }
}

#[async_trait]
impl AgentHandler for ReportWriterAgent {
    async fn handle_message(&self, message: Envelope) -> Result<Envelope, AgentError> {
        match (message.kind, message.method()) {
            (MessageKind::Request, Some(GENERATE_REPORT_METHOD)) => {
                self.generate_report(&message).await
            }
            (MessageKind::Request, Some(FORMAT_REPORT_METHOD)) => {
                self.format_report(&message).await
            }
            (MessageKind::Request, Some(EXECUTIVE_SUMMARY_METHOD)) => {
                self.create_executive_summary(&message).await
            }
            (MessageKind::Initialize, _) => Ok(Envelope::lifecycle(MessageKind::Initialized)),
            (_, method) => Err(AgentError::UnknownMethod(
                method.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Strip Markdown syntax, keeping text and turning list dashes into bullets.
pub fn markdown_to_plain_text(markdown: &str) -> String {
    let mut text = markdown.to_string();
    for (pattern, replacement) in PLAIN_TEXT_RULES.iter() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recording {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for Recording {
        async fn generate(&self, prompt: &str) -> Result<String, AgentError> {
            self.prompts.lock().push(prompt.to_string());
            Ok("# Report".to_string())
        }
    }

    #[tokio::test]
    async fn test_generate_report_uses_template() {
        let generator = Arc::new(Recording::default());
        let agent = ReportWriterAgent::new(generator.clone());

        let reply = agent
            .handle_message(Envelope::request(
                GENERATE_REPORT_METHOD,
                json!({ "summary": "Prices fell.", "context": "solar", "type": "academic" }),
            ))
            .await
            .unwrap();

        assert_eq!(reply.into_result().unwrap(), json!("# Report"));
        let prompts = generator.prompts.lock();
        assert!(prompts[0].contains("Research Report: solar"));
        assert!(prompts[0].contains("## Literature Review"));
    }

    struct Broken;

    #[async_trait]
    impl TextGenerator for Broken {
        async fn generate(&self, _prompt: &str) -> Result<String, AgentError> {
            Err(AgentError::Upstream("model unavailable".to_string()))
        }
    }

    async fn format_with(
        generator: Arc<dyn TextGenerator>,
        params: Value,
    ) -> Result<Envelope, AgentError> {
        ReportWriterAgent::new(generator)
            .handle_message(Envelope::request(FORMAT_REPORT_METHOD, params))
            .await
    }

    #[test]
    fn test_markdown_to_plain_text() {
        let markdown = "# Solar Outlook\n\n**Costs** fell *sharply* per `IEA` data, see [report](https://iea.example).\n  - storage lags\n- grids";
        assert_eq!(
            markdown_to_plain_text(markdown),
            "Solar Outlook\n\nCosts fell sharply per IEA data, see report.\n• storage lags\n• grids"
        );
    }

    #[tokio::test]
    async fn test_format_report_markdown_is_unchanged() {
        let generator = Arc::new(Recording::default());
        let reply = format_with(generator.clone(), json!({ "content": "## Findings\n- one" }))
            .await
            .unwrap();

        assert_eq!(reply.into_result().unwrap(), json!("## Findings\n- one"));
        assert!(generator.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_format_report_plain_text() {
        let reply = format_with(
            Arc::new(Recording::default()),
            json!({ "content": "# Title\n**bold**", "format": "plain_text" }),
        )
        .await
        .unwrap();
        assert_eq!(reply.into_result().unwrap(), json!("Title\nbold"));
    }

    #[tokio::test]
    async fn test_format_report_html_uses_generator() {
        let generator = Arc::new(Recording::default());
        let reply = format_with(
            generator.clone(),
            json!({ "content": "# Title", "format": "html" }),
        )
        .await
        .unwrap();

        assert_eq!(reply.into_result().unwrap(), json!("# Report"));
        assert!(generator.prompts.lock()[0].contains("professional HTML"));
    }

    #[tokio::test]
    async fn test_format_report_falls_back_when_generator_fails() {
        let html = format_with(Arc::new(Broken), json!({ "content": "# T", "format": "html" }))
            .await
            .unwrap();
        assert_eq!(
            html.into_result().unwrap(),
            json!("<html><body><pre># T</pre></body></html>")
        );

        let pdf = format_with(Arc::new(Broken), json!({ "content": "# T", "format": "pdf_ready" }))
            .await
            .unwrap();
        assert_eq!(pdf.into_result().unwrap(), json!("# T"));
    }

    #[tokio::test]
    async fn test_format_report_requires_content() {
        let result = format_with(Arc::new(Recording::default()), json!({ "content": "" })).await;
        match result {
            Err(AgentError::InvalidParams(message)) => {
                assert_eq!(message, "Content parameter is required")
            }
            other => panic!("unexpected reply: {:?}", other.map(|e| e.kind)),
        }
    }

    #[tokio::test]
    async fn test_executive_summary_defaults_to_300_words() {
        let generator = Arc::new(Recording::default());
        let agent = ReportWriterAgent::new(generator.clone());
        agent
            .handle_message(Envelope::request(
                EXECUTIVE_SUMMARY_METHOD,
                json!({ "report": "# Full report" }),
            ))
            .await
            .unwrap();

        assert!(generator.prompts.lock()[0].contains("at most 300 words"));
    }

    #[tokio::test]
    async fn test_generate_report_requires_summary() {
        let agent = ReportWriterAgent::new(Arc::new(Recording::default()));
        let result = agent
            .handle_message(Envelope::request(GENERATE_REPORT_METHOD, json!({ "context": "x" })))
            .await;
        assert!(matches!(result, Err(AgentError::InvalidParams(_))));
    }
}
