// Planner: Decomposes user queries into an ordered task plan

use crate::error::AgentError;
use crate::llm::{strip_code_fences, TextGenerator};
use crate::models::{PlanTask, TaskKind, DEFAULT_TASK_PRIORITY};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// External planning capability. Returns raw plan text; parsing and fallback
/// are the executor's job.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, query: &str) -> Result<String, AgentError>;
}

pub struct LlmPlanner {
    generator: Arc<dyn TextGenerator>,
}

impl LlmPlanner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, query: &str) -> Result<String, AgentError> {
        info!("Planner: Decomposing query: {}", query);

        let prompt = format!(
            r#"Create a detailed research plan for the query: "{query}".
Break the research into specific tasks for agents: web_search, summarize, generate_report.
Return a JSON array of tasks. Each task has "task_type", "priority" (lower runs first)
and an optional "description". For web_search, provide a list of 2-3 diverse "search_queries".
For summarize and generate_report, "input_source" names the result they consume
("search_results" or "summary").
Example: [{{"task_type": "web_search", "priority": 1, "search_queries": ["query1", "query2"]}}]"#
        );
        self.generator.generate(&prompt).await
    }
}

#[derive(Deserialize)]
struct PlanDescriptor {
    task_type: String,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    input_source: Option<String>,
    #[serde(default)]
    search_queries: Vec<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parse planner output into tasks.
///
/// Returns `None` when the text is not a JSON array of task descriptors or
/// when no descriptor names a known task kind. Unknown kinds are skipped.
pub fn parse_plan(text: &str) -> Option<Vec<PlanTask>> {
    let descriptors: Vec<PlanDescriptor> = serde_json::from_str(&strip_code_fences(text)).ok()?;

    let tasks: Vec<PlanTask> = descriptors
        .into_iter()
        .filter_map(|descriptor| {
            let Some(kind) = TaskKind::parse(&descriptor.task_type) else {
                warn!("Planner: skipping unknown task type {}", descriptor.task_type);
                return None;
            };
            Some(PlanTask {
                kind,
                priority: descriptor.priority.unwrap_or(DEFAULT_TASK_PRIORITY),
                input_source: descriptor.input_source,
                search_queries: descriptor
                    .search_queries
                    .into_iter()
                    .filter(|q| !q.trim().is_empty())
                    .collect(),
                description: descriptor.description,
            })
        })
        .collect();

    if tasks.is_empty() {
        None
    } else {
        Some(tasks)
    }
}

/// The plan used whenever the planner's output cannot be used:
/// search the query itself, summarize the hits, write the report.
pub fn fallback_plan(query: &str) -> Vec<PlanTask> {
    let mut search = PlanTask::new(TaskKind::WebSearch, 1);
    search.search_queries = vec![query.to_string()];

    let mut summarize = PlanTask::new(TaskKind::Summarize, 2);
    summarize.input_source = Some(TaskKind::WebSearch.result_slot().to_string());

    let mut report = PlanTask::new(TaskKind::GenerateReport, 3);
    report.input_source = Some(TaskKind::Summarize.result_slot().to_string());

    vec![search, summarize, report]
}
