use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

pub type AgentId = Uuid;
pub type RunId = Uuid;

/// The fixed set of worker roles that can sit on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentRole {
    #[serde(rename = "research_orchestrator")]
    Orchestrator,
    #[serde(rename = "search_agent")]
    Search,
    #[serde(rename = "summarizer_agent")]
    Summarizer,
    #[serde(rename = "report_writer_agent")]
    ReportWriter,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Orchestrator => "research_orchestrator",
            AgentRole::Search => "search_agent",
            AgentRole::Summarizer => "summarizer_agent",
            AgentRole::ReportWriter => "report_writer_agent",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
}

/// Point-in-time view of a registered agent, as returned by `Bus::list_agents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(rename = "type")]
    pub role: AgentRole,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Initialize,
    Initialized,
    Request,
    Response,
    Notification,
    Error,
}

/// Message passed between agents and sessions.
///
/// Wire shape: `{type, method?, params?, result?, error?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            method: None,
            params: Map::new(),
            result: None,
            error: None,
        }
    }

    /// Build a request. Non-object `params` are ignored.
    pub fn request(method: &str, params: Value) -> Self {
        Self {
            method: Some(method.to_string()),
            params: into_map(params),
            ..Self::empty(MessageKind::Request)
        }
    }

    pub fn response(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::empty(MessageKind::Response)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(MessageKind::Error)
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            method: Some(method.to_string()),
            params: into_map(params),
            ..Self::empty(MessageKind::Notification)
        }
    }

    pub fn lifecycle(kind: MessageKind) -> Self {
        Self::empty(kind)
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error || self.error.is_some()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// String parameter; empty strings count as missing.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn param_usize(&self, key: &str) -> Option<usize> {
        self.params
            .get(key)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }

    /// Result payload of a response, or the error text of anything else.
    pub fn into_result(self) -> Result<Value, String> {
        if self.is_error() {
            return Err(self.error.unwrap_or_else(|| "unknown error".to_string()));
        }
        self.result
            .ok_or_else(|| "response carried no result".to_string())
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// Plan models

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    WebSearch,
    Summarize,
    GenerateReport,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::WebSearch => "web_search",
            TaskKind::Summarize => "summarize",
            TaskKind::GenerateReport => "generate_report",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "web_search" | "search" | "retrieve" => Some(TaskKind::WebSearch),
            "summarize" | "condense" => Some(TaskKind::Summarize),
            "generate_report" | "report" | "write_report" => Some(TaskKind::GenerateReport),
            _ => None,
        }
    }

    /// Slot the task's output is stored under in `TaskRun::results`.
    pub fn result_slot(&self) -> &'static str {
        match self {
            TaskKind::WebSearch => "search_results",
            TaskKind::Summarize => "summary",
            TaskKind::GenerateReport => "report",
        }
    }

    /// Slot read when the plan names no input source.
    pub fn default_input(&self) -> Option<&'static str> {
        match self {
            TaskKind::WebSearch => None,
            TaskKind::Summarize => Some("search_results"),
            TaskKind::GenerateReport => Some("summary"),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_TASK_PRIORITY: i32 = 999;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    #[serde(rename = "task_type")]
    pub kind: TaskKind,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_queries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PlanTask {
    pub fn new(kind: TaskKind, priority: i32) -> Self {
        Self {
            kind,
            priority,
            input_source: None,
            search_queries: Vec::new(),
            description: None,
        }
    }

    pub fn input_slot(&self) -> Option<&str> {
        self.input_source
            .as_deref()
            .or_else(|| self.kind.default_input())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Planning,
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRun {
    pub id: RunId,
    pub query: String,
    pub session_id: String,
    pub plan: Vec<PlanTask>,
    pub status: RunStatus,
    pub results: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    pub fn new(id: RunId, query: &str, session_id: &str) -> Self {
        Self {
            id,
            query: query.to_string(),
            session_id: session_id.to_string(),
            plan: Vec::new(),
            status: RunStatus::Planning,
            results: Map::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Structured outcome of `handle_query`. Never an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Completed {
        run_id: RunId,
        results: Map<String, Value>,
    },
    Error {
        run_id: RunId,
        error: String,
    },
}

impl QueryOutcome {
    pub fn run_id(&self) -> RunId {
        match self {
            QueryOutcome::Completed { run_id, .. } | QueryOutcome::Error { run_id, .. } => *run_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, QueryOutcome::Completed { .. })
    }
}

/// Payload of a `research_progress` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: RunId,
    pub message: String,
}

// Worker payloads

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Output of a direct search: the hits plus a summary of them.
#[derive(Debug, Clone, Serialize)]
pub struct SearchDigest {
    pub query: String,
    pub summary: String,
    pub sources: usize,
    pub results: Vec<SearchHit>,
}

// API Request/Response models

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agents: usize,
    pub sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_wire_shape() {
        let envelope = Envelope::request("search", json!({"query": "solar", "max_results": 4}));
        let wire = serde_json::to_value(&envelope).unwrap();

        assert_eq!(wire["type"], "request");
        assert_eq!(wire["method"], "search");
        assert_eq!(wire["params"]["max_results"], 4);
        assert!(wire.get("result").is_none());
        assert!(wire.get("error").is_none());
    }

    #[test]
    fn test_error_envelope_into_result() {
        let envelope = Envelope::error("agent not found");
        assert!(envelope.is_error());
        assert_eq!(envelope.into_result(), Err("agent not found".to_string()));
    }

    #[test]
    fn test_param_str_treats_blank_as_missing() {
        let envelope = Envelope::request("search", json!({"query": "   "}));
        assert_eq!(envelope.param_str("query"), None);
    }

    #[test]
    fn test_task_kind_aliases() {
        assert_eq!(TaskKind::parse("web_search"), Some(TaskKind::WebSearch));
        assert_eq!(TaskKind::parse("Condense"), Some(TaskKind::Summarize));
        assert_eq!(TaskKind::parse("analyze_data"), None);
    }

    #[test]
    fn test_input_slot_defaults() {
        let mut task = PlanTask::new(TaskKind::GenerateReport, 3);
        assert_eq!(task.input_slot(), Some("summary"));

        task.input_source = Some("search_results".to_string());
        assert_eq!(task.input_slot(), Some("search_results"));
    }

    #[test]
    fn test_outcome_serialization() {
        let run_id = Uuid::new_v4();
        let outcome = QueryOutcome::Error {
            run_id,
            error: "boom".to_string(),
        };
        let wire = serde_json::to_value(&outcome).unwrap();
        assert_eq!(wire["status"], "error");
        assert_eq!(wire["error"], "boom");
    }
}
