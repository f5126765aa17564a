#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use research_orchestrator::agents::planner::Planner;
use research_orchestrator::models::SearchHit;
use research_orchestrator::{AgentError, AgentHandler, Envelope};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared log of (agent label, method) pairs in delivery order.
pub type CallLog = Arc<Mutex<Vec<(String, String)>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Search agent that answers every query with exactly `per_call` hits, or
/// with as many as were requested when `per_call` is `None`.
pub struct FakeSearchAgent {
    pub per_call: Option<usize>,
    pub requests: Mutex<Vec<(String, usize)>>,
    pub log: Option<CallLog>,
}

impl FakeSearchAgent {
    pub fn new(per_call: Option<usize>) -> Self {
        Self {
            per_call,
            requests: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn requested(&self) -> Vec<(String, usize)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AgentHandler for FakeSearchAgent {
    async fn handle_message(&self, message: Envelope) -> Result<Envelope, AgentError> {
        let query = message.param_str("query").unwrap_or_default().to_string();
        let max_results = message.param_usize("max_results").unwrap_or(0);
        self.requests.lock().push((query.clone(), max_results));
        if let Some(log) = &self.log {
            log.lock()
                .push(("search".to_string(), message.method().unwrap_or_default().to_string()));
        }

        let count = self.per_call.unwrap_or(max_results);
        let hits: Vec<SearchHit> = (0..count)
            .map(|i| SearchHit {
                title: format!("{} #{}", query, i),
                url: format!("https://example.com/{}/{}", query.replace(' ', "-"), i),
                content: format!("Finding {} about {}", i, query),
            })
            .collect();
        Ok(Envelope::response(serde_json::to_value(hits)?))
    }
}

/// Agent that records what it receives and replies with a fixed result.
pub struct ScriptedAgent {
    pub label: String,
    pub reply: Result<Value, String>,
    pub received: Mutex<Vec<Envelope>>,
    pub log: Option<CallLog>,
    pub shut_down: AtomicBool,
}

impl ScriptedAgent {
    pub fn replying(label: &str, reply: &str) -> Self {
        Self::returning(label, json!(reply))
    }

    pub fn returning(label: &str, result: Value) -> Self {
        Self {
            label: label.to_string(),
            reply: Ok(result),
            received: Mutex::new(Vec::new()),
            log: None,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn failing(label: &str, error: &str) -> Self {
        Self {
            reply: Err(error.to_string()),
            ..Self::replying(label, "")
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn last_params(&self) -> Option<serde_json::Map<String, Value>> {
        self.received.lock().last().map(|m| m.params.clone())
    }

    pub fn was_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentHandler for ScriptedAgent {
    async fn handle_message(&self, message: Envelope) -> Result<Envelope, AgentError> {
        if let Some(log) = &self.log {
            log.lock().push((
                self.label.clone(),
                message.method().unwrap_or_default().to_string(),
            ));
        }
        self.received.lock().push(message);
        match &self.reply {
            Ok(result) => Ok(Envelope::response(result.clone())),
            Err(error) => Err(AgentError::Upstream(error.clone())),
        }
    }

    async fn shutdown(&self) -> Result<(), AgentError> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Planner returning canned text and counting calls.
pub struct FixedPlanner {
    pub text: String,
    pub calls: AtomicUsize,
}

impl FixedPlanner {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Planner for FixedPlanner {
    async fn plan(&self, _query: &str) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Planner that holds every call until `release` is called.
pub struct GatedPlanner {
    pub text: String,
    pub gate: tokio::sync::Notify,
}

impl GatedPlanner {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            gate: tokio::sync::Notify::new(),
        }
    }

    pub fn release(&self) {
        // notify_one stores a permit when nobody is waiting yet.
        self.gate.notify_one();
    }
}

#[async_trait]
impl Planner for GatedPlanner {
    async fn plan(&self, _query: &str) -> Result<String, AgentError> {
        self.gate.notified().await;
        Ok(self.text.clone())
    }
}
