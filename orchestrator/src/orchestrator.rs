//! Research orchestrator: turns a query into a plan and runs it over the bus.
//!
//! Each query becomes a `TaskRun` that moves `Planning -> InProgress ->
//! Completed`, or to `Failed` on an unrecoverable fault. Tasks run strictly
//! in ascending priority (stable on ties). Worker faults degrade to empty
//! results; only faults with no sensible default abort the run.
//!
//! ## Retrieval quota
//!
//! A search task with N queries and a global maximum M asks each query for
//! `ceil(M / N)` results, stops dispatching once M results are in hand, and
//! truncates the aggregate to M.

use crate::agents::planner::{fallback_plan, parse_plan, Planner};
use crate::agents::{
    GENERATE_REPORT_METHOD, PROGRESS_NOTIFICATION, RESEARCH_METHOD, SEARCH_METHOD,
    SUMMARIZE_METHOD,
};
use crate::bus::{AgentHandler, Bus};
use crate::error::{AgentError, OrchestratorError};
use crate::metrics;
use crate::models::{
    AgentId, AgentRole, Envelope, MessageKind, PlanTask, ProgressEvent, QueryOutcome, RunId,
    RunStatus, SearchDigest, SearchHit, TaskKind, TaskRun,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Summary reported by `search_and_summarize` when the search came back empty.
pub const NO_RESULTS_SUMMARY: &str = "No search results found for this query.";

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Global cap on search results per search task.
    pub max_search_results: usize,
    /// How long finished runs stay queryable.
    pub run_ttl: Duration,
    /// Cap on finished runs kept in memory.
    pub max_retained_runs: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_search_results: 10,
            run_ttl: Duration::hours(1),
            max_retained_runs: 256,
        }
    }
}

/// Results each of `queries` sub-queries should ask for so that together
/// they can fill `quota`.
pub fn per_query_share(quota: usize, queries: usize) -> usize {
    if queries == 0 {
        return 0;
    }
    quota.div_ceil(queries)
}

pub struct ResearchOrchestrator {
    bus: Arc<Bus>,
    planner: Arc<dyn Planner>,
    settings: OrchestratorSettings,
    runs: Mutex<HashMap<RunId, TaskRun>>,
}

impl ResearchOrchestrator {
    pub fn new(bus: Arc<Bus>, planner: Arc<dyn Planner>, settings: OrchestratorSettings) -> Arc<Self> {
        Arc::new(Self {
            bus,
            planner,
            settings,
            runs: Mutex::new(HashMap::new()),
        })
    }

    /// Put the orchestrator on the bus under its own role.
    pub fn register(self: &Arc<Self>) -> AgentId {
        let handler: Arc<dyn AgentHandler> = self.clone();
        let id = self.bus.register(AgentRole::Orchestrator, handler);
        info!("Research Orchestrator registered with ID: {}", id);
        id
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run a research query end to end. Always returns an outcome.
    pub async fn handle_query(&self, query: &str, session_id: &str) -> QueryOutcome {
        self.prune_runs();

        let run_id = Uuid::new_v4();
        self.runs
            .lock()
            .insert(run_id, TaskRun::new(run_id, query, session_id));
        metrics::run_started();
        info!("Processing query [{}]: {}", run_id, query);

        self.notify_progress(run_id, "Creating a research plan...");
        let plan = self.create_plan(query).await;
        info!("Created research plan with {} tasks", plan.len());

        if let Some(run) = self.runs.lock().get_mut(&run_id) {
            run.plan = plan.clone();
            run.status = RunStatus::InProgress;
        }

        match self.execute_plan(run_id, query, plan).await {
            Ok(results) => {
                self.finish(run_id, RunStatus::Completed);
                metrics::run_completed();
                info!("Research run {} completed", run_id);
                QueryOutcome::Completed { run_id, results }
            }
            Err(e) => {
                error!("Error executing research plan {}: {}", run_id, e);
                self.finish(run_id, RunStatus::Failed);
                metrics::run_failed();
                QueryOutcome::Error {
                    run_id,
                    error: e.to_string(),
                }
            }
        }
    }

    pub fn get_run(&self, run_id: RunId) -> Option<TaskRun> {
        self.runs.lock().get(&run_id).cloned()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }

    /// Aggregate search over the bus with the global quota applied.
    pub async fn search(&self, queries: &[String]) -> Vec<SearchHit> {
        let Some(agent) = self.bus.agent_for_role(AgentRole::Search) else {
            error!("Search agent not available");
            return Vec::new();
        };
        if queries.is_empty() {
            return Vec::new();
        }

        let quota = self.settings.max_search_results;
        let per_query = per_query_share(quota, queries.len());
        let mut hits: Vec<SearchHit> = Vec::new();

        for query in queries {
            if hits.len() >= quota {
                break;
            }
            let request = Envelope::request(
                SEARCH_METHOD,
                json!({ "query": query, "max_results": per_query }),
            );
            match self.bus.send(agent, request).await.into_result() {
                Ok(value) => match serde_json::from_value::<Vec<SearchHit>>(value) {
                    Ok(batch) => hits.extend(batch),
                    Err(e) => warn!("Discarding malformed search results for {}: {}", query, e),
                },
                Err(e) => warn!("Search for {} failed: {}", query, e),
            }
        }

        hits.truncate(quota);
        info!(
            "Aggregated {} search results from {} queries",
            hits.len(),
            queries.len()
        );
        hits
    }

    /// One quota-bounded search for `query`, summarized by the summarizer role.
    pub async fn search_and_summarize(&self, query: &str) -> SearchDigest {
        let results = self.search(&[query.to_string()]).await;
        if results.is_empty() {
            return SearchDigest {
                query: query.to_string(),
                summary: NO_RESULTS_SUMMARY.to_string(),
                sources: 0,
                results,
            };
        }

        let params = json!({ "data": &results, "context": query });
        let summary = self
            .delegate_text(AgentRole::Summarizer, SUMMARIZE_METHOD, params)
            .await;
        SearchDigest {
            query: query.to_string(),
            summary,
            sources: results.len(),
            results,
        }
    }

    async fn create_plan(&self, query: &str) -> Vec<PlanTask> {
        let parsed = match self.planner.plan(query).await {
            Ok(text) => parse_plan(&text),
            Err(e) => {
                warn!("Planner failed: {}", e);
                None
            }
        };
        parsed.unwrap_or_else(|| {
            warn!("Using default research plan for: {}", query);
            metrics::plan_fallback();
            fallback_plan(query)
        })
    }

    async fn execute_plan(
        &self,
        run_id: RunId,
        query: &str,
        mut plan: Vec<PlanTask>,
    ) -> Result<Map<String, Value>, OrchestratorError> {
        plan.sort_by_key(|task| task.priority);

        for task in &plan {
            let description = task
                .description
                .clone()
                .unwrap_or_else(|| format!("Processing {}", task.kind));
            self.notify_progress(run_id, &description);

            let output = match task.kind {
                TaskKind::WebSearch => serde_json::to_value(self.search(&task.search_queries).await)?,
                TaskKind::Summarize => {
                    let input = self.slot(run_id, task.input_slot())?;
                    let params = json!({ "data": input, "context": query });
                    Value::String(
                        self.delegate_text(AgentRole::Summarizer, SUMMARIZE_METHOD, params)
                            .await,
                    )
                }
                TaskKind::GenerateReport => {
                    let input = self.slot(run_id, task.input_slot())?;
                    let params = json!({ "summary": input, "context": query });
                    Value::String(
                        self.delegate_text(AgentRole::ReportWriter, GENERATE_REPORT_METHOD, params)
                            .await,
                    )
                }
            };
            self.store(run_id, task.kind.result_slot(), output)?;
        }

        let runs = self.runs.lock();
        let run = runs.get(&run_id).ok_or(OrchestratorError::RunNotFound(run_id))?;
        Ok(run.results.clone())
    }

    /// Send one request to the agent holding `role` and read a text result.
    /// Missing agents, error replies and null results all yield an empty string.
    async fn delegate_text(&self, role: AgentRole, method: &str, params: Value) -> String {
        let Some(agent) = self.bus.agent_for_role(role) else {
            error!("{} not available", role);
            return String::new();
        };

        match self.bus.send(agent, Envelope::request(method, params)).await.into_result() {
            Ok(Value::String(text)) => text,
            Ok(Value::Null) => {
                warn!("{} returned no result for {}", role, method);
                String::new()
            }
            Ok(other) => {
                warn!("{} returned a non-text result for {}", role, method);
                other.to_string()
            }
            Err(e) => {
                warn!("{} failed on {}: {}", role, method, e);
                String::new()
            }
        }
    }

    fn slot(&self, run_id: RunId, name: Option<&str>) -> Result<Value, OrchestratorError> {
        let runs = self.runs.lock();
        let run = runs.get(&run_id).ok_or(OrchestratorError::RunNotFound(run_id))?;
        Ok(name
            .and_then(|name| run.results.get(name))
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn store(&self, run_id: RunId, slot: &str, value: Value) -> Result<(), OrchestratorError> {
        let mut runs = self.runs.lock();
        let run = runs
            .get_mut(&run_id)
            .ok_or(OrchestratorError::RunNotFound(run_id))?;
        run.results.insert(slot.to_string(), value);
        Ok(())
    }

    fn finish(&self, run_id: RunId, status: RunStatus) {
        if let Some(run) = self.runs.lock().get_mut(&run_id) {
            run.status = status;
            run.finished_at = Some(Utc::now());
        }
    }

    fn notify_progress(&self, run_id: RunId, message: &str) {
        let Some(session_id) = self
            .runs
            .lock()
            .get(&run_id)
            .map(|run| run.session_id.clone())
        else {
            return;
        };

        let event = ProgressEvent {
            run_id,
            message: message.to_string(),
        };
        match serde_json::to_value(&event) {
            Ok(params) => {
                self.bus
                    .broadcast_to_session(&session_id, Envelope::notification(PROGRESS_NOTIFICATION, params));
            }
            Err(e) => warn!("Could not encode progress for run {}: {}", run_id, e),
        }
    }

    /// Drop finished runs past their TTL, then the oldest finished runs over
    /// the retention cap. Runs still in flight are never dropped.
    fn prune_runs(&self) {
        let cutoff = Utc::now() - self.settings.run_ttl;
        let mut runs = self.runs.lock();
        runs.retain(|_, run| match run.finished_at {
            Some(finished) if run.status.is_finished() => finished > cutoff,
            _ => true,
        });

        let mut finished: Vec<(chrono::DateTime<Utc>, RunId)> = runs
            .values()
            .filter_map(|run| run.finished_at.map(|at| (at, run.id)))
            .collect();
        if finished.len() > self.settings.max_retained_runs {
            finished.sort();
            let excess = finished.len() - self.settings.max_retained_runs;
            for (_, id) in finished.into_iter().take(excess) {
                runs.remove(&id);
            }
        }
    }
}

#[async_trait]
impl AgentHandler for ResearchOrchestrator {
    async fn handle_message(&self, message: Envelope) -> Result<Envelope, AgentError> {
        match (message.kind, message.method()) {
            (MessageKind::Request, Some(RESEARCH_METHOD)) => {
                let query = message.param_str("query").ok_or_else(|| {
                    AgentError::InvalidParams("Query parameter is required".to_string())
                })?;
                let session_id = message.param_str("session_id").unwrap_or_default();
                let outcome = self.handle_query(query, session_id).await;
                Ok(Envelope::response(serde_json::to_value(outcome)?))
            }
            (MessageKind::Initialize, _) => Ok(Envelope::lifecycle(MessageKind::Initialized)),
            (_, method) => Err(AgentError::UnknownMethod(
                method.unwrap_or("<none>").to_string(),
            )),
        }
    }

    async fn shutdown(&self) -> Result<(), AgentError> {
        self.runs.lock().clear();
        info!("Research Orchestrator shutdown completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_query_share() {
        assert_eq!(per_query_share(10, 3), 4);
        assert_eq!(per_query_share(10, 1), 10);
        assert_eq!(per_query_share(10, 10), 1);
        assert_eq!(per_query_share(10, 20), 1);
        assert_eq!(per_query_share(0, 3), 0);
        assert_eq!(per_query_share(10, 0), 0);
    }

    struct NoPlan;

    #[async_trait]
    impl Planner for NoPlan {
        async fn plan(&self, _query: &str) -> Result<String, AgentError> {
            Err(AgentError::Upstream("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_prune_respects_cap_and_in_flight_runs() {
        let settings = OrchestratorSettings {
            max_retained_runs: 1,
            ..OrchestratorSettings::default()
        };
        let orchestrator = ResearchOrchestrator::new(Arc::new(Bus::new()), Arc::new(NoPlan), settings);

        let first = orchestrator.handle_query("first", "s").await.run_id();
        let second = orchestrator.handle_query("second", "s").await.run_id();
        let in_flight = Uuid::new_v4();
        {
            let mut runs = orchestrator.runs.lock();
            if let Some(run) = runs.get_mut(&first) {
                run.finished_at = Some(Utc::now() - Duration::minutes(5));
            }
            runs.insert(in_flight, TaskRun::new(in_flight, "third", "s"));
        }

        orchestrator.prune_runs();
        assert!(orchestrator.get_run(first).is_none());
        assert!(orchestrator.get_run(second).is_some());
        assert!(orchestrator.get_run(in_flight).is_some());
    }

    #[tokio::test]
    async fn test_prune_expires_by_ttl() {
        let settings = OrchestratorSettings {
            run_ttl: Duration::zero(),
            ..OrchestratorSettings::default()
        };
        let orchestrator = ResearchOrchestrator::new(Arc::new(Bus::new()), Arc::new(NoPlan), settings);
        let run_id = orchestrator.handle_query("q", "s").await.run_id();
        assert!(orchestrator.get_run(run_id).is_some());

        orchestrator.prune_runs();
        assert!(orchestrator.get_run(run_id).is_none());
    }
}
