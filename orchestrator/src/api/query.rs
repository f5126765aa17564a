use crate::bus::Bus;
use crate::error::ApiError;
use crate::models::{HealthResponse, QueryRequest};
use crate::orchestrator::ResearchOrchestrator;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use warp::{Rejection, Reply};

pub async fn handle_health(bus: Arc<Bus>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&HealthResponse {
        status: "healthy",
        agents: bus.agent_count(),
        sessions: bus.session_count(),
    }))
}

pub async fn handle_list_agents(bus: Arc<Bus>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&json!({ "agents": bus.list_agents() })))
}

pub async fn handle_research(
    request: QueryRequest,
    orchestrator: Arc<ResearchOrchestrator>,
) -> Result<impl Reply, Rejection> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(warp::reject::custom(ApiError::BadRequest(
            "Query is required".to_string(),
        )));
    }

    // HTTP callers have no socket, so progress goes to a throwaway session.
    let session_id = Uuid::new_v4().to_string();
    info!("Research request over HTTP: {}", query);
    let outcome = orchestrator.handle_query(query, &session_id).await;
    Ok(warp::reply::json(&outcome))
}

pub async fn handle_search(
    request: QueryRequest,
    orchestrator: Arc<ResearchOrchestrator>,
) -> Result<impl Reply, Rejection> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(warp::reject::custom(ApiError::BadRequest(
            "Query is required".to_string(),
        )));
    }

    let digest = orchestrator.search_and_summarize(query).await;
    Ok(warp::reply::json(&digest))
}

pub async fn handle_get_run(
    run_id: Uuid,
    orchestrator: Arc<ResearchOrchestrator>,
) -> Result<impl Reply, Rejection> {
    match orchestrator.get_run(run_id) {
        Some(run) => Ok(warp::reply::json(&run)),
        None => Err(warp::reject::custom(ApiError::NotFound(format!(
            "Run {} not found",
            run_id
        )))),
    }
}
