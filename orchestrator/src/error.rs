use thiserror::Error;
use uuid::Uuid;
use warp::{reject::Reject, Rejection, Reply};

/// Faults raised by a worker agent or an external capability it calls.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Faults that abort a single research run.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Run {0} not found")]
    RunNotFound(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl Reject for ApiError {}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(api_err) = err.find::<ApiError>() {
        let (code, message) = match api_err {
            ApiError::NotFound(_) => (404, "Resource not found"),
            ApiError::BadRequest(_) => (400, "Bad request"),
            ApiError::InternalError(_) => (500, "Internal server error"),
        };

        let json = warp::reply::json(&serde_json::json!({
            "error": message,
            "details": api_err.to_string(),
        }));

        let status = warp::http::StatusCode::from_u16(code)
            .unwrap_or(warp::http::StatusCode::INTERNAL_SERVER_ERROR);
        Ok(warp::reply::with_status(json, status))
    } else {
        Err(err)
    }
}
