//! Multi-agent research assistant.
//!
//! A `Bus` routes messages between worker agents; the
//! `ResearchOrchestrator` plans a query and delegates each task over the
//! bus; the summarizer grounds its output in a `SimilarityIndex`.

pub mod agents;
pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod orchestrator;

pub use bus::{AgentHandler, Bus, SessionSink};
pub use error::{AgentError, ApiError, OrchestratorError};
pub use index::SimilarityIndex;
pub use models::{AgentRole, Envelope, MessageKind, QueryOutcome};
pub use orchestrator::{OrchestratorSettings, ResearchOrchestrator};
