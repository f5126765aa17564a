use std::sync::Arc;
use tracing::info;
use warp::Filter;

use research_orchestrator::agents::planner::LlmPlanner;
use research_orchestrator::agents::report_writer::ReportWriterAgent;
use research_orchestrator::agents::retriever::{GoogleSearch, RetrieverAgent};
use research_orchestrator::agents::summarizer::SummarizerAgent;
use research_orchestrator::llm::{GeminiClient, TextGenerator};
use research_orchestrator::{api, config, error, metrics, middleware};
use research_orchestrator::{AgentRole, Bus, ResearchOrchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!("Starting AI Research Assistant");
    config.validate()?;
    info!("Configuration loaded");

    let generator: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone().unwrap_or_default(),
        config.gemini_model.clone(),
        config.llm_timeout(),
    )?);
    let search = GoogleSearch::new(
        config.google_api_key.clone().unwrap_or_default(),
        config.search_engine_id.clone().unwrap_or_default(),
        config.search_timeout(),
    )?;

    // Bring up the bus and its agents
    let bus = Arc::new(Bus::new());
    bus.start();

    let orchestrator = ResearchOrchestrator::new(
        bus.clone(),
        Arc::new(LlmPlanner::new(generator.clone())),
        config.orchestrator_settings(),
    );
    orchestrator.register();
    bus.register(
        AgentRole::Search,
        Arc::new(RetrieverAgent::new(Arc::new(search), config.max_search_results)),
    );
    bus.register(
        AgentRole::Summarizer,
        Arc::new(SummarizerAgent::new(generator.clone(), config.vector_dimension)),
    );
    bus.register(
        AgentRole::ReportWriter,
        Arc::new(ReportWriterAgent::new(generator)),
    );
    info!("{} agents registered", bus.agent_count());

    // Metrics route
    let metrics_route = warp::path("metrics")
        .and(warp::get())
        .and_then(|| async {
            metrics::render()
                .map(|buffer| {
                    warp::reply::with_header(buffer, "Content-Type", metrics::content_type())
                })
                .map_err(|e| {
                    warp::reject::custom(error::ApiError::InternalError(e.to_string()))
                })
        });

    let routes = metrics_route
        .or(api::routes(bus.clone(), orchestrator))
        .recover(error::handle_rejection)
        .with(warp::log("api"))
        .with(middleware::cors());

    // Start server
    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(
        ([0, 0, 0, 0], config.port),
        async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        },
    );
    info!("Server listening on {}", addr);
    server.await;

    bus.stop().await;
    info!("AI Research Assistant shutdown completed");
    Ok(())
}
