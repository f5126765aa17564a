use crate::bus::Bus;
use crate::orchestrator::ResearchOrchestrator;
use std::sync::Arc;
use uuid::Uuid;
use warp::{Filter, Rejection, Reply};

mod query;
mod session;

pub fn routes(
    bus: Arc<Bus>,
    orchestrator: Arc<ResearchOrchestrator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let api = warp::path("api");

    // Served at the root and under /api
    let health_route = warp::path("health")
        .or(api.and(warp::path("health")))
        .unify()
        .and(warp::path::end())
        .and(warp::get())
        .and(with_bus(bus.clone()))
        .and_then(query::handle_health);

    let agents_route = api
        .and(warp::path("agents"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_bus(bus.clone()))
        .and_then(query::handle_list_agents);

    let research_route = api
        .and(warp::path("research"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(query::handle_research);

    let search_route = api
        .and(warp::path("search"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(query::handle_search);

    let run_route = api
        .and(warp::path("runs"))
        .and(warp::path::param::<Uuid>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(query::handle_get_run);

    let ws_route = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_bus(bus))
        .and(with_orchestrator(orchestrator))
        .map(|ws: warp::ws::Ws, bus: Arc<Bus>, orchestrator: Arc<ResearchOrchestrator>| {
            ws.on_upgrade(move |socket| session::handle_socket(socket, bus, orchestrator))
        });

    health_route
        .or(agents_route)
        .or(research_route)
        .or(search_route)
        .or(run_route)
        .or(ws_route)
}

fn with_bus(
    bus: Arc<Bus>,
) -> impl Filter<Extract = (Arc<Bus>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || bus.clone())
}

fn with_orchestrator(
    orchestrator: Arc<ResearchOrchestrator>,
) -> impl Filter<Extract = (Arc<ResearchOrchestrator>,), Error = std::convert::Infallible> + Clone
{
    warp::any().map(move || orchestrator.clone())
}
