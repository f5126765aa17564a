// WebSocket sessions: progress notifications out, research requests in

use crate::bus::Bus;
use crate::models::Envelope;
use crate::orchestrator::ResearchOrchestrator;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    ResearchRequest { query: String },
    GetAgents,
    HealthCheck,
}

pub async fn handle_socket(
    socket: WebSocket,
    bus: Arc<Bus>,
    orchestrator: Arc<ResearchOrchestrator>,
) {
    let session_id = Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    bus.add_session(session_id.clone(), tx.clone());
    info!("Client connected: {}", session_id);

    // Single writer: notifications from the bus and replies share this channel.
    let writer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Dropping unserializable frame: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                warn!("WebSocket error on session {}: {}", session_id, e);
                break;
            }
        };
        if message.is_close() {
            break;
        }
        let Ok(text) = message.to_str() else {
            continue;
        };

        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::ResearchRequest { query }) if !query.trim().is_empty() => {
                // Runs off the reader so the socket keeps being served meanwhile.
                let orchestrator = orchestrator.clone();
                let session_id = session_id.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = orchestrator.handle_query(query.trim(), &session_id).await;
                    let reply = Envelope::response(json!({ "success": true, "data": outcome }))
                        .with_method("research_response");
                    if tx.send(reply).is_err() {
                        warn!("Session {} closed before its research finished", session_id);
                    }
                });
            }
            Ok(request) => {
                if tx.send(handle_client_message(request, &bus)).is_err() {
                    break;
                }
            }
            Err(e) => {
                if tx.send(Envelope::error(format!("Invalid message: {}", e))).is_err() {
                    break;
                }
            }
        }
    }

    bus.remove_session(&session_id);
    // In-flight runs hold their own senders; the writer drains until they finish.
    drop(tx);
    if let Err(e) = writer.await {
        warn!("Session writer for {} ended abnormally: {}", session_id, e);
    }
    info!("Client disconnected: {}", session_id);
}

/// Replies that need no research run.
fn handle_client_message(request: ClientMessage, bus: &Bus) -> Envelope {
    match request {
        ClientMessage::ResearchRequest { .. } => {
            Envelope::response(json!({ "success": false, "error": "Query is required" }))
                .with_method("research_response")
        }
        ClientMessage::GetAgents => Envelope::response(json!({
            "success": true,
            "data": { "agents": bus.list_agents() },
        }))
        .with_method("agents_response"),
        ClientMessage::HealthCheck => Envelope::response(json!({
            "success": true,
            "data": {
                "status": "healthy",
                "agents": bus.agent_count(),
                "sessions": bus.session_count(),
            },
        }))
        .with_method("health_response"),
    }
}
