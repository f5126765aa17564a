//! Agent registry, message router and session broadcast.
//!
//! One `Bus` is built at process start and handed to every component as an
//! `Arc<Bus>`. It owns three pieces of shared state:
//!
//! - the agent table, keyed by identifier
//! - a role index listing agents of each role in registration order
//! - the session table used for one-way progress notifications
//!
//! Locks are only held for map access, never across a handler call.
//!
//! ## Role resolution
//!
//! The design assumes one agent per role. When several agents share a role,
//! the first one registered wins; unregistering it promotes the next.

use crate::error::AgentError;
use crate::metrics;
use crate::models::{AgentId, AgentInfo, AgentRole, AgentStatus, Envelope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Message-handling capability of a registered agent.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn handle_message(&self, message: Envelope) -> Result<Envelope, AgentError>;

    /// Called once by `Bus::stop`.
    async fn shutdown(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Delivery handle for a session. The receiving half belongs to the transport.
pub type SessionSink = mpsc::UnboundedSender<Envelope>;

struct AgentRecord {
    role: AgentRole,
    handler: Arc<dyn AgentHandler>,
    status: AgentStatus,
    registered_at: DateTime<Utc>,
}

#[derive(Default)]
struct Registry {
    agents: HashMap<AgentId, AgentRecord>,
    by_role: HashMap<AgentRole, Vec<AgentId>>,
}

#[derive(Default)]
pub struct Bus {
    registry: RwLock<Registry>,
    sessions: RwLock<HashMap<String, SessionSink>>,
    running: AtomicBool,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("Agent bus started");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a handler under a fresh identifier. The agent starts active.
    pub fn register(&self, role: AgentRole, handler: Arc<dyn AgentHandler>) -> AgentId {
        let id = Uuid::new_v4();
        let record = AgentRecord {
            role,
            handler,
            status: AgentStatus::Active,
            registered_at: Utc::now(),
        };

        let mut registry = self.registry.write();
        registry.agents.insert(id, record);
        registry.by_role.entry(role).or_default().push(id);
        info!("Registered agent {} of type {}", id, role);
        id
    }

    /// Returns false if the agent was not registered.
    pub fn unregister(&self, id: AgentId) -> bool {
        let mut registry = self.registry.write();
        let Some(record) = registry.agents.remove(&id) else {
            return false;
        };

        if let Some(ids) = registry.by_role.get_mut(&record.role) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                registry.by_role.remove(&record.role);
            }
        }
        info!("Unregistered agent {}", id);
        true
    }

    pub fn set_status(&self, id: AgentId, status: AgentStatus) -> bool {
        match self.registry.write().agents.get_mut(&id) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// First active agent registered under `role`.
    pub fn agent_for_role(&self, role: AgentRole) -> Option<AgentId> {
        let registry = self.registry.read();
        registry.by_role.get(&role).and_then(|ids| {
            ids.iter()
                .copied()
                .find(|id| matches!(registry.agents.get(id), Some(r) if r.status == AgentStatus::Active))
        })
    }

    /// Deliver `message` to one agent and return its reply.
    ///
    /// Unknown or inactive targets and handler faults all come back as
    /// error envelopes.
    pub async fn send(&self, id: AgentId, message: Envelope) -> Envelope {
        let handler = {
            let registry = self.registry.read();
            match registry.agents.get(&id) {
                None => {
                    metrics::routing_fault();
                    return Envelope::error(format!("Agent {} not found", id));
                }
                Some(record) if record.status == AgentStatus::Inactive => {
                    metrics::routing_fault();
                    return Envelope::error(format!("Agent {} is inactive", id));
                }
                Some(record) => Arc::clone(&record.handler),
            }
        };

        metrics::message_routed();
        match handler.handle_message(message).await {
            Ok(reply) => {
                if reply.is_error() {
                    metrics::routing_fault();
                }
                reply
            }
            Err(e) => {
                warn!("Error sending message to agent {}: {}", id, e);
                metrics::routing_fault();
                Envelope::error(e.to_string())
            }
        }
    }

    /// Send to every agent not in `exclude`. One agent's fault does not stop
    /// delivery to the others.
    pub async fn broadcast(
        &self,
        message: Envelope,
        exclude: &[AgentId],
    ) -> BTreeMap<AgentId, Envelope> {
        let targets: Vec<AgentId> = self
            .registry
            .read()
            .agents
            .keys()
            .copied()
            .filter(|id| !exclude.contains(id))
            .collect();

        let replies = join_all(targets.iter().map(|id| self.send(*id, message.clone()))).await;
        targets.into_iter().zip(replies).collect()
    }

    pub fn list_agents(&self) -> BTreeMap<AgentId, AgentInfo> {
        self.registry
            .read()
            .agents
            .iter()
            .map(|(id, record)| {
                (
                    *id,
                    AgentInfo {
                        role: record.role,
                        status: record.status,
                        registered_at: record.registered_at,
                    },
                )
            })
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.registry.read().agents.len()
    }

    pub fn add_session(&self, session_id: impl Into<String>, sink: SessionSink) {
        let session_id = session_id.into();
        debug!("Session {} added", session_id);
        self.sessions.write().insert(session_id, sink);
    }

    pub fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            debug!("Session {} removed", session_id);
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Best-effort delivery to one session. False if the session is unknown
    /// or its receiver has gone away.
    pub fn broadcast_to_session(&self, session_id: &str, message: Envelope) -> bool {
        let sessions = self.sessions.read();
        let Some(sink) = sessions.get(session_id) else {
            debug!("No session {} to notify", session_id);
            return false;
        };
        match sink.send(message) {
            Ok(()) => true,
            Err(_) => {
                debug!("Session {} receiver closed", session_id);
                false
            }
        }
    }

    /// Shut down every registered agent, then clear agents and sessions.
    pub async fn stop(&self) {
        let records: Vec<(AgentId, Arc<dyn AgentHandler>)> = {
            let mut registry = self.registry.write();
            registry.by_role.clear();
            registry
                .agents
                .drain()
                .map(|(id, record)| (id, record.handler))
                .collect()
        };

        for (id, handler) in records {
            if let Err(e) = handler.shutdown().await {
                warn!("Agent {} failed to shut down cleanly: {}", id, e);
            }
        }

        self.sessions.write().clear();
        self.running.store(false, Ordering::SeqCst);
        info!("Agent bus stopped");
    }
}
