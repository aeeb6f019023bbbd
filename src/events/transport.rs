// src/events/transport.rs
//! Event transport bridge
//!
//! The transport owns delivery to a tenant's live connections. The engine
//! only hands it structured events; wire framing is the transport's business.

use crate::events::event::AgentEvent;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

/// Delivers events to a tenant's connection(s)
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send(&self, user_id: &str, event: &AgentEvent) -> Result<()>;
}

/// In-process connection multiplexer
///
/// Each tenant may hold any number of live connections. Closed connections
/// are pruned on send; a tenant with no open connection is a delivery failure.
#[derive(Default)]
pub struct ChannelTransport {
    connections: DashMap<String, Vec<mpsc::UnboundedSender<AgentEvent>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection for `user_id`
    pub fn connect(&self, user_id: &str) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.entry(user_id.to_string()).or_default().push(tx);
        rx
    }

    /// Close every connection for `user_id`
    pub fn disconnect(&self, user_id: &str) {
        self.connections.remove(user_id);
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.connections
            .get(user_id)
            .map(|conns| conns.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventTransport for ChannelTransport {
    async fn send(&self, user_id: &str, event: &AgentEvent) -> Result<()> {
        let mut entry = self
            .connections
            .get_mut(user_id)
            .ok_or_else(|| EngineError::Transport(format!("no connection for user '{}'", user_id)))?;

        let senders = entry.value_mut();
        senders.retain(|tx| tx.send(event.clone()).is_ok());

        if senders.is_empty() {
            drop(entry);
            self.connections.remove(user_id);
            return Err(EngineError::Transport(format!(
                "all connections closed for user '{}'",
                user_id
            )));
        }

        trace!(user_id, event = event.event_type.as_str(), "Event delivered");
        Ok(())
    }
}
