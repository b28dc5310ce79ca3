//! Upstream transport adapters.
//!
//! The hosted agent's event stream reaches the gateway over one of two
//! transports: an SSE-style HTTP response (`sse`) or a WebSocket relay
//! speaking the stream envelope (`socket`). Both implement `AgentTransport`:
//! run one turn, deliver raw events in arrival order, report a terminal
//! outcome. Exactly one transport is active per conversation turn.

pub mod socket;
pub mod sse;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agent::AgentEvent;

/// Delivery-side events produced by a transport while a turn runs.
#[derive(Debug)]
pub enum TransportEvent {
    /// The upstream acknowledged the turn and began streaming.
    Started { message_id: Option<String> },
    /// One raw agent event, in arrival order.
    Event(AgentEvent),
    /// Terminal marker: the turn completed.
    Ended,
    /// Terminal failure: the turn cannot complete.
    Failed(String),
}

/// Errors surfaced by a transport's turn.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("upstream request failed: {0}")]
    Request(String),
    #[error("upstream stream error: {0}")]
    Stream(String),
    #[error("upstream connection failed: {0}")]
    Connect(String),
}

/// A transport that can run one conversation turn against the hosted agent.
///
/// Implementations send `TransportEvent`s on the provided channel and return
/// once the turn is terminal. A dropped receiver ends the turn silently (the
/// consumer has gone away).
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn run_turn(
        &self,
        prompt: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError>;
}

/// Which upstream transport the gateway uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamMode {
    Sse,
    Socket,
}

/// Upstream connection settings, resolved from the gateway config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Transport selection.
    pub mode: UpstreamMode,
    /// Base URL of the agent's HTTP API (SSE transport).
    pub http_url: String,
    /// WebSocket URL of the agent's stream relay (socket transport).
    pub socket_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            mode: UpstreamMode::Socket,
            http_url: "http://localhost:3000".to_string(),
            socket_url: "ws://localhost:8000".to_string(),
        }
    }
}

/// Build the configured transport.
pub fn build(config: &UpstreamConfig) -> Arc<dyn AgentTransport> {
    match config.mode {
        UpstreamMode::Sse => Arc::new(sse::SseTransport::new(&config.http_url)),
        UpstreamMode::Socket => Arc::new(socket::SocketTransport::new(&config.socket_url)),
    }
}
