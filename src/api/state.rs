//! Application state shared across handlers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::transport::AgentTransport;
use crate::ws::WsHub;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Root directory the read/download endpoints resolve paths against.
    /// Report paths like `logs/acme-analysis.md` are joined onto this.
    pub logs_root: PathBuf,
    /// Upstream transport used to run conversation turns.
    pub transport: Arc<dyn AgentTransport>,
    /// Registry of active browser socket connections.
    pub hub: Arc<WsHub>,
}

impl AppState {
    pub fn new(logs_root: PathBuf, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            logs_root,
            transport,
            hub: Arc::new(WsHub::new()),
        }
    }
}
