//! Connection registry for the browser-facing socket.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::info;

/// Tracks active WebSocket connections. Conversations are per-connection, so
/// the hub only does bookkeeping: ids, counts, connect times.
pub struct WsHub {
    connections: DashMap<u64, ConnectionInfo>,
    next_id: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connected_at: DateTime<Utc>,
}

impl WsHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new connection and return its id.
    pub fn register(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(
            id,
            ConnectionInfo {
                connected_at: Utc::now(),
            },
        );
        info!("registered socket connection {id}");
        id
    }

    /// Unregister a closed connection.
    pub fn unregister(&self, id: u64) {
        if self.connections.remove(&id).is_some() {
            info!("unregistered socket connection {id}");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for WsHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unregister_roundtrip() {
        let hub = WsHub::new();
        let a = hub.register();
        let b = hub.register();
        assert_ne!(a, b);
        assert_eq!(hub.connection_count(), 2);

        hub.unregister(a);
        assert_eq!(hub.connection_count(), 1);

        // Unknown ids are a no-op.
        hub.unregister(999);
        assert_eq!(hub.connection_count(), 1);
    }
}
