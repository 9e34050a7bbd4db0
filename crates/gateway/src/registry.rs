//! Connection registry.
//!
//! A sharded concurrent map from connection id to a per-connection handle.
//! Handler code only sees scoped register/unregister and the handle's send
//! path; the raw map is never exposed.

use crate::error::{GatewayError, Result};
use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Unique connection identifier.
pub type ConnectionId = Uuid;

/// Outbound channel depth per connection. Replies are serialized through
/// this channel, preserving order relative to the requests on the same
/// connection.
pub const OUTBOUND_CHANNEL_SIZE: usize = 64;

/// State for one open connection.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub client_id: Uuid,
    tx: mpsc::Sender<Message>,
    pub connected_at: i64,
    last_pong: AtomicI64,
}

impl ConnectionHandle {
    pub fn new(client_id: Uuid, tx: mpsc::Sender<Message>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            client_id,
            tx,
            connected_at: now,
            last_pong: AtomicI64::new(now),
        }
    }

    /// Queue a frame for the writer task. Applies backpressure rather than
    /// dropping: reply order is part of the protocol contract.
    pub async fn send(&self, msg: Message) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| GatewayError::ChannelSend)
    }

    /// Record a pong (or inbound ping) as liveness.
    pub fn touch(&self) {
        self.last_pong
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Milliseconds since the peer last proved liveness.
    pub fn idle_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.last_pong.load(Ordering::Relaxed)
    }
}

/// Registry of open connections.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn register(&self, handle: Arc<ConnectionHandle>) -> ConnectionId {
        let id = handle.id;
        self.connections.insert(id, handle);
        debug!("connection {} registered", id);
        id
    }

    pub fn unregister(&self, id: &ConnectionId) {
        if self.connections.remove(id).is_some() {
            debug!("connection {} unregistered", id);
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(id).map(|c| c.clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_get_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(OUTBOUND_CHANNEL_SIZE);
        let handle = Arc::new(ConnectionHandle::new(Uuid::new_v4(), tx));

        let id = registry.register(handle.clone());
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get(&id).unwrap().client_id, handle.client_id);

        registry.unregister(&id);
        assert_eq!(registry.count(), 0);
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_drops() {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_SIZE);
        let handle = ConnectionHandle::new(Uuid::new_v4(), tx);
        drop(rx);

        let denied = handle.send(Message::Text("x".to_string().into())).await;
        assert!(matches!(denied, Err(GatewayError::ChannelSend)));
    }

    #[tokio::test]
    async fn test_touch_resets_idle() {
        let (tx, _rx) = mpsc::channel(OUTBOUND_CHANNEL_SIZE);
        let handle = ConnectionHandle::new(Uuid::new_v4(), tx);

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let idle = handle.idle_ms();
        assert!(idle >= 30);

        handle.touch();
        assert!(handle.idle_ms() < idle);
    }
}
