//! Registry of live WebSocket connections, addressed by connection id.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parley_common::id::prefix;
use parley_common::PrefixedId;
use serde::Serialize;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::signaling::{DispatchError, Dispatcher, SignalEvent};

/// Normal closure.
const CLOSE_NORMAL: u16 = 1000;

/// Transport session identifier (`conn_` prefixed ULID).
pub struct ConnectionId;

impl PrefixedId for ConnectionId {
    const PREFIX: &'static str = prefix::CONNECTION;
}

struct ConnectionEntry {
    sender: mpsc::UnboundedSender<Message>,
    client: String,
    connected_at: DateTime<Utc>,
}

/// Public view of a live connection.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub client: String,
    pub connected_at: DateTime<Utc>,
}

/// Shared map from connection id to the outbound half of its socket.
///
/// Each entry's sender feeds a per-connection writer task; the registry never
/// touches the socket itself.
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection and return its freshly assigned id.
    pub fn register(&self, client: &str, sender: mpsc::UnboundedSender<Message>) -> String {
        let connection_id = ConnectionId::generate();
        self.connections.insert(
            connection_id.clone(),
            ConnectionEntry {
                sender,
                client: client.to_string(),
                connected_at: Utc::now(),
            },
        );
        connection_id
    }

    pub fn unregister(&self, connection_id: &str) -> bool {
        self.connections.remove(connection_id).is_some()
    }

    /// Queue a text frame. Fails with `Gone` if the connection is unknown or
    /// its writer has shut down (the stale entry is dropped).
    pub fn deliver(&self, connection_id: &str, text: String) -> Result<(), DispatchError> {
        let sent = match self.connections.get(connection_id) {
            Some(entry) => entry.sender.send(Message::Text(text.into())).is_ok(),
            None => return Err(DispatchError::Gone),
        };
        if !sent {
            self.connections.remove(connection_id);
            return Err(DispatchError::Gone);
        }
        Ok(())
    }

    /// Close a connection from the server side. Returns false if it was not live.
    pub fn close(&self, connection_id: &str) -> bool {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            return false;
        };
        let _ = entry.sender.send(Message::Close(Some(CloseFrame {
            code: CLOSE_NORMAL,
            reason: "closed by server".into(),
        })));
        true
    }

    pub fn info(&self, connection_id: &str) -> Option<ConnectionInfo> {
        self.connections.get(connection_id).map(|entry| ConnectionInfo {
            connection_id: connection_id.to_string(),
            client: entry.client.clone(),
            connected_at: entry.connected_at,
        })
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatcher that delivers straight into this process's registry.
/// The `domain` argument is ignored: every connection is local.
pub struct LocalDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl LocalDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn send(
        &self,
        connection_id: &str,
        event: &SignalEvent,
        _domain: &str,
    ) -> Result<(), DispatchError> {
        let text = event
            .to_json()
            .map_err(|e| DispatchError::Encode(e.to_string()))?;
        self.registry.deliver(connection_id, text)
    }
}
