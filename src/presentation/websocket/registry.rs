//! Connection Registry
//!
//! Maps each username to its live gateway connections. A user may be
//! connected from several devices at once; a username with no connections
//! has no entry at all.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::ServerEvent;
use crate::infrastructure::metrics;

/// Outbound queue of one connection. Events are shared between recipients.
pub type EventSender = mpsc::UnboundedSender<Arc<ServerEvent>>;
pub type EventReceiver = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

/// Identity of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cheap, cloneable handle used to push events to one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: EventSender,
}

impl ConnectionHandle {
    pub fn new(sender: EventSender) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    /// A handle plus the receiving end of its queue.
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event. Fails only when the connection's writer is gone.
    pub fn push(&self, event: Arc<ServerEvent>) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// username → live connections
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, HashMap<ConnectionId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, username: &str, conn: ConnectionHandle) {
        let total = {
            let mut connections = self.connections.write();
            connections
                .entry(username.to_string())
                .or_default()
                .insert(conn.id(), conn.clone());
            connections.values().map(HashMap::len).sum::<usize>()
        };
        metrics::set_gateway_connections(total);

        tracing::debug!(username = %username, connection_id = %conn.id(), "Connection registered");
    }

    /// Remove one connection. The user's entry goes away with its last
    /// connection. Returns false when the connection was not registered.
    pub fn remove(&self, username: &str, id: ConnectionId) -> bool {
        let (removed, total) = {
            let mut connections = self.connections.write();
            let removed = match connections.get_mut(username) {
                Some(conns) => {
                    let removed = conns.remove(&id).is_some();
                    if conns.is_empty() {
                        connections.remove(username);
                    }
                    removed
                }
                None => false,
            };
            (removed, connections.values().map(HashMap::len).sum::<usize>())
        };
        metrics::set_gateway_connections(total);

        if removed {
            tracing::debug!(username = %username, connection_id = %id, "Connection unregistered");
        }
        removed
    }

    /// Snapshot of the user's connections; empty when offline.
    pub fn get(&self, username: &str) -> Vec<ConnectionHandle> {
        self.connections
            .read()
            .get(username)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, username: &str) -> usize {
        self.connections.read().get(username).map_or(0, HashMap::len)
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.count(username) > 0
    }

    /// Live connections across all users
    pub fn connection_count(&self) -> usize {
        self.connections.read().values().map(HashMap::len).sum()
    }

    pub fn online_users(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    /// Register `conn` and return a guard that unregisters it on drop.
    pub fn register(self: &Arc<Self>, username: &str, conn: ConnectionHandle) -> RegistrationGuard {
        let id = conn.id();
        self.add(username, conn);
        RegistrationGuard {
            registry: Arc::clone(self),
            username: username.to_string(),
            id,
        }
    }
}

/// Unregisters its connection when dropped, whichever way the connection ends.
pub struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    username: String,
    id: ConnectionId,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.username, self.id);
    }
}
