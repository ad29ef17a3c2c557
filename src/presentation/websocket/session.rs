//! WebSocket Session State

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::registry::ConnectionId;

/// Per-connection state shared by the reader and heartbeat tasks.
#[derive(Debug)]
pub struct SessionState {
    pub connection_id: ConnectionId,
    pub username: String,
    last_pong: Mutex<Instant>,
}

impl SessionState {
    pub fn new(connection_id: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            connection_id,
            username: username.into(),
            last_pong: Mutex::new(Instant::now()),
        }
    }

    pub fn pong(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        self.last_pong.lock().elapsed() < timeout
    }
}
