//! Fan-out Broadcaster
//!
//! Pushes events onto the queues of every live connection of a set of
//! users. Delivery is best effort: a closed queue or a failed member
//! lookup never fails the mutation that produced the event.

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{ChatRepository, Fanout, ServerEvent};
use crate::infrastructure::metrics;

use super::registry::{ConnectionHandle, ConnectionRegistry};

pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    chats: Arc<dyn ChatRepository>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, chats: Arc<dyn ChatRepository>) -> Self {
        Self { registry, chats }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Push to one connection.
    pub fn push(&self, conn: &ConnectionHandle, event: Arc<ServerEvent>) -> bool {
        let ok = conn.push(Arc::clone(&event));
        if ok {
            metrics::record_event_pushed(event.event_type());
        } else {
            tracing::debug!(connection_id = %conn.id(), "Push to closed connection dropped");
        }
        ok
    }

    /// Push `event` to every connection of every listed user, once per
    /// connection even when a username is listed twice. Returns the number of
    /// successful pushes.
    pub fn broadcast_to_users<S: AsRef<str>>(&self, usernames: &[S], event: ServerEvent) -> usize {
        let event = Arc::new(event);
        let mut seen = HashSet::with_capacity(usernames.len());
        let mut delivered = 0;

        for username in usernames.iter().map(AsRef::as_ref) {
            if !seen.insert(username) {
                continue;
            }
            for conn in self.registry.get(username) {
                if self.push(&conn, Arc::clone(&event)) {
                    delivered += 1;
                }
            }
        }

        tracing::trace!(event = event.event_type(), delivered, "Broadcast to users");
        delivered
    }

    /// Push `event` to every current member of the chat.
    pub async fn broadcast_to_chat(&self, chat_id: &str, event: ServerEvent) -> usize {
        match self.chats.members(chat_id).await {
            Ok(members) => self.broadcast_to_users(&members, event),
            Err(e) => {
                tracing::warn!(
                    chat_id = %chat_id,
                    event = event.event_type(),
                    error = %e,
                    "Member lookup failed, broadcast dropped"
                );
                0
            }
        }
    }

    /// Deliver the events produced by a committed mutation, in order.
    pub async fn deliver(&self, fanout: Vec<Fanout>) -> usize {
        let mut delivered = 0;
        for target in fanout {
            delivered += match target {
                Fanout::Chat(chat_id, event) => self.broadcast_to_chat(&chat_id, event).await,
                Fanout::Users(usernames, event) => self.broadcast_to_users(&usernames, event),
            };
        }
        delivered
    }
}
