//! WebSocket Gateway
//!
//! Per-connection protocol logic: registration, replay of missed messages and
//! handling of inbound client frames. The socket plumbing lives in the
//! handler; everything here works on connection handles so it can be driven
//! without a real socket.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::broadcaster::Broadcaster;
use super::messages::{CallFrame, ClientFrame};
use super::registry::{ConnectionHandle, ConnectionRegistry, RegistrationGuard};
use super::session::SessionState;
use crate::config::WebSocketSettings;
use crate::domain::{CallMode, CallSignal, ChatRepository, MessageRepository, ServerEvent};
use crate::shared::error::AppError;

/// Reason sent back to a caller none of whose peers are connected.
pub const OFFLINE_REASON: &str = "offline";

pub struct Gateway {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    replay_limit: i64,
    max_message_size: usize,
}

impl Gateway {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<Broadcaster>,
        chats: Arc<dyn ChatRepository>,
        messages: Arc<dyn MessageRepository>,
        settings: &WebSocketSettings,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            chats,
            messages,
            heartbeat_interval: settings.heartbeat_interval(),
            heartbeat_timeout: settings.heartbeat_timeout(),
            replay_limit: settings.replay_limit,
            max_message_size: settings.max_message_size,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Make the connection reachable by fan-out. Must happen before replay so
    /// no message committed in between is missed.
    pub fn register(&self, username: &str, conn: ConnectionHandle) -> RegistrationGuard {
        self.registry.register(username, conn)
    }

    /// Push every message after `since` in the user's chats to one
    /// connection, oldest first. A message may also arrive through live
    /// fan-out; clients de-duplicate by id.
    pub async fn replay(&self, username: &str, since: i64, conn: &ConnectionHandle) -> Result<usize, AppError> {
        let missed = self.messages.messages_since(username, since, self.replay_limit).await?;
        let total = missed.len();

        let mut pushed = 0;
        for message in &missed {
            if !self.broadcaster.push(conn, Arc::new(ServerEvent::message(message))) {
                break;
            }
            pushed += 1;
        }

        tracing::debug!(username = %username, since, total, pushed, "Replayed missed messages");
        Ok(pushed)
    }

    /// Handle one text frame. Unparseable frames are dropped.
    pub async fn handle_text(&self, session: &SessionState, conn: &ConnectionHandle, text: &str) {
        match ClientFrame::parse(text) {
            Some(frame) => self.handle_frame(session, conn, frame).await,
            None => {
                tracing::trace!(connection_id = %session.connection_id, "Ignoring malformed frame");
            }
        }
    }

    pub async fn handle_frame(&self, session: &SessionState, conn: &ConnectionHandle, frame: ClientFrame) {
        let frame_type = frame.frame_type();
        let result = match frame {
            ClientFrame::Pong { .. } => {
                session.pong();
                Ok(())
            }
            ClientFrame::Typing { chat_id, is_typing } => self.typing(&session.username, &chat_id, is_typing).await,
            ClientFrame::Delivered { chat_id, message_id } => {
                self.delivered(&session.username, &chat_id, message_id).await
            }
            ClientFrame::CallOffer(call) => self.relay_call(session, conn, call, ServerEvent::IncomingCall).await,
            ClientFrame::CallAnswer(call) | ClientFrame::CallAccept(call) => {
                self.relay_call(session, conn, call, ServerEvent::CallAnswer).await
            }
            ClientFrame::CallReject(call) => self.relay_call(session, conn, call, ServerEvent::CallReject).await,
            ClientFrame::CallEnd(call) => self.relay_call(session, conn, call, ServerEvent::CallEnd).await,
            ClientFrame::CallTimeout(call) => self.relay_call(session, conn, call, ServerEvent::CallTimeout).await,
            ClientFrame::CallRingAck(call) => self.relay_call(session, conn, call, ServerEvent::CallRingAck).await,
        };

        if let Err(e) = result {
            tracing::warn!(
                username = %session.username,
                connection_id = %session.connection_id,
                frame = frame_type,
                error = %e,
                "Frame handling failed"
            );
        }
    }

    async fn is_member(&self, chat_id: &str, username: &str) -> Result<bool, AppError> {
        if chat_id.is_empty() {
            return Ok(false);
        }
        self.chats.is_member(chat_id, username).await
    }

    async fn typing(&self, username: &str, chat_id: &str, is_typing: bool) -> Result<(), AppError> {
        let chat_id = chat_id.trim();
        if !self.is_member(chat_id, username).await? {
            return Ok(());
        }

        let event = ServerEvent::Typing {
            chat_id: chat_id.to_string(),
            username: username.to_string(),
            is_typing,
        };
        self.broadcaster.broadcast_to_chat(chat_id, event).await;
        Ok(())
    }

    async fn delivered(&self, username: &str, chat_id: &str, message_id: i64) -> Result<(), AppError> {
        let chat_id = chat_id.trim();
        if message_id <= 0 || !self.is_member(chat_id, username).await? {
            return Ok(());
        }

        self.messages.record_delivery(message_id, username).await?;

        let event = ServerEvent::Delivered {
            chat_id: chat_id.to_string(),
            message_id,
            username: username.to_string(),
        };
        self.broadcaster.broadcast_to_chat(chat_id, event).await;
        Ok(())
    }

    /// Relay a call signal to every other member with a live connection.
    /// An offer nobody can receive is answered with `call_timeout` on the
    /// originating connection only.
    async fn relay_call(
        &self,
        session: &SessionState,
        conn: &ConnectionHandle,
        call: CallFrame,
        into_event: fn(CallSignal) -> ServerEvent,
    ) -> Result<(), AppError> {
        if !call.is_addressable() {
            return Ok(());
        }
        let chat_id = call.chat_id.trim().to_string();
        if !self.is_member(&chat_id, &session.username).await? {
            return Ok(());
        }

        let recipients: Vec<String> = self
            .chats
            .members(&chat_id)
            .await?
            .into_iter()
            .filter(|member| *member != session.username && self.registry.is_online(member))
            .collect();

        let signal = CallSignal {
            chat_id,
            call_id: call.call_id.trim().to_string(),
            mode: CallMode::parse(call.mode.as_deref()),
            username: session.username.clone(),
            started_at: call.started_at.unwrap_or_else(|| Utc::now().timestamp()),
            duration: call.duration.unwrap_or(0),
            reason: call.reason.map(|r| r.trim().to_string()).unwrap_or_default(),
            data: call.data,
        };
        let event = into_event(signal);

        if recipients.is_empty() {
            if let ServerEvent::IncomingCall(signal) = event {
                tracing::debug!(
                    username = %session.username,
                    chat_id = %signal.chat_id,
                    call_id = %signal.call_id,
                    "Callee offline, timing out offer"
                );
                let timeout = ServerEvent::CallTimeout(CallSignal {
                    reason: OFFLINE_REASON.to_string(),
                    data: None,
                    ..signal
                });
                self.broadcaster.push(conn, Arc::new(timeout));
            }
            return Ok(());
        }

        self.broadcaster.broadcast_to_users(&recipients, event);
        Ok(())
    }
}
