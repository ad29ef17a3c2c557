//! Server-to-client realtime events.
//!
//! Every event is a JSON object whose `type` field names the variant; the
//! remaining fields sit next to it. Events are fire-and-forget: they are never
//! persisted and never acknowledged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{MediaKind, MemberRole, Message};

/// Audio-only or audio+video call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMode {
    #[default]
    Voice,
    Video,
}

impl CallMode {
    /// Anything other than `video` is treated as a voice call.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|m| m.trim().to_ascii_lowercase()) {
            Some(m) if m == "video" => Self::Video,
            _ => Self::Voice,
        }
    }
}

/// Call signaling payload relayed between chat members.
///
/// The server keeps no call state; it stamps `username` with the sender and
/// forwards `data` (SDP offers, ICE candidates) untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSignal {
    pub chat_id: String,
    pub call_id: String,
    pub mode: CallMode,
    pub username: String,

    /// Epoch seconds
    pub started_at: i64,
    pub duration: i64,
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Wire shape of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: i64,
    pub chat_id: String,
    pub sender: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_edited: bool,
    pub deleted_for_all: bool,
    pub media_kind: Option<MediaKind>,
    pub media_url: Option<String>,
    pub media_mime: Option<String>,
    pub media_name: Option<String>,
    pub reply_to_id: Option<i64>,
    pub reply_sender: Option<String>,
    pub reply_text: Option<String>,
    pub reactions: BTreeMap<String, Vec<String>>,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        let media = message.media.as_ref();
        let reply = message.reply.as_ref();
        Self {
            id: message.id,
            chat_id: message.chat_id.clone(),
            sender: message.sender.clone(),
            text: message.text.clone(),
            created_at: message.created_at,
            is_edited: message.is_edited,
            deleted_for_all: message.deleted_for_all,
            media_kind: media.map(|m| m.kind),
            media_url: media.map(|m| m.url.clone()),
            media_mime: media.map(|m| m.mime.clone()),
            media_name: media.map(|m| m.name.clone()),
            reply_to_id: reply.map(|r| r.id),
            reply_sender: reply.map(|r| r.sender.clone()),
            reply_text: reply.map(|r| r.text.clone()),
            reactions: message.reactions.clone(),
        }
    }
}

/// Closed set of events pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Message(MessagePayload),
    MessageEdited {
        chat_id: String,
        id: i64,
        text: String,
    },
    MessageDeletedAll {
        chat_id: String,
        id: i64,
    },
    ChatDeleted {
        chat_id: String,
    },
    Typing {
        chat_id: String,
        username: String,
        is_typing: bool,
    },
    Delivered {
        chat_id: String,
        message_id: i64,
        username: String,
    },
    Read {
        chat_id: String,
        username: String,
        last_read_id: i64,
    },
    Invited {
        chat_id: String,
    },
    RoleUpdated {
        chat_id: String,
        username: String,
        role: MemberRole,
    },
    MemberRemoved {
        chat_id: String,
        username: String,
    },
    PinAdded {
        chat_id: String,
        message_id: i64,
    },
    PinRemoved {
        chat_id: String,
        message_id: i64,
    },
    ReactionAdded {
        chat_id: String,
        message_id: i64,
        emoji: String,
        username: String,
    },
    ReactionRemoved {
        chat_id: String,
        message_id: i64,
        emoji: String,
        username: String,
    },
    IncomingCall(CallSignal),
    CallAnswer(CallSignal),
    CallReject(CallSignal),
    CallEnd(CallSignal),
    CallTimeout(CallSignal),
    CallRingAck(CallSignal),
    Ping {
        ts: i64,
    },
}

impl ServerEvent {
    /// Wire tag, also used as a metrics label.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::MessageEdited { .. } => "message_edited",
            Self::MessageDeletedAll { .. } => "message_deleted_all",
            Self::ChatDeleted { .. } => "chat_deleted",
            Self::Typing { .. } => "typing",
            Self::Delivered { .. } => "delivered",
            Self::Read { .. } => "read",
            Self::Invited { .. } => "invited",
            Self::RoleUpdated { .. } => "role_updated",
            Self::MemberRemoved { .. } => "member_removed",
            Self::PinAdded { .. } => "pin_added",
            Self::PinRemoved { .. } => "pin_removed",
            Self::ReactionAdded { .. } => "reaction_added",
            Self::ReactionRemoved { .. } => "reaction_removed",
            Self::IncomingCall(_) => "incoming_call",
            Self::CallAnswer(_) => "call_answer",
            Self::CallReject(_) => "call_reject",
            Self::CallEnd(_) => "call_end",
            Self::CallTimeout(_) => "call_timeout",
            Self::CallRingAck(_) => "call_ring_ack",
            Self::Ping { .. } => "ping",
        }
    }

    pub fn message(message: &Message) -> Self {
        Self::Message(MessagePayload::from(message))
    }

    pub fn ping() -> Self {
        Self::Ping {
            ts: Utc::now().timestamp(),
        }
    }
}

/// Where a committed mutation's event must go.
#[derive(Debug, Clone, PartialEq)]
pub enum Fanout {
    /// Every current member of the chat
    Chat(String, ServerEvent),
    /// An explicit recipient list, resolved before the mutation
    Users(Vec<String>, ServerEvent),
}
