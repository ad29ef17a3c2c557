//! Response DTOs
//!
//! Data structures for API response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::services::{AuthTokens, MessageStatus};
use crate::domain::{Chat, ChatKind, MemberReceipt, Message, MessagePayload, Pin};

/// Authentication tokens response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub username: String,
}

impl From<AuthTokens> for TokenResponse {
    fn from(tokens: AuthTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
            token_type: tokens.token_type,
            username: tokens.username,
        }
    }
}

/// Chat summary
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub kind: ChatKind,
    pub title: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<Chat> for ChatResponse {
    fn from(chat: Chat) -> Self {
        Self {
            id: chat.id,
            kind: chat.kind,
            title: chat.title,
            created_by: chat.created_by,
            created_at: chat.created_at,
        }
    }
}

/// Chat list response
#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatResponse>,
}

/// Single message response, same shape as the realtime `message` event
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: MessagePayload,
}

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        Self {
            message: MessagePayload::from(message),
        }
    }
}

/// History page, oldest first
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessagePayload>,
}

impl From<Vec<Message>> for MessagesResponse {
    fn from(messages: Vec<Message>) -> Self {
        Self {
            messages: messages.iter().map(MessagePayload::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub username: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<MemberReceipt> for ReceiptResponse {
    fn from(receipt: MemberReceipt) -> Self {
        Self {
            username: receipt.username,
            delivered_at: receipt.delivered_at,
            read_at: receipt.read_at,
        }
    }
}

/// Delivery and read summary of one message; the sender is not counted
#[derive(Debug, Serialize)]
pub struct MessageStatusResponse {
    pub message_id: i64,
    pub chat_id: String,
    pub members_total: usize,
    pub delivered_count: usize,
    pub read_count: usize,
    pub delivered_latest: Option<DateTime<Utc>>,
    pub read_latest: Option<DateTime<Utc>>,
    pub members: Vec<ReceiptResponse>,
}

impl From<MessageStatus> for MessageStatusResponse {
    fn from(status: MessageStatus) -> Self {
        Self {
            message_id: status.message_id,
            members_total: status.members.len(),
            delivered_count: status.delivered_count(),
            read_count: status.read_count(),
            delivered_latest: status.delivered_latest(),
            read_latest: status.read_latest(),
            chat_id: status.chat_id,
            members: status.members.into_iter().map(ReceiptResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PinResponse {
    pub message_id: i64,
    pub pinned_by: String,
    pub pinned_at: DateTime<Utc>,
    pub sender: String,
    pub text: String,
}

impl From<Pin> for PinResponse {
    fn from(pin: Pin) -> Self {
        Self {
            message_id: pin.message_id,
            pinned_by: pin.pinned_by,
            pinned_at: pin.pinned_at,
            sender: pin.sender,
            text: pin.text,
        }
    }
}

/// Pins of a chat, most recent first
#[derive(Debug, Serialize)]
pub struct PinsResponse {
    pub pins: Vec<PinResponse>,
}

/// Read marker response
#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub last_read_id: i64,
}

/// Generic acknowledgement
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
