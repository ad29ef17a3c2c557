//! Message entity and repository trait.
//!
//! Maps to the `messages` table plus its per-user side tables
//! (`message_delivered`, `message_hidden`, `message_reactions`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Attachment category of a media message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Derive the category from a MIME type; anything else is rejected.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else if mime.starts_with("audio/") {
            Some(Self::Audio)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Media attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub url: String,
    pub mime: String,
    pub name: String,
}

/// Quoted preview of the message being replied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub id: i64,
    pub sender: String,
    pub text: String,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// BIGSERIAL primary key; ids grow monotonically across all chats
    pub id: i64,
    pub chat_id: String,
    pub sender: String,

    /// Empty once the message is deleted for everyone
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_edited: bool,
    pub deleted_for_all: bool,
    pub media: Option<Media>,
    pub reply: Option<ReplyPreview>,

    /// Emoji → usernames that reacted with it
    pub reactions: BTreeMap<String, Vec<String>>,
}

/// Fields supplied when creating a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: String,
    pub sender: String,
    pub text: String,
    pub media: Option<Media>,
    pub reply: Option<ReplyPreview>,
}

/// Delivery and read state of one message for one chat member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberReceipt {
    pub username: String,
    pub delivered_at: Option<DateTime<Utc>>,

    /// Set once the member's read marker reaches the message id
    pub read_at: Option<DateTime<Utc>>,
}

/// Repository trait for Message data access operations.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Store the message and mark it delivered to its sender, both or neither.
    async fn create(&self, message: NewMessage) -> Result<Message, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError>;

    /// Replace the text and set `is_edited`.
    async fn update_text(&self, id: i64, text: &str) -> Result<(), AppError>;

    /// Blank the text and media and set `deleted_for_all`.
    async fn mark_deleted_for_all(&self, id: i64) -> Result<(), AppError>;

    /// Hide the message from one user's history only.
    async fn hide_for_user(&self, id: i64, username: &str) -> Result<(), AppError>;

    /// Record a delivery receipt; repeated receipts are ignored.
    async fn record_delivery(&self, message_id: i64, username: &str) -> Result<(), AppError>;

    /// Messages with `id > since` across every chat the user belongs to,
    /// ascending by id, excluding ones the user hid, at most `limit` rows.
    async fn messages_since(&self, username: &str, since: i64, limit: i64) -> Result<Vec<Message>, AppError>;

    /// One page of a chat's history as `username` sees it: up to `limit`
    /// messages with id below `before_id` (the newest ones when `None`),
    /// returned oldest first.
    async fn history(
        &self,
        chat_id: &str,
        username: &str,
        before_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError>;

    /// Receipt state of every current member of `chat_id` for the message,
    /// in join order.
    async fn receipts(&self, chat_id: &str, message_id: i64) -> Result<Vec<MemberReceipt>, AppError>;

    /// Returns false when the user already reacted with this emoji.
    async fn add_reaction(&self, message_id: i64, username: &str, emoji: &str) -> Result<bool, AppError>;

    /// Returns false when there was no such reaction.
    async fn remove_reaction(&self, message_id: i64, username: &str, emoji: &str) -> Result<bool, AppError>;
}
