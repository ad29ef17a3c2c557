//! Chat entity, membership roles and repository trait.
//!
//! Maps to the `chats`, `chat_members`, `chat_pins` and `chat_reads` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};

use crate::shared::crypto::sha256_hex;
use crate::shared::error::AppError;

/// Chat kind matching the database VARCHAR constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Group,
    Dm,
}

impl ChatKind {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "group" => Self::Group,
            _ => Self::Dm,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Dm => "dm",
        }
    }
}

/// A member's role inside a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    /// Parse a stored or requested role; unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A group or direct-message chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub kind: ChatKind,
    pub title: Option<String>,

    /// Username of the creator; only the creator may delete a group
    pub created_by: String,

    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// A new group owned by `created_by`, with a random `c_` id.
    pub fn new_group(title: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: format!("c_{}", Alphanumeric.sample_string(&mut rand::rng(), 14)),
            kind: ChatKind::Group,
            title: Some(title.into()),
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }

    /// The DM between two users. The id is derived from the sorted pair so
    /// both sides resolve to the same chat.
    pub fn new_dm(created_by: &str, other: &str) -> Self {
        let (a, b) = if created_by <= other {
            (created_by, other)
        } else {
            (other, created_by)
        };
        let key = format!("dm:{}|{}", a, b);
        let digest = sha256_hex(key.as_bytes());
        Self {
            id: format!("dm_{}", &digest[..16]),
            kind: ChatKind::Dm,
            title: Some(key),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == ChatKind::Group
    }

    /// Moderation rights: any member of a DM, owner or admin of a group.
    pub fn can_moderate(&self, role: Option<MemberRole>) -> bool {
        match (self.kind, role) {
            (_, None) => false,
            (ChatKind::Dm, Some(_)) => true,
            (ChatKind::Group, Some(role)) => matches!(role, MemberRole::Owner | MemberRole::Admin),
        }
    }
}

/// A pinned message with enough of it to render the pin bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub message_id: i64,
    pub pinned_by: String,
    pub pinned_at: DateTime<Utc>,
    pub sender: String,
    pub text: String,
}

/// Repository trait for chat membership and chat-scoped state.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Insert the chat with its initial members. Returns false, changing
    /// nothing, when a chat with this id already exists.
    async fn create_chat(&self, chat: &Chat, members: &[(String, MemberRole)]) -> Result<bool, AppError>;

    /// Every chat the user belongs to, newest first.
    async fn chats_for_user(&self, username: &str) -> Result<Vec<Chat>, AppError>;

    async fn is_member(&self, chat_id: &str, username: &str) -> Result<bool, AppError>;

    /// Usernames of every member of the chat; empty for an unknown chat.
    async fn members(&self, chat_id: &str) -> Result<Vec<String>, AppError>;

    async fn find_chat(&self, chat_id: &str) -> Result<Option<Chat>, AppError>;

    async fn member_role(&self, chat_id: &str, username: &str) -> Result<Option<MemberRole>, AppError>;

    /// Add a member; adding an existing member is a no-op.
    async fn add_member(&self, chat_id: &str, username: &str, role: MemberRole) -> Result<(), AppError>;

    async fn set_member_role(&self, chat_id: &str, username: &str, role: MemberRole) -> Result<(), AppError>;

    async fn remove_member(&self, chat_id: &str, username: &str) -> Result<(), AppError>;

    /// Delete the chat with its messages, pins and read markers.
    async fn delete_chat(&self, chat_id: &str) -> Result<(), AppError>;

    /// Leave a DM. Returns true when the chat was deleted because no members remain.
    async fn leave_dm(&self, chat_id: &str, username: &str) -> Result<bool, AppError>;

    async fn add_pin(&self, chat_id: &str, message_id: i64, pinned_by: &str) -> Result<(), AppError>;

    async fn remove_pin(&self, chat_id: &str, message_id: i64) -> Result<(), AppError>;

    /// At most `limit` pins, most recently pinned first.
    async fn pins(&self, chat_id: &str, limit: i64) -> Result<Vec<Pin>, AppError>;

    /// Advance the read marker; never moves it backwards. Returns the stored marker.
    async fn mark_read(&self, chat_id: &str, username: &str, last_read_id: i64) -> Result<i64, AppError>;
}
