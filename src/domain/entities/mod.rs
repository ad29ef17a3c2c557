//! # Domain Entities
//!
//! Core domain entities and the repository traits the rest of the crate
//! depends on. Implementations live in the infrastructure layer.
//!
//! - **User**: account keyed by an immutable username
//! - **Chat**: group or DM, with member roles, pins and read markers
//! - **Message**: chat message with media, reply preview and reactions
//! - **RefreshTokenRecord**: one link of a rotating refresh-token chain

mod chat;
mod message;
mod refresh_token;
mod user;

pub use chat::{Chat, ChatKind, ChatRepository, MemberRole, Pin};
pub use message::{Media, MediaKind, MemberReceipt, Message, MessageRepository, NewMessage, ReplyPreview};
pub use refresh_token::{RefreshTokenRecord, RefreshTokenRepository};
pub use user::{User, UserRepository};
