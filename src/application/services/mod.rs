//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **TokenCodec**: signed access tokens
//! - **SessionService**: refresh-token rotation and reuse detection
//! - **AuthService**: registration, login, token pairs
//! - **MessageService**: send, forward, edit, delete, reactions, history, receipts
//! - **ChatService**: chat lifecycle, moderation, pins, read markers

pub mod auth_service;
pub mod chat_service;
pub mod message_service;
pub mod session_service;
pub mod token_codec;

use crate::domain::Fanout;

pub use auth_service::{AuthError, AuthService, AuthTokens};
pub use chat_service::{ChatError, ChatService};
pub use message_service::{DeleteScope, MessageError, MessageService, MessageStatus};
pub use session_service::{IssuedRefreshToken, SessionError, SessionService};
pub use token_codec::{Claims, TokenCodec, TokenError};

/// Result of a committed mutation plus the events it produced.
///
/// Services never push events themselves; the caller delivers `fanout` once
/// the mutation has returned.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub fanout: Vec<Fanout>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, fanout: Vec<Fanout>) -> Self {
        Self { value, fanout }
    }
}
