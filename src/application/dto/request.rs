//! Request DTOs
//!
//! Data structures for API request bodies and query strings.

use serde::Deserialize;
use validator::Validate;

use crate::application::services::DeleteScope;

/// Registration / login request
#[derive(Debug, Deserialize, Validate)]
pub struct CredentialsRequest {
    #[validate(length(min = 3, max = 20, message = "Username must be 3-20 characters"))]
    pub username: String,

    #[validate(length(min = 6, max = 128, message = "Password must be 6-128 characters"))]
    pub password: String,
}

/// Refresh / logout request; the cookie is used when the body has no token
#[derive(Debug, Default, Deserialize)]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Send message request
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 64, message = "chat_id is required"))]
    pub chat_id: String,

    pub text: String,

    #[serde(default)]
    pub reply_to_id: Option<i64>,
}

/// `?chat_id=&before_id=&limit=` for history pages
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub chat_id: String,

    /// Only messages older than this id
    #[serde(default)]
    pub before_id: Option<i64>,

    #[serde(default)]
    pub limit: Option<i64>,
}

/// Forward request
#[derive(Debug, Deserialize)]
pub struct ForwardRequest {
    pub target_chat_id: String,
}

/// Edit message request
#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub text: String,
}

/// `?scope=me|all`, defaults to `me`
#[derive(Debug, Deserialize)]
pub struct DeleteMessageQuery {
    #[serde(default = "default_scope")]
    pub scope: DeleteScope,
}

fn default_scope() -> DeleteScope {
    DeleteScope::Me
}

/// Add reaction request
#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

/// `?emoji=` for reaction removal
#[derive(Debug, Deserialize)]
pub struct ReactionQuery {
    pub emoji: String,
}

/// Create group request
#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub title: String,
}

/// Open DM / invite request
#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

/// Role update request
#[derive(Debug, Deserialize)]
pub struct RoleUpdateRequest {
    pub username: String,
    pub role: String,
}

/// `?last_id=` for read markers
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub last_id: i64,
}

/// Pin request
#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub message_id: i64,
}

/// Gateway handshake query
#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    #[serde(default)]
    pub token: Option<String>,

    /// Replay messages with ids above this one
    #[serde(default)]
    pub since: Option<i64>,
}
