//! User entity and repository trait.
//!
//! Maps to the `users` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Represents a user account.
///
/// Maps to the `users` table:
/// - username: VARCHAR(20) PRIMARY KEY
/// - password_hash: TEXT NOT NULL
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
///
/// The username is immutable and doubles as the identity key everywhere else
/// (chat membership, tokens, connection registry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,

    /// Argon2 password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            created_at: Utc::now(),
        }
    }
}

/// Repository trait for User data access operations.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Fails with `Conflict` when the username is taken.
    async fn create(&self, user: &User) -> Result<(), AppError>;

    /// Stored password hash, or `None` for an unknown username.
    async fn find_password_hash(&self, username: &str) -> Result<Option<String>, AppError>;

    async fn exists(&self, username: &str) -> Result<bool, AppError>;
}
