//! Refresh token record and repository trait.
//!
//! Maps to the `refresh_tokens` table. Raw tokens never reach the store; the
//! primary key is the SHA-256 hex digest of the opaque token string.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::AppError;

/// One link of a refresh-token rotation chain.
///
/// Maps to the `refresh_tokens` table:
/// - token_hash: CHAR(64) PRIMARY KEY
/// - username: VARCHAR(20) NOT NULL REFERENCES users(username)
/// - session_id: UUID NOT NULL (shared by every link of one chain)
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// - expires_at: TIMESTAMPTZ NOT NULL
/// - revoked: BOOLEAN NOT NULL DEFAULT FALSE
/// - replaced_by: CHAR(64) NULL (hash of the successor)
/// - compromised: BOOLEAN NOT NULL DEFAULT FALSE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub username: String,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    #[serde(skip_serializing)]
    pub replaced_by: Option<String>,
    pub compromised: bool,
}

impl RefreshTokenRecord {
    pub fn new(
        token_hash: String,
        username: impl Into<String>,
        session_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_hash,
            username: username.into(),
            session_id,
            created_at: Utc::now(),
            expires_at,
            revoked: false,
            replaced_by: None,
            compromised: false,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Revoked because it was rotated; presenting it again proves theft.
    pub fn was_rotated(&self) -> bool {
        self.revoked && self.replaced_by.is_some()
    }
}

/// Repository trait for refresh token storage.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn find(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AppError>;

    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AppError>;

    /// Atomically revoke `old_hash` (only if still unrevoked) pointing it at
    /// `successor`, and insert the successor. Returns false, inserting
    /// nothing, when `old_hash` was already revoked.
    async fn rotate(&self, old_hash: &str, successor: &RefreshTokenRecord) -> Result<bool, AppError>;

    /// Revoke one token; unknown or already revoked tokens are left as-is.
    async fn revoke(&self, token_hash: &str) -> Result<(), AppError>;

    /// Revoke every unrevoked token of the user. Returns how many were revoked.
    async fn revoke_all(&self, username: &str) -> Result<u64, AppError>;

    /// Revoke and flag as compromised every active token of the user, and
    /// flag the presented token too. Returns how many active tokens were hit.
    async fn compromise_user(&self, username: &str, presented_hash: &str) -> Result<u64, AppError>;

    /// Delete records that expired before `expired_before`. Rotated records
    /// are kept until `rotated_before` so a replay still reads as reuse.
    async fn purge_expired(
        &self,
        expired_before: DateTime<Utc>,
        rotated_before: DateTime<Utc>,
    ) -> Result<u64, AppError>;
}
