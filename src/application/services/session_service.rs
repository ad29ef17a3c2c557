//! Refresh Session Service
//!
//! Issues, rotates and revokes opaque refresh tokens. Every successful
//! rotation retires the presented token and links it to its successor, so a
//! retired token showing up again means a copy leaked: the whole account is
//! then signed out.
//!
//! ```text
//!   issue ──► active ──rotate──► revoked(replaced_by = next) ──present again──► ReuseDetected
//!               │                                                               (all tokens of the
//!               └──logout──► revoked(replaced_by = none) ──present──► Invalid     user compromised)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distr::{Alphanumeric, SampleString};
use uuid::Uuid;

use crate::domain::{RefreshTokenRecord, RefreshTokenRepository};
use crate::infrastructure::metrics;
use crate::shared::crypto::sha256_hex;
use crate::shared::error::AppError;

/// Length of the opaque refresh token handed to clients
const REFRESH_TOKEN_LENGTH: usize = 48;

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Unknown, logged out, or expired
    #[error("Invalid refresh token")]
    InvalidToken,

    #[error("Refresh token reuse detected")]
    ReuseDetected,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidToken => AppError::InvalidToken,
            SessionError::ReuseDetected => AppError::ReuseDetected,
            SessionError::Store(e) => e,
        }
    }
}

/// A freshly issued refresh token. `token` is the only copy of the raw value.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub username: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionService {
    repo: Arc<dyn RefreshTokenRepository>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(repo: Arc<dyn RefreshTokenRepository>, ttl_seconds: i64) -> Self {
        Self {
            repo,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Refresh token lifetime in seconds
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Hash refresh token for storage
    pub fn hash_token(token: &str) -> String {
        sha256_hex(token.as_bytes())
    }

    fn generate_token() -> String {
        Alphanumeric.sample_string(&mut rand::rng(), REFRESH_TOKEN_LENGTH)
    }

    fn new_record(&self, username: &str, session_id: Uuid) -> (String, RefreshTokenRecord) {
        let token = Self::generate_token();
        let record = RefreshTokenRecord::new(
            Self::hash_token(&token),
            username,
            session_id,
            Utc::now() + self.ttl,
        );
        (token, record)
    }

    /// Start a session, or continue `session_id` when given.
    pub async fn issue(
        &self,
        username: &str,
        session_id: Option<Uuid>,
    ) -> Result<IssuedRefreshToken, SessionError> {
        let session_id = session_id.unwrap_or_else(Uuid::new_v4);
        let (token, record) = self.new_record(username, session_id);
        self.repo.insert(&record).await?;

        tracing::debug!(username = %username, session_id = %session_id, "Refresh token issued");

        Ok(IssuedRefreshToken {
            token,
            username: username.to_string(),
            session_id,
            expires_at: record.expires_at,
        })
    }

    /// Exchange a refresh token for its successor.
    pub async fn rotate(&self, presented: &str) -> Result<IssuedRefreshToken, SessionError> {
        let presented_hash = Self::hash_token(presented);
        let record = self
            .repo
            .find(&presented_hash)
            .await?
            .ok_or(SessionError::InvalidToken)?;

        // Reuse is checked before expiry: a stolen token stays evidence after it expires.
        if record.was_rotated() {
            return Err(self.compromise(&record.username, &presented_hash).await);
        }
        if record.revoked || record.is_expired_at(Utc::now()) {
            return Err(SessionError::InvalidToken);
        }

        let (token, successor) = self.new_record(&record.username, record.session_id);
        if !self.repo.rotate(&presented_hash, &successor).await? {
            // The token changed between our read and our write. Only a rotation
            // by someone else is reuse; a concurrent logout is a plain invalid token.
            let raced = self.repo.find(&presented_hash).await?;
            return match raced {
                Some(current) if current.was_rotated() => {
                    Err(self.compromise(&record.username, &presented_hash).await)
                }
                _ => Err(SessionError::InvalidToken),
            };
        }

        tracing::debug!(
            username = %record.username,
            session_id = %record.session_id,
            "Refresh token rotated"
        );

        Ok(IssuedRefreshToken {
            token,
            username: record.username,
            session_id: record.session_id,
            expires_at: successor.expires_at,
        })
    }

    async fn compromise(&self, username: &str, presented_hash: &str) -> SessionError {
        metrics::record_refresh_reuse();
        match self.repo.compromise_user(username, presented_hash).await {
            Ok(revoked) => {
                tracing::warn!(
                    username = %username,
                    revoked = revoked,
                    "Refresh token reuse detected, all sessions revoked"
                );
                SessionError::ReuseDetected
            }
            Err(e) => SessionError::Store(e),
        }
    }

    /// Logout. Unknown or already revoked tokens are fine.
    pub async fn revoke(&self, presented: &str) -> Result<(), SessionError> {
        self.repo.revoke(&Self::hash_token(presented)).await?;
        Ok(())
    }

    /// Logout everywhere.
    pub async fn revoke_all(&self, username: &str) -> Result<u64, SessionError> {
        let revoked = self.repo.revoke_all(username).await?;
        tracing::info!(username = %username, revoked = revoked, "All refresh tokens revoked");
        Ok(revoked)
    }

    /// Drop expired records. Rotated ones outlive their expiry by one more
    /// refresh lifetime, so replaying a stale stolen token still cascades.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let now = Utc::now();
        Ok(self.repo.purge_expired(now, now - self.ttl).await?)
    }
}
