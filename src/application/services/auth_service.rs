//! Authentication Service
//!
//! Handles registration, password login, and the access/refresh token pair
//! handed to clients.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::session_service::{SessionError, SessionService};
use super::token_codec::{TokenCodec, TokenError};
use crate::domain::{User, UserRepository};
use crate::shared::error::AppError;
use crate::shared::validation::validate_username;

/// Access token plus the rotated refresh token
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub username: String,
    pub refresh_token: String,
    pub refresh_expires_in: i64,
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Username already exists")]
    UsernameExists,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    App(#[from] AppError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::Unauthorized("Invalid username or password".into()),
            AuthError::UsernameExists => AppError::Conflict("Username already taken".into()),
            AuthError::Session(e) => e.into(),
            AuthError::Token(e) => AppError::Internal(e.to_string()),
            AuthError::App(e) => e,
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<SessionService>,
    tokens: Arc<TokenCodec>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, sessions: Arc<SessionService>, tokens: Arc<TokenCodec>) -> Self {
        Self { users, sessions, tokens }
    }

    /// Hash a password using Argon2id
    fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its hash
    fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| AuthError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    fn token_pair(&self, username: &str, refresh_token: String) -> Result<AuthTokens, AuthError> {
        Ok(AuthTokens {
            access_token: self.tokens.issue(username)?,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.ttl_seconds(),
            username: username.to_string(),
            refresh_token,
            refresh_expires_in: self.sessions.ttl_seconds(),
        })
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<AuthTokens, AuthError> {
        let username = username.trim();
        validate_username(username)?;

        if self.users.exists(username).await? {
            return Err(AuthError::UsernameExists);
        }

        let user = User::new(username, Self::hash_password(password)?);
        self.users.create(&user).await.map_err(|e| match e {
            AppError::Conflict(_) => AuthError::UsernameExists,
            other => AuthError::App(other),
        })?;

        let refresh = self.sessions.issue(username, None).await?;
        tracing::info!(username = %username, "User registered");

        self.token_pair(username, refresh.token)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AuthTokens, AuthError> {
        let username = username.trim();
        let hash = self
            .users
            .find_password_hash(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !Self::verify_password(password, &hash)? {
            tracing::debug!(username = %username, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let refresh = self.sessions.issue(username, None).await?;
        self.token_pair(username, refresh.token)
    }

    /// Rotate the refresh token and mint a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let rotated = self.sessions.rotate(refresh_token).await?;
        self.token_pair(&rotated.username, rotated.token)
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.sessions.revoke(refresh_token).await?;
        Ok(())
    }

    /// Revoke every refresh token the user holds; returns how many were live.
    pub async fn logout_all(&self, username: &str) -> Result<u64, AuthError> {
        Ok(self.sessions.revoke_all(username).await?)
    }
}
