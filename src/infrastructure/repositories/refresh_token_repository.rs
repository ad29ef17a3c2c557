//! Refresh Token Repository Implementation
//!
//! PostgreSQL storage for refresh-token chains. Rotation is a
//! compare-and-swap on `revoked = FALSE` inside one transaction, so two
//! concurrent refreshes of the same token cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{RefreshTokenRecord, RefreshTokenRepository};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct RefreshTokenRow {
    token_hash: String,
    username: String,
    session_id: uuid::Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
    replaced_by: Option<String>,
    compromised: bool,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            token_hash: row.token_hash,
            username: row.username,
            session_id: row.session_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            revoked: row.revoked,
            replaced_by: row.replaced_by,
            compromised: row.compromised,
        }
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenRepository {
    pool: PgPool,
}

impl PgRefreshTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_TOKEN: &str = r#"
    INSERT INTO refresh_tokens
        (token_hash, username, session_id, created_at, expires_at, revoked, replaced_by, compromised)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

#[async_trait]
impl RefreshTokenRepository for PgRefreshTokenRepository {
    async fn find(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT token_hash, username, session_id, created_at, expires_at,
                   revoked, replaced_by, compromised
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        sqlx::query(INSERT_TOKEN)
            .bind(&record.token_hash)
            .bind(&record.username)
            .bind(record.session_id)
            .bind(record.created_at)
            .bind(record.expires_at)
            .bind(record.revoked)
            .bind(&record.replaced_by)
            .bind(record.compromised)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn rotate(&self, old_hash: &str, successor: &RefreshTokenRecord) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let swapped = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE, replaced_by = $2 WHERE token_hash = $1 AND revoked = FALSE",
        )
        .bind(old_hash)
        .bind(&successor.token_hash)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if swapped == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(INSERT_TOKEN)
            .bind(&successor.token_hash)
            .bind(&successor.username)
            .bind(successor.session_id)
            .bind(successor.created_at)
            .bind(successor.expires_at)
            .bind(successor.revoked)
            .bind(&successor.replaced_by)
            .bind(successor.compromised)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE token_hash = $1 AND revoked = FALSE")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn revoke_all(&self, username: &str) -> Result<u64, AppError> {
        let revoked = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE username = $1 AND revoked = FALSE")
            .bind(username)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(revoked)
    }

    async fn compromise_user(&self, username: &str, presented_hash: &str) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        let hit = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, compromised = TRUE
            WHERE username = $1 AND revoked = FALSE
            "#,
        )
        .bind(username)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("UPDATE refresh_tokens SET compromised = TRUE WHERE token_hash = $1")
            .bind(presented_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(hit)
    }

    async fn purge_expired(
        &self,
        expired_before: DateTime<Utc>,
        rotated_before: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let purged = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE (replaced_by IS NULL AND expires_at < $1)
               OR (replaced_by IS NOT NULL AND expires_at < $2)
            "#,
        )
        .bind(expired_before)
        .bind(rotated_before)
        .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(purged)
    }
}
