//! Chat Repository Implementation
//!
//! PostgreSQL implementation of the ChatRepository trait. Covers chats,
//! membership, pins and read markers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{Chat, ChatKind, ChatRepository, MemberRole, Pin};
use crate::shared::error::AppError;

/// Row of the `chats` table
#[derive(Debug, sqlx::FromRow)]
struct ChatRow {
    id: String,
    kind: String,
    title: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl ChatRow {
    fn into_chat(self) -> Chat {
        Chat {
            id: self.id,
            kind: ChatKind::from_str(&self.kind),
            title: self.title,
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn create_chat(&self, chat: &Chat, members: &[(String, MemberRole)]) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO chats (id, kind, title, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&chat.id)
        .bind(chat.kind.as_str())
        .bind(&chat.title)
        .bind(&chat.created_by)
        .bind(chat.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for (username, role) in members {
            sqlx::query(
                r#"
                INSERT INTO chat_members (chat_id, username, role)
                VALUES ($1, $2, $3)
                ON CONFLICT (chat_id, username) DO NOTHING
                "#,
            )
            .bind(&chat.id)
            .bind(username)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn chats_for_user(&self, username: &str) -> Result<Vec<Chat>, AppError> {
        let rows = sqlx::query_as::<_, ChatRow>(
            r#"
            SELECT c.id, c.kind, c.title, c.created_by, c.created_at
            FROM chats c
            JOIN chat_members m ON m.chat_id = c.id
            WHERE m.username = $1
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChatRow::into_chat).collect())
    }

    async fn is_member(&self, chat_id: &str, username: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM chat_members WHERE chat_id = $1 AND username = $2)",
        )
        .bind(chat_id)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn members(&self, chat_id: &str) -> Result<Vec<String>, AppError> {
        let members = sqlx::query_scalar::<_, String>(
            "SELECT username FROM chat_members WHERE chat_id = $1 ORDER BY joined_at, username",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn find_chat(&self, chat_id: &str) -> Result<Option<Chat>, AppError> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT id, kind, title, created_by, created_at FROM chats WHERE id = $1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ChatRow::into_chat))
    }

    async fn member_role(&self, chat_id: &str, username: &str) -> Result<Option<MemberRole>, AppError> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM chat_members WHERE chat_id = $1 AND username = $2",
        )
        .bind(chat_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        // A member with an unrecognized stored role still counts as a member.
        Ok(role.map(|r| MemberRole::parse(&r).unwrap_or(MemberRole::Member)))
    }

    async fn add_member(&self, chat_id: &str, username: &str, role: MemberRole) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO chat_members (chat_id, username, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (chat_id, username) DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(username)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_member_role(&self, chat_id: &str, username: &str, role: MemberRole) -> Result<(), AppError> {
        sqlx::query("UPDATE chat_members SET role = $3 WHERE chat_id = $1 AND username = $2")
            .bind(chat_id)
            .bind(username)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn remove_member(&self, chat_id: &str, username: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chat_members WHERE chat_id = $1 AND username = $2")
            .bind(chat_id)
            .bind(username)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM chat_reads WHERE chat_id = $1 AND username = $2")
            .bind(chat_id)
            .bind(username)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), AppError> {
        // Members, messages, pins and read markers cascade.
        sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn leave_dm(&self, chat_id: &str, username: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chat_members WHERE chat_id = $1 AND username = $2")
            .bind(chat_id)
            .bind(username)
            .execute(&mut *tx)
            .await?;

        let remaining = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_members WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_one(&mut *tx)
            .await?;

        let deleted = remaining == 0;
        if deleted {
            sqlx::query("DELETE FROM chats WHERE id = $1")
                .bind(chat_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn add_pin(&self, chat_id: &str, message_id: i64, pinned_by: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO chat_pins (chat_id, message_id, pinned_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (chat_id, message_id) DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(message_id)
        .bind(pinned_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_pin(&self, chat_id: &str, message_id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM chat_pins WHERE chat_id = $1 AND message_id = $2")
            .bind(chat_id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn pins(&self, chat_id: &str, limit: i64) -> Result<Vec<Pin>, AppError> {
        let rows = sqlx::query_as::<_, (i64, String, DateTime<Utc>, String, String)>(
            r#"
            SELECT p.message_id, p.pinned_by, p.pinned_at, m.sender, m.text
            FROM chat_pins p
            JOIN messages m ON m.id = p.message_id
            WHERE p.chat_id = $1
            ORDER BY p.pinned_at DESC, p.message_id DESC
            LIMIT $2
            "#,
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(message_id, pinned_by, pinned_at, sender, text)| Pin {
                message_id,
                pinned_by,
                pinned_at,
                sender,
                text,
            })
            .collect())
    }

    async fn mark_read(&self, chat_id: &str, username: &str, last_read_id: i64) -> Result<i64, AppError> {
        let stored = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO chat_reads (chat_id, username, last_read_id, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (chat_id, username) DO UPDATE
            SET last_read_id = GREATEST(chat_reads.last_read_id, EXCLUDED.last_read_id),
                updated_at = CASE
                    WHEN EXCLUDED.last_read_id > chat_reads.last_read_id THEN NOW()
                    ELSE chat_reads.updated_at
                END
            RETURNING last_read_id
            "#,
        )
        .bind(chat_id)
        .bind(username)
        .bind(last_read_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }
}
