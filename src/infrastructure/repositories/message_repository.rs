//! Message Repository Implementation
//!
//! PostgreSQL implementation of message storage, per-user visibility,
//! delivery receipts, reactions and reconnect replay.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{Media, MediaKind, MemberReceipt, Message, MessageRepository, NewMessage, ReplyPreview};
use crate::shared::error::AppError;
use crate::shared::validation::{truncate_chars, REPLY_PREVIEW_CHARS};

/// Column list shared by every message read, aliased `m` with the reply
/// target joined as `r`.
const MESSAGE_COLUMNS: &str = r#"
    m.id, m.chat_id, m.sender, m.text, m.created_at, m.is_edited, m.deleted_for_all,
    m.media_kind, m.media_url, m.media_mime, m.media_name,
    m.reply_to_id, r.sender AS reply_sender, r.text AS reply_text
"#;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    chat_id: String,
    sender: String,
    text: String,
    created_at: DateTime<Utc>,
    is_edited: bool,
    deleted_for_all: bool,
    media_kind: Option<String>,
    media_url: Option<String>,
    media_mime: Option<String>,
    media_name: Option<String>,
    reply_to_id: Option<i64>,
    reply_sender: Option<String>,
    reply_text: Option<String>,
}

impl MessageRow {
    fn into_message(self, reactions: BTreeMap<String, Vec<String>>) -> Message {
        let media = match (self.media_kind.as_deref().and_then(MediaKind::from_str), self.media_url) {
            (Some(kind), Some(url)) => Some(Media {
                kind,
                url,
                mime: self.media_mime.unwrap_or_default(),
                name: self.media_name.unwrap_or_default(),
            }),
            _ => None,
        };

        let reply = self.reply_to_id.map(|id| ReplyPreview {
            id,
            sender: self.reply_sender.unwrap_or_default(),
            text: truncate_chars(self.reply_text.as_deref().unwrap_or_default(), REPLY_PREVIEW_CHARS),
        });

        Message {
            id: self.id,
            chat_id: self.chat_id,
            sender: self.sender,
            text: self.text,
            created_at: self.created_at,
            is_edited: self.is_edited,
            deleted_for_all: self.deleted_for_all,
            media,
            reply,
            reactions,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReactionRow {
    message_id: i64,
    emoji: String,
    username: String,
}

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// emoji → usernames for each of the given messages
    async fn load_reactions(&self, ids: &[i64]) -> Result<HashMap<i64, BTreeMap<String, Vec<String>>>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, ReactionRow>(
            r#"
            SELECT message_id, emoji, username
            FROM message_reactions
            WHERE message_id = ANY($1)
            ORDER BY created_at, username
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, BTreeMap<String, Vec<String>>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.message_id)
                .or_default()
                .entry(row.emoji)
                .or_default()
                .push(row.username);
        }
        Ok(grouped)
    }

    async fn attach_reactions(&self, rows: Vec<MessageRow>) -> Result<Vec<Message>, AppError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut reactions = self.load_reactions(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let r = reactions.remove(&row.id).unwrap_or_default();
                row.into_message(r)
            })
            .collect())
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: NewMessage) -> Result<Message, AppError> {
        let media = message.media.as_ref();
        let mut tx = self.pool.begin().await?;

        let (id, created_at) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            r#"
            INSERT INTO messages
                (chat_id, sender, text, media_kind, media_url, media_mime, media_name, reply_to_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, created_at
            "#,
        )
        .bind(&message.chat_id)
        .bind(&message.sender)
        .bind(&message.text)
        .bind(media.map(|m| m.kind.as_str()))
        .bind(media.map(|m| m.url.as_str()))
        .bind(media.map(|m| m.mime.as_str()))
        .bind(media.map(|m| m.name.as_str()))
        .bind(message.reply.as_ref().map(|r| r.id))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO message_delivered (message_id, username) VALUES ($1, $2)")
            .bind(id)
            .bind(&message.sender)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Message {
            id,
            chat_id: message.chat_id,
            sender: message.sender,
            text: message.text,
            created_at,
            is_edited: false,
            deleted_for_all: false,
            media: message.media,
            reply: message.reply,
            reactions: BTreeMap::new(),
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m LEFT JOIN messages r ON r.id = m.reply_to_id WHERE m.id = $1"
        );
        let row = sqlx::query_as::<_, MessageRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.attach_reactions(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE messages SET text = $2, is_edited = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(text)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_deleted_for_all(&self, id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE messages
            SET deleted_for_all = TRUE, text = '',
                media_kind = NULL, media_url = NULL, media_mime = NULL, media_name = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn hide_for_user(&self, id: i64, username: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO message_hidden (message_id, username)
            VALUES ($1, $2)
            ON CONFLICT (message_id, username) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_delivery(&self, message_id: i64, username: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO message_delivered (message_id, username)
            SELECT id, $2 FROM messages WHERE id = $1
            ON CONFLICT (message_id, username) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn messages_since(&self, username: &str, since: i64, limit: i64) -> Result<Vec<Message>, AppError> {
        let query = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages m
            JOIN chat_members cm ON cm.chat_id = m.chat_id AND cm.username = $1
            LEFT JOIN messages r ON r.id = m.reply_to_id
            LEFT JOIN message_hidden h ON h.message_id = m.id AND h.username = $1
            WHERE m.id > $2 AND h.message_id IS NULL
            ORDER BY m.id ASC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(username)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        self.attach_reactions(rows).await
    }

    async fn history(
        &self,
        chat_id: &str,
        username: &str,
        before_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        // Newest page first, then flipped back to ascending order.
        let query = format!(
            r#"
            SELECT * FROM (
                SELECT {MESSAGE_COLUMNS}
                FROM messages m
                LEFT JOIN messages r ON r.id = m.reply_to_id
                LEFT JOIN message_hidden h ON h.message_id = m.id AND h.username = $2
                WHERE m.chat_id = $1
                  AND h.message_id IS NULL
                  AND ($3::BIGINT IS NULL OR m.id < $3)
                ORDER BY m.id DESC
                LIMIT $4
            ) page
            ORDER BY id ASC
            "#
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(chat_id)
            .bind(username)
            .bind(before_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        self.attach_reactions(rows).await
    }

    async fn receipts(&self, chat_id: &str, message_id: i64) -> Result<Vec<MemberReceipt>, AppError> {
        let rows = sqlx::query_as::<_, (String, Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(
            r#"
            SELECT cm.username,
                   d.delivered_at,
                   CASE WHEN rd.last_read_id >= $2 THEN rd.updated_at END AS read_at
            FROM chat_members cm
            LEFT JOIN message_delivered d ON d.message_id = $2 AND d.username = cm.username
            LEFT JOIN chat_reads rd ON rd.chat_id = cm.chat_id AND rd.username = cm.username
            WHERE cm.chat_id = $1
            ORDER BY cm.joined_at ASC, cm.username ASC
            "#,
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(username, delivered_at, read_at)| MemberReceipt {
                username,
                delivered_at,
                read_at,
            })
            .collect())
    }

    async fn add_reaction(&self, message_id: i64, username: &str, emoji: &str) -> Result<bool, AppError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO message_reactions (message_id, username, emoji)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id, username, emoji) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(username)
        .bind(emoji)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(inserted > 0)
    }

    async fn remove_reaction(&self, message_id: i64, username: &str, emoji: &str) -> Result<bool, AppError> {
        let removed = sqlx::query(
            "DELETE FROM message_reactions WHERE message_id = $1 AND username = $2 AND emoji = $3",
        )
        .bind(message_id)
        .bind(username)
        .bind(emoji)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(removed > 0)
    }
}
