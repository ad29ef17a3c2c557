//! Message Service
//!
//! Handles message operations including send, edit, delete and reactions.
//! Every mutation commits first and then hands back the event to fan out;
//! callers deliver it after the call returns.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::Outcome;
use crate::domain::{
    ChatRepository, Fanout, Media, MemberReceipt, Message, MessageRepository, NewMessage, ReplyPreview, ServerEvent,
};
use crate::shared::error::AppError;
use crate::shared::validation::{
    normalize_emoji, normalize_text, truncate_chars, MAX_TEXT_CHARS, REPLY_PREVIEW_CHARS,
};

/// History page size when the client does not ask for one
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Largest history page served
pub const MAX_HISTORY_LIMIT: i64 = 200;

/// Clamp a requested history page size to `1..=MAX_HISTORY_LIMIT`.
pub fn history_limit(requested: Option<i64>) -> i64 {
    requested.map_or(DEFAULT_HISTORY_LIMIT, |n| n.clamp(1, MAX_HISTORY_LIMIT))
}

/// Text of a forwarded copy, within the message length limit.
pub fn forwarded_text(original_sender: &str, original_text: &str) -> String {
    let text = format!("\u{21aa} Forwarded from {}: {}", original_sender, original_text.trim());
    truncate_chars(text.trim(), MAX_TEXT_CHARS)
}

/// Who has received and read a message, the sender excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStatus {
    pub message_id: i64,
    pub chat_id: String,
    pub sender: String,
    pub members: Vec<MemberReceipt>,
}

impl MessageStatus {
    pub fn delivered_count(&self) -> usize {
        self.members.iter().filter(|m| m.delivered_at.is_some()).count()
    }

    pub fn read_count(&self) -> usize {
        self.members.iter().filter(|m| m.read_at.is_some()).count()
    }

    pub fn delivered_latest(&self) -> Option<DateTime<Utc>> {
        self.members.iter().filter_map(|m| m.delivered_at).max()
    }

    pub fn read_latest(&self) -> Option<DateTime<Utc>> {
        self.members.iter().filter_map(|m| m.read_at).max()
    }
}

/// Scope of a message deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteScope {
    /// Hide from the caller's own history
    Me,
    /// Sender only: blank the message for everyone
    All,
}

/// Message service errors
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message not found")]
    NotFound,

    #[error("Not a member of this chat")]
    NotMember,

    #[error("Only the sender can do this")]
    NotSender,

    #[error("Message was deleted")]
    Deleted,

    #[error("Reply target not found in this chat")]
    BadReply,

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<MessageError> for AppError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::NotFound => AppError::NotFound("Message not found".into()),
            MessageError::NotMember => AppError::Forbidden("Not a member".into()),
            MessageError::NotSender => AppError::Forbidden("Only the sender can do this".into()),
            MessageError::Deleted => AppError::BadRequest("Message was deleted".into()),
            MessageError::BadReply => AppError::BadRequest("Reply target not found".into()),
            MessageError::App(e) => e,
        }
    }
}

pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    chats: Arc<dyn ChatRepository>,
}

impl MessageService {
    pub fn new(messages: Arc<dyn MessageRepository>, chats: Arc<dyn ChatRepository>) -> Self {
        Self { messages, chats }
    }

    async fn ensure_member(&self, chat_id: &str, username: &str) -> Result<(), MessageError> {
        if self.chats.is_member(chat_id, username).await? {
            Ok(())
        } else {
            Err(MessageError::NotMember)
        }
    }

    /// Load a message the caller can see, i.e. one in a chat they belong to.
    async fn visible_message(&self, id: i64, username: &str) -> Result<Message, MessageError> {
        let message = self.messages.find_by_id(id).await?.ok_or(MessageError::NotFound)?;
        self.ensure_member(&message.chat_id, username).await?;
        Ok(message)
    }

    async fn reply_preview(&self, chat_id: &str, reply_to_id: Option<i64>) -> Result<Option<ReplyPreview>, MessageError> {
        let Some(reply_id) = reply_to_id else {
            return Ok(None);
        };
        let target = self
            .messages
            .find_by_id(reply_id)
            .await?
            .filter(|m| m.chat_id == chat_id)
            .ok_or(MessageError::BadReply)?;
        Ok(Some(ReplyPreview {
            id: target.id,
            sender: target.sender,
            text: truncate_chars(&target.text, REPLY_PREVIEW_CHARS),
        }))
    }

    pub async fn send(
        &self,
        sender: &str,
        chat_id: &str,
        text: &str,
        reply_to_id: Option<i64>,
    ) -> Result<Outcome<Message>, MessageError> {
        let text = normalize_text(text)?;
        self.ensure_member(chat_id, sender).await?;
        let reply = self.reply_preview(chat_id, reply_to_id).await?;

        let message = self
            .messages
            .create(NewMessage {
                chat_id: chat_id.to_string(),
                sender: sender.to_string(),
                text,
                media: None,
                reply,
            })
            .await?;

        tracing::debug!(message_id = message.id, chat_id = %chat_id, sender = %sender, "Message created");

        let event = ServerEvent::message(&message);
        Ok(Outcome::new(message, vec![Fanout::Chat(chat_id.to_string(), event)]))
    }

    /// Store a message that carries an already-uploaded attachment.
    pub async fn send_media(
        &self,
        sender: &str,
        chat_id: &str,
        caption: Option<&str>,
        media: Media,
    ) -> Result<Outcome<Message>, MessageError> {
        self.ensure_member(chat_id, sender).await?;
        let text = match caption.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => normalize_text(c)?,
            None => String::new(),
        };

        let message = self
            .messages
            .create(NewMessage {
                chat_id: chat_id.to_string(),
                sender: sender.to_string(),
                text,
                media: Some(media),
                reply: None,
            })
            .await?;

        let event = ServerEvent::message(&message);
        Ok(Outcome::new(message, vec![Fanout::Chat(chat_id.to_string(), event)]))
    }

    /// Copy a message into another chat the caller belongs to. Media travels
    /// with it; the text names the original sender.
    pub async fn forward(&self, username: &str, id: i64, target_chat_id: &str) -> Result<Outcome<Message>, MessageError> {
        let source = self.visible_message(id, username).await?;
        self.ensure_member(target_chat_id, username).await?;
        if source.deleted_for_all {
            return Err(MessageError::Deleted);
        }

        let message = self
            .messages
            .create(NewMessage {
                chat_id: target_chat_id.to_string(),
                sender: username.to_string(),
                text: forwarded_text(&source.sender, &source.text),
                media: source.media,
                reply: None,
            })
            .await?;

        tracing::debug!(
            message_id = message.id,
            source_id = id,
            chat_id = %target_chat_id,
            "Message forwarded"
        );

        let event = ServerEvent::message(&message);
        Ok(Outcome::new(message, vec![Fanout::Chat(target_chat_id.to_string(), event)]))
    }

    /// A page of history, oldest first.
    pub async fn history(
        &self,
        username: &str,
        chat_id: &str,
        before_id: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, MessageError> {
        self.ensure_member(chat_id, username).await?;
        Ok(self
            .messages
            .history(chat_id, username, before_id, history_limit(limit))
            .await?)
    }

    pub async fn status(&self, username: &str, id: i64) -> Result<MessageStatus, MessageError> {
        let message = self.visible_message(id, username).await?;
        let members = self
            .messages
            .receipts(&message.chat_id, id)
            .await?
            .into_iter()
            .filter(|r| r.username != message.sender)
            .collect();

        Ok(MessageStatus {
            message_id: id,
            chat_id: message.chat_id,
            sender: message.sender,
            members,
        })
    }

    /// Check membership before an upload is attempted.
    pub async fn authorize_upload(&self, sender: &str, chat_id: &str) -> Result<(), MessageError> {
        self.ensure_member(chat_id, sender).await
    }

    pub async fn edit(&self, username: &str, id: i64, text: &str) -> Result<Outcome<()>, MessageError> {
        let text = normalize_text(text)?;
        let message = self.visible_message(id, username).await?;
        if message.sender != username {
            return Err(MessageError::NotSender);
        }
        if message.deleted_for_all {
            return Err(MessageError::Deleted);
        }

        self.messages.update_text(id, &text).await?;

        let event = ServerEvent::MessageEdited {
            chat_id: message.chat_id.clone(),
            id,
            text,
        };
        Ok(Outcome::new((), vec![Fanout::Chat(message.chat_id, event)]))
    }

    pub async fn delete(&self, username: &str, id: i64, scope: DeleteScope) -> Result<Outcome<()>, MessageError> {
        let message = self.visible_message(id, username).await?;

        match scope {
            DeleteScope::Me => {
                self.messages.hide_for_user(id, username).await?;
                Ok(Outcome::new((), Vec::new()))
            }
            DeleteScope::All => {
                if message.sender != username {
                    return Err(MessageError::NotSender);
                }
                self.messages.mark_deleted_for_all(id).await?;
                let event = ServerEvent::MessageDeletedAll {
                    chat_id: message.chat_id.clone(),
                    id,
                };
                Ok(Outcome::new((), vec![Fanout::Chat(message.chat_id, event)]))
            }
        }
    }

    pub async fn add_reaction(&self, username: &str, id: i64, emoji: &str) -> Result<Outcome<()>, MessageError> {
        let emoji = normalize_emoji(emoji)?;
        let message = self.visible_message(id, username).await?;
        if message.deleted_for_all {
            return Err(MessageError::Deleted);
        }

        if !self.messages.add_reaction(id, username, &emoji).await? {
            return Ok(Outcome::new((), Vec::new()));
        }

        let event = ServerEvent::ReactionAdded {
            chat_id: message.chat_id.clone(),
            message_id: id,
            emoji,
            username: username.to_string(),
        };
        Ok(Outcome::new((), vec![Fanout::Chat(message.chat_id, event)]))
    }

    pub async fn remove_reaction(&self, username: &str, id: i64, emoji: &str) -> Result<Outcome<()>, MessageError> {
        let emoji = normalize_emoji(emoji)?;
        let message = self.visible_message(id, username).await?;

        if !self.messages.remove_reaction(id, username, &emoji).await? {
            return Ok(Outcome::new((), Vec::new()));
        }

        let event = ServerEvent::ReactionRemoved {
            chat_id: message.chat_id.clone(),
            message_id: id,
            emoji,
            username: username.to_string(),
        };
        Ok(Outcome::new((), vec![Fanout::Chat(message.chat_id, event)]))
    }
}
