//! Chat Service
//!
//! Chat lifecycle, membership moderation, pins and read markers.
//!
//! Moderation rights depend on the chat kind: in a DM every member moderates,
//! in a group only the owner and admins do. Roles can only be changed by the
//! owner, and the owner can neither be demoted nor removed.

use std::sync::Arc;

use super::Outcome;
use crate::domain::{Chat, ChatRepository, Fanout, MemberRole, MessageRepository, Pin, ServerEvent, UserRepository};
use crate::shared::error::AppError;
use crate::shared::validation::validate_username;

/// Longest accepted group title, in characters
pub const MAX_TITLE_CHARS: usize = 40;

/// Pins returned by a listing
pub const MAX_LISTED_PINS: i64 = 20;

/// Chat service errors
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Chat not found")]
    NotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Not a member of this chat")]
    NotMember,

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Bad request: {0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotFound => AppError::NotFound("Chat not found".into()),
            ChatError::UserNotFound => AppError::NotFound("User not found".into()),
            ChatError::MessageNotFound => AppError::NotFound("Message not found".into()),
            ChatError::MemberNotFound => AppError::NotFound("Member not found".into()),
            ChatError::NotMember => AppError::Forbidden("Not a member".into()),
            ChatError::Forbidden(msg) => AppError::Forbidden(msg.into()),
            ChatError::BadRequest(msg) => AppError::BadRequest(msg.into()),
            ChatError::App(e) => e,
        }
    }
}

pub struct ChatService {
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
    users: Arc<dyn UserRepository>,
}

impl ChatService {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        messages: Arc<dyn MessageRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self { chats, messages, users }
    }

    async fn chat(&self, chat_id: &str) -> Result<Chat, ChatError> {
        self.chats.find_chat(chat_id).await?.ok_or(ChatError::NotFound)
    }

    async fn group(&self, chat_id: &str) -> Result<Chat, ChatError> {
        let chat = self.chat(chat_id).await?;
        if chat.is_group() {
            Ok(chat)
        } else {
            Err(ChatError::NotFound)
        }
    }

    async fn ensure_moderator(&self, chat: &Chat, username: &str, denied: &'static str) -> Result<(), ChatError> {
        let role = self.chats.member_role(&chat.id, username).await?;
        if chat.can_moderate(role) {
            Ok(())
        } else {
            Err(ChatError::Forbidden(denied))
        }
    }

    async fn ensure_user(&self, username: &str) -> Result<(), ChatError> {
        validate_username(username)?;
        if self.users.exists(username).await? {
            Ok(())
        } else {
            Err(ChatError::UserNotFound)
        }
    }

    pub async fn list(&self, username: &str) -> Result<Vec<Chat>, ChatError> {
        Ok(self.chats.chats_for_user(username).await?)
    }

    /// Create a group with the caller as its only member and owner.
    pub async fn create_group(&self, username: &str, title: &str) -> Result<Chat, ChatError> {
        let title = title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
            return Err(ChatError::BadRequest("Title must be 1-40 characters"));
        }

        let chat = Chat::new_group(title, username);
        self.chats
            .create_chat(&chat, &[(username.to_string(), MemberRole::Owner)])
            .await?;

        tracing::info!(chat_id = %chat.id, owner = %username, "Group created");
        Ok(chat)
    }

    /// Open (or re-open) the DM between the caller and `other`.
    pub async fn open_dm(&self, username: &str, other: &str) -> Result<Chat, ChatError> {
        let other = other.trim();
        if other == username {
            return Err(ChatError::BadRequest("Cannot open a DM with yourself"));
        }
        self.ensure_user(other).await?;

        let chat = Chat::new_dm(username, other);
        let members = [
            (username.to_string(), MemberRole::Admin),
            (other.to_string(), MemberRole::Admin),
        ];
        if !self.chats.create_chat(&chat, &members).await? {
            // Either side may have left earlier; re-add both.
            for (member, role) in &members {
                self.chats.add_member(&chat.id, member, *role).await?;
            }
            return self.chat(&chat.id).await;
        }
        Ok(chat)
    }

    pub async fn mark_read(&self, username: &str, chat_id: &str, last_id: i64) -> Result<Outcome<i64>, ChatError> {
        if last_id <= 0 {
            return Err(ChatError::BadRequest("last_id must be positive"));
        }
        if !self.chats.is_member(chat_id, username).await? {
            return Err(ChatError::NotMember);
        }

        let stored = self.chats.mark_read(chat_id, username, last_id).await?;
        let event = ServerEvent::Read {
            chat_id: chat_id.to_string(),
            username: username.to_string(),
            last_read_id: stored,
        };
        Ok(Outcome::new(stored, vec![Fanout::Chat(chat_id.to_string(), event)]))
    }

    pub async fn invite(&self, username: &str, chat_id: &str, invitee: &str) -> Result<Outcome<()>, ChatError> {
        let invitee = invitee.trim();
        if invitee == username {
            return Err(ChatError::BadRequest("Cannot invite yourself"));
        }
        let chat = self.chat(chat_id).await?;
        if !chat.is_group() {
            return Err(ChatError::BadRequest("Invites are only possible in group chats"));
        }
        self.ensure_moderator(&chat, username, "Only owner or admin can invite").await?;
        self.ensure_user(invitee).await?;

        self.chats.add_member(chat_id, invitee, MemberRole::Member).await?;

        let event = ServerEvent::Invited {
            chat_id: chat_id.to_string(),
        };
        Ok(Outcome::new((), vec![Fanout::Users(vec![invitee.to_string()], event)]))
    }

    pub async fn set_role(
        &self,
        username: &str,
        chat_id: &str,
        target: &str,
        role: &str,
    ) -> Result<Outcome<()>, ChatError> {
        let target = target.trim();
        let role = match MemberRole::parse(role) {
            Some(role @ (MemberRole::Admin | MemberRole::Member)) => role,
            _ => return Err(ChatError::BadRequest("Role must be admin or member")),
        };

        let chat = self.group(chat_id).await?;
        if self.chats.member_role(chat_id, username).await? != Some(MemberRole::Owner) {
            return Err(ChatError::Forbidden("Only the owner can change roles"));
        }
        if target == chat.created_by {
            return Err(ChatError::BadRequest("Cannot change the owner's role"));
        }
        if self.chats.member_role(chat_id, target).await?.is_none() {
            return Err(ChatError::MemberNotFound);
        }

        self.chats.set_member_role(chat_id, target, role).await?;

        let event = ServerEvent::RoleUpdated {
            chat_id: chat_id.to_string(),
            username: target.to_string(),
            role,
        };
        Ok(Outcome::new((), vec![Fanout::Chat(chat_id.to_string(), event)]))
    }

    pub async fn remove_member(&self, username: &str, chat_id: &str, target: &str) -> Result<Outcome<()>, ChatError> {
        let target = target.trim();
        let chat = self.group(chat_id).await?;
        self.ensure_moderator(&chat, username, "Only owner or admin can remove members")
            .await?;
        if target == chat.created_by {
            return Err(ChatError::BadRequest("The owner cannot be removed"));
        }

        self.chats.remove_member(chat_id, target).await?;

        let removed = ServerEvent::MemberRemoved {
            chat_id: chat_id.to_string(),
            username: target.to_string(),
        };
        let gone = ServerEvent::ChatDeleted {
            chat_id: chat_id.to_string(),
        };
        Ok(Outcome::new(
            (),
            vec![
                Fanout::Chat(chat_id.to_string(), removed),
                Fanout::Users(vec![target.to_string()], gone),
            ],
        ))
    }

    pub async fn pin(&self, username: &str, chat_id: &str, message_id: i64) -> Result<Outcome<()>, ChatError> {
        let chat = self.chat(chat_id).await?;
        self.ensure_moderator(&chat, username, "Only owner or admin can pin").await?;
        let in_chat = self
            .messages
            .find_by_id(message_id)
            .await?
            .is_some_and(|m| m.chat_id == chat_id);
        if !in_chat {
            return Err(ChatError::MessageNotFound);
        }

        self.chats.add_pin(chat_id, message_id, username).await?;

        let event = ServerEvent::PinAdded {
            chat_id: chat_id.to_string(),
            message_id,
        };
        Ok(Outcome::new((), vec![Fanout::Chat(chat_id.to_string(), event)]))
    }

    /// Latest pins of a chat the caller belongs to.
    pub async fn pins(&self, username: &str, chat_id: &str) -> Result<Vec<Pin>, ChatError> {
        if !self.chats.is_member(chat_id, username).await? {
            return Err(ChatError::NotMember);
        }
        Ok(self.chats.pins(chat_id, MAX_LISTED_PINS).await?)
    }

    pub async fn unpin(&self, username: &str, chat_id: &str, message_id: i64) -> Result<Outcome<()>, ChatError> {
        let chat = self.chat(chat_id).await?;
        self.ensure_moderator(&chat, username, "Only owner or admin can unpin").await?;

        self.chats.remove_pin(chat_id, message_id).await?;

        let event = ServerEvent::PinRemoved {
            chat_id: chat_id.to_string(),
            message_id,
        };
        Ok(Outcome::new((), vec![Fanout::Chat(chat_id.to_string(), event)]))
    }

    /// Groups are deleted by their creator; a DM is left, and deleted once empty.
    ///
    /// Members are captured before the mutation so they still hear about it.
    pub async fn delete(&self, username: &str, chat_id: &str) -> Result<Outcome<()>, ChatError> {
        let chat = self.chat(chat_id).await?;
        if !self.chats.is_member(chat_id, username).await? {
            return Err(ChatError::NotMember);
        }
        if chat.is_group() && chat.created_by != username {
            return Err(ChatError::Forbidden("Only the creator can delete a group"));
        }

        let members = self.chats.members(chat_id).await?;
        if chat.is_group() {
            self.chats.delete_chat(chat_id).await?;
            tracing::info!(chat_id = %chat_id, "Group deleted");
        } else if self.chats.leave_dm(chat_id, username).await? {
            tracing::info!(chat_id = %chat_id, "DM deleted, no members left");
        }

        let event = ServerEvent::ChatDeleted {
            chat_id: chat_id.to_string(),
        };
        Ok(Outcome::new((), vec![Fanout::Users(members, event)]))
    }
}
