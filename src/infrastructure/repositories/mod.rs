//! Repository Implementations
//!
//! PostgreSQL implementations of the repository traits defined in the
//! domain layer.
//!
//! ## Available Repositories
//!
//! - **PgUserRepository** - accounts and password hashes
//! - **PgChatRepository** - chats, membership, pins, read markers
//! - **PgMessageRepository** - messages, receipts, reactions, replay
//! - **PgRefreshTokenRepository** - refresh-token chains

pub mod chat_repository;
pub mod message_repository;
pub mod refresh_token_repository;
pub mod user_repository;

pub use chat_repository::PgChatRepository;
pub use message_repository::PgMessageRepository;
pub use refresh_token_repository::PgRefreshTokenRepository;
pub use user_repository::PgUserRepository;
