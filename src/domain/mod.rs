//! # Domain Layer
//!
//! Entities, repository traits and the realtime event vocabulary. Nothing in
//! here depends on the infrastructure or presentation layers.
//!
//! - **entities**: users, chats, messages, refresh-token records
//! - **events**: server-to-client events and their fan-out targets

pub mod entities;
pub mod events;

pub use entities::*;
pub use events::{CallMode, CallSignal, Fanout, MessagePayload, ServerEvent};
