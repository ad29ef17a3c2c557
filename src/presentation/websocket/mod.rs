//! WebSocket Gateway
//!
//! Live delivery of chat events over persistent connections.

pub mod broadcaster;
pub mod gateway;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod session;

pub use broadcaster::Broadcaster;
pub use gateway::{Gateway, OFFLINE_REASON};
pub use handler::{ws_handler, UNAUTHORIZED_CLOSE_CODE};
pub use messages::{CallFrame, ClientFrame};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, EventReceiver, RegistrationGuard};
pub use session::SessionState;
