//! Client Frames
//!
//! JSON frames a connected client may send. The `type` field selects the
//! variant; unknown types and malformed frames fail to parse and are dropped
//! by the gateway.

use serde::Deserialize;
use serde_json::Value;

/// Inbound gateway frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Typing {
        chat_id: String,
        #[serde(default)]
        is_typing: bool,
    },
    Delivered {
        chat_id: String,
        message_id: i64,
    },
    CallOffer(CallFrame),
    CallAnswer(CallFrame),
    CallAccept(CallFrame),
    CallReject(CallFrame),
    CallEnd(CallFrame),
    CallTimeout(CallFrame),
    CallRingAck(CallFrame),
    Pong {
        #[serde(default)]
        ts: Option<i64>,
    },
}

impl ClientFrame {
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Typing { .. } => "typing",
            Self::Delivered { .. } => "delivered",
            Self::CallOffer(_) => "call_offer",
            Self::CallAnswer(_) => "call_answer",
            Self::CallAccept(_) => "call_accept",
            Self::CallReject(_) => "call_reject",
            Self::CallEnd(_) => "call_end",
            Self::CallTimeout(_) => "call_timeout",
            Self::CallRingAck(_) => "call_ring_ack",
            Self::Pong { .. } => "pong",
        }
    }
}

/// Call signaling frame. Only `chat_id` and `call_id` are required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallFrame {
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub call_id: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl CallFrame {
    pub fn is_addressable(&self) -> bool {
        !self.chat_id.trim().is_empty() && !self.call_id.trim().is_empty()
    }
}
