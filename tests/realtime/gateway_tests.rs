//! Gateway Frame Handling Tests
//!
//! Drives the gateway through connection handles, without a socket.

use std::sync::Arc;

use messenger_server::config::WebSocketSettings;
use messenger_server::domain::{CallMode, MessageRepository, NewMessage, ServerEvent};
use messenger_server::presentation::websocket::{
    Broadcaster, ConnectionHandle, ConnectionRegistry, EventReceiver, Gateway, RegistrationGuard, SessionState,
    OFFLINE_REASON,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{drain, drain_types, MemoryStore};

struct Harness {
    store: Arc<MemoryStore>,
    gateway: Gateway,
}

struct Client {
    session: SessionState,
    conn: ConnectionHandle,
    rx: EventReceiver,
    _guard: RegistrationGuard,
}

impl Harness {
    fn new() -> Self {
        Self::with_replay_limit(500)
    }

    fn with_replay_limit(replay_limit: i64) -> Self {
        let store = MemoryStore::new();
        store.seed_chat("c1", true, &["alice", "bob"]);
        store.add_user("carol");

        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), store.clone()));
        let settings = WebSocketSettings {
            max_message_size: 65536,
            heartbeat_interval_secs: 20,
            heartbeat_timeout_secs: 45,
            replay_limit,
        };
        let gateway = Gateway::new(registry, broadcaster, store.clone(), store.clone(), &settings);
        Self { store, gateway }
    }

    fn connect(&self, username: &str) -> Client {
        let (conn, rx) = ConnectionHandle::channel();
        let guard = self.gateway.register(username, conn.clone());
        Client {
            session: SessionState::new(conn.id(), username),
            conn,
            rx,
            _guard: guard,
        }
    }

    async fn frame(&self, client: &Client, frame: serde_json::Value) {
        self.gateway
            .handle_text(&client.session, &client.conn, &frame.to_string())
            .await;
    }

    async fn message(&self, chat_id: &str, sender: &str, text: &str) -> i64 {
        self.store
            .create(NewMessage {
                chat_id: chat_id.to_string(),
                sender: sender.to_string(),
                text: text.to_string(),
                media: None,
                reply: None,
            })
            .await
            .unwrap()
            .id
    }
}

#[tokio::test]
async fn typing_is_broadcast_to_members_only() {
    let h = Harness::new();
    let mut alice = h.connect("alice");
    let mut bob = h.connect("bob");
    let mut carol = h.connect("carol");

    h.frame(&alice, json!({ "type": "typing", "chat_id": "c1", "is_typing": true })).await;

    let events = drain(&mut bob.rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &*events[0],
        ServerEvent::Typing { username, is_typing: true, .. } if username == "alice"
    ));
    assert_eq!(drain_types(&mut alice.rx), vec!["typing"]);

    // Outsiders can neither receive nor send typing for the chat.
    assert!(drain(&mut carol.rx).is_empty());
    h.frame(&carol, json!({ "type": "typing", "chat_id": "c1" })).await;
    assert!(drain(&mut bob.rx).is_empty());
}

#[tokio::test]
async fn delivered_is_recorded_and_broadcast() {
    let h = Harness::new();
    let id = h.message("c1", "alice", "hi").await;
    let mut alice = h.connect("alice");
    let bob = h.connect("bob");

    h.frame(&bob, json!({ "type": "delivered", "chat_id": "c1", "message_id": id })).await;

    assert!(h.store.is_delivered(id, "bob"));
    let events = drain(&mut alice.rx);
    assert!(matches!(
        &*events[0],
        ServerEvent::Delivered { message_id, username, .. } if *message_id == id && username == "bob"
    ));

    h.frame(&bob, json!({ "type": "delivered", "chat_id": "c1", "message_id": 0 })).await;
    assert!(drain(&mut alice.rx).is_empty());
}

#[tokio::test]
async fn call_offer_to_offline_callee_times_out_on_caller_connection_only() {
    let h = Harness::new();
    let mut caller = h.connect("alice");
    let mut other_device = h.connect("alice");

    h.frame(
        &caller,
        json!({ "type": "call_offer", "chat_id": "c1", "call_id": "call-1", "mode": "video", "data": { "sdp": "x" } }),
    )
    .await;

    let events = drain(&mut caller.rx);
    assert_eq!(events.len(), 1);
    match &*events[0] {
        ServerEvent::CallTimeout(signal) => {
            assert_eq!(signal.reason, OFFLINE_REASON);
            assert_eq!(signal.call_id, "call-1");
            assert_eq!(signal.mode, CallMode::Video);
            assert_eq!(signal.data, None);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(drain(&mut other_device.rx).is_empty());
}

#[tokio::test]
async fn call_offer_is_relayed_to_online_peers() {
    let h = Harness::new();
    let mut caller = h.connect("alice");
    let mut bob = h.connect("bob");

    h.frame(
        &caller,
        json!({ "type": "call_offer", "chat_id": "c1", "call_id": "call-2", "data": { "sdp": "offer" } }),
    )
    .await;

    let events = drain(&mut bob.rx);
    assert_eq!(events.len(), 1);
    match &*events[0] {
        ServerEvent::IncomingCall(signal) => {
            assert_eq!(signal.username, "alice");
            assert_eq!(signal.mode, CallMode::Voice);
            assert_eq!(signal.duration, 0);
            assert!(signal.started_at > 0);
            assert_eq!(signal.data, Some(json!({ "sdp": "offer" })));
        }
        other => panic!("unexpected event {:?}", other),
    }
    // The sender never hears its own signal.
    assert!(drain(&mut caller.rx).is_empty());
}

#[tokio::test]
async fn call_accept_is_relayed_as_answer() {
    let h = Harness::new();
    let mut alice = h.connect("alice");
    let bob = h.connect("bob");

    h.frame(&bob, json!({ "type": "call_accept", "chat_id": "c1", "call_id": "call-3" })).await;
    h.frame(&bob, json!({ "type": "call_end", "chat_id": "c1", "call_id": "call-3", "duration": 42, "reason": " hangup " }))
        .await;

    let events = drain(&mut alice.rx);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type(), "call_answer");
    match &*events[1] {
        ServerEvent::CallEnd(signal) => {
            assert_eq!(signal.duration, 42);
            assert_eq!(signal.reason, "hangup");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn unaddressable_and_malformed_frames_are_dropped() {
    let h = Harness::new();
    let alice = h.connect("alice");
    let mut bob = h.connect("bob");

    h.frame(&alice, json!({ "type": "call_offer", "chat_id": "c1" })).await;
    h.frame(&alice, json!({ "type": "shout", "chat_id": "c1" })).await;
    h.gateway.handle_text(&alice.session, &alice.conn, "{not json").await;

    assert!(drain(&mut bob.rx).is_empty());
}

#[tokio::test]
async fn replay_sends_missed_messages_in_order() {
    let h = Harness::new();
    h.store.seed_chat("c2", true, &["carol"]);

    let first = h.message("c1", "alice", "one").await;
    let _foreign = h.message("c2", "carol", "not yours").await;
    let second = h.message("c1", "bob", "two").await;
    let third = h.message("c1", "alice", "three").await;
    h.store.hide_for_user(second, "alice").await.unwrap();

    let mut alice = h.connect("alice");
    let replayed = h.gateway.replay("alice", first - 1, &alice.conn).await.unwrap();
    assert_eq!(replayed, 2);

    let ids: Vec<i64> = drain(&mut alice.rx)
        .iter()
        .map(|e| match &**e {
            ServerEvent::Message(m) => m.id,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(ids, vec![first, third]);

    assert_eq!(h.gateway.replay("alice", third, &alice.conn).await.unwrap(), 0);
}

#[tokio::test]
async fn replay_stops_at_the_configured_limit() {
    let h = Harness::with_replay_limit(2);
    let mut ids = Vec::new();
    for text in ["one", "two", "three", "four"] {
        ids.push(h.message("c1", "bob", text).await);
    }

    let mut alice = h.connect("alice");
    assert_eq!(h.gateway.replay("alice", 0, &alice.conn).await.unwrap(), 2);

    let replayed: Vec<i64> = drain(&mut alice.rx)
        .iter()
        .filter_map(|e| match &**e {
            ServerEvent::Message(m) => Some(m.id),
            _ => None,
        })
        .collect();
    assert_eq!(replayed, ids[..2].to_vec());

    // The client resumes from the last id it saw.
    assert_eq!(h.gateway.replay("alice", ids[1], &alice.conn).await.unwrap(), 2);
    assert_eq!(drain(&mut alice.rx).len(), 2);
}

#[tokio::test]
async fn registration_guard_takes_user_offline() {
    let h = Harness::new();
    let client = h.connect("alice");
    assert!(h.gateway.registry().is_online("alice"));
    drop(client);
    assert!(!h.gateway.registry().is_online("alice"));
}
