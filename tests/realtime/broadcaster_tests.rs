//! Fan-out Broadcaster Tests

use std::sync::Arc;

use messenger_server::domain::{Fanout, ServerEvent};
use messenger_server::presentation::websocket::{Broadcaster, ConnectionHandle, ConnectionRegistry};
use pretty_assertions::assert_eq;

use crate::common::MemoryStore;

fn typing(chat_id: &str) -> ServerEvent {
    ServerEvent::Typing {
        chat_id: chat_id.to_string(),
        username: "alice".to_string(),
        is_typing: true,
    }
}

fn broadcaster() -> (Arc<MemoryStore>, Arc<ConnectionRegistry>, Broadcaster) {
    let store = MemoryStore::new();
    let registry = Arc::new(ConnectionRegistry::new());
    let broadcaster = Broadcaster::new(Arc::clone(&registry), store.clone());
    (store, registry, broadcaster)
}

#[test]
fn broadcasting_to_offline_user_is_a_no_op() {
    let (_store, registry, broadcaster) = broadcaster();
    assert_eq!(broadcaster.broadcast_to_users(&["ghost"], typing("c1")), 0);
    assert!(!registry.is_online("ghost"));
    assert_eq!(registry.connection_count(), 0);
}

#[test]
fn duplicate_usernames_push_once_per_connection() {
    let (_store, registry, broadcaster) = broadcaster();
    let (phone, mut phone_rx) = ConnectionHandle::channel();
    let (laptop, mut laptop_rx) = ConnectionHandle::channel();
    registry.add("alice", phone);
    registry.add("alice", laptop);

    let delivered = broadcaster.broadcast_to_users(&["alice", "alice", "alice"], typing("c1"));
    assert_eq!(delivered, 2);

    assert!(phone_rx.try_recv().is_ok());
    assert!(phone_rx.try_recv().is_err());
    assert!(laptop_rx.try_recv().is_ok());
    assert!(laptop_rx.try_recv().is_err());
}

#[tokio::test]
async fn chat_broadcast_reaches_every_member_connection_only() {
    let (store, registry, broadcaster) = broadcaster();
    store.seed_chat("c1", true, &["alice", "bob"]);
    store.add_user("carol");

    let mut receivers = Vec::new();
    for user in ["alice", "alice", "bob"] {
        let (conn, rx) = ConnectionHandle::channel();
        registry.add(user, conn);
        receivers.push(rx);
    }
    let (carol, mut carol_rx) = ConnectionHandle::channel();
    registry.add("carol", carol);

    let delivered = broadcaster.broadcast_to_chat("c1", typing("c1")).await;
    assert_eq!(delivered, 3);

    for rx in &mut receivers {
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type(), "typing");
    }
    assert!(carol_rx.try_recv().is_err());
}

#[tokio::test]
async fn closed_connection_does_not_block_the_others() {
    let (store, registry, broadcaster) = broadcaster();
    store.seed_chat("c1", true, &["alice", "bob"]);

    let (gone, gone_rx) = ConnectionHandle::channel();
    let (live, mut live_rx) = ConnectionHandle::channel();
    registry.add("alice", gone);
    registry.add("bob", live);
    drop(gone_rx);

    assert_eq!(broadcaster.broadcast_to_chat("c1", typing("c1")).await, 1);
    assert!(live_rx.try_recv().is_ok());
}

#[tokio::test]
async fn deliver_handles_chat_and_explicit_targets_in_order() {
    let (store, registry, broadcaster) = broadcaster();
    store.seed_chat("c1", true, &["alice", "bob"]);

    let (bob, mut bob_rx) = ConnectionHandle::channel();
    registry.add("bob", bob);

    let fanout = vec![
        Fanout::Chat(
            "c1".to_string(),
            ServerEvent::MemberRemoved {
                chat_id: "c1".to_string(),
                username: "carol".to_string(),
            },
        ),
        Fanout::Users(
            vec!["bob".to_string()],
            ServerEvent::ChatDeleted {
                chat_id: "c9".to_string(),
            },
        ),
    ];
    assert_eq!(broadcaster.deliver(fanout).await, 2);

    assert_eq!(bob_rx.try_recv().unwrap().event_type(), "member_removed");
    assert_eq!(bob_rx.try_recv().unwrap().event_type(), "chat_deleted");
}

#[tokio::test]
async fn unknown_chat_broadcast_is_dropped() {
    let (_store, registry, broadcaster) = broadcaster();
    let (conn, mut rx) = ConnectionHandle::channel();
    registry.add("alice", conn);

    assert_eq!(broadcaster.broadcast_to_chat("nope", typing("nope")).await, 0);
    assert!(rx.try_recv().is_err());
}
