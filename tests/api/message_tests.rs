//! Message API Tests

use axum::http::StatusCode;
use messenger_server::domain::{Media, MediaKind, MessageRepository, NewMessage, ServerEvent};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{body_json, connect, drain, drain_types, test_settings, TestApp};

fn seeded() -> TestApp {
    let app = TestApp::new();
    app.store.seed_chat("c1", true, &["alice", "bob"]);
    app.store.add_user("carol");
    app
}

async fn send(app: &TestApp, token: &str, chat_id: &str, text: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .json_auth("POST", "/api/v1/messages", json!({ "chat_id": chat_id, "text": text }), token)
        .await;
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn send_requires_authentication() {
    let app = seeded();
    let response = app
        .post_json("/api/v1/messages", json!({ "chat_id": "c1", "text": "hi" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bad_token = app
        .json_auth("POST", "/api/v1/messages", json!({ "chat_id": "c1", "text": "hi" }), "garbage")
        .await;
    assert_eq!(bad_token.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn message_reaches_every_member_connection_and_no_one_else() {
    let app = seeded();
    let alice = app.token_for("alice");

    let (_a1, mut alice_phone) = connect(&app, "alice");
    let (_a2, mut alice_laptop) = connect(&app, "alice");
    let (_b1, mut bob) = connect(&app, "bob");
    let (_c1, mut carol) = connect(&app, "carol");

    let (status, body) = send(&app, &alice, "c1", "  hello  ").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"]["text"], "hello");
    assert_eq!(body["message"]["sender"], "alice");

    let id = body["message"]["id"].as_i64().unwrap();
    for rx in [&mut alice_phone, &mut alice_laptop, &mut bob] {
        let events = drain(rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&*events[0], ServerEvent::Message(m) if m.id == id));
    }
    assert!(drain(&mut carol).is_empty());

    assert!(app.store.is_delivered(id, "alice"));
    assert!(!app.store.is_delivered(id, "bob"));
}

#[tokio::test]
async fn non_members_cannot_send() {
    let app = seeded();
    let carol = app.token_for("carol");
    let (status, body) = send(&app, &carol, "c1", "let me in").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn blank_and_oversized_text_are_rejected() {
    let app = seeded();
    let alice = app.token_for("alice");

    let (blank, _) = send(&app, &alice, "c1", "   ").await;
    assert_eq!(blank, StatusCode::BAD_REQUEST);

    let (long, _) = send(&app, &alice, "c1", &"x".repeat(2001)).await;
    assert_eq!(long, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reply_carries_truncated_preview() {
    let app = seeded();
    let alice = app.token_for("alice");
    let bob = app.token_for("bob");

    let (_, original) = send(&app, &alice, "c1", &"q".repeat(500)).await;
    let original_id = original["message"]["id"].as_i64().unwrap();

    let response = app
        .json_auth(
            "POST",
            "/api/v1/messages",
            json!({ "chat_id": "c1", "text": "answer", "reply_to_id": original_id }),
            &bob,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["message"]["reply_to_id"], original_id);
    assert_eq!(body["message"]["reply_sender"], "alice");
    assert_eq!(body["message"]["reply_text"].as_str().unwrap().chars().count(), 160);

    let missing = app
        .json_auth(
            "POST",
            "/api/v1/messages",
            json!({ "chat_id": "c1", "text": "answer", "reply_to_id": 9999 }),
            &bob,
        )
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_sender_edits_and_edit_is_broadcast() {
    let app = seeded();
    let alice = app.token_for("alice");
    let bob = app.token_for("bob");
    let (_, sent) = send(&app, &alice, "c1", "first").await;
    let id = sent["message"]["id"].as_i64().unwrap();

    let (_guard, mut bob_rx) = connect(&app, "bob");

    let forbidden = app
        .json_auth("PATCH", &format!("/api/v1/messages/{}", id), json!({ "text": "hijack" }), &bob)
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let edited = app
        .json_auth("PATCH", &format!("/api/v1/messages/{}", id), json!({ "text": "second" }), &alice)
        .await;
    assert_eq!(edited.status(), StatusCode::OK);

    assert_eq!(drain_types(&mut bob_rx), vec!["message_edited"]);
    let stored = app.store.message(id).unwrap();
    assert_eq!(stored.text, "second");
    assert!(stored.is_edited);
}

#[tokio::test]
async fn delete_scopes() {
    let app = seeded();
    let alice = app.token_for("alice");
    let bob = app.token_for("bob");
    let (_, sent) = send(&app, &alice, "c1", "secret").await;
    let id = sent["message"]["id"].as_i64().unwrap();

    let (_guard, mut bob_rx) = connect(&app, "bob");

    // Hiding for oneself is silent.
    let hide = app
        .empty_auth("DELETE", &format!("/api/v1/messages/{}?scope=me", id), &bob)
        .await;
    assert_eq!(hide.status(), StatusCode::OK);
    assert!(drain(&mut bob_rx).is_empty());

    let not_sender = app
        .empty_auth("DELETE", &format!("/api/v1/messages/{}?scope=all", id), &bob)
        .await;
    assert_eq!(not_sender.status(), StatusCode::FORBIDDEN);

    let for_all = app
        .empty_auth("DELETE", &format!("/api/v1/messages/{}?scope=all", id), &alice)
        .await;
    assert_eq!(for_all.status(), StatusCode::OK);
    assert_eq!(drain_types(&mut bob_rx), vec!["message_deleted_all"]);

    let stored = app.store.message(id).unwrap();
    assert!(stored.deleted_for_all);
    assert!(stored.text.is_empty());
}

#[tokio::test]
async fn reactions_are_idempotent() {
    let app = seeded();
    let alice = app.token_for("alice");
    let bob = app.token_for("bob");
    let (_, sent) = send(&app, &alice, "c1", "react to me").await;
    let id = sent["message"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/messages/{}/reactions", id);

    let (_guard, mut alice_rx) = connect(&app, "alice");

    for _ in 0..2 {
        let response = app.json_auth("POST", &uri, json!({ "emoji": " 👍 " }), &bob).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(drain_types(&mut alice_rx), vec!["reaction_added"]);
    assert_eq!(app.store.message(id).unwrap().reactions["👍"], vec!["bob".to_string()]);

    let removed = app
        .empty_auth("DELETE", &format!("{}?emoji=%F0%9F%91%8D", uri), &bob)
        .await;
    assert_eq!(removed.status(), StatusCode::OK);
    assert_eq!(drain_types(&mut alice_rx), vec!["reaction_removed"]);
}

#[tokio::test]
async fn sending_is_rate_limited_per_user() {
    let mut settings = test_settings();
    settings.rate_limit.max_send = 3;
    let app = TestApp::with_settings(settings);
    app.store.seed_chat("c1", true, &["alice", "bob"]);
    let alice = app.token_for("alice");
    let bob = app.token_for("bob");

    for i in 0..3 {
        let (status, _) = send(&app, &alice, "c1", &format!("msg {}", i)).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (limited, body) = send(&app, &alice, "c1", "one too many").await;
    assert_eq!(limited, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    let (other_user, _) = send(&app, &bob, "c1", "still fine").await;
    assert_eq!(other_user, StatusCode::CREATED);
}

#[tokio::test]
async fn failed_send_leaves_nothing_behind() {
    let app = seeded();
    let alice = app.token_for("alice");
    let (_guard, mut bob) = connect(&app, "bob");
    app.store
        .fail_message_writes
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let (status, body) = send(&app, &alice, "c1", "lost").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal");

    assert!(app.store.message(1).is_none());
    assert!(!app.store.is_delivered(1, "alice"));
    assert!(drain(&mut bob).is_empty());
}

async fn message_ids(app: &TestApp, token: &str, uri: &str) -> Vec<i64> {
    let response = app.get_auth(uri, token).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn history_pages_backwards_oldest_first() {
    let app = seeded();
    let alice = app.token_for("alice");
    let bob = app.token_for("bob");
    for i in 0..5 {
        send(&app, &alice, "c1", &format!("msg {}", i)).await;
    }

    assert_eq!(message_ids(&app, &bob, "/api/v1/messages?chat_id=c1").await, vec![1, 2, 3, 4, 5]);
    assert_eq!(
        message_ids(&app, &bob, "/api/v1/messages?chat_id=c1&limit=2").await,
        vec![4, 5]
    );
    assert_eq!(
        message_ids(&app, &bob, "/api/v1/messages?chat_id=c1&before_id=4&limit=2").await,
        vec![2, 3]
    );
    // Out of range limits are clamped, not rejected.
    assert_eq!(
        message_ids(&app, &bob, "/api/v1/messages?chat_id=c1&limit=0").await,
        vec![5]
    );
    assert_eq!(
        message_ids(&app, &bob, "/api/v1/messages?chat_id=c1&limit=999").await.len(),
        5
    );

    let hide = app.empty_auth("DELETE", "/api/v1/messages/5?scope=me", &bob).await;
    assert_eq!(hide.status(), StatusCode::OK);
    assert_eq!(
        message_ids(&app, &bob, "/api/v1/messages?chat_id=c1&limit=2").await,
        vec![3, 4]
    );
    assert_eq!(
        message_ids(&app, &alice, "/api/v1/messages?chat_id=c1&limit=2").await,
        vec![4, 5]
    );

    let outsider = app
        .get_auth("/api/v1/messages?chat_id=c1", &app.token_for("carol"))
        .await;
    assert_eq!(outsider.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn status_counts_everyone_but_the_sender() {
    let app = TestApp::new();
    app.store.seed_chat("c1", true, &["alice", "bob", "carol"]);
    let alice = app.token_for("alice");
    let (_, sent) = send(&app, &alice, "c1", "did you get this").await;
    let id = sent["message"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/messages/{}/status", id);

    let before = body_json(app.get_auth(&uri, &alice).await).await;
    assert_eq!(before["members_total"], 2);
    assert_eq!(before["delivered_count"], 0);
    assert_eq!(before["read_count"], 0);
    assert!(before["delivered_latest"].is_null());

    app.store.record_delivery(id, "bob").await.unwrap();
    app.store.record_delivery(id, "carol").await.unwrap();
    let read = app
        .empty_auth("POST", &format!("/api/v1/chats/c1/read?last_id={}", id), &app.token_for("bob"))
        .await;
    assert_eq!(read.status(), StatusCode::OK);

    let after = body_json(app.get_auth(&uri, &app.token_for("carol")).await).await;
    assert_eq!(after["delivered_count"], 2);
    assert_eq!(after["read_count"], 1);
    assert!(after["read_latest"].is_string());
    let members: Vec<&str> = after["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["username"].as_str().unwrap())
        .collect();
    assert_eq!(members, vec!["bob", "carol"]);

    app.store.add_user("dave");
    let outsider = app.get_auth(&uri, &app.token_for("dave")).await;
    assert_eq!(outsider.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn forward_copies_into_the_target_chat() {
    let app = seeded();
    app.store.seed_chat("c2", true, &["bob", "carol"]);
    let alice = app.token_for("alice");
    let bob = app.token_for("bob");
    let (_, sent) = send(&app, &alice, "c1", "  worth sharing  ").await;
    let id = sent["message"]["id"].as_i64().unwrap();

    let (_a, mut alice_rx) = connect(&app, "alice");
    let (_c, mut carol_rx) = connect(&app, "carol");

    let response = app
        .json_auth(
            "POST",
            &format!("/api/v1/messages/{}/forward", id),
            json!({ "target_chat_id": "c2" }),
            &bob,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["message"]["chat_id"], "c2");
    assert_eq!(body["message"]["sender"], "bob");
    assert_eq!(body["message"]["text"], "\u{21aa} Forwarded from alice: worth sharing");

    assert_eq!(drain_types(&mut carol_rx), vec!["message"]);
    assert!(drain(&mut alice_rx).is_empty());

    // Alice is not in c2.
    let not_in_target = app
        .json_auth(
            "POST",
            &format!("/api/v1/messages/{}/forward", id),
            json!({ "target_chat_id": "c2" }),
            &alice,
        )
        .await;
    assert_eq!(not_in_target.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn forward_keeps_media_and_refuses_deleted_messages() {
    let app = seeded();
    app.store.seed_chat("c2", true, &["bob"]);
    let bob = app.token_for("bob");
    let photo = app
        .store
        .create(NewMessage {
            chat_id: "c1".into(),
            sender: "alice".into(),
            text: String::new(),
            media: Some(Media {
                kind: MediaKind::Image,
                url: "https://media.example/cat.png".into(),
                mime: "image/png".into(),
                name: "cat.png".into(),
            }),
            reply: None,
        })
        .await
        .unwrap();

    let forwarded = app
        .json_auth(
            "POST",
            &format!("/api/v1/messages/{}/forward", photo.id),
            json!({ "target_chat_id": "c2" }),
            &bob,
        )
        .await;
    let body = body_json(forwarded).await;
    assert_eq!(body["message"]["media_url"], "https://media.example/cat.png");
    assert_eq!(body["message"]["text"], "\u{21aa} Forwarded from alice:");

    let alice = app.token_for("alice");
    app.empty_auth("DELETE", &format!("/api/v1/messages/{}?scope=all", photo.id), &alice)
        .await;
    let deleted = app
        .json_auth(
            "POST",
            &format!("/api/v1/messages/{}/forward", photo.id),
            json!({ "target_chat_id": "c2" }),
            &bob,
        )
        .await;
    assert_eq!(deleted.status(), StatusCode::BAD_REQUEST);
}
