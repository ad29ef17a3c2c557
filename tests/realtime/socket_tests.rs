//! Live Gateway Socket Tests
//!
//! Serves the real router on a loopback port and talks to `/gateway` with a
//! WebSocket client.

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use messenger_server::presentation::websocket::UNAUTHORIZED_CLOSE_CODE;

use crate::common::{test_settings, TestApp};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(app: &TestApp) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    addr
}

async fn open(addr: SocketAddr, token: &str) -> Client {
    let url = format!("ws://{}/gateway?token={}", addr, token);
    let (client, _) = connect_async(url).await.unwrap();
    client
}

/// Read until the server closes; returns the close code, if one was sent.
async fn until_closed(client: &mut Client) -> Option<u16> {
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(frame) = client.next().await {
            match frame {
                Ok(Message::Close(frame)) => return frame.map(|f| u16::from(f.code)),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    })
    .await
    .expect("server never closed the socket")
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn bad_token_is_closed_with_4401_and_never_registered() {
    let app = TestApp::new();
    let addr = serve(&app).await;

    let mut client = open(addr, "not-a-jwt").await;
    assert_eq!(until_closed(&mut client).await, Some(UNAUTHORIZED_CLOSE_CODE));
    assert_eq!(app.state.gateway.registry().connection_count(), 0);

    let mut missing = open(addr, "").await;
    assert_eq!(until_closed(&mut missing).await, Some(UNAUTHORIZED_CLOSE_CODE));
    assert_eq!(app.state.gateway.registry().connection_count(), 0);
}

#[tokio::test]
async fn silent_client_is_closed_and_unregistered_after_heartbeat_timeout() {
    let mut settings = test_settings();
    settings.websocket.heartbeat_interval_secs = 1;
    settings.websocket.heartbeat_timeout_secs = 1;
    let app = TestApp::with_settings(settings);
    app.store.seed_chat("c1", true, &["alice", "bob"]);
    let addr = serve(&app).await;

    let mut client = open(addr, &app.token_for("alice")).await;
    let registry = app.state.gateway.registry().clone();
    wait_for(|| registry.is_online("alice")).await;

    // Never answers the server's pings.
    until_closed(&mut client).await;
    wait_for(|| !registry.is_online("alice")).await;
    assert_eq!(registry.connection_count(), 0);
}
