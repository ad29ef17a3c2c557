//! WebSocket Connection Handler
//!
//! Upgrades `/gateway`, authenticates from the query string and runs the
//! reader, writer and heartbeat tasks of one connection.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::gateway::Gateway;
use super::registry::{ConnectionHandle, EventReceiver};
use super::session::SessionState;
use crate::application::dto::request::GatewayQuery;
use crate::domain::ServerEvent;
use crate::startup::AppState;

/// Close code sent when the handshake token is missing or invalid.
pub const UNAUTHORIZED_CLOSE_CODE: u16 = 4401;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<GatewayQuery>,
    State(state): State<AppState>,
) -> Response {
    let ws = ws.max_message_size(state.gateway.max_message_size());

    let token = query.token.as_deref().map(str::trim).unwrap_or_default();
    let username = if token.is_empty() {
        None
    } else {
        match state.tokens.verify(token) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                tracing::debug!(error = %e, "Gateway token rejected");
                None
            }
        }
    };

    match username {
        Some(username) => {
            let gateway = Arc::clone(&state.gateway);
            ws.on_upgrade(move |socket| handle_socket(socket, gateway, username, query.since))
        }
        None => ws.on_upgrade(reject_socket),
    }
}

async fn reject_socket(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: UNAUTHORIZED_CLOSE_CODE,
        reason: "unauthorized".into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "Failed to send unauthorized close");
    }
}

/// Drive one authenticated connection until any of its tasks exits.
async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>, username: String, since: Option<i64>) {
    let (conn, rx) = ConnectionHandle::channel();
    let session = Arc::new(SessionState::new(conn.id(), username.as_str()));

    // Registered before replay; unregistered when the guard drops.
    let _guard = gateway.register(&username, conn.clone());
    tracing::info!(username = %username, connection_id = %conn.id(), "Gateway connected");

    if let Some(since) = since {
        if let Err(e) = gateway.replay(&username, since, &conn).await {
            tracing::warn!(username = %username, since, error = %e, "Replay failed");
        }
    }

    let (sink, mut stream) = socket.split();
    let cancel = CancellationToken::new();

    let writer = tokio::spawn(write_loop(sink, rx, cancel.clone()));
    let heartbeat = tokio::spawn(heartbeat_loop(
        Arc::clone(&gateway),
        Arc::clone(&session),
        conn.clone(),
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    gateway.handle_text(&session, &conn, text.as_str()).await;
                }
                Some(Ok(Message::Pong(_))) => session.pong(),
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(connection_id = %conn.id(), "Connection closed by client");
                    break;
                }
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    cancel.cancel();
    let (writer, heartbeat) = tokio::join!(writer, heartbeat);
    for (task, result) in [("writer", writer), ("heartbeat", heartbeat)] {
        if let Err(e) = result {
            tracing::warn!(connection_id = %conn.id(), task, error = %e, "Connection task failed");
        }
    }

    tracing::info!(username = %username, connection_id = %conn.id(), "Gateway disconnected");
}

/// Serialize queued events onto the socket in queue order.
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: EventReceiver, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(event.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(event = event.event_type(), error = %e, "Failed to serialize event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    cancel.cancel();
}

/// Ping every interval; give up once no pong arrived within the timeout.
async fn heartbeat_loop(
    gateway: Arc<Gateway>,
    session: Arc<SessionState>,
    conn: ConnectionHandle,
    cancel: CancellationToken,
) {
    let mut ticker = interval(gateway.heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !session.is_alive(gateway.heartbeat_timeout()) {
                    tracing::info!(
                        username = %session.username,
                        connection_id = %session.connection_id,
                        "Heartbeat timeout, closing connection"
                    );
                    break;
                }
                if !gateway.broadcaster().push(&conn, Arc::new(ServerEvent::ping())) {
                    break;
                }
            }
        }
    }

    cancel.cancel();
}
