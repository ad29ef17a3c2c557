//! Route Configuration
//!
//! Configures all HTTP routes for the API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{auth_middleware, logging, rate_limit_auth, rate_limit_send};
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Room for multipart boundaries and the text fields around the file.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        // WebSocket gateway, authenticated by the `token` query parameter
        .route("/gateway", get(ws_handler))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(logging::track_metrics))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes(state.clone()))
        .merge(message_routes(state.clone()))
        .nest("/chats", chat_routes(state))
}

/// Authentication routes (public); credential and refresh calls are rate
/// limited per client IP
fn auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh_token))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_auth))
        .route("/logout", post(handlers::auth::logout))
        .merge(
            Router::new()
                .route("/logout-all", post(handlers::auth::logout_all))
                .route_layer(middleware::from_fn_with_state(state, auth_middleware)),
        )
}

/// Message routes (protected); creating a message is rate limited per user
fn message_routes(state: AppState) -> Router<AppState> {
    let upload_limit = state.settings.media.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    let sending = Router::new()
        .route("/messages", post(handlers::message::send_message))
        .route("/messages/{message_id}/forward", post(handlers::message::forward_message))
        .route(
            "/upload",
            post(handlers::upload::upload_media).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_send));

    Router::new()
        .route("/messages", get(handlers::message::list_messages))
        .route("/messages/{message_id}/status", get(handlers::message::message_status))
        .route(
            "/messages/{message_id}",
            patch(handlers::message::edit_message).delete(handlers::message::delete_message),
        )
        .route(
            "/messages/{message_id}/reactions",
            post(handlers::message::add_reaction).delete(handlers::message::remove_reaction),
        )
        .merge(sending)
        // Runs before the send limiter, which keys on the authenticated user
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Chat routes (protected)
fn chat_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::chat::list_chats).post(handlers::chat::create_group))
        .route("/dm", post(handlers::chat::open_dm))
        .route("/{chat_id}", delete(handlers::chat::delete_chat))
        .route("/{chat_id}/read", post(handlers::chat::mark_read))
        .route("/{chat_id}/invite", post(handlers::chat::invite))
        .route("/{chat_id}/members/role", patch(handlers::chat::set_role))
        .route("/{chat_id}/members/{username}", delete(handlers::chat::remove_member))
        .route(
            "/{chat_id}/pins",
            get(handlers::chat::list_pins).post(handlers::chat::pin_message),
        )
        .route("/{chat_id}/pins/{message_id}", delete(handlers::chat::unpin_message))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
