//! Chat Handlers
//!
//! Chat lifecycle, membership moderation, pins and read markers. Each
//! mutation delivers its events only after the service call has committed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{CreateGroupRequest, PinRequest, ReadQuery, RoleUpdateRequest, UsernameRequest};
use crate::application::dto::response::{
    ChatListResponse, ChatResponse, OkResponse, PinResponse, PinsResponse, ReadResponse,
};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

pub async fn list_chats(State(state): State<AppState>, auth: AuthUser) -> Result<Json<ChatListResponse>, AppError> {
    let chats = state.chats.list(&auth.username).await?;
    Ok(Json(ChatListResponse {
        chats: chats.into_iter().map(ChatResponse::from).collect(),
    }))
}

pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), AppError> {
    let chat = state.chats.create_group(&auth.username, &body.title).await?;
    Ok((StatusCode::CREATED, Json(ChatResponse::from(chat))))
}

pub async fn open_dm(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UsernameRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let chat = state.chats.open_dm(&auth.username, &body.username).await?;
    Ok(Json(ChatResponse::from(chat)))
}

/// Markers never move backwards; the stored value is returned.
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<ReadResponse>, AppError> {
    let outcome = state.chats.mark_read(&auth.username, &chat_id, query.last_id).await?;
    let last_read_id = outcome.value;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(ReadResponse { last_read_id }))
}

pub async fn invite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<UsernameRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state.chats.invite(&auth.username, &chat_id, &body.username).await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}

pub async fn set_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<RoleUpdateRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state
        .chats
        .set_role(&auth.username, &chat_id, &body.username, &body.role)
        .await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, username)): Path<(String, String)>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state.chats.remove_member(&auth.username, &chat_id, &username).await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}

pub async fn list_pins(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<PinsResponse>, AppError> {
    let pins = state.chats.pins(&auth.username, &chat_id).await?;
    Ok(Json(PinsResponse {
        pins: pins.into_iter().map(PinResponse::from).collect(),
    }))
}

pub async fn pin_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<PinRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state.chats.pin(&auth.username, &chat_id, body.message_id).await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}

pub async fn unpin_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(String, i64)>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state.chats.unpin(&auth.username, &chat_id, message_id).await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state.chats.delete(&auth.username, &chat_id).await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}
