//! Message Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{
    DeleteMessageQuery, EditMessageRequest, ForwardRequest, HistoryQuery, ReactionQuery, ReactionRequest,
    SendMessageRequest,
};
use crate::application::dto::response::{MessageResponse, MessageStatusResponse, MessagesResponse, OkResponse};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validate;
use crate::startup::AppState;

/// Send message to chat
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    validate(&body)?;

    let outcome = state
        .messages
        .send(&auth.username, &body.chat_id, &body.text, body.reply_to_id)
        .await?;

    let response = MessageResponse::from(&outcome.value);
    state.broadcaster().deliver(outcome.fanout).await;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Page backwards through a chat with `before_id`.
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagesResponse>, AppError> {
    let messages = state
        .messages
        .history(&auth.username, &query.chat_id, query.before_id, query.limit)
        .await?;
    Ok(Json(MessagesResponse::from(messages)))
}

pub async fn message_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
) -> Result<Json<MessageStatusResponse>, AppError> {
    let status = state.messages.status(&auth.username, message_id).await?;
    Ok(Json(MessageStatusResponse::from(status)))
}

pub async fn forward_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
    Json(body): Json<ForwardRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let outcome = state
        .messages
        .forward(&auth.username, message_id, &body.target_chat_id)
        .await?;

    let response = MessageResponse::from(&outcome.value);
    state.broadcaster().deliver(outcome.fanout).await;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn edit_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state.messages.edit(&auth.username, message_id, &body.text).await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}

/// `scope=me` hides the message for the caller; `scope=all` blanks it for everyone.
pub async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
    Query(query): Query<DeleteMessageQuery>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state.messages.delete(&auth.username, message_id, query.scope).await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}

pub async fn add_reaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
    Json(body): Json<ReactionRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state.messages.add_reaction(&auth.username, message_id, &body.emoji).await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
    Query(query): Query<ReactionQuery>,
) -> Result<Json<OkResponse>, AppError> {
    let outcome = state
        .messages
        .remove_reaction(&auth.username, message_id, &query.emoji)
        .await?;
    state.broadcaster().deliver(outcome.fanout).await;
    Ok(Json(OkResponse::ok()))
}
