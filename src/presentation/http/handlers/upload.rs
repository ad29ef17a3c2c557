//! Media Upload Handler
//!
//! Accepts a multipart form with `chat_id`, an optional `text` caption and a
//! single `file` part. The file goes to the media host first; the message is
//! only stored once the host has returned a URL.

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::response::MessageResponse;
use crate::domain::{Media, MediaKind};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::truncate_chars;
use crate::startup::AppState;

/// Stored file names are cut to this many characters
pub const MAX_FILE_NAME_CHARS: usize = 120;

const DEFAULT_FILE_NAME: &str = "file";

struct UploadedFile {
    bytes: Vec<u8>,
    name: String,
    mime: String,
    kind: MediaKind,
}

#[derive(Default)]
struct UploadForm {
    chat_id: Option<String>,
    text: Option<String>,
    file: Option<UploadedFile>,
}

fn multipart_error(err: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(format!("Invalid multipart body: {}", err))
}

async fn read_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

async fn read_file(field: Field<'_>, max_bytes: usize) -> Result<UploadedFile, AppError> {
    let mime = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let kind = MediaKind::from_mime(&mime)
        .ok_or_else(|| AppError::BadRequest("Only image, video or audio files are accepted".into()))?;
    let name = sanitize_file_name(field.file_name());

    let bytes = field.bytes().await.map_err(multipart_error)?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("File is empty".into()));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::BadRequest(format!(
            "File exceeds the {} MB limit",
            max_bytes / (1024 * 1024)
        )));
    }

    Ok(UploadedFile {
        bytes: bytes.to_vec(),
        name,
        mime,
        kind,
    })
}

fn sanitize_file_name(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        truncate_chars(trimmed, MAX_FILE_NAME_CHARS)
    }
}

async fn parse_form(mut multipart: Multipart, max_bytes: usize) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("chat_id") => form.chat_id = Some(read_text(field).await?),
            Some("text") => form.text = Some(read_text(field).await?),
            Some("file") => form.file = Some(read_file(field, max_bytes).await?),
            _ => {}
        }
    }
    Ok(form)
}

pub async fn upload_media(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let form = parse_form(multipart, state.settings.media.max_upload_bytes()).await?;

    let chat_id = form
        .chat_id
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("chat_id is required".into()))?;
    let file = form.file.ok_or_else(|| AppError::BadRequest("file is required".into()))?;

    state.messages.authorize_upload(&auth.username, &chat_id).await?;

    let size = file.bytes.len();
    let url = state.media.upload(file.bytes, &file.name, &file.mime).await?;
    tracing::info!(chat_id = %chat_id, sender = %auth.username, kind = file.kind.as_str(), size, "Media uploaded");

    let media = Media {
        kind: file.kind,
        url,
        mime: file.mime,
        name: file.name,
    };
    let outcome = state
        .messages
        .send_media(&auth.username, &chat_id, form.text.as_deref(), media)
        .await?;

    let response = MessageResponse::from(&outcome.value);
    state.broadcaster().deliver(outcome.fanout).await;

    Ok((StatusCode::CREATED, Json(response)))
}
