//! Media Host Client
//!
//! Uploads attachment bytes to an external media host and returns the
//! public URL. The host receives a multipart form with a single `file` part
//! and must answer with JSON containing `secure_url` or `url`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;

use crate::config::MediaSettings;
use crate::shared::error::AppError;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Media host is not configured")]
    NotConfigured,

    #[error("Media host request failed: {0}")]
    Http(String),

    #[error("Media host rejected upload with status {0}")]
    Rejected(u16),

    #[error("Media host response had no url")]
    MissingUrl,
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, mime: &str) -> Result<String, MediaError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// `MediaHost` over HTTP with an optional bearer API key.
#[derive(Debug, Clone)]
pub struct HttpMediaHost {
    http: Client,
    upload_url: Option<String>,
    api_key: Option<String>,
}

impl HttpMediaHost {
    pub fn new(settings: &MediaSettings) -> Result<Self, MediaError> {
        let http = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .user_agent(concat!("messenger-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MediaError::Http(e.to_string()))?;

        Ok(Self {
            http,
            upload_url: settings.upload_url.clone().filter(|u| !u.trim().is_empty()),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }
}

#[async_trait]
impl MediaHost for HttpMediaHost {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, mime: &str) -> Result<String, MediaError> {
        let upload_url = self.upload_url.as_deref().ok_or(MediaError::NotConfigured)?;

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| MediaError::Http(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let mut request = self.http.post(upload_url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| MediaError::Http(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Media host rejected upload");
            return Err(MediaError::Rejected(status.as_u16()));
        }

        let body: UploadResponse = resp.json().await.map_err(|e| MediaError::Http(e.to_string()))?;
        let url = body
            .secure_url
            .or(body.url)
            .filter(|u| !u.is_empty())
            .ok_or(MediaError::MissingUrl)?;

        tracing::debug!(file_name = %file_name, mime = %mime, url = %url, "Media uploaded");
        Ok(url)
    }
}
