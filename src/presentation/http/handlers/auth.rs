//! Authentication Handlers
//!
//! Every successful credential or refresh call answers with the token pair in
//! the body and sets the refresh token as an HttpOnly cookie scoped to
//! `/api/v1/auth`. Refresh and logout read the token from the body first and
//! fall back to the cookie.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::application::dto::request::{CredentialsRequest, RefreshTokenRequest};
use crate::application::dto::response::{OkResponse, TokenResponse};
use crate::application::services::AuthTokens;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validate;
use crate::startup::AppState;

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

pub fn build_refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let secure_attr = if secure { "; Secure" } else { "" };
    format!(
        "{name}={value}; HttpOnly; Path={path}; SameSite=Strict; Max-Age={max_age}{secure}",
        name = REFRESH_COOKIE_NAME,
        value = token,
        path = REFRESH_COOKIE_PATH,
        max_age = max_age_secs.max(0),
        secure = secure_attr,
    )
}

pub fn build_refresh_cookie_clear(secure: bool) -> String {
    build_refresh_cookie("", 0, secure)
}

fn get_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        (name == cookie_name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Body token first, then the cookie.
fn presented_refresh_token(headers: &HeaderMap, body: Option<RefreshTokenRequest>) -> Option<String> {
    body.and_then(|b| b.refresh_token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| get_cookie_value(headers, REFRESH_COOKIE_NAME))
}

fn with_cookie(mut response: Response, cookie: String) -> Response {
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn token_response(state: &AppState, status: StatusCode, tokens: AuthTokens) -> Response {
    let cookie = build_refresh_cookie(&tokens.refresh_token, tokens.refresh_expires_in, state.settings.cookie.secure);
    with_cookie((status, Json(TokenResponse::from(tokens))).into_response(), cookie)
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Response, AppError> {
    validate(&body)?;
    let tokens = state.auth.register(&body.username, &body.password).await?;
    Ok(token_response(&state, StatusCode::CREATED, tokens))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Response, AppError> {
    validate(&body)?;
    let tokens = state.auth.login(&body.username, &body.password).await?;
    Ok(token_response(&state, StatusCode::OK, tokens))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshTokenRequest>>,
) -> Result<Response, AppError> {
    let token = presented_refresh_token(&headers, body.map(|Json(b)| b))
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".into()))?;

    match state.auth.refresh(&token).await {
        Ok(tokens) => Ok(token_response(&state, StatusCode::OK, tokens)),
        Err(e) => {
            // A dead refresh cookie is cleared so the client stops replaying it.
            let err = AppError::from(e);
            let response = err.into_response();
            Ok(with_cookie(response, build_refresh_cookie_clear(state.settings.cookie.secure)))
        }
    }
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshTokenRequest>>,
) -> Result<Response, AppError> {
    if let Some(token) = presented_refresh_token(&headers, body.map(|Json(b)| b)) {
        state.auth.logout(&token).await?;
    }

    let response = Json(OkResponse::ok()).into_response();
    Ok(with_cookie(response, build_refresh_cookie_clear(state.settings.cookie.secure)))
}

/// Logout on every device. Access tokens already issued stay valid until
/// they expire.
pub async fn logout_all(State(state): State<AppState>, auth: AuthUser) -> Result<Response, AppError> {
    let revoked = state.auth.logout_all(&auth.username).await?;
    tracing::info!(username = %auth.username, revoked, "Logged out everywhere");

    let response = Json(OkResponse::ok()).into_response();
    Ok(with_cookie(response, build_refresh_cookie_clear(state.settings.cookie.secure)))
}
