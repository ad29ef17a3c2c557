//! Validation Utilities

use validator::{Validate, ValidationErrors};

use super::error::AppError;

/// Longest accepted message body, in characters
pub const MAX_TEXT_CHARS: usize = 2000;

/// Reactions are truncated to this many characters
pub const MAX_EMOJI_CHARS: usize = 16;

/// Reply previews carry at most this many characters of the quoted text
pub const REPLY_PREVIEW_CHARS: usize = 160;

/// Convert validation errors to AppError
pub fn validation_error(errors: ValidationErrors) -> AppError {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let detail = e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{}: {}", field, detail)
            })
        })
        .next()
        .unwrap_or_else(|| "Validation failed".into());

    AppError::Validation(message)
}

/// Run `validator` rules on a request body.
pub fn validate<T: Validate>(value: &T) -> Result<(), AppError> {
    value.validate().map_err(validation_error)
}

/// Usernames are 3..=20 ASCII letters, digits or underscores.
pub fn validate_username(username: &str) -> Result<(), AppError> {
    let len = username.len();
    let well_formed = (3..=20).contains(&len)
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(AppError::Validation(
            "username: must be 3-20 letters, digits or underscores".into(),
        ))
    }
}

/// Trim a message body and enforce the 1..=2000 character bound.
pub fn normalize_text(text: &str) -> Result<String, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("text: must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_TEXT_CHARS {
        return Err(AppError::Validation(format!(
            "text: must be at most {} characters",
            MAX_TEXT_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim a reaction and cut it to [`MAX_EMOJI_CHARS`].
pub fn normalize_emoji(emoji: &str) -> Result<String, AppError> {
    let trimmed = emoji.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("emoji: must not be empty".into()));
    }
    Ok(truncate_chars(trimmed, MAX_EMOJI_CHARS))
}

/// Cut a string to at most `max` characters on a char boundary.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
