use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network_error:{message}")]
    Network { message: String },
    #[error("auth_expired")]
    AuthExpired,
    #[error("unauthorized:{body}")]
    Unauthorized { body: String },
    #[error("validation_error:{status}:{message}")]
    Validation { status: u16, message: String },
    #[error("http_{status}:{body}")]
    Http { status: u16, body: String },
    #[error("asset_fetch_failed:{log_id}:{message}")]
    AssetFetch { log_id: i64, message: String },
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthInputError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url must use http:// or https:// and include a host")]
    InvalidBaseUrl,
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("email must contain a local part and a domain")]
    InvalidEmail,
}

#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Maps a non-success status and its body onto the client error taxonomy.
pub fn classify_http_error(status: u16, body: &[u8]) -> ApiError {
    let raw = String::from_utf8_lossy(body).trim().to_string();
    let raw = if raw.is_empty() {
        "<empty>".to_string()
    } else {
        raw
    };

    match status {
        401 => ApiError::Unauthorized { body: raw },
        400 | 422 => ApiError::Validation {
            status,
            message: backend_message(body).unwrap_or(raw),
        },
        _ => ApiError::Http { status, body: raw },
    }
}

fn backend_message(body: &[u8]) -> Option<String> {
    let parsed: BackendErrorBody = serde_json::from_slice(body).ok()?;
    parsed
        .error
        .or(parsed.detail)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
}
