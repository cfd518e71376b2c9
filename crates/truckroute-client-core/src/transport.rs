use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::decode::ListPayload;
use crate::error::{ApiError, classify_http_error};
use crate::logs::{LogAsset, LogId};

/// Whether a request carries the stored access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    None,
    AccessToken,
}

/// A fully read HTTP response, independent of the HTTP library that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(classify_http_error(self.status, &self.body))
        }
    }

    pub fn decode_json<T>(self) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let reply = self.error_for_status()?;
        let body: &[u8] = if reply.body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &reply.body
        };
        serde_json::from_slice(body)
            .map_err(|error| ApiError::network(format!("malformed response body: {error}")))
    }

    /// Decodes a list body, bare or paginated.
    pub fn decode_list<T>(self) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        Ok(self.decode_json::<ListPayload<T>>()?.into_items())
    }

    /// The body as an asset, attributed to `log_id` on failure.
    pub fn into_asset(self, log_id: LogId) -> Result<LogAsset, ApiError> {
        match self.error_for_status() {
            Ok(reply) => Ok(LogAsset {
                content_type: reply.content_type,
                bytes: reply.body,
            }),
            Err(error) => Err(ApiError::AssetFetch {
                log_id,
                message: error.to_string(),
            }),
        }
    }
}

/// Sends one attempt of a request with the given bearer token.
///
/// The coordinator calls it once for the original attempt and at most once more
/// for the replay, so it must be cheap to call repeatedly.
pub type ReplayFn =
    Arc<dyn Fn(Option<String>) -> BoxFuture<'static, Result<HttpReply, ApiError>> + Send + Sync>;
