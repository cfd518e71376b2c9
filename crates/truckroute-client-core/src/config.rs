use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::default_credentials_path;
use crate::error::AuthInputError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const ENV_API_BASE_URL: &str = "TRUCKROUTE_API_BASE_URL";
pub const ENV_AUTH_TIMEOUT_MS: &str = "TRUCKROUTE_AUTH_TIMEOUT_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "TRUCKROUTE_REQUEST_TIMEOUT_MS";
pub const ENV_ASSET_TIMEOUT_MS: &str = "TRUCKROUTE_ASSET_TIMEOUT_MS";
pub const ENV_CREDENTIALS_PATH: &str = "TRUCKROUTE_CREDENTIALS_PATH";

pub const DEFAULT_AUTH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_ASSET_TIMEOUT_MS: u64 = 60_000;
const MIN_TIMEOUT_MS: u64 = 250;

/// Timeout class of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Auth,
    Standard,
    Asset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub auth: Duration,
    pub standard: Duration,
    pub asset: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            auth: Duration::from_millis(DEFAULT_AUTH_TIMEOUT_MS),
            standard: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            asset: Duration::from_millis(DEFAULT_ASSET_TIMEOUT_MS),
        }
    }
}

impl TimeoutPolicy {
    #[must_use]
    pub fn for_class(&self, class: RequestClass) -> Duration {
        match class {
            RequestClass::Auth => self.auth,
            RequestClass::Standard => self.standard,
            RequestClass::Asset => self.asset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeouts: TimeoutPolicy,
    pub credentials_path: PathBuf,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self, AuthInputError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            timeouts: TimeoutPolicy::default(),
            credentials_path: default_credentials_path(),
        })
    }

    pub fn from_env() -> Result<Self, AuthInputError> {
        let base_url =
            env_non_empty(ENV_API_BASE_URL).unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let defaults = TimeoutPolicy::default();
        let timeouts = TimeoutPolicy {
            auth: env_timeout(ENV_AUTH_TIMEOUT_MS).unwrap_or(defaults.auth),
            standard: env_timeout(ENV_REQUEST_TIMEOUT_MS).unwrap_or(defaults.standard),
            asset: env_timeout(ENV_ASSET_TIMEOUT_MS).unwrap_or(defaults.asset),
        };
        let credentials_path = env_non_empty(ENV_CREDENTIALS_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(default_credentials_path);

        Ok(Self {
            base_url: normalize_base_url(&base_url)?,
            timeouts,
            credentials_path,
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        let trimmed = path.trim();
        if trimmed.starts_with('/') {
            format!("{}{}", self.base_url, trimmed)
        } else {
            format!("{}/{}", self.base_url, trimmed)
        }
    }
}

pub fn normalize_base_url(raw: &str) -> Result<String, AuthInputError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AuthInputError::EmptyBaseUrl);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AuthInputError::InvalidBaseUrl);
    }
    let Some((_, remainder)) = trimmed.split_once("://") else {
        return Err(AuthInputError::InvalidBaseUrl);
    };
    if remainder.trim().is_empty() || remainder.starts_with('/') {
        return Err(AuthInputError::InvalidBaseUrl);
    }
    Ok(trimmed.to_string())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_timeout(key: &str) -> Option<Duration> {
    let raw = env_non_empty(key)?;
    match raw.parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms.max(MIN_TIMEOUT_MS))),
        Err(error) => {
            tracing::warn!(error = %error, key, value = %raw, "Ignoring invalid timeout override");
            None
        }
    }
}
