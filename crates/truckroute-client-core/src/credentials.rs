use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const UNKNOWN_USER: &str = "unknown user";

const CREDENTIALS_FILE_NAME: &str = "credentials.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("credential_store_io:{path}:{source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("credential_store_encode:{0}")]
    Encode(#[from] serde_json::Error),
}

pub trait CredentialPersistence: Send + Sync {
    fn load_credentials(&self) -> Result<Credentials, CredentialStoreError>;
    fn persist_credentials(&self, credentials: &Credentials) -> Result<(), CredentialStoreError>;
    fn clear_credentials(&self) -> Result<(), CredentialStoreError>;
}

/// Keeps nothing beyond the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryPersistence;

impl CredentialPersistence for MemoryPersistence {
    fn load_credentials(&self) -> Result<Credentials, CredentialStoreError> {
        Ok(Credentials::default())
    }

    fn persist_credentials(&self, _credentials: &Credentials) -> Result<(), CredentialStoreError> {
        Ok(())
    }

    fn clear_credentials(&self) -> Result<(), CredentialStoreError> {
        Ok(())
    }
}

/// JSON document holding the two well-known token keys.
#[derive(Debug, Clone)]
pub struct FileCredentialPersistence {
    path: PathBuf,
}

impl FileCredentialPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CredentialStoreError {
        CredentialStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialPersistence for FileCredentialPersistence {
    fn load_credentials(&self) -> Result<Credentials, CredentialStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Credentials::default());
            }
            Err(error) => return Err(self.io_error(error)),
        };
        match serde_json::from_str::<Credentials>(&raw) {
            Ok(credentials) => Ok(credentials),
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    path = %self.path.display(),
                    "Discarding unreadable credentials file"
                );
                Ok(Credentials::default())
            }
        }
    }

    fn persist_credentials(&self, credentials: &Credentials) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| self.io_error(error))?;
        }
        let encoded = serde_json::to_string_pretty(credentials)?;
        fs::write(&self.path, encoded).map_err(|error| self.io_error(error))
    }

    fn clear_credentials(&self) -> Result<(), CredentialStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(self.io_error(error)),
        }
    }
}

#[must_use]
pub fn default_credentials_path() -> PathBuf {
    if let Some(mut data_dir) = dirs::data_local_dir() {
        data_dir.push("truckroute");
        data_dir.push(CREDENTIALS_FILE_NAME);
        return data_dir;
    }

    if let Some(mut home_dir) = dirs::home_dir() {
        home_dir.push(".truckroute");
        home_dir.push(CREDENTIALS_FILE_NAME);
        return home_dir;
    }

    PathBuf::from(CREDENTIALS_FILE_NAME)
}

/// Process-wide token holder. Clones share the same state.
///
/// Writes go through to the persistence backend; a backend failure is logged
/// and the in-memory state still changes, so the auth flow never fails on
/// storage.
#[derive(Clone)]
pub struct CredentialStore {
    state: Arc<RwLock<Credentials>>,
    persistence: Arc<dyn CredentialPersistence>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let credentials = self.get();
        f.debug_struct("CredentialStore")
            .field("has_access_token", &credentials.access_token.is_some())
            .field("has_refresh_token", &credentials.refresh_token.is_some())
            .finish()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CredentialStore {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(Credentials::default())),
            persistence: Arc::new(MemoryPersistence),
        }
    }

    /// Opens a store primed from `persistence`. Load failures start empty.
    pub fn load(persistence: Arc<dyn CredentialPersistence>) -> Self {
        let credentials = persistence.load_credentials().unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Failed to load stored credentials");
            Credentials::default()
        });
        Self {
            state: Arc::new(RwLock::new(credentials)),
            persistence,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::load(Arc::new(FileCredentialPersistence::new(path)))
    }

    #[must_use]
    pub fn get(&self) -> Credentials {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.get().access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.get().refresh_token
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.get().access_token.is_some()
    }

    pub fn set(&self, access_token: impl Into<String>, refresh_token: impl Into<String>) {
        self.write(|credentials| {
            credentials.access_token = non_empty(access_token.into());
            credentials.refresh_token = non_empty(refresh_token.into());
        });
    }

    /// Applies a refresh result. A rotated refresh token replaces the old one.
    pub fn replace_access(&self, access_token: impl Into<String>, rotated_refresh: Option<String>) {
        self.write(|credentials| {
            credentials.access_token = non_empty(access_token.into());
            if let Some(refresh) = rotated_refresh.and_then(non_empty) {
                credentials.refresh_token = Some(refresh);
            }
        });
    }

    pub fn clear(&self) {
        {
            let mut state = self
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *state = Credentials::default();
        }
        if let Err(error) = self.persistence.clear_credentials() {
            tracing::warn!(error = %error, "Failed to clear stored credentials");
        }
    }

    /// Best-effort username from the access token, for display only.
    pub fn username(&self) -> Result<Username, TokenDecodeError> {
        let token = self.access_token().ok_or(TokenDecodeError::Missing)?;
        decode_username(&token)
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        self.username()
            .map(|username| username.0)
            .unwrap_or_else(|_| UNKNOWN_USER.to_string())
    }

    fn write(&self, update: impl FnOnce(&mut Credentials)) {
        let snapshot = {
            let mut state = self
                .state
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            update(&mut state);
            state.clone()
        };
        if let Err(error) = self.persistence.persist_credentials(&snapshot) {
            tracing::warn!(error = %error, "Failed to persist credentials");
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username(pub String);

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenDecodeError {
    #[error("no access token present")]
    Missing,
    #[error("access token payload is malformed")]
    Malformed,
    #[error("access token payload has no username claim")]
    MissingClaim,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    username: Option<String>,
}

/// Reads the `username` claim from a JWT payload without verifying it.
pub fn decode_username(token: &str) -> Result<Username, TokenDecodeError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or(TokenDecodeError::Malformed)?;
    let normalized = payload
        .trim_end_matches('=')
        .replace('+', "-")
        .replace('/', "_");
    let bytes = URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|_| TokenDecodeError::Malformed)?;
    let claims: TokenClaims =
        serde_json::from_slice(&bytes).map_err(|_| TokenDecodeError::Malformed)?;
    claims
        .username
        .filter(|username| !username.trim().is_empty())
        .map(Username)
        .ok_or(TokenDecodeError::MissingClaim)
}
