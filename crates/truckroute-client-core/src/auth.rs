use serde::{Deserialize, Serialize};

use crate::error::AuthInputError;

/// Body for `POST /register/`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Registration {
    pub fn new(username: &str, password: &str, email: &str) -> Result<Self, AuthInputError> {
        Ok(Self {
            username: normalize_username(username)?,
            password: require_password(password)?,
            email: normalize_email(email)?,
        })
    }
}

/// Body for `POST /token/`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl LoginRequest {
    pub fn new(username: &str, password: &str) -> Result<Self, AuthInputError> {
        Ok(Self {
            username: normalize_username(username)?,
            password: require_password(password)?,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}

pub fn normalize_username(raw: &str) -> Result<String, AuthInputError> {
    let normalized = raw.trim();
    if normalized.is_empty() {
        return Err(AuthInputError::EmptyUsername);
    }
    Ok(normalized.to_string())
}

// Passwords are sent as typed; only emptiness is rejected.
pub fn require_password(raw: &str) -> Result<String, AuthInputError> {
    if raw.trim().is_empty() {
        return Err(AuthInputError::EmptyPassword);
    }
    Ok(raw.to_string())
}

pub fn normalize_email(raw: &str) -> Result<String, AuthInputError> {
    let normalized = raw.trim().to_lowercase();
    let Some((local, domain)) = normalized.split_once('@') else {
        return Err(AuthInputError::InvalidEmail);
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(AuthInputError::InvalidEmail);
    }
    Ok(normalized)
}
