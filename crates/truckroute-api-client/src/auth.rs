use reqwest::Method;
use serde_json::Value;
use truckroute_client_core::{
    ApiError, AuthRequirement, LoginRequest, RefreshedTokens, Registration, RequestClass,
    TokenPair,
};

use crate::client::{TOKEN_REFRESH_PATH, TruckRouteClient};

pub(crate) const REGISTER_PATH: &str = "/register/";
pub(crate) const LOGIN_PATH: &str = "/token/";

impl TruckRouteClient {
    /// Creates an account. The response body is returned as-is.
    pub async fn register(&self, registration: &Registration) -> Result<Value, ApiError> {
        self.send_json(
            Method::POST,
            REGISTER_PATH,
            registration,
            RequestClass::Auth,
            AuthRequirement::None,
        )
        .await
    }

    /// Exchanges credentials for a token pair and stores both tokens.
    pub async fn login(&self, request: &LoginRequest) -> Result<(), ApiError> {
        let tokens: TokenPair = self
            .send_json(
                Method::POST,
                LOGIN_PATH,
                request,
                RequestClass::Auth,
                AuthRequirement::None,
            )
            .await?;
        self.credentials().set(tokens.access, tokens.refresh);
        tracing::info!(username = %request.username, "Logged in");
        Ok(())
    }

    pub fn logout(&self) {
        self.credentials().clear();
        tracing::info!("Logged out");
    }

    /// Calls the refresh endpoint directly, outside the 401 flow.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshedTokens, ApiError> {
        self.send_json(
            Method::POST,
            TOKEN_REFRESH_PATH,
            &serde_json::json!({ "refresh": refresh_token }),
            RequestClass::Auth,
            AuthRequirement::None,
        )
        .await
    }
}
