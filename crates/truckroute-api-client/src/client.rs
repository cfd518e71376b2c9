use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use truckroute_client_core::{
    ApiError, AuthInputError, AuthRequirement, ClientConfig, CredentialStore, HttpReply,
    LogAsset, LogId, RefreshCoordinator, RefreshedTokens, ReplayFn, RequestClass, SessionEvent,
    TokenRefresher,
};
use uuid::Uuid;

pub(crate) const TOKEN_REFRESH_PATH: &str = "/token/refresh/";

/// One outbound request, fully described so it can be sent again on replay.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) body: Option<Value>,
    pub(crate) timeout: Duration,
}

/// Typed client for the TruckRoute REST API.
///
/// Requests that need the access token go through the shared
/// [`RefreshCoordinator`]; auth endpoints are sent directly.
#[derive(Debug, Clone)]
pub struct TruckRouteClient {
    config: ClientConfig,
    http: reqwest::Client,
    coordinator: RefreshCoordinator,
}

impl TruckRouteClient {
    pub fn new(config: ClientConfig, credentials: CredentialStore) -> Self {
        let http = reqwest::Client::new();
        let refresher = HttpTokenRefresher::new(http.clone(), &config);
        let coordinator = RefreshCoordinator::new(credentials, Arc::new(refresher));
        Self {
            config,
            http,
            coordinator,
        }
    }

    /// Resolves config from the environment and opens the credentials file it names.
    pub fn from_env() -> Result<Self, AuthInputError> {
        let config = ClientConfig::from_env()?;
        let credentials = CredentialStore::from_file(config.credentials_path.clone());
        Ok(Self::new(config, credentials))
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        self.coordinator.credentials()
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    pub(crate) fn prepare(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        class: RequestClass,
    ) -> PreparedRequest {
        PreparedRequest {
            method,
            url: self.config.endpoint(path),
            body,
            timeout: self.config.timeouts.for_class(class),
        }
    }

    pub(crate) async fn execute(
        &self,
        request: PreparedRequest,
        auth: AuthRequirement,
    ) -> Result<HttpReply, ApiError> {
        match auth {
            AuthRequirement::None => send_once(&self.http, &request, None).await,
            AuthRequirement::AccessToken => {
                let http = self.http.clone();
                let request = Arc::new(request);
                let replay: ReplayFn = Arc::new(move |token: Option<String>| {
                    let http = http.clone();
                    let request = request.clone();
                    async move { send_once(&http, &request, token.as_deref()).await }.boxed()
                });
                self.coordinator.execute(replay).await
            }
        }
    }

    pub(crate) async fn get_json<T>(&self, path: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let request = self.prepare(Method::GET, path, None, RequestClass::Standard);
        self.execute(request, AuthRequirement::AccessToken)
            .await?
            .decode_json()
    }

    pub(crate) async fn get_list<T>(&self, path: &str) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let request = self.prepare(Method::GET, path, None, RequestClass::Standard);
        self.execute(request, AuthRequirement::AccessToken)
            .await?
            .decode_list()
    }

    pub(crate) async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        class: RequestClass,
        auth: AuthRequirement,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode_body(body)?;
        let request = self.prepare(method, path, Some(body), class);
        self.execute(request, auth).await?.decode_json()
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = self.prepare(Method::DELETE, path, None, RequestClass::Standard);
        self.execute(request, AuthRequirement::AccessToken)
            .await?
            .error_for_status()
            .map(|_| ())
    }

    pub(crate) async fn get_asset(&self, path: &str, log_id: LogId) -> Result<LogAsset, ApiError> {
        let request = self.prepare(Method::GET, path, None, RequestClass::Asset);
        match self.execute(request, AuthRequirement::AccessToken).await {
            Ok(reply) => reply.into_asset(log_id),
            Err(error) if error.is_auth_expired() => Err(error),
            Err(error) => Err(ApiError::AssetFetch {
                log_id,
                message: error.to_string(),
            }),
        }
    }
}

/// Refreshes the access token with `POST /token/refresh/`.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTokenRefresher {
    /// Shares `http` with the client that owns the coordinator.
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            url: config.endpoint(TOKEN_REFRESH_PATH),
            timeout: config.timeouts.for_class(RequestClass::Auth),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, ApiError> {
        let request = PreparedRequest {
            method: Method::POST,
            url: self.url.clone(),
            body: Some(json!({ "refresh": refresh_token })),
            timeout: self.timeout,
        };
        send_once(&self.http, &request, None).await?.decode_json()
    }
}

pub(crate) fn encode_body<B>(body: &B) -> Result<Value, ApiError>
where
    B: Serialize + ?Sized,
{
    serde_json::to_value(body)
        .map_err(|error| ApiError::network(format!("request encode failed: {error}")))
}

async fn send_once(
    http: &reqwest::Client,
    request: &PreparedRequest,
    token: Option<&str>,
) -> Result<HttpReply, ApiError> {
    let mut builder = http
        .request(request.method.clone(), request.url.as_str())
        .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
        .timeout(request.timeout);
    if let Some(token) = token {
        builder = builder.bearer_auth(token);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder.send().await.map_err(|error| {
        if error.is_timeout() {
            ApiError::network(format!("request timed out after {:?}", request.timeout))
        } else {
            ApiError::network(error.to_string())
        }
    })?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let body = response
        .bytes()
        .await
        .map_err(|error| ApiError::network(format!("response read failed: {error}")))?;

    tracing::debug!(
        method = %request.method,
        url = %request.url,
        status,
        "TruckRoute API response"
    );

    let reply = HttpReply::new(status, body.to_vec());
    Ok(match content_type {
        Some(content_type) => reply.with_content_type(content_type),
        None => reply,
    })
}
