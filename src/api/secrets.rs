//! Credential retrieval.
//!
//! The API key is never compiled into the binary or written to settings. It
//! comes from a server-side secret function (preferred) or, for local
//! development, from the environment / `.env`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::fmt;

/// Secrets the retrieval function is allowed to hand out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretName {
    ElevenLabsApiKey,
    FirebaseApiKey,
}

impl SecretName {
    pub const ALLOWED: [SecretName; 2] = [SecretName::ElevenLabsApiKey, SecretName::FirebaseApiKey];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecretName::ElevenLabsApiKey => "ELEVEN_LABS_API_KEY",
            SecretName::FirebaseApiKey => "FIREBASE_API_KEY",
        }
    }

    /// Reject anything outside the allow-list without touching the network
    pub fn parse(raw: &str) -> Result<Self, SecretError> {
        Self::ALLOWED
            .iter()
            .copied()
            .find(|name| name.as_str() == raw)
            .ok_or_else(|| SecretError::InvalidName(raw.to_string()))
    }
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Invalid secret name: {0}")]
    InvalidName(String),

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Secret retrieval failed: {0}")]
    Transport(String),
}

/// An API credential; never printed in full
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        write!(f, "ApiKey(***{})", tail)
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: SecretName) -> Result<String, SecretError>;

    /// Look up a secret by its raw name, enforcing the allow-list first
    async fn get_named(&self, raw: &str) -> Result<String, SecretError> {
        let name = SecretName::parse(raw)?;
        self.get(name).await
    }
}

/// Fetch the speech API key from a store
pub async fn resolve_api_key(store: &dyn SecretStore) -> Result<ApiKey, SecretError> {
    let value = store.get(SecretName::ElevenLabsApiKey).await?;
    log::info!("Resolved API credential from secret store");
    Ok(ApiKey::new(value))
}

/// Server-side secret function: `POST {secret_name}` -> `{NAME: value}`
pub struct RemoteSecretStore {
    http: Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl RemoteSecretStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            bearer_token: None,
        }
    }

    /// Identity token of the signed-in user, forwarded as `Authorization`
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait]
impl SecretStore for RemoteSecretStore {
    async fn get(&self, name: SecretName) -> Result<String, SecretError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "secret_name": name.as_str() }));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SecretError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::BAD_REQUEST => return Err(SecretError::InvalidName(name.to_string())),
            StatusCode::NOT_FOUND => return Err(SecretError::NotFound(name.to_string())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(SecretError::Transport(format!(
                    "Secret function returned {}: {}",
                    status, body
                )));
            }
            _ => {}
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SecretError::Transport(format!("Invalid secret response: {}", e)))?;

        body.get(name.as_str())
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

/// Process environment, after loading a `.env` file if one exists
#[derive(Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn new() -> Self {
        if let Err(e) = dotenv::dotenv() {
            log::debug!("No .env file loaded: {}", e);
        }
        Self
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get(&self, name: SecretName) -> Result<String, SecretError> {
        std::env::var(name.as_str())
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}
