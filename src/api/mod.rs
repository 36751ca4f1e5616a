//! Clients for the hosted speech API and the secret-retrieval function.
//!
//! Every call returns a tagged `Result<_, ApiError>`; nothing is retried and
//! nothing panics on a bad response.

use async_trait::async_trait;

pub mod client;
pub mod config;
pub mod secrets;
pub mod types;

pub use client::SpeechClient;
pub use config::{DEFAULT_API_BASE_URL, DEFAULT_MODEL_ID, MAX_TEXT_LENGTH};
pub use secrets::{ApiKey, EnvSecretStore, RemoteSecretStore, SecretError, SecretName, SecretStore};
pub use types::{ConversionRequest, SynthesisRequest, VoiceDescriptor, VoiceSettings};

use crate::audio::AudioPayload;

#[cfg(test)]
mod tests;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Audio exceeds the {0} byte limit")]
    PayloadTooLarge(u64),
}

impl ApiError {
    /// Errors the user can fix by editing the form, before any request was made
    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, ApiError::QuotaExceeded(_))
    }
}

impl From<SecretError> for ApiError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::Transport(message) => ApiError::Network(message),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

/// The hosted speech service: voice catalog, synthesis and voice conversion
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechApi: Send + Sync {
    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, ApiError>;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioPayload, ApiError>;

    async fn convert_recording(
        &self,
        request: &ConversionRequest,
    ) -> Result<AudioPayload, ApiError>;

    /// Download a public clip such as a voice preview sample
    async fn fetch_audio(&self, url: &str) -> Result<AudioPayload, ApiError>;
}
