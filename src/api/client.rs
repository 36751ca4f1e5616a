use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{multipart, Client, Response};
use std::time::{Duration, Instant};

use super::config::{API_KEY_HEADER, DEFAULT_MAX_AUDIO_SIZE_MB, QUOTA_EXCEEDED_STATUS};
use super::secrets::ApiKey;
use super::types::{
    ConversionRequest, SynthesisBody, SynthesisRequest, VoiceDescriptor, VoicesResponse,
};
use super::{ApiError, SpeechApi};
use crate::audio::{AudioPayload, MIME_MPEG};
use crate::utils::logger::{log_event, LogEvent, NetworkDetails, NetworkStatus};

/// HTTP client for an ElevenLabs-compatible speech API
pub struct SpeechClient {
    http: Client,
    base_url: String,
    api_key: ApiKey,
    max_audio_bytes: u64,
}

impl SpeechClient {
    /// `base_url` is the versioned root, e.g. `https://api.elevenlabs.io/v1`.
    /// No request timeout is applied unless one is given.
    pub fn new(base_url: &str, api_key: ApiKey, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_audio_bytes: DEFAULT_MAX_AUDIO_SIZE_MB * 1024 * 1024,
        })
    }

    pub fn with_max_audio_bytes(mut self, max_audio_bytes: u64) -> Self {
        self.max_audio_bytes = max_audio_bytes;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        operation: &str,
        method: &str,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, ApiError> {
        let started = Instant::now();
        let details = |code: Option<u16>| NetworkDetails {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            status_code: code,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                log_event(LogEvent::Network {
                    operation: operation.to_string(),
                    status: NetworkStatus::Failed {
                        error: e.to_string(),
                    },
                    duration_ms: started.elapsed().as_millis() as u64,
                    details: Some(details(None)),
                });
                return Err(ApiError::Network(e.to_string()));
            }
        };

        let status = response.status();
        if status.is_success() {
            log_event(LogEvent::Network {
                operation: operation.to_string(),
                status: NetworkStatus::Success,
                duration_ms: started.elapsed().as_millis() as u64,
                details: Some(details(Some(status.as_u16()))),
            });
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let error = error_from_status(status.as_u16(), &body);

        let network_status = match error {
            ApiError::RateLimited | ApiError::QuotaExceeded(_) => NetworkStatus::RateLimited,
            ref other => NetworkStatus::Failed {
                error: other.to_string(),
            },
        };
        log_event(LogEvent::Network {
            operation: operation.to_string(),
            status: network_status,
            duration_ms: started.elapsed().as_millis() as u64,
            details: Some(details(Some(status.as_u16()))),
        });

        Err(error)
    }

    /// Read an audio body, enforcing the configured size limit while streaming
    async fn read_audio(&self, response: Response) -> Result<AudioPayload, ApiError> {
        if let Some(length) = response.content_length() {
            if length > self.max_audio_bytes {
                return Err(ApiError::PayloadTooLarge(self.max_audio_bytes));
            }
        }

        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| v.starts_with("audio/"))
            .unwrap_or_else(|| MIME_MPEG.to_string());

        let mut buffer = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApiError::Network(e.to_string()))?;
            if (buffer.len() + chunk.len()) as u64 > self.max_audio_bytes {
                return Err(ApiError::PayloadTooLarge(self.max_audio_bytes));
            }
            buffer.extend_from_slice(&chunk);
        }

        if buffer.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Response contained no audio".to_string(),
            ));
        }

        Ok(AudioPayload::new(buffer.freeze(), mime))
    }
}

/// Map a non-success status and its body to an error.
///
/// The API reports errors as `{"detail": {"status": ..., "message": ...}}`
/// (sometimes `{"detail": "..."}`); a `quota_exceeded` status wins over the
/// HTTP code.
pub fn error_from_status(status: u16, body: &str) -> ApiError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(|v| v.get("detail"));

    let detail_status = detail
        .and_then(|d| d.get("status"))
        .and_then(|s| s.as_str())
        .map(|s| s.to_string());

    let message = detail
        .and_then(|d| {
            d.get("message")
                .and_then(|m| m.as_str())
                .or_else(|| d.as_str())
        })
        .or_else(|| {
            parsed
                .as_ref()
                .and_then(|v| v.get("error").or_else(|| v.get("message")))
                .and_then(|m| m.as_str())
        })
        .map(|m| m.to_string())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body.trim().to_string()
            }
        });

    if detail_status.as_deref() == Some(QUOTA_EXCEEDED_STATUS) {
        return ApiError::QuotaExceeded(message);
    }

    match status {
        401 | 403 => ApiError::Unauthorized(message),
        429 => ApiError::RateLimited,
        _ => ApiError::Server { status, message },
    }
}

#[async_trait]
impl SpeechApi for SpeechClient {
    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, ApiError> {
        let endpoint = self.url("voices");
        let request = self
            .http
            .get(&endpoint)
            .header(API_KEY_HEADER, self.api_key.expose());

        let response = self.send("voice catalog", "GET", &endpoint, request).await?;
        let parsed: VoicesResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let voices: Vec<VoiceDescriptor> = parsed.voices.into_iter().map(Into::into).collect();
        log::info!("Voice catalog returned {} voices", voices.len());
        Ok(voices)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioPayload, ApiError> {
        request.validate()?;

        let endpoint = self.url(&format!("text-to-speech/{}", request.voice_id));
        let http_request = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, self.api_key.expose())
            .header(ACCEPT, MIME_MPEG)
            .json(&SynthesisBody::from(request));

        let response = self.send("synthesis", "POST", &endpoint, http_request).await?;
        self.read_audio(response).await
    }

    async fn convert_recording(
        &self,
        request: &ConversionRequest,
    ) -> Result<AudioPayload, ApiError> {
        request.validate()?;

        let part = multipart::Part::bytes(request.audio.bytes().to_vec())
            .file_name(format!("recording.{}", request.audio.file_extension()))
            .mime_str(request.audio.mime())
            .map_err(|e| ApiError::Validation(format!("Invalid audio type: {}", e)))?;
        let form = multipart::Form::new()
            .part("audio", part)
            .text("model_id", request.model_id.clone());

        let endpoint = self.url(&format!("voice-generation/{}", request.voice_id));
        let http_request = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, self.api_key.expose())
            .multipart(form);

        let response = self
            .send("voice conversion", "POST", &endpoint, http_request)
            .await?;
        self.read_audio(response).await
    }

    async fn fetch_audio(&self, url: &str) -> Result<AudioPayload, ApiError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ApiError::Validation(format!("Invalid audio URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Validation(format!(
                "Unsupported audio URL scheme: {}",
                parsed.scheme()
            )));
        }

        let request = self.http.get(parsed);
        let response = self.send("audio download", "GET", url, request).await?;
        self.read_audio(response).await
    }
}
