use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::config::{
    DEFAULT_MODEL_ID, DEFAULT_SIMILARITY_BOOST, DEFAULT_STABILITY, MAX_TEXT_LENGTH,
};
use super::ApiError;
use crate::audio::AudioPayload;

static VOICE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("voice id pattern is valid"));

/// Voice ids end up in URL paths, so only a conservative charset is accepted
pub fn validate_voice_id(voice_id: &str) -> Result<(), ApiError> {
    if voice_id.trim().is_empty() {
        return Err(ApiError::Validation("No voice selected".to_string()));
    }
    if !VOICE_ID_PATTERN.is_match(voice_id) {
        return Err(ApiError::Validation(format!(
            "Invalid voice id: {}",
            voice_id
        )));
    }
    Ok(())
}

/// Metadata of a selectable synthetic voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    pub id: String,
    pub display_name: String,
    pub language_label: String,
    pub accent_label: String,
    pub gender_label: String,
    pub description: Option<String>,
    pub preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoicesResponse {
    #[serde(default)]
    pub voices: Vec<WireVoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireVoice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub labels: Option<WireLabels>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireLabels {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl From<WireVoice> for VoiceDescriptor {
    fn from(wire: WireVoice) -> Self {
        let labels = wire.labels.unwrap_or_default();
        Self {
            id: wire.voice_id,
            display_name: wire.name,
            language_label: labels.language.unwrap_or_default(),
            accent_label: labels.accent.unwrap_or_default(),
            gender_label: labels.gender.unwrap_or_default(),
            description: wire.description.filter(|d| !d.trim().is_empty()),
            preview_url: wire.preview_url.filter(|u| !u.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: DEFAULT_STABILITY,
            similarity_boost: DEFAULT_SIMILARITY_BOOST,
        }
    }
}

impl VoiceSettings {
    pub fn clamped(self) -> Self {
        Self {
            stability: self.stability.clamp(0.0, 1.0),
            similarity_boost: self.similarity_boost.clamp(0.0, 1.0),
        }
    }
}

/// A request to turn text into speech with one voice
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub model_id: String,
    pub voice_settings: VoiceSettings,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            voice_settings: VoiceSettings::default(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_settings(mut self, settings: VoiceSettings) -> Self {
        self.voice_settings = settings.clamped();
        self
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.text.trim().is_empty() {
            return Err(ApiError::Validation("Text cannot be empty".to_string()));
        }

        let chars = self.text.chars().count();
        if chars > MAX_TEXT_LENGTH {
            return Err(ApiError::Validation(format!(
                "Text exceeds maximum length of {} characters",
                MAX_TEXT_LENGTH
            )));
        }

        validate_voice_id(&self.voice_id)
    }
}

#[derive(Serialize)]
pub(crate) struct SynthesisBody<'a> {
    pub text: &'a str,
    pub model_id: &'a str,
    pub voice_settings: &'a VoiceSettings,
}

impl<'a> From<&'a SynthesisRequest> for SynthesisBody<'a> {
    fn from(request: &'a SynthesisRequest) -> Self {
        Self {
            text: &request.text,
            model_id: &request.model_id,
            voice_settings: &request.voice_settings,
        }
    }
}

/// A recorded clip to re-voice with the target voice
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub audio: AudioPayload,
    pub voice_id: String,
    pub model_id: String,
}

impl ConversionRequest {
    pub fn new(audio: AudioPayload, voice_id: impl Into<String>) -> Self {
        Self {
            audio,
            voice_id: voice_id.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.audio.is_empty() {
            return Err(ApiError::Validation("Recording is empty".to_string()));
        }
        validate_voice_id(&self.voice_id)
    }
}
