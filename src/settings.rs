use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::config::{
    DEFAULT_API_BASE_URL, DEFAULT_MAX_AUDIO_SIZE_MB, DEFAULT_MODEL_ID, DEFAULT_SIMILARITY_BOOST,
    DEFAULT_STABILITY,
};
use crate::api::VoiceSettings;

pub const ENV_API_BASE_URL: &str = "VOICE_STUDIO_API_BASE_URL";
pub const ENV_SECRET_ENDPOINT: &str = "VOICE_STUDIO_SECRET_ENDPOINT";
pub const ENV_MODEL_ID: &str = "VOICE_STUDIO_MODEL_ID";

const APP_DIR: &str = "voice-studio";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setting {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// User preferences. Credentials are never stored here.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    /// Server-side secret function; when unset the key comes from the environment
    pub secret_endpoint: Option<String>,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub default_volume: f32,
    pub request_timeout_secs: Option<u64>,
    pub max_audio_size_mb: u64,
    pub language_filter: String,
    pub download_file_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            secret_endpoint: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            stability: DEFAULT_STABILITY,
            similarity_boost: DEFAULT_SIMILARITY_BOOST,
            default_volume: 1.0,
            request_timeout_secs: None, // synthesis can take a while; no limit
            max_audio_size_mb: DEFAULT_MAX_AUDIO_SIZE_MB,
            language_filter: "all".to_string(),
            download_file_name: "audio.mp3".to_string(),
        }
    }
}

pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Read settings from `path` (defaults if the file is missing), apply
    /// environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let mut settings = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings at {}, using defaults", path.display());
                Settings::default()
            }
            Err(e) => return Err(e.into()),
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Err(e) = dotenv::dotenv() {
            log::debug!("No .env file loaded: {}", e);
        }

        if let Some(url) = env_value(ENV_API_BASE_URL) {
            log::info!("API base URL overridden from environment");
            self.api_base_url = url;
        }
        if let Some(endpoint) = env_value(ENV_SECRET_ENDPOINT) {
            self.secret_endpoint = Some(endpoint);
        }
        if let Some(model) = env_value(ENV_MODEL_ID) {
            self.model_id = model;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        fn unit_range(field: &'static str, value: f32) -> Result<(), SettingsError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(SettingsError::Invalid {
                    field,
                    message: format!("{} is outside [0, 1]", value),
                })
            }
        }

        unit_range("stability", self.stability)?;
        unit_range("similarity_boost", self.similarity_boost)?;
        unit_range("default_volume", self.default_volume)?;

        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(SettingsError::Invalid {
                field: "api_base_url",
                message: format!("{} is not an http(s) URL", self.api_base_url),
            });
        }
        if self.model_id.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "model_id",
                message: "must not be empty".to_string(),
            });
        }
        if self.max_audio_size_mb == 0 {
            return Err(SettingsError::Invalid {
                field: "max_audio_size_mb",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            stability: self.stability,
            similarity_boost: self.similarity_boost,
        }
    }

    pub fn max_audio_bytes(&self) -> u64 {
        self.max_audio_size_mb.saturating_mul(1024 * 1024)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.model_id, DEFAULT_MODEL_ID);
        assert_eq!(settings.request_timeout_secs, None);
    }

    #[test]
    #[serial]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"default_volume": 0.4}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.default_volume, 0.4);
        assert_eq!(settings.stability, DEFAULT_STABILITY);
    }

    #[test]
    #[serial]
    fn test_out_of_range_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"stability": 1.5}"#).unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { field: "stability", .. }));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        Settings::default().save(&path).unwrap();

        std::env::set_var(ENV_MODEL_ID, "eleven_turbo_v2");
        let settings = Settings::load(&path);
        std::env::remove_var(ENV_MODEL_ID);

        assert_eq!(settings.unwrap().model_id, "eleven_turbo_v2");
    }

    #[test]
    fn test_max_audio_bytes_saturates() {
        let mut settings = Settings::default();
        settings.max_audio_size_mb = 2;
        assert_eq!(settings.max_audio_bytes(), 2 * 1024 * 1024);

        settings.max_audio_size_mb = u64::MAX;
        assert_eq!(settings.max_audio_bytes(), u64::MAX);
    }
}
