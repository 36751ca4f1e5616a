/// Configuration constants for the speech API clients

/// Default base URL of the hosted speech API (versioned)
pub const DEFAULT_API_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// Default synthesis / conversion model
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";

/// Default voice stability (0.0 = expressive, 1.0 = monotone)
pub const DEFAULT_STABILITY: f32 = 0.5;

/// Default similarity boost towards the original voice
pub const DEFAULT_SIMILARITY_BOOST: f32 = 0.5;

/// Header carrying the API credential
pub const API_KEY_HEADER: &str = "xi-api-key";

/// Maximum characters accepted in one synthesis request
pub const MAX_TEXT_LENGTH: usize = 5_000;

/// Default cap for downloaded audio (preview samples, clips) in megabytes
pub const DEFAULT_MAX_AUDIO_SIZE_MB: u64 = 50;

/// Error status the API uses for an exhausted character quota
pub const QUOTA_EXCEEDED_STATUS: &str = "quota_exceeded";
