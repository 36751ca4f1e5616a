pub mod capture;
pub mod payload;

pub use capture::{CaptureError, CaptureHandle, ChunkSender, FileMicrophone, Microphone};
pub use payload::{AudioPayload, CaptureFormat, MIME_MPEG, MIME_WAV};
