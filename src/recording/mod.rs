//! Microphone recording sessions.

pub mod session;
pub mod state_machine;

pub use session::RecordingSession;
pub use state_machine::{RecordingState, RecordingStateMachine};

use crate::api::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("No voice selected")]
    NoVoiceSelected,

    #[error("Microphone access denied: {0}")]
    MicrophoneDenied(String),

    #[error("Microphone capture failed: {0}")]
    Capture(String),

    #[error("Invalid recording transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: RecordingState,
        to: RecordingState,
    },

    #[error("Recording session already finished ({0:?}); start a new one")]
    AlreadyFinished(RecordingState),

    #[error("Could not assemble recording: {0}")]
    Assembly(String),

    #[error("Processing failed: {0}")]
    Processing(#[from] ApiError),
}
