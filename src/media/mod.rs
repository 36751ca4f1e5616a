//! Playback of generated clips and voice previews.
//!
//! `MediaSessionController` keeps at most one resource audible at a time.
//! Actual audio output goes through a `MediaBackend`: rodio on devices with
//! the `device-audio` feature, or the silent backend for headless runs.

pub mod backend;
pub mod controller;
pub mod resource;
#[cfg(feature = "device-audio")]
pub mod rodio_backend;

pub use backend::{BackendEvent, MediaBackend, MediaError, MediaHandle, MediaMetadata, SilentBackend};
pub use controller::{MediaEvent, MediaSessionController};
pub use resource::{format_time, MediaSource, PlayableResource, PlaybackState, ResourceId};
#[cfg(feature = "device-audio")]
pub use rodio_backend::RodioBackend;
