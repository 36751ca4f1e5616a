use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::resource::MediaSource;
use crate::api::SpeechApi;

/// Backend-side handle of a loaded resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaMetadata {
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MediaError {
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Failed to load audio: {0}")]
    Load(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Playback request was superseded by a newer one")]
    Superseded,

    #[error("Audio output unavailable: {0}")]
    BackendUnavailable(String),
}

/// Notifications a backend pushes back to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    TimeUpdate {
        handle: MediaHandle,
        position_seconds: f64,
    },
    Ended {
        handle: MediaHandle,
    },
    Error {
        handle: MediaHandle,
        message: String,
    },
}

/// The host's media element: loads, decodes and renders audio.
///
/// Only `load` may suspend; the transport calls are expected to return
/// immediately because the controller issues them while holding its lock.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn load(&self, source: &MediaSource) -> Result<(MediaHandle, MediaMetadata), MediaError>;

    fn start(&self, handle: MediaHandle, position_seconds: f64, volume: f32) -> Result<(), MediaError>;

    fn pause(&self, handle: MediaHandle);

    fn seek(&self, handle: MediaHandle, position_seconds: f64);

    fn set_volume(&self, handle: MediaHandle, volume: f32);

    fn release(&self, handle: MediaHandle);
}

/// Encoded bytes behind `source`. URLs go through the speech client's
/// download, which enforces the scheme check and the size limit.
pub async fn source_bytes(source: &MediaSource, fetcher: &dyn SpeechApi) -> Result<Bytes, MediaError> {
    match source {
        MediaSource::Blob(payload) => Ok(payload.bytes().clone()),
        MediaSource::Url(url) => fetcher
            .fetch_audio(url)
            .await
            .map(|payload| payload.bytes().clone())
            .map_err(|e| MediaError::Load(e.to_string())),
    }
}

/// Backend for headless runs: resources load and "play" without producing
/// sound, so clips can still be produced and saved. Playback ends as soon as
/// it starts.
#[derive(Default)]
pub struct SilentBackend {
    next_handle: AtomicU64,
    events: Option<mpsc::UnboundedSender<BackendEvent>>,
}

impl SilentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also report the immediate end of every playback
    pub fn with_events() -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                next_handle: AtomicU64::new(0),
                events: Some(tx),
            },
            rx,
        )
    }
}

#[async_trait]
impl MediaBackend for SilentBackend {
    async fn load(&self, _source: &MediaSource) -> Result<(MediaHandle, MediaMetadata), MediaError> {
        let handle = MediaHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        Ok((
            handle,
            MediaMetadata {
                duration_seconds: 0.0,
            },
        ))
    }

    fn start(&self, handle: MediaHandle, _position_seconds: f64, _volume: f32) -> Result<(), MediaError> {
        log::debug!("Silent backend: start {:?}", handle);
        if let Some(events) = &self.events {
            let _ = events.send(BackendEvent::Ended { handle });
        }
        Ok(())
    }

    fn pause(&self, _handle: MediaHandle) {}

    fn seek(&self, _handle: MediaHandle, _position_seconds: f64) {}

    fn set_volume(&self, _handle: MediaHandle, _volume: f32) {}

    fn release(&self, _handle: MediaHandle) {}
}
