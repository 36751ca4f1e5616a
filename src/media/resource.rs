use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::AudioPayload;

static NEXT_BLOB_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of a playable resource (a URL or a `blob:` handle)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh handle for in-memory audio
    pub fn next_blob() -> Self {
        Self(format!("blob:{}", NEXT_BLOB_ID.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the audio bytes of a resource come from
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Url(String),
    Blob(AudioPayload),
}

impl MediaSource {
    pub fn resource_id(&self) -> ResourceId {
        match self {
            MediaSource::Url(url) => ResourceId::new(url.clone()),
            MediaSource::Blob(_) => ResourceId::next_blob(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Failed,
}

/// Observable view of one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayableResource {
    pub id: ResourceId,
    pub duration_seconds: f64,
    pub position_seconds: f64,
    pub volume: f32,
    pub state: PlaybackState,
}

impl PlayableResource {
    pub fn is_muted(&self) -> bool {
        self.volume == 0.0
    }
}

/// Format seconds as `m:ss` for display
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
