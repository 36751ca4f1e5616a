use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::api::{ApiError, ConversionRequest, SpeechApi, SynthesisRequest, VoiceDescriptor};
use crate::audio::{AudioPayload, MIME_MPEG};
use crate::audio::{CaptureError, CaptureFormat, CaptureHandle, ChunkSender, Microphone};
use crate::media::{
    MediaBackend, MediaError, MediaHandle, MediaMetadata, MediaSessionController, MediaSource,
    PlaybackState, ResourceId,
};

pub const CLIP_SECONDS: f64 = 30.0;

/// Scriptable media backend: loads can be held open, made to fail, and every
/// transport call is recorded.
#[derive(Default)]
pub struct FakeBackend {
    next_handle: AtomicU64,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    failing_loads: Mutex<HashSet<String>>,
    failing_starts: Mutex<HashSet<String>>,
    handles: Mutex<HashMap<MediaHandle, String>>,
    calls: Mutex<Vec<String>>,
}

fn source_key(source: &MediaSource) -> String {
    match source {
        MediaSource::Url(url) => url.clone(),
        MediaSource::Blob(_) => "blob".to_string(),
    }
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold loads of `key` until the returned notify fires
    pub fn gate(&self, key: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(key.to_string(), notify.clone());
        notify
    }

    pub fn fail_load(&self, key: &str) {
        self.failing_loads.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_start(&self, key: &str) {
        self.failing_starts.lock().unwrap().insert(key.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn key_of(&self, handle: MediaHandle) -> String {
        self.handles
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn load(&self, source: &MediaSource) -> Result<(MediaHandle, MediaMetadata), MediaError> {
        let key = source_key(source);
        self.record(format!("load:{}", key));

        let gate = self.gates.lock().unwrap().get(&key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing_loads.lock().unwrap().contains(&key) {
            return Err(MediaError::Decode(format!("cannot decode {}", key)));
        }

        let handle = MediaHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.handles.lock().unwrap().insert(handle, key);
        Ok((
            handle,
            MediaMetadata {
                duration_seconds: CLIP_SECONDS,
            },
        ))
    }

    fn start(&self, handle: MediaHandle, position_seconds: f64, _volume: f32) -> Result<(), MediaError> {
        let key = self.key_of(handle);
        self.record(format!("start:{}@{}", key, position_seconds));
        if self.failing_starts.lock().unwrap().contains(&key) {
            return Err(MediaError::Playback("autoplay blocked".to_string()));
        }
        Ok(())
    }

    fn pause(&self, handle: MediaHandle) {
        let key = self.key_of(handle);
        self.record(format!("pause:{}", key));
    }

    fn seek(&self, handle: MediaHandle, position_seconds: f64) {
        let key = self.key_of(handle);
        self.record(format!("seek:{}@{}", key, position_seconds));
    }

    fn set_volume(&self, handle: MediaHandle, volume: f32) {
        let key = self.key_of(handle);
        self.record(format!("volume:{}@{}", key, volume));
    }

    fn release(&self, handle: MediaHandle) {
        let key = self.key_of(handle);
        self.record(format!("release:{}", key));
    }
}

pub fn controller_with(backend: &Arc<FakeBackend>) -> MediaSessionController {
    MediaSessionController::new(backend.clone(), 1.0)
}

pub fn state_of(controller: &MediaSessionController, id: &ResourceId) -> Option<PlaybackState> {
    controller.snapshot(id).map(|r| r.state)
}

/// Poll until `id` reaches `state` or a second passes
pub async fn wait_for_state(controller: &MediaSessionController, id: &ResourceId, state: PlaybackState) -> bool {
    for _ in 0..100 {
        if state_of(controller, id) == Some(state) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Microphone that delivers a fixed set of chunks as soon as it opens
pub struct FakeMicrophone {
    pub chunks: Vec<Bytes>,
    pub format: CaptureFormat,
    pub deny: bool,
}

impl FakeMicrophone {
    pub fn pcm(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Bytes::from).collect(),
            format: CaptureFormat::Pcm16 {
                sample_rate: 16_000,
                channels: 1,
            },
            deny: false,
        }
    }

    pub fn denied() -> Self {
        Self {
            chunks: Vec::new(),
            format: CaptureFormat::Pcm16 {
                sample_rate: 16_000,
                channels: 1,
            },
            deny: true,
        }
    }
}

struct FakeCapture {
    format: CaptureFormat,
}

impl CaptureHandle for FakeCapture {
    fn format(&self) -> CaptureFormat {
        self.format.clone()
    }

    fn stop(self: Box<Self>) -> Result<(), CaptureError> {
        Ok(())
    }
}

impl Microphone for FakeMicrophone {
    fn open(&self, chunks: ChunkSender) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied("user dismissed the prompt".to_string()));
        }
        for chunk in &self.chunks {
            let _ = chunks.send(chunk.clone());
        }
        Ok(Box::new(FakeCapture {
            format: self.format.clone(),
        }))
    }
}

pub fn voice(id: &str, name: &str, preview_url: Option<&str>) -> VoiceDescriptor {
    VoiceDescriptor {
        id: id.to_string(),
        display_name: name.to_string(),
        language_label: "en".to_string(),
        accent_label: "american".to_string(),
        gender_label: "female".to_string(),
        description: None,
        preview_url: preview_url.map(|u| u.to_string()),
    }
}

/// Speech API whose synthesis waits until released, to hold the studio busy
pub struct GatedApi {
    pub release: Arc<Notify>,
}

impl GatedApi {
    pub fn new() -> Self {
        Self {
            release: Arc::new(Notify::new()),
        }
    }
}

fn clip() -> AudioPayload {
    AudioPayload::new(&b"ID3\x04gated"[..], MIME_MPEG)
}

#[async_trait]
impl SpeechApi for GatedApi {
    async fn list_voices(&self) -> Result<Vec<VoiceDescriptor>, ApiError> {
        Ok(Vec::new())
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<AudioPayload, ApiError> {
        self.release.notified().await;
        Ok(clip())
    }

    async fn convert_recording(&self, _request: &ConversionRequest) -> Result<AudioPayload, ApiError> {
        Ok(clip())
    }

    async fn fetch_audio(&self, _url: &str) -> Result<AudioPayload, ApiError> {
        Ok(clip())
    }
}
