//! Media session controller.
//!
//! Owns every playable resource in the session and enforces that at most one
//! of them is audible. Ownership changes happen under a single lock, so the
//! previous owner is paused (and its `Paused` event emitted) before the new
//! owner can report `Playing`. Loads run with the lock released; each `play`
//! call takes a generation ticket and a load whose ticket is no longer the
//! pending one is discarded instead of starting playback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::backend::{BackendEvent, MediaBackend, MediaError, MediaHandle};
use super::resource::{MediaSource, PlayableResource, PlaybackState, ResourceId};
use crate::audio::AudioPayload;
use crate::utils::logger::{log_event, LogEvent};

const EVENT_CAPACITY: usize = 256;
const DEFAULT_RESTORE_VOLUME: f32 = 1.0;

/// Observable changes emitted by the controller, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    StateChanged {
        id: ResourceId,
        state: PlaybackState,
    },
    LoadedMetadata {
        id: ResourceId,
        duration_seconds: f64,
    },
    TimeUpdate {
        id: ResourceId,
        position_seconds: f64,
    },
    VolumeChanged {
        id: ResourceId,
        volume: f32,
    },
    Ended {
        id: ResourceId,
    },
    Released {
        id: ResourceId,
    },
}

struct ResourceEntry {
    source: MediaSource,
    handle: Option<MediaHandle>,
    duration_seconds: f64,
    position_seconds: f64,
    volume: f32,
    last_audible_volume: Option<f32>,
    state: PlaybackState,
}

impl ResourceEntry {
    fn snapshot(&self, id: &ResourceId) -> PlayableResource {
        PlayableResource {
            id: id.clone(),
            duration_seconds: self.duration_seconds,
            position_seconds: self.position_seconds,
            volume: self.volume,
            state: self.state,
        }
    }
}

#[derive(Default)]
struct SessionInner {
    resources: HashMap<ResourceId, ResourceEntry>,
    handles: HashMap<MediaHandle, ResourceId>,
    slots: HashMap<String, ResourceId>,
    /// Resource that currently owns the audio output
    playing: Option<ResourceId>,
    /// Load in flight that will take ownership when it completes
    pending: Option<(ResourceId, u64)>,
    generation: u64,
}

struct Shared {
    inner: Mutex<SessionInner>,
    backend: Arc<dyn MediaBackend>,
    events: broadcast::Sender<MediaEvent>,
    default_volume: f32,
}

/// Cloneable handle to the session; all clones share the same resources.
#[derive(Clone)]
pub struct MediaSessionController {
    shared: Arc<Shared>,
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

fn clamp_position(position: f64, duration: f64) -> f64 {
    if !position.is_finite() || position < 0.0 {
        return 0.0;
    }
    position.min(duration.max(0.0))
}

impl MediaSessionController {
    pub fn new(backend: Arc<dyn MediaBackend>, default_volume: f32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(SessionInner::default()),
                backend,
                events,
                default_volume: clamp_volume(default_volume),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.shared.events.subscribe()
    }

    /// Forward backend notifications into the session until the backend
    /// drops its sender or every controller handle is gone.
    pub fn attach(&self, mut backend_events: mpsc::UnboundedReceiver<BackendEvent>) -> JoinHandle<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            while let Some(event) = backend_events.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                MediaSessionController { shared }.handle_backend_event(event);
            }
            log::debug!("Media backend event stream closed");
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        match self.shared.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Recovering from poisoned mutex in MediaSessionController");
                poisoned.into_inner()
            }
        }
    }

    fn emit(&self, event: MediaEvent) {
        // No subscribers is fine
        let _ = self.shared.events.send(event);
    }

    fn set_state(&self, entry: &mut ResourceEntry, id: &ResourceId, state: PlaybackState) {
        if entry.state == state {
            return;
        }
        log::debug!("[MEDIA] {}: {:?} -> {:?}", id, entry.state, state);
        entry.state = state;
        self.emit(MediaEvent::StateChanged {
            id: id.clone(),
            state,
        });
    }

    /// Register a source with the session. Opening a URL that is already
    /// registered returns the existing resource untouched.
    pub fn open(&self, source: MediaSource) -> ResourceId {
        let id = source.resource_id();
        let mut inner = self.lock();
        if inner.resources.contains_key(&id) {
            return id;
        }

        let volume = self.shared.default_volume;
        inner.resources.insert(
            id.clone(),
            ResourceEntry {
                source,
                handle: None,
                duration_seconds: 0.0,
                position_seconds: 0.0,
                volume,
                last_audible_volume: (volume > 0.0).then_some(volume),
                state: PlaybackState::Idle,
            },
        );
        self.emit(MediaEvent::StateChanged {
            id: id.clone(),
            state: PlaybackState::Idle,
        });
        id
    }

    /// Open `source` under a named slot, releasing whatever the slot held.
    pub fn replace(&self, slot: &str, source: MediaSource) -> ResourceId {
        let id = self.open(source);
        let previous = {
            let mut inner = self.lock();
            inner.slots.insert(slot.to_string(), id.clone())
        };
        if let Some(previous) = previous.filter(|p| *p != id) {
            self.release(&previous);
        }
        id
    }

    pub fn slot(&self, slot: &str) -> Option<ResourceId> {
        self.lock().slots.get(slot).cloned()
    }

    /// Drop a resource and its backend handle. Unknown ids are ignored.
    pub fn release(&self, id: &ResourceId) {
        let mut inner = self.lock();
        let Some(entry) = inner.resources.remove(id) else {
            return;
        };

        if inner.playing.as_ref() == Some(id) {
            inner.playing = None;
        }
        if inner.pending.as_ref().map(|(p, _)| p == id).unwrap_or(false) {
            inner.pending = None;
        }
        inner.slots.retain(|_, held| held != id);

        if let Some(handle) = entry.handle {
            inner.handles.remove(&handle);
            if entry.state == PlaybackState::Playing {
                self.shared.backend.pause(handle);
            }
            self.shared.backend.release(handle);
        }

        self.emit(MediaEvent::Released { id: id.clone() });
    }

    pub fn snapshot(&self, id: &ResourceId) -> Option<PlayableResource> {
        self.lock().resources.get(id).map(|entry| entry.snapshot(id))
    }

    pub fn now_playing(&self) -> Option<ResourceId> {
        self.lock().playing.clone()
    }

    /// Bytes behind a blob resource, for saving generated audio
    pub fn payload(&self, id: &ResourceId) -> Option<AudioPayload> {
        match &self.lock().resources.get(id)?.source {
            MediaSource::Blob(payload) => Some(payload.clone()),
            MediaSource::Url(_) => None,
        }
    }

    /// Pause the current owner and abandon any load in flight
    fn yield_ownership(&self, inner: &mut SessionInner, keep: Option<&ResourceId>) {
        if let Some(current) = inner.playing.clone() {
            if Some(&current) != keep {
                inner.playing = None;
                if let Some(entry) = inner.resources.get_mut(&current) {
                    if let Some(handle) = entry.handle {
                        self.shared.backend.pause(handle);
                    }
                    self.set_state(entry, &current, PlaybackState::Paused);
                    log_event(LogEvent::Playback {
                        resource: current.to_string(),
                        action: "paused (superseded)".to_string(),
                    });
                }
            }
        }

        if let Some((pending, _)) = inner.pending.clone() {
            if Some(&pending) != keep {
                inner.pending = None;
                if let Some(entry) = inner.resources.get_mut(&pending) {
                    if entry.state == PlaybackState::Loading {
                        self.set_state(entry, &pending, PlaybackState::Idle);
                    }
                }
            }
        }
    }

    /// True when `id` is audible or a newer `play` of `id` is loading
    fn owns_output(inner: &SessionInner, id: &ResourceId) -> bool {
        inner.playing.as_ref() == Some(id)
            || inner.pending.as_ref().map(|(p, _)| p == id).unwrap_or(false)
    }

    fn start_locked(
        &self,
        inner: &mut SessionInner,
        id: &ResourceId,
        handle: MediaHandle,
    ) -> Result<(), MediaError> {
        let Some(entry) = inner.resources.get_mut(id) else {
            return Err(MediaError::UnknownResource(id.to_string()));
        };

        // Replaying from the end restarts; a seek made after the end is kept
        if entry.state == PlaybackState::Ended && entry.position_seconds >= entry.duration_seconds {
            entry.position_seconds = 0.0;
        }

        if let Err(e) = self
            .shared
            .backend
            .start(handle, entry.position_seconds, entry.volume)
        {
            log::error!("Failed to start playback of {}: {}", id, e);
            self.set_state(entry, id, PlaybackState::Failed);
            return Err(e);
        }

        self.set_state(entry, id, PlaybackState::Playing);
        inner.playing = Some(id.clone());
        log_event(LogEvent::Playback {
            resource: id.to_string(),
            action: "playing".to_string(),
        });
        Ok(())
    }

    /// Make `id` the single audible resource.
    ///
    /// Returns `Superseded` when another resource took ownership while this
    /// one was still loading; in that case it never reaches `Playing`. A
    /// repeated `play` of the same resource does not supersede the earlier
    /// caller.
    pub async fn play(&self, id: &ResourceId) -> Result<(), MediaError> {
        let started = Instant::now();

        let (ticket, source) = {
            let mut inner = self.lock();
            let state = match inner.resources.get(id) {
                Some(entry) => entry.state,
                None => return Err(MediaError::UnknownResource(id.to_string())),
            };
            if state == PlaybackState::Playing {
                return Ok(());
            }

            inner.generation += 1;
            let ticket = inner.generation;
            self.yield_ownership(&mut inner, Some(id));

            let Some(entry) = inner.resources.get_mut(id) else {
                return Err(MediaError::UnknownResource(id.to_string()));
            };
            if let Some(handle) = entry.handle {
                inner.pending = None;
                return self.start_locked(&mut inner, id, handle);
            }

            self.set_state(entry, id, PlaybackState::Loading);
            let source = entry.source.clone();
            inner.pending = Some((id.clone(), ticket));
            (ticket, source)
        };

        let loaded = self.shared.backend.load(&source).await;

        let mut inner = self.lock();
        let current = inner
            .pending
            .as_ref()
            .map(|(pending, t)| pending == id && *t == ticket)
            .unwrap_or(false);

        match loaded {
            Ok((handle, metadata)) => {
                let Some(entry) = inner.resources.get_mut(id) else {
                    // Released while loading
                    self.shared.backend.release(handle);
                    return Err(MediaError::Superseded);
                };

                // A concurrent load of the same resource may have finished first
                let handle = match entry.handle {
                    Some(existing) => {
                        self.shared.backend.release(handle);
                        existing
                    }
                    None => {
                        entry.handle = Some(handle);
                        entry.duration_seconds = metadata.duration_seconds.max(0.0);
                        entry.position_seconds =
                            clamp_position(entry.position_seconds, entry.duration_seconds);
                        self.emit(MediaEvent::LoadedMetadata {
                            id: id.clone(),
                            duration_seconds: entry.duration_seconds,
                        });
                        inner.handles.insert(handle, id.clone());
                        handle
                    }
                };

                if !current {
                    if Self::owns_output(&inner, id) {
                        log::debug!("[MEDIA] {} already handled by a newer play (ticket {})", id, ticket);
                        return Ok(());
                    }
                    log::info!(
                        "[MEDIA] Discarding stale load of {} (ticket {} superseded)",
                        id,
                        ticket
                    );
                    return Err(MediaError::Superseded);
                }

                inner.pending = None;
                let result = self.start_locked(&mut inner, id, handle);
                if result.is_ok() {
                    log::debug!("[MEDIA] {} started in {}ms", id, started.elapsed().as_millis());
                }
                result
            }
            Err(e) => {
                if !current {
                    log::warn!("Stale load of {} failed: {}", id, e);
                    if inner.playing.as_ref() == Some(id) {
                        return Ok(());
                    }
                    return Err(MediaError::Superseded);
                }
                inner.pending = None;
                if let Some(entry) = inner.resources.get_mut(id) {
                    self.set_state(entry, id, PlaybackState::Failed);
                }
                log::error!("Failed to load {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Pause `id` if it is playing; otherwise a no-op.
    pub fn pause(&self, id: &ResourceId) {
        let mut inner = self.lock();
        let Some(entry) = inner.resources.get_mut(id) else {
            return;
        };
        if entry.state != PlaybackState::Playing {
            return;
        }
        if let Some(handle) = entry.handle {
            self.shared.backend.pause(handle);
        }
        self.set_state(entry, id, PlaybackState::Paused);
        if inner.playing.as_ref() == Some(id) {
            inner.playing = None;
        }
    }

    pub async fn toggle_play(&self, id: &ResourceId) -> Result<(), MediaError> {
        let playing = self
            .snapshot(id)
            .map(|r| r.state == PlaybackState::Playing)
            .ok_or_else(|| MediaError::UnknownResource(id.to_string()))?;
        if playing {
            self.pause(id);
            Ok(())
        } else {
            self.play(id).await
        }
    }

    /// Pause whatever is audible and cancel pending loads
    pub fn stop_all(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        self.yield_ownership(&mut inner, None);
    }

    /// Move the playhead; the position is clamped to `[0, duration]`.
    pub fn seek(&self, id: &ResourceId, position_seconds: f64) -> Result<f64, MediaError> {
        let mut inner = self.lock();
        let entry = inner
            .resources
            .get_mut(id)
            .ok_or_else(|| MediaError::UnknownResource(id.to_string()))?;

        let position = clamp_position(position_seconds, entry.duration_seconds);
        entry.position_seconds = position;
        if let Some(handle) = entry.handle {
            self.shared.backend.seek(handle, position);
        }
        self.emit(MediaEvent::TimeUpdate {
            id: id.clone(),
            position_seconds: position,
        });
        Ok(position)
    }

    fn apply_volume(&self, entry: &mut ResourceEntry, id: &ResourceId, volume: f32) {
        entry.volume = volume;
        if volume > 0.0 {
            entry.last_audible_volume = Some(volume);
        }
        if let Some(handle) = entry.handle {
            self.shared.backend.set_volume(handle, volume);
        }
        self.emit(MediaEvent::VolumeChanged {
            id: id.clone(),
            volume,
        });
    }

    /// Set volume, clamped to `[0, 1]`. Returns the applied value.
    pub fn set_volume(&self, id: &ResourceId, volume: f32) -> Result<f32, MediaError> {
        let mut inner = self.lock();
        let entry = inner
            .resources
            .get_mut(id)
            .ok_or_else(|| MediaError::UnknownResource(id.to_string()))?;
        let volume = clamp_volume(volume);
        self.apply_volume(entry, id, volume);
        Ok(volume)
    }

    /// Mute, or restore the last audible volume (1.0 if there never was one)
    pub fn toggle_mute(&self, id: &ResourceId) -> Result<f32, MediaError> {
        let mut inner = self.lock();
        let entry = inner
            .resources
            .get_mut(id)
            .ok_or_else(|| MediaError::UnknownResource(id.to_string()))?;
        let volume = if entry.volume == 0.0 {
            entry.last_audible_volume.unwrap_or(DEFAULT_RESTORE_VOLUME)
        } else {
            0.0
        };
        self.apply_volume(entry, id, volume);
        Ok(volume)
    }

    pub fn on_loaded_metadata(&self, id: &ResourceId, duration_seconds: f64) {
        if !duration_seconds.is_finite() || duration_seconds < 0.0 {
            log::warn!("Ignoring invalid duration {} for {}", duration_seconds, id);
            return;
        }
        let mut inner = self.lock();
        let Some(entry) = inner.resources.get_mut(id) else {
            return;
        };
        entry.duration_seconds = duration_seconds;
        entry.position_seconds = clamp_position(entry.position_seconds, duration_seconds);
        self.emit(MediaEvent::LoadedMetadata {
            id: id.clone(),
            duration_seconds,
        });
    }

    /// Playhead progress reported by the backend; only the owner reports.
    pub fn on_time_update(&self, id: &ResourceId, position_seconds: f64) {
        let mut inner = self.lock();
        let Some(entry) = inner.resources.get_mut(id) else {
            return;
        };
        if entry.state != PlaybackState::Playing {
            return;
        }
        let duration = entry.duration_seconds;
        let position = if duration > 0.0 {
            clamp_position(position_seconds, duration)
        } else {
            position_seconds.max(0.0)
        };
        entry.position_seconds = position;
        self.emit(MediaEvent::TimeUpdate {
            id: id.clone(),
            position_seconds: position,
        });
    }

    /// Natural end of playback; the resource gives up ownership.
    pub fn on_ended(&self, id: &ResourceId) {
        let mut inner = self.lock();
        let Some(entry) = inner.resources.get_mut(id) else {
            return;
        };
        if entry.state != PlaybackState::Playing {
            return;
        }
        if entry.duration_seconds > 0.0 {
            entry.position_seconds = entry.duration_seconds;
        }
        self.set_state(entry, id, PlaybackState::Ended);
        if inner.playing.as_ref() == Some(id) {
            inner.playing = None;
        }
        self.emit(MediaEvent::Ended { id: id.clone() });
        log_event(LogEvent::Playback {
            resource: id.to_string(),
            action: "ended".to_string(),
        });
    }

    fn on_backend_error(&self, id: &ResourceId, message: &str) {
        let mut inner = self.lock();
        let Some(entry) = inner.resources.get_mut(id) else {
            return;
        };
        log::error!("Playback error on {}: {}", id, message);
        self.set_state(entry, id, PlaybackState::Failed);
        if inner.playing.as_ref() == Some(id) {
            inner.playing = None;
        }
    }

    pub fn handle_backend_event(&self, event: BackendEvent) {
        let handle = match &event {
            BackendEvent::TimeUpdate { handle, .. }
            | BackendEvent::Ended { handle }
            | BackendEvent::Error { handle, .. } => *handle,
        };
        let Some(id) = self.lock().handles.get(&handle).cloned() else {
            return;
        };

        match event {
            BackendEvent::TimeUpdate {
                position_seconds, ..
            } => self.on_time_update(&id, position_seconds),
            BackendEvent::Ended { .. } => self.on_ended(&id),
            BackendEvent::Error { message, .. } => self.on_backend_error(&id, &message),
        }
    }
}
