//! Front-end facing orchestration.
//!
//! `VoiceStudio` ties the API client, the media session and the notifier
//! together. Its operations never return errors: every failure is turned
//! into a `Notification` at the boundary and the caller only learns whether
//! a result was produced.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::api::{ApiError, SpeechApi, SynthesisRequest, VoiceDescriptor};
use crate::audio::Microphone;
use crate::catalog::VoiceFilter;
use crate::document::{extract_text, PdfParser, UploadedFile};
use crate::media::{MediaError, MediaSessionController, MediaSource, PlaybackState, ResourceId};
use crate::notification::{Notification, Notifier};
use crate::recording::RecordingSession;
use crate::settings::Settings;
use crate::utils::logger::{log_complete, log_failed, log_start, LogContext};

pub const PLAYER_SLOT: &str = "player";
pub const PREVIEW_SLOT: &str = "preview";
pub const WELCOME_SLOT: &str = "welcome";

/// Clears the busy flag when the remote call finishes, however it finishes
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct VoiceStudio {
    api: Arc<dyn SpeechApi>,
    media: MediaSessionController,
    notifier: Arc<dyn Notifier>,
    settings: Settings,
    voices: Mutex<Vec<VoiceDescriptor>>,
    selected_voice: Mutex<Option<String>>,
    busy: AtomicBool,
}

impl VoiceStudio {
    pub fn new(
        api: Arc<dyn SpeechApi>,
        media: MediaSessionController,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Self {
        Self {
            api,
            media,
            notifier,
            settings,
            voices: Mutex::new(Vec::new()),
            selected_voice: Mutex::new(None),
            busy: AtomicBool::new(false),
        }
    }

    pub fn api(&self) -> &dyn SpeechApi {
        self.api.as_ref()
    }

    pub fn media(&self) -> &MediaSessionController {
        &self.media
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    /// True while a synthesis or conversion request is outstanding
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn begin_remote_call(&self) -> Option<BusyGuard<'_>> {
        let guard = BusyGuard::acquire(&self.busy);
        if guard.is_none() {
            self.notify(Notification::info(
                "Please wait",
                "A conversion is already in progress",
            ));
        }
        guard
    }

    pub async fn load_voices(&self) -> Vec<VoiceDescriptor> {
        match self.api.list_voices().await {
            Ok(voices) => {
                log::info!("Loaded {} voices", voices.len());
                if let Ok(mut cached) = self.voices.lock() {
                    *cached = voices.clone();
                }
                voices
            }
            Err(e) => {
                log::error!("Failed to load voices: {}", e);
                self.notify(Notification::from(&e));
                Vec::new()
            }
        }
    }

    pub fn voices(&self) -> Vec<VoiceDescriptor> {
        self.voices.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn filtered_voices(&self, filter: &VoiceFilter) -> Vec<VoiceDescriptor> {
        let voices = self.voices();
        filter.apply(&voices).into_iter().cloned().collect()
    }

    pub fn select_voice(&self, voice_id: &str) {
        if let Ok(mut selected) = self.selected_voice.lock() {
            *selected = Some(voice_id.to_string());
        }
    }

    pub fn selected_voice(&self) -> Option<String> {
        self.selected_voice.lock().ok().and_then(|v| v.clone())
    }

    pub fn selected_voice_info(&self) -> Option<VoiceDescriptor> {
        let selected = self.selected_voice()?;
        self.voices().into_iter().find(|v| v.id == selected)
    }

    /// Synthesize `text` with the selected voice into the player slot.
    ///
    /// Validation failures are reported before any request is sent. On
    /// success the clip is registered `Idle`, ready to play.
    pub async fn convert_text(&self, text: &str) -> Option<ResourceId> {
        let request = SynthesisRequest::new(text, self.selected_voice().unwrap_or_default())
            .with_model(self.settings.model_id.clone())
            .with_settings(self.settings.voice_settings());
        if let Err(e) = request.validate() {
            self.notify(Notification::from(&e));
            return None;
        }

        let _busy = self.begin_remote_call()?;
        let started = Instant::now();
        log_start(
            "SYNTHESIS",
            Some(
                LogContext::new()
                    .with("voice_id", &request.voice_id)
                    .with("chars", request.text.chars().count()),
            ),
        );

        match self.api.synthesize(&request).await {
            Ok(payload) => {
                log_complete("SYNTHESIS", started);
                let id = self.media.replace(PLAYER_SLOT, MediaSource::Blob(payload));
                self.notify(Notification::info("Done", "Your audio is ready"));
                Some(id)
            }
            Err(e) => {
                self.report_api_failure("SYNTHESIS", &e);
                None
            }
        }
    }

    fn report_api_failure(&self, operation: &str, err: &ApiError) {
        log_failed(operation, &err.to_string(), None);
        self.notify(Notification::from(err));
    }

    /// Begin a take; any audible clip is paused so it is not recorded.
    /// Refused while another request is outstanding.
    pub fn start_recording(&self, session: &mut RecordingSession, microphone: &dyn Microphone) -> bool {
        if self.is_busy() {
            self.notify(Notification::info(
                "Please wait",
                "A conversion is already in progress",
            ));
            return false;
        }
        self.media.stop_all();
        match session.start(self.selected_voice().as_deref(), microphone) {
            Ok(()) => true,
            Err(e) => {
                self.notify(Notification::from(&e));
                false
            }
        }
    }

    /// Stop the take, upload it for conversion and put the result in the player.
    ///
    /// If another request is still running this returns `None` without
    /// touching the session: the take keeps recording and can be submitted
    /// once the studio is idle again.
    pub async fn convert_recording(&self, session: &mut RecordingSession) -> Option<ResourceId> {
        let _busy = self.begin_remote_call()?;
        match session.submit(self.api.as_ref(), &self.settings.model_id).await {
            Ok(payload) => {
                let id = self.media.replace(PLAYER_SLOT, MediaSource::Blob(payload));
                self.notify(Notification::info(
                    "Success",
                    "The recording was processed successfully",
                ));
                Some(id)
            }
            Err(e) => {
                self.notify(Notification::from(&e));
                None
            }
        }
    }

    /// Toggle the preview sample of `voice_id`. Clicking another voice's
    /// preview replaces the current one.
    pub async fn preview_voice(&self, voice_id: &str) -> Option<PlaybackState> {
        let url = self
            .voices()
            .into_iter()
            .find(|v| v.id == voice_id)
            .and_then(|v| v.preview_url);
        let Some(url) = url else {
            self.notify(Notification::error("No preview available for this voice"));
            return None;
        };

        let id = ResourceId::new(url.clone());
        if self.media.slot(PREVIEW_SLOT).as_ref() != Some(&id) {
            self.media.replace(PREVIEW_SLOT, MediaSource::Url(url));
        }

        match self.media.toggle_play(&id).await {
            Ok(()) => self.media.snapshot(&id).map(|r| r.state),
            Err(MediaError::Superseded) => None,
            Err(e) => {
                self.notify(Notification::from(&e));
                None
            }
        }
    }

    /// Play or pause the clip in the player slot
    pub async fn toggle_player(&self) -> Option<PlaybackState> {
        let id = self.media.slot(PLAYER_SLOT)?;
        match self.media.toggle_play(&id).await {
            Ok(()) => self.media.snapshot(&id).map(|r| r.state),
            Err(MediaError::Superseded) => None,
            Err(e) => {
                self.notify(Notification::from(&e));
                None
            }
        }
    }

    /// Save the clip in the player slot into `dir` under the configured name
    pub fn download(&self, dir: &Path) -> Option<PathBuf> {
        let payload = self
            .media
            .slot(PLAYER_SLOT)
            .and_then(|id| self.media.payload(&id));
        let Some(payload) = payload else {
            self.notify(Notification::error("There is no audio to download yet"));
            return None;
        };

        let path = dir.join(&self.settings.download_file_name);
        match payload.save_to(&path) {
            Ok(()) => {
                log::info!("Saved {} bytes to {}", payload.len(), path.display());
                Some(path)
            }
            Err(e) => {
                log::error!("Failed to save audio to {}: {}", path.display(), e);
                self.notify(Notification::error(format!("Could not save the file: {}", e)));
                None
            }
        }
    }

    pub async fn load_document(&self, file: &UploadedFile, parser: &dyn PdfParser) -> Option<String> {
        match extract_text(file, parser).await {
            Ok(text) => {
                self.notify(Notification::info(
                    "Text extracted",
                    "You can now convert it to speech",
                ));
                Some(text)
            }
            Err(e) => {
                log::error!("Document extraction failed for {}: {}", file.name, e);
                self.notify(Notification::from(&e));
                None
            }
        }
    }
}
