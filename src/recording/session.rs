use bytes::Bytes;
use std::time::Instant;
use tokio::sync::mpsc;

use super::state_machine::{RecordingState, RecordingStateMachine};
use super::RecordingError;
use crate::api::{ConversionRequest, SpeechApi};
use crate::audio::{AudioPayload, CaptureError, CaptureFormat, CaptureHandle, Microphone};
use crate::utils::logger::{log_complete, log_failed, log_start, LogContext};

/// One microphone take: capture, assemble, upload for voice conversion.
///
/// A session is single-use. Once it reaches `Complete` or `Failed` a new
/// session has to be created to record again.
pub struct RecordingSession {
    machine: RecordingStateMachine,
    voice_id: Option<String>,
    chunks: Vec<Bytes>,
    format: Option<CaptureFormat>,
    capture: Option<Box<dyn CaptureHandle>>,
    chunk_rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    payload: Option<AudioPayload>,
    converted: Option<AudioPayload>,
    started_at: Option<Instant>,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            machine: RecordingStateMachine::new(),
            voice_id: None,
            chunks: Vec::new(),
            format: None,
            capture: None,
            chunk_rx: None,
            payload: None,
            converted: None,
            started_at: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.machine.current()
    }

    pub fn voice_id(&self) -> Option<&str> {
        self.voice_id.as_deref()
    }

    /// Assembled capture, available from `Processing` on
    pub fn payload(&self) -> Option<&AudioPayload> {
        self.payload.as_ref()
    }

    /// Converted audio returned by the API once `Complete`
    pub fn result(&self) -> Option<&AudioPayload> {
        self.converted.as_ref()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Open the microphone and begin collecting chunks.
    ///
    /// Fails without leaving `Idle` when no voice is selected or the device
    /// cannot be opened.
    pub fn start(&mut self, voice_id: Option<&str>, microphone: &dyn Microphone) -> Result<(), RecordingError> {
        match self.state() {
            RecordingState::Idle => {}
            state if state.is_terminal() => return Err(RecordingError::AlreadyFinished(state)),
            state => {
                return Err(RecordingError::InvalidTransition {
                    from: state,
                    to: RecordingState::Recording,
                })
            }
        }

        let voice_id = voice_id
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(RecordingError::NoVoiceSelected)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let capture = microphone.open(tx).map_err(|e| match e {
            CaptureError::PermissionDenied(message) => RecordingError::MicrophoneDenied(message),
            CaptureError::NoDevice => {
                RecordingError::MicrophoneDenied("No input device available".to_string())
            }
            other => RecordingError::Capture(other.to_string()),
        })?;

        self.machine.transition_to(RecordingState::Recording)?;
        self.format = Some(capture.format());
        self.capture = Some(capture);
        self.chunk_rx = Some(rx);
        self.voice_id = Some(voice_id.to_string());
        self.started_at = Some(Instant::now());
        log::info!("🎙️ Recording started for voice {}", voice_id);
        Ok(())
    }

    /// Append a chunk delivered by the host. Ignored outside `Recording`.
    pub fn push_chunk(&mut self, chunk: Bytes) -> bool {
        if !self.machine.can_stop() || chunk.is_empty() {
            return false;
        }
        self.chunks.push(chunk);
        true
    }

    fn drain_capture(&mut self) {
        let Some(rx) = self.chunk_rx.as_mut() else {
            return;
        };
        while let Ok(chunk) = rx.try_recv() {
            if !chunk.is_empty() {
                self.chunks.push(chunk);
            }
        }
    }

    /// Stop capturing and assemble the take into one payload.
    ///
    /// A no-op returning `Ok(None)` when not recording.
    pub fn stop(&mut self) -> Result<Option<&AudioPayload>, RecordingError> {
        if !self.machine.can_stop() {
            log::debug!("stop() ignored in {:?}", self.state());
            return Ok(None);
        }

        if let Some(capture) = self.capture.take() {
            if let Err(e) = capture.stop() {
                log::warn!("Capture did not stop cleanly: {}", e);
            }
        }
        self.drain_capture();
        self.chunk_rx = None;

        self.machine.transition_to(RecordingState::Processing)?;
        if let Some(started) = self.started_at {
            log::info!(
                "⏹️ Recording stopped after {}ms with {} chunks",
                started.elapsed().as_millis(),
                self.chunks.len()
            );
        }

        if self.chunks.is_empty() {
            self.machine.transition_to(RecordingState::Failed)?;
            return Err(RecordingError::Assembly("No audio captured".to_string()));
        }

        let format = self.format.clone().unwrap_or(CaptureFormat::Encoded {
            mime: crate::audio::MIME_WAV.to_string(),
        });
        match AudioPayload::assemble(&self.chunks, &format) {
            Ok(payload) => {
                self.payload = Some(payload);
                Ok(self.payload.as_ref())
            }
            Err(e) => {
                self.machine.transition_to(RecordingState::Failed)?;
                Err(RecordingError::Assembly(e.to_string()))
            }
        }
    }

    /// Settle `Processing` with the outcome of the network call
    pub fn finish(&mut self, outcome: Result<AudioPayload, String>) -> Result<(), RecordingError> {
        match outcome {
            Ok(audio) => {
                self.machine.transition_to(RecordingState::Complete)?;
                self.converted = Some(audio);
            }
            Err(message) => {
                log::error!("Recording processing failed: {}", message);
                self.machine.transition_to(RecordingState::Failed)?;
            }
        }
        Ok(())
    }

    /// Stop if needed, upload the take for conversion and settle the session
    pub async fn submit(&mut self, api: &dyn SpeechApi, model_id: &str) -> Result<AudioPayload, RecordingError> {
        self.stop()?;

        if self.state() != RecordingState::Processing {
            return Err(match self.state() {
                state if state.is_terminal() => RecordingError::AlreadyFinished(state),
                state => RecordingError::InvalidTransition {
                    from: state,
                    to: RecordingState::Complete,
                },
            });
        }

        let (Some(payload), Some(voice_id)) = (self.payload.clone(), self.voice_id.clone()) else {
            self.machine.transition_to(RecordingState::Failed)?;
            return Err(RecordingError::Assembly("No audio captured".to_string()));
        };

        let mut request = ConversionRequest::new(payload, voice_id.clone());
        request.model_id = model_id.to_string();

        let started = Instant::now();
        log_start(
            "VOICE_CONVERSION",
            Some(
                LogContext::new()
                    .with("voice_id", &voice_id)
                    .with("bytes", request.audio.len()),
            ),
        );

        match api.convert_recording(&request).await {
            Ok(audio) => {
                log_complete("VOICE_CONVERSION", started);
                self.finish(Ok(audio.clone()))?;
                Ok(audio)
            }
            Err(e) => {
                log_failed(
                    "VOICE_CONVERSION",
                    &e.to_string(),
                    Some(LogContext::new().with("voice_id", &voice_id)),
                );
                self.finish(Err(e.to_string()))?;
                Err(RecordingError::Processing(e))
            }
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(capture) = self.capture.take() {
            log::debug!("Recording session dropped while capturing; stopping microphone");
            let _ = capture.stop();
        }
    }
}
