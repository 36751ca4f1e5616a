//! Speaker output through rodio.
//!
//! The output stream is not `Send`, so it lives on a dedicated thread that
//! owns every sink. Callers talk to it over a command channel; the thread
//! polls active sinks and reports progress and completion as backend events.

use async_trait::async_trait;
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, Sink, Source};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::backend::{source_bytes, BackendEvent, MediaBackend, MediaError, MediaHandle, MediaMetadata};
use super::resource::MediaSource;
use crate::api::SpeechApi;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

struct DecodedAudio {
    samples: Arc<Vec<i16>>,
    channels: u16,
    sample_rate: u32,
}

impl DecodedAudio {
    fn duration_seconds(&self) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.channels as f64 / self.sample_rate as f64
    }

    fn buffer(&self) -> SamplesBuffer<i16> {
        SamplesBuffer::new(self.channels, self.sample_rate, self.samples.as_ref().clone())
    }
}

fn decode(bytes: Vec<u8>) -> Result<DecodedAudio, MediaError> {
    let decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| MediaError::Decode(e.to_string()))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<i16> = decoder.collect();
    if samples.is_empty() {
        return Err(MediaError::Decode("No audio frames".to_string()));
    }
    Ok(DecodedAudio {
        samples: Arc::new(samples),
        channels,
        sample_rate,
    })
}

enum Command {
    Create {
        audio: DecodedAudio,
        reply: oneshot::Sender<Result<MediaHandle, MediaError>>,
    },
    Start {
        handle: MediaHandle,
        position_seconds: f64,
        volume: f32,
    },
    Pause(MediaHandle),
    Seek(MediaHandle, f64),
    SetVolume(MediaHandle, f32),
    Release(MediaHandle),
}

struct Track {
    audio: DecodedAudio,
    sink: Sink,
    active: bool,
}

pub struct RodioBackend {
    commands: std_mpsc::Sender<Command>,
    fetcher: Arc<dyn SpeechApi>,
}

impl RodioBackend {
    /// Open the default output device. Remote sources are downloaded through
    /// `fetcher`. Backend events arrive on the returned receiver; hand it to
    /// `MediaSessionController::attach`.
    pub fn spawn(fetcher: Arc<dyn SpeechApi>) -> Result<(Self, mpsc::UnboundedReceiver<BackendEvent>), MediaError> {
        let (command_tx, command_rx) = std_mpsc::channel::<Command>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), MediaError>>();

        thread::spawn(move || {
            let (_stream, stream_handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = ready_tx.send(Err(MediaError::BackendUnavailable(e.to_string())));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            log::info!("Audio output thread started");

            let mut tracks: HashMap<MediaHandle, Track> = HashMap::new();
            let mut next_handle: u64 = 0;

            loop {
                match command_rx.recv_timeout(POLL_INTERVAL) {
                    Ok(Command::Create { audio, reply }) => {
                        let result = Sink::try_new(&stream_handle)
                            .map_err(|e| MediaError::BackendUnavailable(e.to_string()))
                            .map(|sink| {
                                sink.pause();
                                next_handle += 1;
                                let handle = MediaHandle(next_handle);
                                tracks.insert(
                                    handle,
                                    Track {
                                        audio,
                                        sink,
                                        active: false,
                                    },
                                );
                                handle
                            });
                        let _ = reply.send(result);
                    }
                    Ok(Command::Start {
                        handle,
                        position_seconds,
                        volume,
                    }) => {
                        if let Some(track) = tracks.get_mut(&handle) {
                            if track.sink.empty() {
                                track.sink.append(track.audio.buffer());
                            }
                            if let Err(e) = track
                                .sink
                                .try_seek(Duration::from_secs_f64(position_seconds.max(0.0)))
                            {
                                log::warn!("Seek before start failed: {}", e);
                            }
                            track.sink.set_volume(volume);
                            track.sink.play();
                            track.active = true;
                        }
                    }
                    Ok(Command::Pause(handle)) => {
                        if let Some(track) = tracks.get_mut(&handle) {
                            track.sink.pause();
                            track.active = false;
                        }
                    }
                    Ok(Command::Seek(handle, position)) => {
                        if let Some(track) = tracks.get_mut(&handle) {
                            if track.sink.empty() {
                                track.sink.append(track.audio.buffer());
                                track.sink.pause();
                            }
                            if let Err(e) = track.sink.try_seek(Duration::from_secs_f64(position)) {
                                log::warn!("Seek failed: {}", e);
                            }
                        }
                    }
                    Ok(Command::SetVolume(handle, volume)) => {
                        if let Some(track) = tracks.get(&handle) {
                            track.sink.set_volume(volume);
                        }
                    }
                    Ok(Command::Release(handle)) => {
                        if let Some(track) = tracks.remove(&handle) {
                            track.sink.stop();
                        }
                    }
                    Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
                }

                for (handle, track) in tracks.iter_mut().filter(|(_, t)| t.active) {
                    let event = if track.sink.empty() {
                        track.active = false;
                        BackendEvent::Ended { handle: *handle }
                    } else {
                        BackendEvent::TimeUpdate {
                            handle: *handle,
                            position_seconds: track.sink.get_pos().as_secs_f64(),
                        }
                    };
                    let _ = event_tx.send(event);
                }
            }

            log::info!("Audio output thread stopped");
        });

        ready_rx
            .recv()
            .map_err(|_| MediaError::BackendUnavailable("Audio thread exited".to_string()))??;

        Ok((
            Self {
                commands: command_tx,
                fetcher,
            },
            event_rx,
        ))
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::error!("Audio output thread is gone");
        }
    }
}

#[async_trait]
impl MediaBackend for RodioBackend {
    async fn load(&self, source: &MediaSource) -> Result<(MediaHandle, MediaMetadata), MediaError> {
        let bytes = source_bytes(source, self.fetcher.as_ref()).await?.to_vec();

        let audio = tokio::task::spawn_blocking(move || decode(bytes))
            .await
            .map_err(|e| MediaError::Decode(e.to_string()))??;
        let metadata = MediaMetadata {
            duration_seconds: audio.duration_seconds(),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Create {
                audio,
                reply: reply_tx,
            })
            .map_err(|_| MediaError::BackendUnavailable("Audio thread exited".to_string()))?;
        let handle = reply_rx
            .await
            .map_err(|_| MediaError::BackendUnavailable("Audio thread exited".to_string()))??;

        Ok((handle, metadata))
    }

    fn start(&self, handle: MediaHandle, position_seconds: f64, volume: f32) -> Result<(), MediaError> {
        self.commands
            .send(Command::Start {
                handle,
                position_seconds,
                volume,
            })
            .map_err(|_| MediaError::Playback("Audio thread exited".to_string()))
    }

    fn pause(&self, handle: MediaHandle) {
        self.send(Command::Pause(handle));
    }

    fn seek(&self, handle: MediaHandle, position_seconds: f64) {
        self.send(Command::Seek(handle, position_seconds));
    }

    fn set_volume(&self, handle: MediaHandle, volume: f32) {
        self.send(Command::SetVolume(handle, volume));
    }

    fn release(&self, handle: MediaHandle) {
        self.send(Command::Release(handle));
    }
}
