use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

use std::path::PathBuf;

use super::payload::{CaptureFormat, MIME_MPEG, MIME_WAV};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("No input device available")]
    NoDevice,

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Capture stream error: {0}")]
    Stream(String),
}

/// Channel end a capture stream pushes raw chunks into
pub type ChunkSender = UnboundedSender<Bytes>;

/// Source of microphone audio
pub trait Microphone: Send + Sync {
    /// Open the device and start pushing chunks. Fails fast when the device
    /// is missing or access is denied.
    fn open(&self, chunks: ChunkSender) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// A running capture; dropping it without `stop` abandons the stream
pub trait CaptureHandle: Send {
    fn format(&self) -> CaptureFormat;

    /// Stop capturing. Every chunk produced before this returns has been sent.
    fn stop(self: Box<Self>) -> Result<(), CaptureError>;
}

/// Replays an existing audio file as a single capture chunk
pub struct FileMicrophone {
    path: PathBuf,
}

impl FileMicrophone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn mime(&self) -> &'static str {
        match self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("wav") => MIME_WAV,
            Some("ogg") => "audio/ogg",
            Some("webm") => "audio/webm",
            _ => MIME_MPEG,
        }
    }
}

struct FileCapture {
    format: CaptureFormat,
}

impl CaptureHandle for FileCapture {
    fn format(&self) -> CaptureFormat {
        self.format.clone()
    }

    fn stop(self: Box<Self>) -> Result<(), CaptureError> {
        Ok(())
    }
}

impl Microphone for FileMicrophone {
    fn open(&self, chunks: ChunkSender) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let bytes = std::fs::read(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CaptureError::NoDevice,
            std::io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied(e.to_string()),
            _ => CaptureError::Stream(e.to_string()),
        })?;
        chunks
            .send(Bytes::from(bytes))
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        Ok(Box::new(FileCapture {
            format: CaptureFormat::Encoded {
                mime: self.mime().to_string(),
            },
        }))
    }
}

#[cfg(feature = "device-audio")]
pub use device::CpalMicrophone;

#[cfg(feature = "device-audio")]
mod device {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::mpsc;
    use std::thread;

    /// Default system input device via cpal
    #[derive(Default)]
    pub struct CpalMicrophone;

    impl CpalMicrophone {
        pub fn new() -> Self {
            Self
        }

        pub fn input_devices() -> Vec<String> {
            let host = cpal::default_host();
            host.input_devices()
                .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
                .unwrap_or_default()
        }
    }

    struct CpalCapture {
        format: CaptureFormat,
        stop_tx: mpsc::Sender<()>,
        thread_handle: thread::JoinHandle<Result<(), CaptureError>>,
    }

    impl CaptureHandle for CpalCapture {
        fn format(&self) -> CaptureFormat {
            self.format.clone()
        }

        fn stop(self: Box<Self>) -> Result<(), CaptureError> {
            self.stop_tx.send(()).ok();
            match self.thread_handle.join() {
                Ok(result) => result,
                Err(_) => Err(CaptureError::Stream("Capture thread panicked".to_string())),
            }
        }
    }

    fn send_i16(chunks: &ChunkSender, samples: impl Iterator<Item = i16>) {
        let bytes: Vec<u8> = samples.flat_map(|s| s.to_le_bytes()).collect();
        if !bytes.is_empty() {
            // Receiver gone means the session already stopped listening
            let _ = chunks.send(Bytes::from(bytes));
        }
    }

    fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::NoDevice,
            cpal::BuildStreamError::BackendSpecific { err } => {
                CaptureError::PermissionDenied(err.description)
            }
            other => CaptureError::Stream(other.to_string()),
        }
    }

    impl Microphone for CpalMicrophone {
        fn open(&self, chunks: ChunkSender) -> Result<Box<dyn CaptureHandle>, CaptureError> {
            let (ready_tx, ready_rx) = mpsc::channel::<Result<CaptureFormat, CaptureError>>();
            let (stop_tx, stop_rx) = mpsc::channel::<()>();

            // The cpal stream is not Send on every platform, so it lives on its own thread
            let thread_handle = thread::spawn(move || -> Result<(), CaptureError> {
                let host = cpal::default_host();
                let device = match host.default_input_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err(CaptureError::NoDevice));
                        return Err(CaptureError::NoDevice);
                    }
                };

                let config = match device.default_input_config() {
                    Ok(config) => config,
                    Err(e) => {
                        let err = CaptureError::PermissionDenied(e.to_string());
                        let _ = ready_tx.send(Err(CaptureError::PermissionDenied(e.to_string())));
                        return Err(err);
                    }
                };

                let format = CaptureFormat::Pcm16 {
                    sample_rate: config.sample_rate().0,
                    channels: config.channels(),
                };
                log::info!(
                    "Capturing with config: sample_rate={}, channels={}",
                    config.sample_rate().0,
                    config.channels()
                );

                let err_fn = |err| log::error!("Capture stream error: {}", err);

                let stream = match config.sample_format() {
                    cpal::SampleFormat::F32 => {
                        let chunks = chunks.clone();
                        device.build_input_stream(
                            &config.config(),
                            move |data: &[f32], _: &_| {
                                send_i16(
                                    &chunks,
                                    data.iter()
                                        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                                );
                            },
                            err_fn,
                            None,
                        )
                    }
                    cpal::SampleFormat::I16 => {
                        let chunks = chunks.clone();
                        device.build_input_stream(
                            &config.config(),
                            move |data: &[i16], _: &_| {
                                send_i16(&chunks, data.iter().copied());
                            },
                            err_fn,
                            None,
                        )
                    }
                    cpal::SampleFormat::U16 => {
                        let chunks = chunks.clone();
                        device.build_input_stream(
                            &config.config(),
                            move |data: &[u16], _: &_| {
                                send_i16(&chunks, data.iter().map(|&s| (s as i32 - 32768) as i16));
                            },
                            err_fn,
                            None,
                        )
                    }
                    other => {
                        let err = CaptureError::UnsupportedFormat(format!("{:?}", other));
                        let _ = ready_tx.send(Err(CaptureError::UnsupportedFormat(format!(
                            "{:?}",
                            other
                        ))));
                        return Err(err);
                    }
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let message = e.to_string();
                        let _ = ready_tx.send(Err(map_build_error(e)));
                        return Err(CaptureError::Stream(message));
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CaptureError::PermissionDenied(e.to_string())));
                    return Err(CaptureError::Stream(e.to_string()));
                }

                let _ = ready_tx.send(Ok(format));

                // Wait for stop signal
                stop_rx.recv().ok();
                drop(stream);
                Ok(())
            });

            match ready_rx.recv() {
                Ok(Ok(format)) => Ok(Box::new(CpalCapture {
                    format,
                    stop_tx,
                    thread_handle,
                })),
                Ok(Err(e)) => {
                    let _ = thread_handle.join();
                    Err(e)
                }
                Err(_) => Err(CaptureError::Stream(
                    "Capture thread exited before reporting readiness".to_string(),
                )),
            }
        }
    }
}
