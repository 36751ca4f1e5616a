use bytes::{Bytes, BytesMut};
use std::io::Cursor;
use std::path::Path;

pub const MIME_MPEG: &str = "audio/mpeg";
pub const MIME_WAV: &str = "audio/wav";

/// Format of the raw bytes a capture device delivers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Interleaved signed 16-bit little-endian PCM
    Pcm16 { sample_rate: u32, channels: u16 },
    /// Already-encoded container bytes (the chunks are concatenated as-is)
    Encoded { mime: String },
}

/// An immutable, finalized piece of audio (synthesis output or a recording)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    bytes: Bytes,
    mime: String,
}

impl AudioPayload {
    pub fn new(bytes: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    /// Concatenate captured chunks into one payload.
    ///
    /// PCM captures are wrapped in a WAV container; a trailing partial frame
    /// (an odd byte, or fewer samples than channels) is dropped.
    pub fn assemble(chunks: &[Bytes], format: &CaptureFormat) -> Result<Self, hound::Error> {
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut joined = BytesMut::with_capacity(total);
        for chunk in chunks {
            joined.extend_from_slice(chunk);
        }

        match format {
            CaptureFormat::Encoded { mime } => Ok(Self::new(joined.freeze(), mime.clone())),
            CaptureFormat::Pcm16 {
                sample_rate,
                channels,
            } => {
                let spec = hound::WavSpec {
                    channels: *channels,
                    sample_rate: *sample_rate,
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                };

                let mut cursor = Cursor::new(Vec::with_capacity(total + 44));
                {
                    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
                    let frame_len = 2 * usize::from((*channels).max(1));
                    for frame in joined.chunks_exact(frame_len) {
                        for pair in frame.chunks_exact(2) {
                            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
                        }
                    }
                    writer.finalize()?;
                }

                Ok(Self::new(cursor.into_inner(), MIME_WAV))
            }
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn file_extension(&self) -> &'static str {
        match self.mime.as_str() {
            MIME_WAV | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            _ => "mp3",
        }
    }

    /// Write the clip to disk (the "download" action)
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &self.bytes)?;
        log::info!("Saved {} bytes of {} to {:?}", self.len(), self.mime, path);
        Ok(())
    }
}
