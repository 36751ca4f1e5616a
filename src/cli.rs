//! `voice-studio` command-line front-end.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::api::secrets::resolve_api_key;
use crate::api::{EnvSecretStore, RemoteSecretStore, SecretStore, SpeechApi, SpeechClient};
use crate::audio::{FileMicrophone, Microphone};
use crate::catalog::{LanguageFilter, VoiceFilter};
use crate::document::{looks_like_pdf, UploadedFile};
use crate::flags::{FlagStore, WELCOME_PLAYED};
use crate::media::{
    format_time, BackendEvent, MediaBackend, MediaEvent, MediaSessionController, PlaybackState,
    ResourceId, SilentBackend,
};
use crate::notification::LogNotifier;
use crate::recording::RecordingSession;
use crate::settings::Settings;
use crate::studio::VoiceStudio;
use crate::welcome::{play_welcome_once, WelcomeOutcome};

/// Text-to-speech and voice conversion studio
#[derive(Parser)]
#[command(name = "voice-studio")]
#[command(version)]
#[command(about = "Synthesize speech and re-voice recordings with hosted voices", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available voices
    Voices {
        /// Language filter: "all", a language, or "!language" to exclude it
        #[arg(short, long)]
        language: Option<String>,
        /// Search in name, description, language and accent
        #[arg(short, long, default_value = "")]
        query: String,
    },

    /// Convert text to speech
    Speak {
        /// Text to speak; omit to read --file
        text: Option<String>,
        /// Voice id
        #[arg(short, long)]
        voice: String,
        /// Read the text from a UTF-8 file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Directory to save the clip into
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Play the clip after it is generated
        #[arg(long)]
        play: bool,
    },

    /// Re-voice an existing recording
    Convert {
        /// Audio file to convert
        input: PathBuf,
        /// Target voice id
        #[arg(short, long)]
        voice: String,
        /// Directory to save the result into
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long)]
        play: bool,
    },

    /// Play a voice's preview sample
    Preview {
        /// Voice id
        voice: String,
    },

    /// Record from the microphone and re-voice the take
    Record {
        /// Target voice id
        #[arg(short, long)]
        voice: String,
        /// Recording length in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Play the one-time welcome message
    Welcome {
        /// Forget that the welcome message was played
        #[arg(long)]
        reset: bool,
    },
}

fn load_settings(path: Option<&Path>) -> Result<Settings, String> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Settings::default_path().ok_or("Could not determine config directory")?,
    };
    Settings::load(&path).map_err(|e| e.to_string())
}

/// Text for `speak --file`. PDFs are refused up front since the command line
/// has no PDF parser.
fn read_text_file(path: &Path) -> Result<String, String> {
    let file = UploadedFile::read(path).map_err(|e| format!("Could not read {}: {}", path.display(), e))?;
    if looks_like_pdf(&file) {
        return Err(format!(
            "{} is a PDF; PDF text extraction is not available from the command line, pass a plain-text file",
            path.display()
        ));
    }
    String::from_utf8(file.bytes.to_vec()).map_err(|_| format!("{} is not UTF-8 text", path.display()))
}

async fn build_api(settings: &Settings) -> Result<Arc<dyn SpeechApi>, String> {
    let store: Box<dyn SecretStore> = match &settings.secret_endpoint {
        Some(endpoint) => Box::new(RemoteSecretStore::new(endpoint.clone())),
        None => Box::new(EnvSecretStore::new()),
    };
    let api_key = resolve_api_key(store.as_ref())
        .await
        .map_err(|e| format!("Could not obtain API credentials: {}", e))?;

    let client = SpeechClient::new(
        &settings.api_base_url,
        api_key,
        settings.request_timeout_secs.map(Duration::from_secs),
    )
    .map_err(|e| e.to_string())?
    .with_max_audio_bytes(settings.max_audio_bytes());
    Ok(Arc::new(client))
}

type BackendEvents = tokio::sync::mpsc::UnboundedReceiver<BackendEvent>;

fn silent_backend() -> (Arc<dyn MediaBackend>, BackendEvents) {
    let (backend, events) = SilentBackend::with_events();
    (Arc::new(backend), events)
}

#[cfg(feature = "device-audio")]
fn build_backend(api: Arc<dyn SpeechApi>) -> (Arc<dyn MediaBackend>, BackendEvents) {
    match crate::media::RodioBackend::spawn(api) {
        Ok((backend, events)) => (Arc::new(backend), events),
        Err(e) => {
            log::warn!("Audio output unavailable ({}); continuing without sound", e);
            silent_backend()
        }
    }
}

#[cfg(not(feature = "device-audio"))]
fn build_backend(_api: Arc<dyn SpeechApi>) -> (Arc<dyn MediaBackend>, BackendEvents) {
    log::info!("Built without device audio; playback is silent");
    silent_backend()
}

async fn build_studio(settings: Settings) -> Result<VoiceStudio, String> {
    let api = build_api(&settings).await?;

    let (backend, events) = build_backend(api.clone());
    let media = MediaSessionController::new(backend, settings.default_volume);
    media.attach(events);

    Ok(VoiceStudio::new(api, media, Arc::new(LogNotifier), settings))
}

/// Block until `id` stops playing
async fn wait_for_playback(media: &MediaSessionController, id: &ResourceId) {
    let mut events = media.subscribe();
    let still_playing = |media: &MediaSessionController| {
        media
            .snapshot(id)
            .map(|r| r.state == PlaybackState::Playing)
            .unwrap_or(false)
    };
    if !still_playing(media) {
        return;
    }

    loop {
        match events.recv().await {
            Ok(MediaEvent::StateChanged { id: changed, state }) if &changed == id => {
                if state != PlaybackState::Playing {
                    break;
                }
            }
            Ok(MediaEvent::TimeUpdate {
                id: changed,
                position_seconds,
            }) if &changed == id => {
                log::debug!("{}", format_time(position_seconds));
            }
            Ok(MediaEvent::Released { id: changed }) if &changed == id => break,
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                if !still_playing(media) {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn finish_clip(studio: &VoiceStudio, id: ResourceId, out: Option<PathBuf>, play: bool) -> Result<(), String> {
    let dir = match out {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| e.to_string())?,
    };
    let saved = studio.download(&dir).ok_or("Could not save the audio")?;
    println!("Saved {}", saved.display());

    if play && studio.media().play(&id).await.is_ok() {
        wait_for_playback(studio.media(), &id).await;
    }
    Ok(())
}

async fn record_take(studio: &VoiceStudio, microphone: &dyn Microphone, seconds: u64) -> Result<Option<ResourceId>, String> {
    let mut session = RecordingSession::new();
    if !studio.start_recording(&mut session, microphone) {
        return Err("Recording could not be started".to_string());
    }
    if seconds > 0 {
        println!("Recording for {}s...", seconds);
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
    Ok(studio.convert_recording(&mut session).await)
}

#[cfg(feature = "device-audio")]
fn default_microphone() -> Result<Box<dyn Microphone>, String> {
    Ok(Box::new(crate::audio::capture::CpalMicrophone::new()))
}

#[cfg(not(feature = "device-audio"))]
fn default_microphone() -> Result<Box<dyn Microphone>, String> {
    Err("This build has no microphone support (enable the device-audio feature)".to_string())
}

pub async fn execute(cli: Cli) -> Result<(), String> {
    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Voices { language, query } => {
            let studio = build_studio(settings).await?;
            let language = language.unwrap_or_else(|| studio.settings().language_filter.clone());
            studio.load_voices().await;

            let filter = VoiceFilter::new(LanguageFilter::parse(&language), query);
            for voice in studio.filtered_voices(&filter) {
                println!(
                    "{:<24} {:<20} {:<10} {:<12} {}",
                    voice.id,
                    voice.display_name,
                    voice.language_label,
                    voice.accent_label,
                    voice.description.unwrap_or_default()
                );
            }
        }
        Commands::Speak {
            text,
            voice,
            file,
            out,
            play,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => read_text_file(&path)?,
                (None, None) => return Err("Provide text or --file".to_string()),
            };

            let studio = build_studio(settings).await?;
            studio.select_voice(&voice);
            let id = studio.convert_text(&text).await.ok_or("Synthesis failed")?;
            finish_clip(&studio, id, out, play).await?;
        }
        Commands::Convert {
            input,
            voice,
            out,
            play,
        } => {
            let studio = build_studio(settings).await?;
            studio.select_voice(&voice);
            let microphone = FileMicrophone::new(input);
            let id = record_take(&studio, &microphone, 0)
                .await?
                .ok_or("Conversion failed")?;
            finish_clip(&studio, id, out, play).await?;
        }
        Commands::Preview { voice } => {
            let studio = build_studio(settings).await?;
            studio.load_voices().await;
            if studio.preview_voice(&voice).await == Some(PlaybackState::Playing) {
                if let Some(id) = studio.media().now_playing() {
                    wait_for_playback(studio.media(), &id).await;
                }
            }
        }
        Commands::Record {
            voice,
            seconds,
            out,
        } => {
            let microphone = default_microphone()?;
            let studio = build_studio(settings).await?;
            studio.select_voice(&voice);
            let id = record_take(&studio, microphone.as_ref(), seconds)
                .await?
                .ok_or("Conversion failed")?;
            finish_clip(&studio, id, out, false).await?;
        }
        Commands::Welcome { reset } => {
            let path = FlagStore::default_path().ok_or("Could not determine config directory")?;
            let mut flags = FlagStore::open(&path).map_err(|e| e.to_string())?;
            if reset {
                flags.remove(WELCOME_PLAYED).map_err(|e| e.to_string())?;
                println!("Welcome message will play on next run");
                return Ok(());
            }

            let studio = build_studio(settings).await?;
            match play_welcome_once(&studio, &mut flags).await {
                WelcomeOutcome::Played(id) => wait_for_playback(studio.media(), &id).await,
                WelcomeOutcome::AlreadyPlayed => println!("Welcome message already played"),
                WelcomeOutcome::Failed => return Err("Welcome message could not be played".to_string()),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_speak_file_rejects_pdf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("letter.pdf");
        std::fs::write(&path, b"%PDF-1.7 binary").unwrap();

        let err = read_text_file(&path).unwrap_err();
        assert!(err.contains("is a PDF"));
    }

    #[test]
    fn test_speak_file_reads_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("script.txt");
        std::fs::write(&path, "مرحبا").unwrap();
        assert_eq!(read_text_file(&path).unwrap(), "مرحبا");

        let binary = dir.path().join("noise.bin");
        std::fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        assert!(read_text_file(&binary).unwrap_err().contains("not UTF-8"));
    }
}
