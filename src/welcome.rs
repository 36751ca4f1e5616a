use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;

use crate::api::SynthesisRequest;
use crate::flags::{FlagStore, WELCOME_PLAYED};
use crate::media::{MediaSource, ResourceId};
use crate::notification::Notification;
use crate::studio::{VoiceStudio, WELCOME_SLOT};

pub const WELCOME_MESSAGE: &str = "مرحباً بك في محول النص إلى كلام. يمكنك استخدام هذه الخدمة لتحويل النصوص العربية إلى ملفات صوتية.";

/// Voices the greeting is spoken with: Aria, Roger, Sarah
pub const WELCOME_VOICES: [&str; 3] = [
    "9BWtsMINqrJLrRacOk9x",
    "CwhRBWXzGAHq8TQ4Fs17",
    "EXAVITQu4vr4xnSDxMaL",
];

#[derive(Debug, Clone, PartialEq)]
pub enum WelcomeOutcome {
    AlreadyPlayed,
    Played(ResourceId),
    Failed,
}

pub fn pick_voice<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    WELCOME_VOICES.choose(rng).copied().unwrap_or(WELCOME_VOICES[0])
}

/// Speak the greeting once per installation.
///
/// The flag is only written after playback actually started, so a failed
/// attempt is retried on the next launch.
pub async fn play_welcome_once(studio: &VoiceStudio, flags: &mut FlagStore) -> WelcomeOutcome {
    if flags.is_set(WELCOME_PLAYED) {
        log::debug!("Welcome message already played");
        return WelcomeOutcome::AlreadyPlayed;
    }

    let voice = pick_voice(&mut rand::thread_rng());
    let settings = studio.settings();
    let request = SynthesisRequest::new(WELCOME_MESSAGE, voice)
        .with_model(settings.model_id.clone())
        .with_settings(settings.voice_settings());

    let failed = |reason: String| {
        log::warn!("Could not play welcome message: {}", reason);
        studio.notify(Notification::info("Notice", "The welcome message could not be played"));
        WelcomeOutcome::Failed
    };

    let payload = match studio.api().synthesize(&request).await {
        Ok(payload) => payload,
        Err(e) => return failed(e.to_string()),
    };

    let media = studio.media();
    let id = media.replace(WELCOME_SLOT, MediaSource::Blob(payload));
    if let Err(e) = media.play(&id).await {
        return failed(e.to_string());
    }

    if let Err(e) = flags.set(WELCOME_PLAYED, Value::Bool(true), None) {
        log::error!("Failed to persist welcome flag: {}", e);
    }
    log::info!("👋 Welcome message playing with voice {}", voice);
    WelcomeOutcome::Played(id)
}
