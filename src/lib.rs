pub mod api;
pub mod audio;
pub mod catalog;
pub mod cli;
pub mod document;
pub mod flags;
pub mod media;
pub mod notification;
pub mod recording;
pub mod settings;
pub mod studio;
pub mod utils;
pub mod welcome;

#[cfg(test)]
mod tests;

use clap::Parser;

pub use media::{MediaSessionController, PlaybackState, ResourceId};
pub use recording::{RecordingSession, RecordingState};
pub use studio::VoiceStudio;

pub fn run() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = cli::Cli::parse();
    log::info!("Starting voice-studio v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start async runtime: {}", e))?;
    runtime.block_on(cli::execute(cli))
}
