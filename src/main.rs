fn main() {
    if let Err(e) = voice_studio_lib::run() {
        eprintln!("voice-studio: {}", e);
        std::process::exit(1);
    }
}
